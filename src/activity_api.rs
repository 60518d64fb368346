use anyhow::Result;
use std::future::Future;

use crate::session::ActivitySummary;

/// The remote activity service. Returns the id of the stored record.
pub trait ActivityApi: Send + Sync {
    fn create_activity(
        &self,
        summary: &ActivitySummary,
    ) -> impl Future<Output = Result<String>> + Send;
}
