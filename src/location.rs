use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc;

use crate::gps_processor::GpsFix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub min_interval_ms: u64,
    pub min_distance_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions {
            min_interval_ms: 1000,
            min_distance_m: 5.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum PermissionKind {
    #[strum(serialize = "foreground")]
    Foreground,
    #[strum(serialize = "background")]
    Background,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("location provider error: {0}")]
pub struct ProviderError(pub String);

pub type LocationSender = mpsc::UnboundedSender<Result<GpsFix, ProviderError>>;

/// A live stream of fixes. Dropping it (or calling `cancel`) unsubscribes,
/// nothing is delivered afterwards.
pub struct LocationSubscription {
    receiver: mpsc::UnboundedReceiver<Result<GpsFix, ProviderError>>,
}

impl LocationSubscription {
    // For providers: the sender side is fed by the platform callback.
    pub fn channel() -> (LocationSender, LocationSubscription) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, LocationSubscription { receiver })
    }

    /// `None` means the provider closed the stream.
    pub async fn recv(&mut self) -> Option<Result<GpsFix, ProviderError>> {
        self.receiver.recv().await
    }

    pub fn cancel(mut self) {
        self.receiver.close();
    }
}

/// The platform location service. Background delivery is not part of this
/// trait: the host registers its own task and forwards batches to
/// `BackgroundTracker::on_locations`.
pub trait LocationProvider: Send + Sync {
    fn request_foreground_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus>> + Send;

    fn request_background_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus>> + Send;

    fn current_fix(&self) -> impl Future<Output = Result<GpsFix>> + Send;

    fn watch(
        &self,
        options: &WatchOptions,
    ) -> impl Future<Output = Result<LocationSubscription>> + Send;
}
