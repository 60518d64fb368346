use anyhow::Result;

use crate::config::FilterConfig;
use crate::gps_processor::{self, GpsFix};
use crate::kv_store::KvStore;
use crate::raw_data_recorder::RawDataRecorder;
use crate::session_store::SessionStore;

/* Entry point for the host's background location task. It runs in whatever
context the OS wakes us up in, possibly a fresh process, so it shares nothing
with the controller except the durable store: it reads the session record and
the last persisted point, filters the batch and appends what survives.
*/
pub struct BackgroundTracker<S: KvStore> {
    store: SessionStore<S>,
    filter: FilterConfig,
    raw_data_recorder: Option<RawDataRecorder>,
}

impl<S: KvStore> BackgroundTracker<S> {
    pub fn new(kv: S, filter: FilterConfig) -> Self {
        BackgroundTracker {
            store: SessionStore::new(kv),
            filter,
            raw_data_recorder: None,
        }
    }

    pub fn set_raw_data_recorder(&mut self, raw_data_recorder: Option<RawDataRecorder>) {
        self.raw_data_recorder = raw_data_recorder;
    }

    /// Returns how many fixes of the batch were appended.
    pub async fn on_locations(&mut self, mut fixes: Vec<GpsFix>) -> Result<usize> {
        match self.store.read_session().await? {
            Some(record) if record.accepts_points() => (),
            Some(_) => {
                debug!("[background_tracker] session not accepting points, dropping batch");
                return Ok(0);
            }
            None => {
                debug!("[background_tracker] no session, dropping batch");
                return Ok(0);
            }
        }

        // NOTE: batches are not guaranteed to be ordered.
        fixes.sort_by_key(|fix| fix.timestamp);

        let mut last_accepted = self.store.read_points().await?.pop();
        let mut accepted = Vec::new();
        for fix in fixes {
            let process_result = gps_processor::check(&self.filter, last_accepted.as_ref(), &fix);
            if let Some(recorder) = self.raw_data_recorder.as_mut() {
                if let Err(error) = recorder.record(&fix, "background", process_result) {
                    warn!("[background_tracker] failed to record raw data: {}", error);
                }
            }
            if process_result.is_accepted() {
                last_accepted = Some(fix.clone());
                accepted.push(fix);
            }
        }

        let total = self.store.append_points(&accepted).await?;
        info!(
            "[background_tracker] appended {} points, total persisted: {}",
            accepted.len(),
            total
        );
        Ok(accepted.len())
    }
}
