use anyhow::{Context, Result};

use crate::gps_processor::GpsFix;
use crate::kv_store::KvStore;
use crate::session::SessionRecord;

pub const SESSION_KEY: &str = "tracking_session";
pub const POINTS_KEY: &str = "tracking_points";

/* Typed view over the durable kv store. The session record and the points
are kept under two keys so the (frequent) point appends never rewrite the
record and vice versa.

Writes are last-write-wins. There is no coordination between writers because
only one tracker is supposed to be active at a time, and only the controller
clears anything.
*/
pub struct SessionStore<S: KvStore> {
    kv: S,
}

impl<S: KvStore> SessionStore<S> {
    pub fn new(kv: S) -> Self {
        SessionStore { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub async fn read_session(&self) -> Result<Option<SessionRecord>> {
        match self.kv.get(SESSION_KEY).await? {
            None => Ok(None),
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .with_context(|| format!("invalid `{}` payload", SESSION_KEY))?;
                Ok(Some(record))
            }
        }
    }

    pub async fn write_session(&self, record: &SessionRecord) -> Result<()> {
        self.kv
            .set(SESSION_KEY, serde_json::to_string(record)?)
            .await
    }

    pub async fn read_points(&self) -> Result<Vec<GpsFix>> {
        match self.kv.get(POINTS_KEY).await? {
            None => Ok(Vec::new()),
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("invalid `{}` payload", POINTS_KEY)),
        }
    }

    /// Returns the number of persisted points after the append.
    pub async fn append_points(&self, new_points: &[GpsFix]) -> Result<usize> {
        let mut points = self.read_points().await?;
        if new_points.is_empty() {
            return Ok(points.len());
        }
        points.extend_from_slice(new_points);
        self.kv
            .set(POINTS_KEY, serde_json::to_string(&points)?)
            .await?;
        Ok(points.len())
    }

    /// Toggles whether the background callback may append. A no-op when
    /// there is no session.
    pub async fn set_background_enabled(&self, enabled: bool) -> Result<()> {
        if let Some(mut record) = self.read_session().await? {
            if record.is_active != enabled {
                record.is_active = enabled;
                self.write_session(&record).await?;
            }
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.kv.remove(SESSION_KEY).await?;
        self.kv.remove(POINTS_KEY).await?;
        Ok(())
    }
}
