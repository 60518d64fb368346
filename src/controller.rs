use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::activity_api::ActivityApi;
use crate::clock::{Clock, SystemClock};
use crate::config::TrackingConfig;
use crate::error::{Result, SessionError};
use crate::foreground_tracker::{ForegroundEvent, ForegroundTracker};
use crate::gps_processor::{GpsFix, ProcessResult};
use crate::kv_store::KvStore;
use crate::location::{LocationProvider, PermissionKind, PermissionStatus};
use crate::raw_data_recorder::RawDataRecorder;
use crate::session::{
    ActivitySummary, ActivityType, LiveStats, SessionState, SessionStatus, TrackingSession,
};
use crate::session_store::SessionStore;
use crate::utils;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AppState {
    Foreground,
    Background,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    pub point_count: usize,
    pub distance_m: f64,
    // whether the in-memory points were replaced by the persisted ones
    pub replaced: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackingEvent {
    FixAccepted { fix: GpsFix, stats: LiveStats },
    FixRejected { fix: GpsFix, reason: ProcessResult },
    Tick(LiveStats),
    // the session keeps going, points collected so far stay valid
    ProviderUnavailable(String),
    // an accepted fix could not be persisted and was dropped
    PersistenceFailure(String),
}

/* The recording state machine.

   idle --start--> recording --pause--> paused --resume--> recording
   recording/paused --discard/save--> idle
   idle --recover--> recording/paused   (on relaunch)

Every transition either completes all its side effects or leaves both the
in-memory state and the store as they were. Fallible steps are ordered first
where possible, and undone explicitly where not.

The store is the source of truth for points. The in-memory session is a cache
that is only ever replaced by a longer persisted sequence, never the other
way round.
*/
pub struct SessionController<S: KvStore, L: LocationProvider, A: ActivityApi> {
    store: SessionStore<S>,
    provider: L,
    api: A,
    clock: Arc<dyn Clock>,
    state: SessionState,
    foreground: ForegroundTracker,
    in_background: bool,
    raw_data_recorder: Option<RawDataRecorder>,
}

impl<S: KvStore, L: LocationProvider, A: ActivityApi> SessionController<S, L, A> {
    pub fn new(config: &TrackingConfig, kv: S, provider: L, api: A) -> Self {
        SessionController {
            store: SessionStore::new(kv),
            provider,
            api,
            clock: Arc::new(SystemClock),
            state: SessionState::Idle,
            foreground: ForegroundTracker::new(config),
            in_background: false,
            raw_data_recorder: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_raw_data_recorder(&mut self, raw_data_recorder: Option<RawDataRecorder>) {
        self.raw_data_recorder = raw_data_recorder;
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.state.session()
    }

    pub fn points(&self) -> &[GpsFix] {
        self.state.session().map(|s| s.points()).unwrap_or_default()
    }

    pub fn current_fix(&self) -> Option<&GpsFix> {
        self.foreground.current_fix()
    }

    pub fn is_in_background(&self) -> bool {
        self.in_background
    }

    pub fn is_tracking_in_foreground(&self) -> bool {
        self.foreground.is_running()
    }

    pub fn live_stats(&self) -> LiveStats {
        let now = self.clock.now();
        match &self.state {
            SessionState::Idle => LiveStats {
                status: SessionStatus::Idle,
                distance_m: 0.0,
                duration_sec: 0,
                point_count: 0,
                current_speed_kmh: None,
                average_speed_kmh: 0.0,
            },
            SessionState::Recording { session } => {
                self.stats_of(session, SessionStatus::Recording, now)
            }
            SessionState::Paused { session, paused_at } => {
                self.stats_of(session, SessionStatus::Paused, *paused_at)
            }
        }
    }

    fn stats_of(
        &self,
        session: &TrackingSession,
        status: SessionStatus,
        at: DateTime<Utc>,
    ) -> LiveStats {
        let duration_sec = session.duration_sec(at);
        let current_speed_kmh = match status {
            SessionStatus::Recording => self
                .foreground
                .current_fix()
                .and_then(|fix| fix.speed)
                .map(|speed| utils::meters_per_second_to_km_per_hour(speed.max(0.0))),
            _ => None,
        };
        LiveStats {
            status,
            distance_m: session.distance_m(),
            duration_sec,
            point_count: session.points().len(),
            current_speed_kmh,
            average_speed_kmh: utils::average_speed_km_per_hour(session.distance_m(), duration_sec),
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            from: self.state.status(),
            action,
        }
    }

    async fn require_permissions(&self) -> Result<()> {
        let foreground = self
            .provider
            .request_foreground_permission()
            .await
            .map_err(SessionError::provider)?;
        if foreground == PermissionStatus::Denied {
            warn!("[controller] foreground location permission denied");
            return Err(SessionError::PermissionDenied(PermissionKind::Foreground));
        }
        let background = self
            .provider
            .request_background_permission()
            .await
            .map_err(SessionError::provider)?;
        if background == PermissionStatus::Denied {
            warn!("[controller] background location permission denied");
            return Err(SessionError::PermissionDenied(PermissionKind::Background));
        }
        Ok(())
    }

    pub async fn start(&mut self, activity_type: ActivityType) -> Result<()> {
        if !matches!(self.state, SessionState::Idle) {
            return Err(self.invalid("start"));
        }
        self.require_permissions().await?;

        let session = TrackingSession::new(activity_type, self.clock.now());
        // wipe whatever a previous run left behind
        self.store.clear().await?;
        // `is_active` in the record is what enables the background tracker
        self.store.write_session(&session.to_record(None)).await?;

        if !self.in_background {
            if let Err(error) = self.foreground.start(&self.provider, None).await {
                if let Err(clear_error) = self.store.clear().await {
                    error!("[controller] failed to roll back start: {:#}", clear_error);
                }
                return Err(SessionError::provider(error));
            }
            match self.provider.current_fix().await {
                Ok(fix) => self.foreground.set_current_fix(fix),
                Err(error) => debug!("[controller] no current fix at start: {:#}", error),
            }
        }

        info!(
            "[controller] session started: id={}, activity_type={}",
            session.id, activity_type
        );
        self.state = SessionState::Recording { session };
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<()> {
        let now = self.clock.now();
        let record = match &self.state {
            SessionState::Recording { session } => session.to_record(Some(now)),
            _ => return Err(self.invalid("pause")),
        };
        self.store.write_session(&record).await?;
        self.foreground.stop();

        if let SessionState::Recording { session } =
            std::mem::replace(&mut self.state, SessionState::Idle)
        {
            info!("[controller] session paused: id={}", session.id);
            self.state = SessionState::Paused {
                session,
                paused_at: now,
            };
        }
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<()> {
        let now = self.clock.now();
        let (previous_record, paused_for_sec, last_point) = match &self.state {
            SessionState::Paused { session, paused_at } => (
                session.to_record(Some(*paused_at)),
                (now - *paused_at).num_seconds().max(0),
                session.last_point().cloned(),
            ),
            _ => return Err(self.invalid("resume")),
        };

        let mut record = previous_record.clone();
        record.is_paused = false;
        record.paused_at = None;
        record.paused_duration_sec += paused_for_sec;
        self.store.write_session(&record).await?;

        if !self.in_background {
            if let Err(error) = self.foreground.start(&self.provider, last_point).await {
                if let Err(write_error) = self.store.write_session(&previous_record).await {
                    error!("[controller] failed to roll back resume: {:#}", write_error);
                }
                return Err(SessionError::provider(error));
            }
        }

        if let SessionState::Paused { mut session, .. } =
            std::mem::replace(&mut self.state, SessionState::Idle)
        {
            session.paused_duration_sec += paused_for_sec;
            info!(
                "[controller] session resumed: id={}, paused_for_sec={}",
                session.id, paused_for_sec
            );
            self.state = SessionState::Recording { session };
        }
        Ok(())
    }

    /// Drops the current session without producing a summary. Works from any
    /// state, from `Idle` it only wipes leftovers in the store.
    pub async fn stop_and_discard(&mut self) -> Result<()> {
        // removing the record also disables the background tracker
        self.store.clear().await?;
        self.foreground.stop();
        if let Some(session) = self.state.session() {
            info!(
                "[controller] session discarded: id={}, points={}",
                session.id,
                session.points().len()
            );
        }
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Finalizes the session and hands the summary to the activity API. On
    /// any failure the session is left exactly as it was, so the caller can
    /// retry, keep recording or discard.
    pub async fn stop_and_save(&mut self) -> Result<(ActivitySummary, String)> {
        if matches!(self.state, SessionState::Idle) {
            return Err(self.invalid("save"));
        }
        self.reconcile().await?;

        let now = self.clock.now();
        let summary = match self.state.session() {
            None => return Err(self.invalid("save")),
            Some(session) if session.points().len() < 2 => {
                info!(
                    "[controller] refusing to save session with {} points",
                    session.points().len()
                );
                return Err(SessionError::InsufficientData {
                    points: session.points().len(),
                });
            }
            Some(session) => session.summarize(self.state.paused_at().unwrap_or(now), now),
        };

        let foreground_was_running = self.foreground.is_running();
        self.foreground.stop();
        if let Err(error) = self.store.set_background_enabled(false).await {
            self.restore_foreground(foreground_was_running).await;
            return Err(error.into());
        }

        let record_id = match self.api.create_activity(&summary).await {
            Ok(record_id) => record_id,
            Err(error) => {
                warn!("[controller] failed to save activity: {:#}", error);
                self.restore_foreground(foreground_was_running).await;
                // `recover` drops inactive records, this must reach the caller
                if let Err(enable_error) = self.store.set_background_enabled(true).await {
                    error!(
                        "[controller] failed to re-enable background tracker: {:#}",
                        enable_error
                    );
                    let error = format!("failed to re-enable session after: {:#}", error);
                    return Err(SessionError::PersistenceFailure(enable_error.context(error)));
                }
                return Err(SessionError::PersistenceFailure(error));
            }
        };

        // The activity is stored remotely at this point, failing here would
        // only invite a duplicate on retry. The leftover record is inactive
        // and gets wiped by the next `start` or `recover`.
        if let Err(error) = self.store.clear().await {
            warn!("[controller] failed to clear session store after save: {:#}", error);
        }
        info!(
            "[controller] session saved: id={}, record_id={}, distance_m={:.1}, duration_sec={}",
            summary.session_id, record_id, summary.distance_m, summary.duration_sec
        );
        self.state = SessionState::Idle;
        Ok((summary, record_id))
    }

    async fn restore_foreground(&mut self, was_running: bool) {
        if !was_running {
            return;
        }
        let last_point = self.state.session().and_then(|s| s.last_point().cloned());
        if let Err(error) = self.foreground.start(&self.provider, last_point).await {
            error!("[controller] failed to restart foreground tracker: {:#}", error);
        }
    }

    /// Pulls in points the background callback persisted while we were not
    /// looking. Only a longer persisted sequence replaces the in-memory one,
    /// and distance is then recomputed over the whole sequence.
    pub async fn reconcile(&mut self) -> Result<Reconciliation> {
        let persisted = self.store.read_points().await?;
        let session = match self.state.session_mut() {
            None => {
                return Ok(Reconciliation {
                    point_count: 0,
                    distance_m: 0.0,
                    replaced: false,
                })
            }
            Some(session) => session,
        };
        let replaced = persisted.len() > session.points().len();
        if replaced {
            info!(
                "[controller] reconciling: in_memory={}, persisted={}",
                session.points().len(),
                persisted.len()
            );
            session.replace_points(persisted);
            self.foreground
                .reset_last_accepted(session.last_point().cloned());
        }
        Ok(Reconciliation {
            point_count: session.points().len(),
            distance_m: session.distance_m(),
            replaced,
        })
    }

    /// Called by the host's lifecycle notifier. Going to the background hands
    /// tracking over to the background callback; coming back reconciles and
    /// takes it over again.
    pub async fn on_app_state_change(
        &mut self,
        app_state: AppState,
    ) -> Result<Option<Reconciliation>> {
        match app_state {
            AppState::Background => {
                if !self.in_background {
                    info!("[controller] app moved to background");
                    self.foreground.stop();
                    self.in_background = true;
                }
                Ok(None)
            }
            AppState::Foreground => {
                if matches!(self.state, SessionState::Idle) {
                    self.in_background = false;
                    return Ok(None);
                }
                let reconciliation = self.reconcile().await?;
                self.in_background = false;
                if let SessionState::Recording { session } = &self.state {
                    if !self.foreground.is_running() {
                        let last_point = session.last_point().cloned();
                        self.foreground
                            .start(&self.provider, last_point)
                            .await
                            .map_err(SessionError::provider)?;
                    }
                }
                info!(
                    "[controller] app moved to foreground: points={}, replaced={}",
                    reconciliation.point_count, reconciliation.replaced
                );
                Ok(Some(reconciliation))
            }
        }
    }

    /// Restores an unfinished session after the app was relaunched.
    pub async fn recover(&mut self) -> Result<SessionStatus> {
        if !matches!(self.state, SessionState::Idle) {
            return Err(self.invalid("recover"));
        }
        let record = match self.store.read_session().await? {
            None => return Ok(SessionStatus::Idle),
            Some(record) => record,
        };
        if !record.is_active {
            info!("[controller] dropping inactive session record: id={}", record.id);
            self.store.clear().await?;
            return Ok(SessionStatus::Idle);
        }

        let points = self.store.read_points().await?;
        let session = TrackingSession::from_record(&record, points);
        if record.is_paused {
            let paused_at = match record.paused_at {
                Some(paused_at) => paused_at,
                None => {
                    warn!("[controller] paused session without pause timestamp, using now");
                    self.clock.now()
                }
            };
            self.state = SessionState::Paused { session, paused_at };
        } else {
            if !self.in_background {
                self.foreground
                    .start(&self.provider, session.last_point().cloned())
                    .await
                    .map_err(SessionError::provider)?;
            }
            self.state = SessionState::Recording { session };
        }
        if let Some(session) = self.state.session() {
            info!(
                "[controller] session recovered: id={}, status={}, points={}, distance_m={:.1}",
                session.id,
                self.state.status(),
                session.points().len(),
                session.distance_m()
            );
        }
        Ok(self.state.status())
    }

    /// Waits for the next fix or tick. `None` when nothing is being tracked
    /// in the foreground (idle, paused or backgrounded).
    pub async fn next_event(&mut self) -> Option<TrackingEvent> {
        let event = self.foreground.next_event().await?;
        Some(match event {
            ForegroundEvent::Tick => TrackingEvent::Tick(self.live_stats()),
            ForegroundEvent::Fix(Ok(fix)) => self.handle_fix(fix).await,
            ForegroundEvent::Fix(Err(error)) => {
                warn!("[controller] location provider error: {}", error);
                TrackingEvent::ProviderUnavailable(error.0)
            }
            ForegroundEvent::StreamClosed => {
                TrackingEvent::ProviderUnavailable("location stream closed".to_string())
            }
        })
    }

    async fn handle_fix(&mut self, fix: GpsFix) -> TrackingEvent {
        let process_result = self.foreground.process(&fix);
        if let Some(recorder) = self.raw_data_recorder.as_mut() {
            if let Err(error) = recorder.record(&fix, "foreground", process_result) {
                warn!("[controller] failed to record raw data: {}", error);
            }
        }
        if !process_result.is_accepted() {
            return TrackingEvent::FixRejected {
                fix,
                reason: process_result,
            };
        }

        if let Err(error) = self.store.append_points(std::slice::from_ref(&fix)).await {
            warn!("[controller] failed to persist fix: {:#}", error);
            let last_point = self.state.session().and_then(|s| s.last_point().cloned());
            self.foreground.reset_last_accepted(last_point);
            return TrackingEvent::PersistenceFailure(format!("{:#}", error));
        }
        match self.state.session_mut() {
            Some(session) => session.push_point(fix.clone()),
            None => warn!("[controller] fix accepted without a session"),
        }
        TrackingEvent::FixAccepted {
            fix,
            stats: self.live_stats(),
        }
    }
}
