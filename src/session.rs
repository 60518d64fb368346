use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gps_processor::GpsFix;
use crate::utils;

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActivityType {
    Running,
    Cycling,
    Walking,
    Hiking,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Recording,
    Paused,
}

/// What goes into the durable store. The background callback only ever sees
/// this (plus the persisted points), never the controller's memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub activity_type: ActivityType,
    // background tracking is enabled for this session
    pub is_active: bool,
    pub is_paused: bool,
    pub start_time: DateTime<Utc>,
    pub paused_duration_sec: i64,
    pub paused_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Whether the background callback should append points right now.
    pub fn accepts_points(&self) -> bool {
        self.is_active && !self.is_paused
    }
}

pub struct TrackingSession {
    pub id: Uuid,
    pub activity_type: ActivityType,
    pub start_time: DateTime<Utc>,
    pub paused_duration_sec: i64,
    points: Vec<GpsFix>,
    distance_m: f64,
}

impl TrackingSession {
    pub fn new(activity_type: ActivityType, start_time: DateTime<Utc>) -> Self {
        TrackingSession {
            id: Uuid::new_v4(),
            activity_type,
            start_time,
            paused_duration_sec: 0,
            points: Vec::new(),
            distance_m: 0.0,
        }
    }

    pub fn from_record(record: &SessionRecord, points: Vec<GpsFix>) -> Self {
        let distance_m = utils::path_distance(&points);
        TrackingSession {
            id: record.id,
            activity_type: record.activity_type,
            start_time: record.start_time,
            paused_duration_sec: record.paused_duration_sec,
            points,
            distance_m,
        }
    }

    pub fn to_record(&self, paused_at: Option<DateTime<Utc>>) -> SessionRecord {
        SessionRecord {
            id: self.id,
            activity_type: self.activity_type,
            is_active: true,
            is_paused: paused_at.is_some(),
            start_time: self.start_time,
            paused_duration_sec: self.paused_duration_sec,
            paused_at,
        }
    }

    pub fn points(&self) -> &[GpsFix] {
        &self.points
    }

    pub fn last_point(&self) -> Option<&GpsFix> {
        self.points.last()
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn push_point(&mut self, point: GpsFix) {
        if let Some(last) = self.points.last() {
            self.distance_m += utils::distance_between(last, &point);
        }
        self.points.push(point);
    }

    /// Replaces the cached points with the authoritative ones. Distance is
    /// recomputed from scratch rather than patched, so interleaved writers
    /// can't make it drift.
    pub fn replace_points(&mut self, points: Vec<GpsFix>) {
        self.distance_m = utils::path_distance(&points);
        self.points = points;
    }

    // floor((now - start) / 1s) - paused
    pub fn duration_sec(&self, now: DateTime<Utc>) -> i64 {
        ((now - self.start_time).num_seconds() - self.paused_duration_sec).max(0)
    }

    /// `active_until` is the last instant that counts as moving time: now
    /// when recording, the pause timestamp when paused.
    pub fn summarize(
        &self,
        active_until: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> ActivitySummary {
        let duration_sec = self.duration_sec(active_until);
        ActivitySummary {
            session_id: self.id,
            activity_type: self.activity_type,
            points: self.points.clone(),
            distance_m: self.distance_m,
            duration_sec,
            average_speed_kmh: utils::average_speed_km_per_hour(self.distance_m, duration_sec),
            start_time: self.start_time,
            end_time,
        }
    }
}

pub enum SessionState {
    Idle,
    Recording {
        session: TrackingSession,
    },
    Paused {
        session: TrackingSession,
        paused_at: DateTime<Utc>,
    },
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Recording { .. } => SessionStatus::Recording,
            SessionState::Paused { .. } => SessionStatus::Paused,
        }
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        match self {
            SessionState::Idle => None,
            SessionState::Recording { session } | SessionState::Paused { session, .. } => {
                Some(session)
            }
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut TrackingSession> {
        match self {
            SessionState::Idle => None,
            SessionState::Recording { session } | SessionState::Paused { session, .. } => {
                Some(session)
            }
        }
    }

    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Paused { paused_at, .. } => Some(*paused_at),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub session_id: Uuid,
    pub activity_type: ActivityType,
    pub points: Vec<GpsFix>,
    pub distance_m: f64,
    // excluding paused time
    pub duration_sec: i64,
    pub average_speed_kmh: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LiveStats {
    pub status: SessionStatus,
    pub distance_m: f64,
    pub duration_sec: i64,
    pub point_count: usize,
    pub current_speed_kmh: Option<f64>,
    pub average_speed_kmh: f64,
}
