use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::utils;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    // horizontal accuracy in meters
    pub accuracy: Option<f64>,
    // meters per second
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ProcessResult {
    Accept = 0,
    // negative values are for ones that should not be stored in the session.
    TooClose = -1,
    LowAccuracy = -2,
    OutOfOrder = -3,
    // not a position on earth, e.g. NaN from a broken provider
    Invalid = -4,
}

impl ProcessResult {
    pub fn to_int(&self) -> i8 {
        *self as i8
    }

    pub fn is_accepted(&self) -> bool {
        *self == ProcessResult::Accept
    }
}

// NaN and infinities fall outside both ranges
fn is_valid_position(fix: &GpsFix) -> bool {
    (-90.0..=90.0).contains(&fix.latitude)
        && (-180.0..=180.0).contains(&fix.longitude)
}

/// Decides whether `curr` should be appended after `last_accepted`.
///
/// Fixes outside valid coordinates are always dropped. Otherwise the first
/// fix of a session is accepted. After that a fix needs to
/// be at least `min_movement_m` away from the previous accepted one and, if
/// the accuracy is known, strictly better than `max_accuracy_m`. Fixes older
/// than the previous accepted one are dropped so the session stays ordered.
pub fn check(
    config: &FilterConfig,
    last_accepted: Option<&GpsFix>,
    curr: &GpsFix,
) -> ProcessResult {
    if !is_valid_position(curr) {
        return ProcessResult::Invalid;
    }
    let last = match last_accepted {
        None => return ProcessResult::Accept,
        Some(last) => last,
    };
    // NOTE: Android sometimes hands us a batch with stale updates in it. We
    // simply drop those instead of trying to reorder the track.
    if curr.timestamp < last.timestamp {
        return ProcessResult::OutOfOrder;
    }
    if utils::distance_between(last, curr) < config.min_movement_m {
        return ProcessResult::TooClose;
    }
    match curr.accuracy {
        // an unknown accuracy is fine, a NaN one is not
        Some(accuracy) if accuracy.is_nan() || accuracy >= config.max_accuracy_m => {
            ProcessResult::LowAccuracy
        }
        _ => ProcessResult::Accept,
    }
}

pub struct GpsProcessor {
    config: FilterConfig,
    last_data: Option<GpsFix>,
}

impl GpsProcessor {
    pub fn new(config: FilterConfig) -> Self {
        GpsProcessor {
            config,
            last_data: None,
        }
    }

    pub fn last_data(&self) -> Option<&GpsFix> {
        self.last_data.as_ref()
    }

    // Used after reconciliation, the last accepted point may have been
    // written by someone else.
    pub fn reset_last_data(&mut self, last_data: Option<GpsFix>) {
        self.last_data = last_data;
    }

    pub fn preprocess(&mut self, curr_data: &GpsFix) -> ProcessResult {
        let result = check(&self.config, self.last_data.as_ref(), curr_data);
        if result.is_accepted() {
            self.last_data = Some(curr_data.clone());
        }
        result
    }
}
