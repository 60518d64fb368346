use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::location::WatchOptions;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_movement_m: f64,
    pub max_accuracy_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_movement_m: 5.0,
            max_accuracy_m: 30.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub filter: FilterConfig,
    pub watch: WatchOptions,
    pub tick_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            filter: FilterConfig::default(),
            watch: WatchOptions::default(),
            tick_interval_ms: 1000,
        }
    }
}

impl TrackingConfig {
    /// Missing fields fall back to their defaults, so `{}` is a valid config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(anyhow!("invalid `{}`: {}", name, v))
            }
        };
        non_negative("filter.min_movement_m", self.filter.min_movement_m)?;
        non_negative("filter.max_accuracy_m", self.filter.max_accuracy_m)?;
        non_negative("watch.min_distance_m", self.watch.min_distance_m)?;
        if self.tick_interval_ms == 0 {
            bail!("`tick_interval_ms` must be positive");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
