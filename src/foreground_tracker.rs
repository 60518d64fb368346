use anyhow::Result;
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::config::TrackingConfig;
use crate::gps_processor::{GpsFix, GpsProcessor, ProcessResult};
use crate::location::{LocationProvider, LocationSubscription, ProviderError, WatchOptions};

pub enum ForegroundEvent {
    Fix(Result<GpsFix, ProviderError>),
    StreamClosed,
    Tick,
}

/* Owns the live location subscription and the elapsed-time ticker while the
app is in the foreground. Both are plain owned values, so `stop` cancels them
synchronously: once it returns nothing else can come out of `next_event`.
*/
pub struct ForegroundTracker {
    processor: GpsProcessor,
    watch_options: WatchOptions,
    tick_interval: Duration,
    subscription: Option<LocationSubscription>,
    ticker: Option<Interval>,
    // last fix we heard about, accepted or not
    current_fix: Option<GpsFix>,
}

impl ForegroundTracker {
    pub fn new(config: &TrackingConfig) -> Self {
        ForegroundTracker {
            processor: GpsProcessor::new(config.filter.clone()),
            watch_options: config.watch.clone(),
            tick_interval: config.tick_interval(),
            subscription: None,
            ticker: None,
            current_fix: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.subscription.is_some() || self.ticker.is_some()
    }

    pub fn current_fix(&self) -> Option<&GpsFix> {
        self.current_fix.as_ref()
    }

    pub fn set_current_fix(&mut self, fix: GpsFix) {
        self.current_fix = Some(fix);
    }

    /// `last_accepted` seeds the filter so the first live fix is compared
    /// against the end of the existing track.
    pub async fn start<L: LocationProvider>(
        &mut self,
        provider: &L,
        last_accepted: Option<GpsFix>,
    ) -> Result<()> {
        self.stop();
        let subscription = provider.watch(&self.watch_options).await?;
        self.processor.reset_last_data(last_accepted);
        self.subscription = Some(subscription);
        let mut ticker = time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        debug!("[foreground_tracker] started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
            debug!("[foreground_tracker] stopped");
        }
        self.ticker = None;
    }

    pub fn reset_last_accepted(&mut self, last_accepted: Option<GpsFix>) {
        self.processor.reset_last_data(last_accepted);
    }

    pub fn process(&mut self, fix: &GpsFix) -> ProcessResult {
        self.current_fix = Some(fix.clone());
        self.processor.preprocess(fix)
    }

    /// `None` when neither the subscription nor the ticker is running.
    pub async fn next_event(&mut self) -> Option<ForegroundEvent> {
        let event = match (self.subscription.as_mut(), self.ticker.as_mut()) {
            (None, None) => return None,
            (Some(subscription), None) => subscription.recv().await.map(ForegroundEvent::Fix),
            (None, Some(ticker)) => {
                ticker.tick().await;
                Some(ForegroundEvent::Tick)
            }
            (Some(subscription), Some(ticker)) => {
                tokio::select! {
                    fix = subscription.recv() => fix.map(ForegroundEvent::Fix),
                    _ = ticker.tick() => Some(ForegroundEvent::Tick),
                }
            }
        };
        match event {
            Some(event) => Some(event),
            None => {
                // don't spin on a closed stream, the ticker keeps going
                warn!("[foreground_tracker] location stream closed");
                self.subscription = None;
                Some(ForegroundEvent::StreamClosed)
            }
        }
    }
}
