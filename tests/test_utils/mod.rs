#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use fittrack_core::{
    activity_api::ActivityApi,
    clock::Clock,
    config::TrackingConfig,
    controller::{SessionController, TrackingEvent},
    gps_processor::GpsFix,
    kv_store::{KvStore, MemoryKvStore},
    location::{
        LocationProvider, LocationSender, LocationSubscription, PermissionStatus, ProviderError,
        WatchOptions,
    },
    session::ActivitySummary,
    utils::EARTH_RADIUS_M,
};
use std::sync::{Arc, Mutex};

pub const START_TIMESTAMP_SEC: i64 = 1697349116;
pub const START_LAT: f64 = 30.2719716;
pub const START_LNG: f64 = 120.163856;

#[macro_export]
macro_rules! assert_near {
    ($left:expr, $right:expr, $eps:expr) => {{
        let (left, right, eps): (f64, f64, f64) = ($left, $right, $eps);
        assert!(
            (left - right).abs() <= eps,
            "expected {} to be within {} of {}",
            left,
            eps,
            right
        );
    }};
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(START_TIMESTAMP_SEC, 0).unwrap()
}

pub fn fix(latitude: f64, longitude: f64, offset_sec: i64, accuracy: Option<f64>) -> GpsFix {
    GpsFix {
        latitude,
        longitude,
        altitude: None,
        accuracy,
        speed: None,
        timestamp: start_time() + Duration::seconds(offset_sec),
    }
}

// Good enough for the short distances used in tests.
pub fn offset(latitude: f64, longitude: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    let meters_per_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    (
        latitude + north_m / meters_per_degree,
        longitude + east_m / (meters_per_degree * latitude.to_radians().cos()),
    )
}

/// `n` fixes walking north from the start point, `step_m` apart, one per
/// second starting at `first_offset_sec`.
pub fn walk_north(n: usize, step_m: f64, first_offset_sec: i64) -> Vec<GpsFix> {
    walk_north_from(START_LAT, START_LNG, n, step_m, first_offset_sec)
}

pub fn walk_north_from(
    latitude: f64,
    longitude: f64,
    n: usize,
    step_m: f64,
    first_offset_sec: i64,
) -> Vec<GpsFix> {
    (0..n)
        .map(|i| {
            let (lat, lng) = offset(latitude, longitude, step_m * i as f64, 0.0);
            fix(lat, lng, first_offset_sec + i as i64, Some(5.0))
        })
        .collect()
}

/// A `MemoryKvStore` whose writes can be made to fail after a number of
/// successful ones.
#[derive(Default)]
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    // `None` means writes always succeed
    writes_left: Mutex<Option<usize>>,
}

impl FlakyKvStore {
    pub fn fail_writes_after(&self, writes_left: Option<usize>) {
        *self.writes_left.lock().unwrap() = writes_left;
    }

    fn check_write(&self) -> Result<()> {
        let mut writes_left = self.writes_left.lock().unwrap();
        match writes_left.as_mut() {
            None => Ok(()),
            Some(0) => bail!("disk full"),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
        }
    }
}

impl KvStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.check_write()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_write()?;
        self.inner.remove(key).await
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

struct FakeProviderState {
    foreground_permission: PermissionStatus,
    background_permission: PermissionStatus,
    fail_watch: bool,
    watch_count: usize,
    sender: Option<LocationSender>,
    current_fix: Option<GpsFix>,
}

#[derive(Clone)]
pub struct FakeLocationProvider {
    state: Arc<Mutex<FakeProviderState>>,
}

impl FakeLocationProvider {
    pub fn new() -> Self {
        FakeLocationProvider {
            state: Arc::new(Mutex::new(FakeProviderState {
                foreground_permission: PermissionStatus::Granted,
                background_permission: PermissionStatus::Granted,
                fail_watch: false,
                watch_count: 0,
                sender: None,
                current_fix: None,
            })),
        }
    }

    pub fn set_permissions(&self, foreground: PermissionStatus, background: PermissionStatus) {
        let mut state = self.state.lock().unwrap();
        state.foreground_permission = foreground;
        state.background_permission = background;
    }

    pub fn set_fail_watch(&self, fail_watch: bool) {
        self.state.lock().unwrap().fail_watch = fail_watch;
    }

    pub fn set_current_fix(&self, fix: Option<GpsFix>) {
        self.state.lock().unwrap().current_fix = fix;
    }

    pub fn watch_count(&self) -> usize {
        self.state.lock().unwrap().watch_count
    }

    pub fn is_subscribed(&self) -> bool {
        match &self.state.lock().unwrap().sender {
            Some(sender) => !sender.is_closed(),
            None => false,
        }
    }

    pub fn send(&self, fix: GpsFix) {
        let state = self.state.lock().unwrap();
        let sender = state.sender.as_ref().expect("nobody is watching");
        sender.send(Ok(fix)).expect("subscription is closed");
    }

    pub fn send_error(&self, message: &str) {
        let state = self.state.lock().unwrap();
        let sender = state.sender.as_ref().expect("nobody is watching");
        sender
            .send(Err(ProviderError(message.to_string())))
            .expect("subscription is closed");
    }

    pub fn close(&self) {
        self.state.lock().unwrap().sender = None;
    }
}

impl LocationProvider for FakeLocationProvider {
    async fn request_foreground_permission(&self) -> Result<PermissionStatus> {
        Ok(self.state.lock().unwrap().foreground_permission)
    }

    async fn request_background_permission(&self) -> Result<PermissionStatus> {
        Ok(self.state.lock().unwrap().background_permission)
    }

    async fn current_fix(&self) -> Result<GpsFix> {
        self.state
            .lock()
            .unwrap()
            .current_fix
            .clone()
            .ok_or_else(|| anyhow!("no current fix"))
    }

    async fn watch(&self, _options: &WatchOptions) -> Result<LocationSubscription> {
        let mut state = self.state.lock().unwrap();
        if state.fail_watch {
            bail!("location services disabled");
        }
        let (sender, subscription) = LocationSubscription::channel();
        state.sender = Some(sender);
        state.watch_count += 1;
        Ok(subscription)
    }
}

#[derive(Default)]
struct FakeApiState {
    saved: Vec<ActivitySummary>,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct FakeActivityApi {
    state: Arc<Mutex<FakeApiState>>,
}

impl FakeActivityApi {
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    pub fn saved(&self) -> Vec<ActivitySummary> {
        self.state.lock().unwrap().saved.clone()
    }
}

impl ActivityApi for FakeActivityApi {
    async fn create_activity(&self, summary: &ActivitySummary) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            bail!("503 Service Unavailable");
        }
        state.saved.push(summary.clone());
        Ok(format!("activity-{}", state.saved.len()))
    }
}

pub type TestController =
    SessionController<Arc<MemoryKvStore>, FakeLocationProvider, FakeActivityApi>;

pub struct Harness {
    pub kv: Arc<MemoryKvStore>,
    pub provider: FakeLocationProvider,
    pub api: FakeActivityApi,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            kv: Arc::new(MemoryKvStore::new()),
            provider: FakeLocationProvider::new(),
            api: FakeActivityApi::default(),
            clock: Arc::new(ManualClock::new(start_time())),
        }
    }

    /// A fresh controller over the same store, as if the app was relaunched.
    pub fn controller(&self) -> TestController {
        SessionController::new(
            &TrackingConfig::default(),
            self.kv.clone(),
            self.provider.clone(),
            self.api.clone(),
        )
        .with_clock(self.clock.clone())
    }
}

/// Feeds a fix through the live subscription and waits for the controller to
/// handle it, skipping ticks.
pub async fn deliver<S: KvStore>(
    controller: &mut SessionController<S, FakeLocationProvider, FakeActivityApi>,
    provider: &FakeLocationProvider,
    fix: GpsFix,
) -> TrackingEvent {
    provider.send(fix);
    loop {
        match controller.next_event().await {
            Some(TrackingEvent::Tick(_)) => continue,
            Some(event) => return event,
            None => panic!("controller has no event source"),
        }
    }
}
