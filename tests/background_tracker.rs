pub mod test_utils;

use fittrack_core::{
    background_tracker::BackgroundTracker,
    config::FilterConfig,
    kv_store::MemoryKvStore,
    session::{ActivityType, TrackingSession},
    session_store::SessionStore,
};
use std::sync::Arc;
use test_utils::*;

async fn store_with_session(paused: bool) -> SessionStore<Arc<MemoryKvStore>> {
    let store = SessionStore::new(Arc::new(MemoryKvStore::new()));
    let session = TrackingSession::new(ActivityType::Cycling, start_time());
    let paused_at = if paused { Some(start_time()) } else { None };
    store.write_session(&session.to_record(paused_at)).await.unwrap();
    store
}

fn tracker(store: &SessionStore<Arc<MemoryKvStore>>) -> BackgroundTracker<Arc<MemoryKvStore>> {
    BackgroundTracker::new(store.kv().clone(), FilterConfig::default())
}

#[tokio::test]
async fn appends_filtered_batch() {
    let store = store_with_session(false).await;
    let mut tracker = tracker(&store);

    let mut batch = walk_north(4, 10.0, 0);
    // inaccurate and too close, both dropped
    let (lat, lng) = offset(START_LAT, START_LNG, 50.0, 0.0);
    batch.push(fix(lat, lng, 10, Some(120.0)));
    let (lat, lng) = offset(START_LAT, START_LNG, 31.0, 0.0);
    batch.push(fix(lat, lng, 11, Some(5.0)));

    assert_eq!(tracker.on_locations(batch.clone()).await.unwrap(), 4);
    assert_eq!(store.read_points().await.unwrap(), batch[..4].to_vec());
}

#[tokio::test]
async fn continues_from_last_persisted_point() {
    let store = store_with_session(false).await;
    let persisted = walk_north(2, 10.0, 0);
    store.append_points(&persisted).await.unwrap();

    let mut tracker = tracker(&store);
    let last = persisted.last().unwrap();
    // 3m from the last persisted point
    let (lat, lng) = offset(last.latitude, last.longitude, 3.0, 0.0);
    let near = fix(lat, lng, 5, Some(5.0));
    let (lat, lng) = offset(last.latitude, last.longitude, 20.0, 0.0);
    let far = fix(lat, lng, 6, Some(5.0));

    assert_eq!(tracker.on_locations(vec![near, far.clone()]).await.unwrap(), 1);
    let points = store.read_points().await.unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[2], far);
}

#[tokio::test]
async fn sorts_batch_by_time() {
    let store = store_with_session(false).await;
    let mut tracker = tracker(&store);

    let ordered = walk_north(3, 10.0, 0);
    let shuffled = vec![ordered[2].clone(), ordered[0].clone(), ordered[1].clone()];
    assert_eq!(tracker.on_locations(shuffled).await.unwrap(), 3);
    assert_eq!(store.read_points().await.unwrap(), ordered);
}

#[tokio::test]
async fn drops_batch_without_session() {
    let store = SessionStore::new(Arc::new(MemoryKvStore::new()));
    let mut tracker = tracker(&store);
    assert_eq!(tracker.on_locations(walk_north(3, 10.0, 0)).await.unwrap(), 0);
    assert!(store.read_points().await.unwrap().is_empty());
}

#[tokio::test]
async fn drops_batch_while_paused() {
    let store = store_with_session(true).await;
    let mut tracker = tracker(&store);
    assert_eq!(tracker.on_locations(walk_north(3, 10.0, 0)).await.unwrap(), 0);
    assert!(store.read_points().await.unwrap().is_empty());
}

#[tokio::test]
async fn drops_batch_when_disabled() {
    let store = store_with_session(false).await;
    store.set_background_enabled(false).await.unwrap();
    let mut tracker = tracker(&store);
    assert_eq!(tracker.on_locations(walk_north(3, 10.0, 0)).await.unwrap(), 0);

    store.set_background_enabled(true).await.unwrap();
    assert_eq!(tracker.on_locations(walk_north(3, 10.0, 0)).await.unwrap(), 3);
}

#[tokio::test]
async fn empty_batch() {
    let store = store_with_session(false).await;
    let mut tracker = tracker(&store);
    assert_eq!(tracker.on_locations(Vec::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn drops_invalid_positions() {
    let store = store_with_session(false).await;
    let mut tracker = tracker(&store);

    let valid = walk_north(2, 10.0, 1);
    let batch = vec![
        fix(f64::NAN, START_LNG, 0, Some(5.0)),
        valid[0].clone(),
        fix(START_LAT, 200.0, 2, Some(5.0)),
        valid[1].clone(),
    ];
    assert_eq!(tracker.on_locations(batch).await.unwrap(), 2);
    assert_eq!(store.read_points().await.unwrap(), valid);
}
