// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Trip recorder lifecycle tests
///
/// Each harness owns the position and connectivity channels, standing in
/// for the gpsd feed and the reachability probe. The sample interval is
/// set long enough that the background producer never fires mid-test.
///
mod support;

use chrono::Utc;
use ruta_recorder::config::RecorderConfig;
use ruta_recorder::pipeline::queue_key;
use ruta_recorder::position::PositionFix;
use ruta_recorder::protocol::{TelemetrySample, TripSetup};
use ruta_recorder::recorder::TripRecorder;
use ruta_recorder::store::LocalStore;
use ruta_recorder::trips::{Trip, ACTIVE_TRIP_KEY};
use std::sync::Arc;
use std::time::Duration;
use support::{sample, MockCollector};
use tempfile::TempDir;
use tokio::sync::watch;

struct Harness {
    recorder: Arc<TripRecorder>,
    collector: Arc<MockCollector>,
    store: Arc<LocalStore>,
    position_tx: watch::Sender<Option<PositionFix>>,
    online_tx: watch::Sender<bool>,
    temp_dir: TempDir,
}

fn quiet_config(temp_dir: &TempDir) -> RecorderConfig {
    let mut config = RecorderConfig::default();
    config.recorder.sample_interval_seconds = 60;
    config.store.export_dir = temp_dir
        .path()
        .join("exports")
        .to_string_lossy()
        .into_owned();
    config
}

async fn create_recorder_linked(collector_online: bool, link_online: bool) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(LocalStore::new(temp_dir.path().join("data")));
    store.initialize().await.unwrap();

    let collector = Arc::new(MockCollector::new(collector_online));
    let (position_tx, position_rx) = watch::channel(None);
    let (online_tx, online_rx) = watch::channel(link_online);

    let config = quiet_config(&temp_dir);
    let recorder = Arc::new(TripRecorder::new(
        store.clone(),
        collector.clone(),
        "RS-TEST0001".to_string(),
        &config,
        position_rx,
        online_rx,
    ));

    Harness {
        recorder,
        collector,
        store,
        position_tx,
        online_tx,
        temp_dir,
    }
}

async fn create_recorder(online: bool) -> Harness {
    create_recorder_linked(online, online).await
}

fn setup() -> TripSetup {
    TripSetup {
        route: "R7".to_string(),
        direction: "northbound".to_string(),
        jeep_code: "JC-01".to_string(),
        capacity: 20,
        starting_occupancy: 5,
    }
}

fn fresh_fix() -> PositionFix {
    PositionFix {
        latitude: 14.5995,
        longitude: 120.9842,
        accuracy: 8.0,
        acquired_at: Utc::now(),
    }
}

async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_rejects_invalid_setup() {
    let h = create_recorder(true).await;

    let mut invalid = setup();
    invalid.capacity = 0;

    let result = h.recorder.start_trip(invalid).await;
    assert!(result.is_err());

    // Nothing reached the collector and nothing was persisted
    assert!(h.collector.started.lock().unwrap().is_empty());
    assert!(!h.recorder.status().await.active);
    let active: Option<Trip> = h.store.read(ACTIVE_TRIP_KEY).await;
    assert!(active.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_collector_rejection_leaves_no_local_state() {
    let h = create_recorder(true).await;
    h.collector
        .reject_next_start("Jeep JC-01 already has an active trip");

    let err = h.recorder.start_trip(setup()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("already has an active trip"));

    assert!(!h.recorder.status().await.active);
    let active: Option<Trip> = h.store.read(ACTIVE_TRIP_KEY).await;
    assert!(active.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_trip_registers_with_collector() {
    let h = create_recorder(true).await;

    let trip = h.recorder.start_trip(setup()).await.unwrap();
    assert_eq!(trip.trip_id, "trip-1");
    assert_eq!(trip.live_occupancy, 5);

    let started = h.collector.started.lock().unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].recorder_id, "RS-TEST0001");
    assert_eq!(started[0].official_capacity, 20);
    drop(started);

    let status = h.recorder.status().await;
    assert!(status.active);
    assert_eq!(status.trip_id.as_deref(), Some("trip-1"));
    assert_eq!(status.occupancy, 5);
    assert_eq!(status.capacity, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_board_and_alight_update_occupancy() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();

    assert_eq!(h.recorder.board().await.unwrap(), 6);
    assert_eq!(h.recorder.board().await.unwrap(), 7);
    assert_eq!(h.recorder.alight().await.unwrap(), 6);

    // The running count is persisted with the active trip
    let active: Trip = h.store.read(ACTIVE_TRIP_KEY).await.unwrap();
    assert_eq!(active.live_occupancy, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_alight_stops_at_zero() {
    let h = create_recorder(true).await;

    let mut empty = setup();
    empty.starting_occupancy = 0;
    h.recorder.start_trip(empty).await.unwrap();

    assert_eq!(h.recorder.alight().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_occupancy_taps_require_a_trip() {
    let h = create_recorder(true).await;

    let err = h.recorder.board().await.unwrap_err();
    assert!(err.to_string().contains("No trip in progress"));
    assert!(h.recorder.alight().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_trip_completes_locally_and_remotely() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();
    h.recorder.board().await.unwrap();

    let ended = h.recorder.end_trip().await.unwrap().unwrap();

    assert!(ended.ended_at.is_some());
    assert_eq!(ended.final_occupancy, Some(6));
    assert_eq!(ended.logs_sent, Some(0));
    assert_eq!(ended.queue_remaining, Some(0));

    assert_eq!(*h.collector.ended.lock().unwrap(), vec!["trip-1"]);
    assert!(!h.recorder.status().await.active);
    assert_eq!(h.recorder.list_trips().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_trip_delivers_queued_samples_first() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();

    // Samples left over from an offline stretch
    h.store
        .write(
            &queue_key("trip-1"),
            &vec![sample("trip-1", 1), sample("trip-1", 2)],
        )
        .await
        .unwrap();

    let ended = h.recorder.end_trip().await.unwrap().unwrap();

    assert_eq!(h.collector.sent_count(), 2);
    assert_eq!(ended.logs_sent, Some(2));
    assert_eq!(ended.queue_remaining, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_trip_drops_queue_it_cannot_deliver() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();

    h.collector.set_online(false);
    h.store
        .write(
            &queue_key("trip-1"),
            &vec![sample("trip-1", 1), sample("trip-1", 2)],
        )
        .await
        .unwrap();

    // The trip still completes; the queue is dropped, not kept forever
    let ended = h.recorder.end_trip().await.unwrap().unwrap();
    assert_eq!(ended.logs_sent, Some(0));
    assert_eq!(ended.queue_remaining, Some(0));

    let leftover: Option<Vec<TelemetrySample>> = h.store.read(&queue_key("trip-1")).await;
    assert!(leftover.is_none());
    assert_eq!(h.recorder.list_trips().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_trip_survives_collector_refusal() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();
    h.collector.fail_end_trip();

    let ended = h.recorder.end_trip().await.unwrap();
    assert!(ended.is_some());
    assert_eq!(h.recorder.list_trips().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_without_trip_is_none() {
    let h = create_recorder(true).await;
    assert!(h.recorder.end_trip().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_resumes_the_active_trip() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();
    h.recorder.board().await.unwrap();
    h.recorder.shutdown().await.unwrap();

    // Same store, fresh process
    let (_position_tx, position_rx) = watch::channel(None);
    let (_online_tx, online_rx) = watch::channel(true);
    let config = quiet_config(&h.temp_dir);
    let restarted = TripRecorder::new(
        h.store.clone(),
        h.collector.clone(),
        "RS-TEST0001".to_string(),
        &config,
        position_rx,
        online_rx,
    );

    let resumed = restarted.resume_active_trip().await.unwrap().unwrap();
    assert_eq!(resumed.trip_id, "trip-1");
    assert_eq!(resumed.live_occupancy, 6);

    let status = restarted.status().await;
    assert!(status.active);
    assert_eq!(status.occupancy, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replacing_a_trip_discards_its_queue() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();

    h.store
        .write(&queue_key("trip-1"), &vec![sample("trip-1", 1)])
        .await
        .unwrap();

    let replacement = h.recorder.start_trip(setup()).await.unwrap();
    assert_eq!(replacement.trip_id, "trip-2");

    // The replaced trip left nothing behind
    let old_queue: Option<Vec<TelemetrySample>> = h.store.read(&queue_key("trip-1")).await;
    assert!(old_queue.is_none());
    assert!(h.recorder.list_trips().await.is_empty());

    let status = h.recorder.status().await;
    assert_eq!(status.trip_id.as_deref(), Some("trip-2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_drains_the_queue() {
    // Collector reachable, but the recorder has not noticed yet
    let h = create_recorder_linked(true, false).await;
    h.recorder.start_trip(setup()).await.unwrap();

    h.store
        .write(
            &queue_key("trip-1"),
            &vec![sample("trip-1", 1), sample("trip-1", 2)],
        )
        .await
        .unwrap();

    // The offline-to-online edge wakes the session's drain listener
    h.online_tx.send(true).unwrap();

    let collector = h.collector.clone();
    assert!(wait_for(move || collector.sent_count() == 2).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_reflects_fix_and_connectivity() {
    let h = create_recorder(true).await;

    let status = h.recorder.status().await;
    assert!(status.online);
    assert!(!status.has_fix);

    h.position_tx.send_replace(Some(fresh_fix()));
    let status = h.recorder.status().await;
    assert!(status.has_fix);
    assert_eq!(status.fix_accuracy, Some(8.0));

    // A fix past the staleness ceiling no longer counts
    let mut stale = fresh_fix();
    stale.acquired_at = Utc::now() - chrono::Duration::seconds(60);
    h.position_tx.send_replace(Some(stale));
    let status = h.recorder.status().await;
    assert!(!status.has_fix);

    h.online_tx.send(false).unwrap();
    let status = h.recorder.status().await;
    assert!(!status.online);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_export_trip_round_trip() {
    let h = create_recorder(true).await;
    h.recorder.start_trip(setup()).await.unwrap();
    h.recorder.end_trip().await.unwrap();

    let csv = h.recorder.export_trip("trip-1").await.unwrap();
    assert!(csv.starts_with("timestamp,latitude,longitude,accuracy,occupancy"));

    let exported = h.temp_dir.path().join("exports").join("trip_trip-1.csv");
    assert!(exported.exists());

    let err = h.recorder.export_trip("trip-9").await.unwrap_err();
    assert!(err.to_string().contains("Unknown trip"));
}
