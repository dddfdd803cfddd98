// Shared test doubles; not every test binary uses every helper
#![allow(dead_code)]

use async_trait::async_trait;
use ruta_recorder::collector::{CollectorApi, CollectorError};
use ruta_recorder::protocol::{StartTripRequest, StartTripResponse, TelemetrySample};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory collector with scriptable failures
///
/// `online` decides whether calls succeed by default; `script_log_outcomes`
/// overrides the next log deliveries one call at a time, which is how the
/// partial-drain tests stage a failure mid-queue.
pub struct MockCollector {
    online: AtomicBool,
    log_outcomes: Mutex<VecDeque<bool>>,
    log_delay: Mutex<Option<Duration>>,
    reject_start_with: Mutex<Option<String>>,
    fail_end_trip: AtomicBool,
    next_trip: AtomicUsize,

    pub started: Mutex<Vec<StartTripRequest>>,
    pub ended: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<TelemetrySample>>,
}

impl MockCollector {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            log_outcomes: Mutex::new(VecDeque::new()),
            log_delay: Mutex::new(None),
            reject_start_with: Mutex::new(None),
            fail_end_trip: AtomicBool::new(false),
            next_trip: AtomicUsize::new(1),
            started: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Fix the outcome of the next log deliveries, in call order
    pub fn script_log_outcomes(&self, outcomes: &[bool]) {
        self.log_outcomes
            .lock()
            .unwrap()
            .extend(outcomes.iter().copied());
    }

    /// Stall every log delivery, so tests can overlap a drain with other work
    pub fn set_log_delay(&self, delay: Duration) {
        *self.log_delay.lock().unwrap() = Some(delay);
    }

    /// Refuse the next start-trip with the given detail text
    pub fn reject_next_start(&self, detail: &str) {
        *self.reject_start_with.lock().unwrap() = Some(detail.to_string());
    }

    pub fn fail_end_trip(&self) {
        self.fail_end_trip.store(true, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_samples(&self) -> Vec<TelemetrySample> {
        self.sent.lock().unwrap().clone()
    }

    fn offline_error() -> CollectorError {
        CollectorError::Rejected {
            status: 503,
            detail: "collector offline".to_string(),
        }
    }
}

#[async_trait]
impl CollectorApi for MockCollector {
    async fn start_trip(
        &self,
        request: &StartTripRequest,
    ) -> Result<StartTripResponse, CollectorError> {
        if let Some(detail) = self.reject_start_with.lock().unwrap().take() {
            return Err(CollectorError::Rejected {
                status: 409,
                detail,
            });
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(Self::offline_error());
        }

        self.started.lock().unwrap().push(request.clone());
        let n = self.next_trip.fetch_add(1, Ordering::SeqCst);
        Ok(StartTripResponse {
            trip_id: format!("trip-{}", n),
            start_time: "2026-08-25T06:30:00.000000".to_string(),
        })
    }

    async fn end_trip(&self, trip_id: &str) -> Result<(), CollectorError> {
        if self.fail_end_trip.load(Ordering::SeqCst) {
            return Err(CollectorError::Rejected {
                status: 500,
                detail: "end-trip refused".to_string(),
            });
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(Self::offline_error());
        }

        self.ended.lock().unwrap().push(trip_id.to_string());
        Ok(())
    }

    async fn log_sample(&self, sample: &TelemetrySample) -> Result<(), CollectorError> {
        let delay = *self.log_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .log_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.online.load(Ordering::SeqCst));

        if !outcome {
            return Err(Self::offline_error());
        }

        self.sent.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// A sample with recognizable coordinates, numbered so order is visible
pub fn sample(trip_id: &str, n: u32) -> TelemetrySample {
    TelemetrySample {
        trip_id: trip_id.to_string(),
        device_id: "RS-TEST0001".to_string(),
        latitude: 14.5995 + f64::from(n) * 0.001,
        longitude: 120.9842,
        accuracy: 8.0,
        occupancy_count: n,
        timestamp: chrono::Utc::now(),
    }
}
