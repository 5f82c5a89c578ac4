//! Bounded worker pool for running analyses off the async executor.
//!
//! Analyses run on tokio's blocking pool. A worker semaphore caps how many
//! run at once; an admission semaphore caps how many may be running or
//! queued. Both permits move into the blocking task, so a caller that stops
//! waiting does not cancel the work; its result is dropped and the slot frees
//! when the analysis ends.

use std::sync::Arc;

use image::DynamicImage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::{
    config::AnalysisConfig,
    error::{Result, SeedScanError},
    pipeline::Analyzer,
    types::AnalysisResult,
};

/// What happens to a submission when the queue is full
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Backpressure {
    /// Fail immediately with `Overloaded`
    #[default]
    Reject,
    /// Wait for a free slot
    Wait,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ServiceConfig {
    /// Concurrent analyses
    pub workers: usize,
    /// Submissions allowed to wait for a worker
    pub max_queue_depth: usize,
    pub backpressure: Backpressure,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            workers,
            max_queue_depth: 4 * workers,
            backpressure: Backpressure::default(),
        }
    }
}

/// Runs analyses concurrently up to a fixed bound
pub struct AnalysisService {
    analyzer: Arc<Analyzer>,
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    capacity: usize,
    backpressure: Backpressure,
}

impl AnalysisService {
    pub fn new(analyzer: Analyzer, config: &ServiceConfig) -> Result<Self> {
        if config.workers == 0 {
            return Err(SeedScanError::InvalidConfig("service.workers must be positive".into()));
        }
        let capacity = config.workers + config.max_queue_depth;
        Ok(Self {
            analyzer: Arc::new(analyzer),
            workers: Arc::new(Semaphore::new(config.workers)),
            admission: Arc::new(Semaphore::new(capacity)),
            capacity,
            backpressure: config.backpressure,
        })
    }

    pub fn from_config(analysis: &AnalysisConfig, service: &ServiceConfig) -> Result<Self> {
        Self::new(Analyzer::from_config(analysis)?, service)
    }

    /// Running plus queued submissions the service accepts
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Submissions currently running or queued
    pub fn in_flight(&self) -> usize {
        self.capacity - self.admission.available_permits()
    }

    /// Analyze `image` on the worker pool
    pub async fn submit(&self, image: DynamicImage) -> Result<AnalysisResult> {
        let admission = match self.backpressure {
            Backpressure::Reject => Arc::clone(&self.admission).try_acquire_owned().map_err(|_| {
                warn!(capacity = self.capacity, "Rejecting analysis, queue full");
                SeedScanError::Overloaded { capacity: self.capacity }
            })?,
            Backpressure::Wait => Arc::clone(&self.admission)
                .acquire_owned()
                .await
                .map_err(|e| SeedScanError::WorkerFailed(e.to_string()))?,
        };
        let worker = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|e| SeedScanError::WorkerFailed(e.to_string()))?;
        debug!(in_flight = self.in_flight(), "Dispatching analysis");

        let analyzer = Arc::clone(&self.analyzer);
        tokio::task::spawn_blocking(move || {
            let _permits = (admission, worker);
            analyzer.analyze(&image)
        })
        .await
        .map_err(|e| SeedScanError::WorkerFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixtures::SyntheticSample,
        traits::Calibrator,
        types::CalibrationResult,
    };
    use image::GrayImage;
    use std::{
        sync::{mpsc, Mutex},
        time::Duration,
    };

    fn fixed(pixels_per_mm: f64) -> CalibrationResult {
        CalibrationResult {
            pixels_per_mm,
            grid_lines_detected: 0,
            horizontal_lines: 0,
            vertical_lines: 0,
            horizontal_spacing_px: pixels_per_mm,
            vertical_spacing_px: pixels_per_mm,
            confidence: 1.0,
        }
    }

    /// Blocks until the test opens the gate
    struct Gate(Mutex<mpsc::Receiver<()>>);

    impl Calibrator for Gate {
        fn calibrate(&self, _image: &GrayImage) -> crate::Result<CalibrationResult> {
            self.0.lock().unwrap().recv().unwrap();
            Ok(fixed(10.0))
        }
    }

    struct Panics;

    impl Calibrator for Panics {
        fn calibrate(&self, _image: &GrayImage) -> crate::Result<CalibrationResult> {
            panic!("calibrator exploded");
        }
    }

    struct Fixed;

    impl Calibrator for Fixed {
        fn calibrate(&self, _image: &GrayImage) -> crate::Result<CalibrationResult> {
            Ok(fixed(10.0))
        }
    }

    fn single_slot(backpressure: Backpressure) -> ServiceConfig {
        ServiceConfig {
            workers: 1,
            max_queue_depth: 0,
            backpressure,
        }
    }

    fn image() -> DynamicImage {
        SyntheticSample::blank(60, 60).with_disc(30.0, 30.0, 10.0).render_dynamic()
    }

    #[tokio::test]
    async fn rejects_when_full_and_recovers() {
        let (open, gate) = mpsc::channel();
        let analyzer = Analyzer::builder().set_calibrator(Gate(Mutex::new(gate))).build().unwrap();
        let service = Arc::new(AnalysisService::new(analyzer, &single_slot(Backpressure::Reject)).unwrap());
        assert_eq!(service.capacity(), 1);

        let busy = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.submit(image()).await }
        });
        while service.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = service.submit(image()).await.unwrap_err();
        assert!(matches!(err, SeedScanError::Overloaded { capacity: 1 }));

        open.send(()).unwrap();
        let first = busy.await.unwrap().unwrap();
        assert_eq!(first.seeds.len(), 1);

        open.send(()).unwrap();
        assert!(service.submit(image()).await.is_ok());
    }

    #[tokio::test]
    async fn waiting_policy_queues_instead_of_failing() {
        let analyzer = Analyzer::builder().set_calibrator(Fixed).build().unwrap();
        let service = Arc::new(AnalysisService::new(analyzer, &single_slot(Backpressure::Wait)).unwrap());

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.submit(image()).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(service.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_worker_fails_only_its_request() {
        let analyzer = Analyzer::builder().set_calibrator(Panics).build().unwrap();
        let service = AnalysisService::new(analyzer, &single_slot(Backpressure::Reject)).unwrap();
        let err = service.submit(image()).await.unwrap_err();
        assert_eq!(err.code(), "WORKER_FAILED");
        assert_eq!(service.in_flight(), 0);
    }

    #[test]
    fn zero_workers_is_invalid() {
        let config = ServiceConfig { workers: 0, ..Default::default() };
        let analyzer = Analyzer::builder().build().unwrap();
        assert!(AnalysisService::new(analyzer, &config).is_err());
    }
}
