// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detector trait, sink port, and the voting orchestrator.

use crate::detectors;
use async_trait::async_trait;
use mrec_adapters::PagePort;
use mrec_core::{DetectionConfig, DetectionResult, DetectorKind, JobId};
use std::sync::Arc;

/// One meeting-end probe.
#[async_trait]
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Evaluation order across the ensemble; lower runs first.
    fn priority(&self) -> u32;

    fn enabled(&self) -> bool;

    /// Called once before the recording loop starts polling.
    async fn setup(&mut self, _page: &dyn PagePort) {}

    async fn check(&mut self, page: &dyn PagePort) -> DetectionResult;

    /// Clear accumulated state so the instance is reusable across runs.
    fn reset(&mut self);
}

/// Where positive probe results are persisted.
pub trait DetectionSink: Send + Sync {
    fn record(&self, job_id: &JobId, result: &DetectionResult);
}

/// The built-in ensemble for a config, audio probe included only when a
/// monitor source is at hand.
pub fn default_detectors(
    config: &DetectionConfig,
    audio_source: Option<String>,
) -> Vec<Box<dyn Detector>> {
    let mut set: Vec<Box<dyn Detector>> = vec![
        Box::new(detectors::WebRtcConnectionDetector::new(config.clone())),
        Box::new(detectors::TextIndicatorDetector::new(config.clone())),
        Box::new(detectors::VideoElementDetector::new(config.clone())),
        Box::new(detectors::UrlChangeDetector::new(config.clone())),
        Box::new(detectors::ScreenFreezeDetector::new(config.clone())),
    ];
    if let Some(source) = audio_source {
        set.push(Box::new(detectors::AudioSilenceDetector::new(
            config.clone(),
            source,
        )));
    }
    set
}

/// Runs the ensemble and makes the end-of-meeting decision.
pub struct DetectionOrchestrator {
    config: DetectionConfig,
    detectors: Vec<Box<dyn Detector>>,
    dry_run: bool,
    sink: Option<Arc<dyn DetectionSink>>,
    job_id: Option<JobId>,
}

impl DetectionOrchestrator {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            detectors: Vec::new(),
            dry_run: false,
            sink: None,
            job_id: None,
        }
    }

    /// Register a detector; the set stays sorted by priority.
    pub fn register(&mut self, detector: Box<dyn Detector>) {
        tracing::debug!(kind = %detector.kind(), "registered detector");
        self.detectors.push(detector);
        self.detectors.sort_by_key(|d| d.priority());
    }

    pub fn set_dry_run(&mut self, enabled: bool) {
        self.dry_run = enabled;
    }

    pub fn set_sink(&mut self, sink: Arc<dyn DetectionSink>) {
        self.sink = Some(sink);
    }

    /// The job the next run's results are logged against.
    pub fn set_job(&mut self, job_id: JobId) {
        self.job_id = Some(job_id);
    }

    pub fn detector_kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Setup every enabled detector.
    pub async fn setup_all(&mut self, page: &dyn PagePort) {
        for detector in &mut self.detectors {
            if detector.enabled() {
                detector.setup(page).await;
            }
        }
    }

    /// Run every enabled detector once.
    ///
    /// Returns `(should_end, results)`. `should_end` is reached when the
    /// count of currently-detected probes meets `min_detectors_agree`, and
    /// is always false in dry-run mode even though results keep flowing to
    /// the sink as tuning signal.
    pub async fn check_all(&mut self, page: &dyn PagePort) -> (bool, Vec<DetectionResult>) {
        let mut results = Vec::new();
        let mut triggered = 0usize;

        for detector in &mut self.detectors {
            if !detector.enabled() {
                continue;
            }
            let result = detector.check(page).await;
            if result.detected {
                triggered += 1;
                tracing::info!(
                    kind = %result.detector,
                    confidence = result.confidence,
                    reason = %result.reason,
                    "detector triggered"
                );
                if let (Some(sink), Some(job_id)) = (&self.sink, &self.job_id) {
                    sink.record(job_id, &result);
                }
            }
            results.push(result);

            if !self.dry_run && triggered >= self.config.min_detectors_agree {
                return (true, results);
            }
        }

        let should_end = !self.dry_run && triggered >= self.config.min_detectors_agree;
        (should_end, results)
    }

    /// Reset every detector to its post-construct state. Idempotent.
    pub fn reset_all(&mut self) {
        for detector in &mut self.detectors {
            detector.reset();
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod recording_sink {
    use super::DetectionSink;
    use mrec_core::{DetectionResult, JobId};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Test sink collecting every recorded result.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        entries: Arc<Mutex<Vec<(JobId, DetectionResult)>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn entries(&self) -> Vec<(JobId, DetectionResult)> {
            self.entries.lock().clone()
        }
    }

    impl DetectionSink for RecordingSink {
        fn record(&self, job_id: &JobId, result: &DetectionResult) {
            self.entries.lock().push((*job_id, result.clone()));
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording_sink::RecordingSink;

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
