// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Video element presence probe.

use crate::orchestrator::Detector;
use async_trait::async_trait;
use chrono::Utc;
use mrec_adapters::PagePort;
use mrec_core::{DetectionConfig, DetectionResult, DetectorKind};
use tokio::time::Instant;

pub struct VideoElementDetector {
    config: DetectionConfig,
    no_video_since: Option<Instant>,
}

impl VideoElementDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config, no_video_since: None }
    }
}

#[async_trait]
impl Detector for VideoElementDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::VideoElement
    }

    fn priority(&self) -> u32 {
        self.config.priority(self.kind())
    }

    fn enabled(&self) -> bool {
        self.config.is_enabled(self.kind())
    }

    async fn check(&mut self, page: &dyn PagePort) -> DetectionResult {
        let now = Utc::now();
        let count = match page.count("video").await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(error = %e, "video probe failed");
                return DetectionResult::negative(self.kind(), "video probe failed", now);
            }
        };

        if count > 0 {
            self.no_video_since = None;
            return DetectionResult::negative(self.kind(), "video elements present", now);
        }

        // Zero video elements has to persist before it counts; vendors
        // re-render the grid constantly.
        match self.no_video_since {
            None => {
                self.no_video_since = Some(Instant::now());
                DetectionResult::negative(self.kind(), "no video elements, confirming", now)
            }
            Some(since) => {
                let elapsed = since.elapsed().as_secs_f64();
                if elapsed >= self.config.video_absence_sec as f64 {
                    DetectionResult::positive(
                        self.kind(),
                        0.9,
                        format!("no video elements for {elapsed:.1}s"),
                        now,
                    )
                } else {
                    DetectionResult::negative(self.kind(), "no video elements, confirming", now)
                }
            }
        }
    }

    fn reset(&mut self) {
        self.no_video_since = None;
    }
}

#[cfg(test)]
#[path = "video_tests.rs"]
mod tests;
