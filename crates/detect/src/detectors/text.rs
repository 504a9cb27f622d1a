// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-of-meeting text probe.

use crate::orchestrator::Detector;
use async_trait::async_trait;
use chrono::Utc;
use mrec_adapters::PagePort;
use mrec_core::{DetectionConfig, DetectionResult, DetectorKind};

/// Curated end-of-meeting phrases, English plus localized variants.
const END_INDICATORS: [&str; 14] = [
    "meeting has ended",
    "Meeting has ended",
    "會議已結束",
    "You have been disconnected",
    "連線已中斷",
    "You have left the meeting",
    "已離開會議",
    "The host ended the meeting",
    "主持人已結束會議",
    "kicked",
    "removed from the meeting",
    "Conference not found",
    "會議不存在",
    "Meeting unavailable",
];

pub struct TextIndicatorDetector {
    config: DetectionConfig,
}

impl TextIndicatorDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Detector for TextIndicatorDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::TextIndicator
    }

    fn priority(&self) -> u32 {
        self.config.priority(self.kind())
    }

    fn enabled(&self) -> bool {
        self.config.is_enabled(self.kind())
    }

    async fn check(&mut self, page: &dyn PagePort) -> DetectionResult {
        let now = Utc::now();
        for indicator in END_INDICATORS {
            match page.contains_text(indicator).await {
                Ok(true) => {
                    return DetectionResult::positive(
                        self.kind(),
                        1.0,
                        format!("found text indicator: {indicator:?}"),
                        now,
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "text probe failed");
                    break;
                }
            }
        }
        DetectionResult::negative(self.kind(), "no end indicators found", now)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
#[path = "text_tests.rs"]
mod tests;
