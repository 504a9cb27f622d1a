// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Screen-freeze probe.
//!
//! Screenshots are shrunk to a fixed thumbnail, grayscaled, and compared by
//! mean absolute pixel difference. Similarity at or above the threshold for
//! the configured window means the composited page stopped moving.

use crate::orchestrator::Detector;
use async_trait::async_trait;
use chrono::Utc;
use image::imageops::FilterType;
use mrec_adapters::PagePort;
use mrec_core::{DetectionConfig, DetectionResult, DetectorKind};
use tokio::time::Instant;

const THUMB_W: u32 = 100;
const THUMB_H: u32 = 75;

pub struct ScreenFreezeDetector {
    config: DetectionConfig,
    last_thumbnail: Option<Vec<u8>>,
    freeze_start: Option<Instant>,
}

impl ScreenFreezeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            last_thumbnail: None,
            freeze_start: None,
        }
    }

    fn thumbnail(png: &[u8]) -> Option<Vec<u8>> {
        let decoded = image::load_from_memory(png).ok()?;
        let small = decoded
            .resize_exact(THUMB_W, THUMB_H, FilterType::Triangle)
            .to_luma8();
        Some(small.into_raw())
    }

    /// `1 - meanPixelDiff/255` over the two thumbnails.
    fn similarity(a: &[u8], b: &[u8]) -> f64 {
        if a.len() != b.len() || a.is_empty() {
            return 0.5;
        }
        let diff_sum: u64 = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| x.abs_diff(*y) as u64)
            .sum();
        let max_diff = 255u64 * a.len() as u64;
        1.0 - (diff_sum as f64 / max_diff as f64)
    }
}

#[async_trait]
impl Detector for ScreenFreezeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ScreenFreeze
    }

    fn priority(&self) -> u32 {
        self.config.priority(self.kind())
    }

    fn enabled(&self) -> bool {
        self.config.is_enabled(self.kind())
    }

    async fn check(&mut self, page: &dyn PagePort) -> DetectionResult {
        let now = Utc::now();
        let png = match page.screenshot_png().await {
            Ok(png) if !png.is_empty() => png,
            Ok(_) => return DetectionResult::negative(self.kind(), "empty screenshot", now),
            Err(e) => {
                tracing::debug!(error = %e, "freeze probe screenshot failed");
                return DetectionResult::negative(self.kind(), "screenshot failed", now);
            }
        };
        let Some(current) = Self::thumbnail(&png) else {
            return DetectionResult::negative(self.kind(), "undecodable screenshot", now);
        };

        let result = match &self.last_thumbnail {
            None => DetectionResult::negative(self.kind(), "first sample", now),
            Some(last) => {
                let similarity = Self::similarity(last, &current);
                if similarity >= self.config.screen_freeze_threshold {
                    let since = *self.freeze_start.get_or_insert_with(Instant::now);
                    let frozen_for = since.elapsed().as_secs_f64();
                    if frozen_for >= self.config.screen_freeze_timeout_sec as f64 {
                        DetectionResult::positive(
                            self.kind(),
                            similarity,
                            format!(
                                "screen frozen for {frozen_for:.0}s (similarity {:.1}%)",
                                similarity * 100.0
                            ),
                            now,
                        )
                    } else {
                        DetectionResult::negative(self.kind(), "screen still, confirming", now)
                    }
                } else {
                    self.freeze_start = None;
                    DetectionResult::negative(self.kind(), "screen is active", now)
                }
            }
        };

        self.last_thumbnail = Some(current);
        result
    }

    fn reset(&mut self) {
        self.last_thumbnail = None;
        self.freeze_start = None;
    }
}

#[cfg(test)]
#[path = "freeze_tests.rs"]
mod tests;
