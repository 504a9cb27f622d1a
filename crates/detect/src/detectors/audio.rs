// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audio-silence probe.
//!
//! Queries the audio server for the monitor source level each check; a
//! level under the threshold for the configured window counts as the
//! meeting having gone quiet. Disabled by default since it shells out on
//! every probe.

use crate::orchestrator::Detector;
use async_trait::async_trait;
use chrono::Utc;
use mrec_adapters::PagePort;
use mrec_core::{DetectionConfig, DetectionResult, DetectorKind};
use tokio::time::Instant;

pub struct AudioSilenceDetector {
    config: DetectionConfig,
    source: String,
    silence_start: Option<Instant>,
    last_level: f64,
}

impl AudioSilenceDetector {
    pub fn new(config: DetectionConfig, source: String) -> Self {
        Self {
            config,
            source,
            silence_start: None,
            last_level: 0.0,
        }
    }
}

#[async_trait]
impl Detector for AudioSilenceDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::AudioSilence
    }

    fn priority(&self) -> u32 {
        self.config.priority(self.kind())
    }

    fn enabled(&self) -> bool {
        self.config.is_enabled(self.kind())
    }

    async fn check(&mut self, _page: &dyn PagePort) -> DetectionResult {
        let now = Utc::now();
        let Some(level) = mrec_capture::audio::source_level(&self.source).await else {
            return DetectionResult::negative(self.kind(), "audio level unavailable", now);
        };
        self.last_level = level;

        if level >= self.config.audio_silence_threshold {
            self.silence_start = None;
            return DetectionResult::negative(
                self.kind(),
                format!("audio active (level {level:.3})"),
                now,
            );
        }

        let since = *self.silence_start.get_or_insert_with(Instant::now);
        let silent_for = since.elapsed().as_secs_f64();
        if silent_for >= self.config.audio_silence_timeout_sec as f64 {
            DetectionResult::positive(
                self.kind(),
                0.8,
                format!("audio silent for {silent_for:.0}s (level {level:.3})"),
                now,
            )
        } else {
            DetectionResult::negative(self.kind(), "audio quiet, confirming", now)
        }
    }

    fn reset(&mut self) {
        self.silence_start = None;
        self.last_level = 0.0;
    }
}
