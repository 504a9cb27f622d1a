// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Meeting end detection types shared between the framework and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kinds of meeting end detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    WebrtcConnection,
    TextIndicator,
    VideoElement,
    UrlChange,
    ScreenFreeze,
    AudioSilence,
}

crate::simple_display! {
    DetectorKind {
        WebrtcConnection => "webrtc_connection",
        TextIndicator => "text_indicator",
        VideoElement => "video_element",
        UrlChange => "url_change",
        ScreenFreeze => "screen_freeze",
        AudioSilence => "audio_silence",
    }
}

/// Result of one probe check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detector: DetectorKind,
    pub detected: bool,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl DetectionResult {
    pub fn negative(detector: DetectorKind, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            detector,
            detected: false,
            confidence: 0.0,
            reason: reason.into(),
            timestamp: at,
        }
    }

    pub fn positive(
        detector: DetectorKind,
        confidence: f64,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            detector,
            detected: true,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            timestamp: at,
        }
    }
}

/// Configuration for the detection ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub text_indicator_enabled: bool,
    pub video_element_enabled: bool,
    pub webrtc_connection_enabled: bool,
    pub screen_freeze_enabled: bool,
    pub audio_silence_enabled: bool,
    pub url_change_enabled: bool,

    /// Similarity at or above this counts as a frozen frame.
    pub screen_freeze_threshold: f64,
    pub screen_freeze_timeout_sec: u64,
    pub audio_silence_timeout_sec: u64,
    /// Level below this is silence.
    pub audio_silence_threshold: f64,
    /// Seconds with zero `<video>` elements before the probe fires.
    pub video_absence_sec: u64,

    /// Probes that must currently agree before the ensemble votes to end.
    pub min_detectors_agree: usize,

    /// Priority per kind, lower fires first.
    pub priorities: HashMap<DetectorKind, u32>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            text_indicator_enabled: true,
            video_element_enabled: true,
            webrtc_connection_enabled: true,
            screen_freeze_enabled: false,
            audio_silence_enabled: false,
            url_change_enabled: true,
            screen_freeze_threshold: 0.98,
            screen_freeze_timeout_sec: 60,
            audio_silence_timeout_sec: 120,
            audio_silence_threshold: 0.05,
            video_absence_sec: 5,
            min_detectors_agree: 1,
            priorities: HashMap::from([
                (DetectorKind::WebrtcConnection, 1),
                (DetectorKind::TextIndicator, 2),
                (DetectorKind::VideoElement, 3),
                (DetectorKind::UrlChange, 4),
                (DetectorKind::ScreenFreeze, 5),
                (DetectorKind::AudioSilence, 6),
            ]),
        }
    }
}

impl DetectionConfig {
    pub fn priority(&self, kind: DetectorKind) -> u32 {
        self.priorities.get(&kind).copied().unwrap_or(99)
    }

    pub fn is_enabled(&self, kind: DetectorKind) -> bool {
        match kind {
            DetectorKind::TextIndicator => self.text_indicator_enabled,
            DetectorKind::VideoElement => self.video_element_enabled,
            DetectorKind::WebrtcConnection => self.webrtc_connection_enabled,
            DetectorKind::ScreenFreeze => self.screen_freeze_enabled,
            DetectorKind::AudioSilence => self.audio_silence_enabled,
            DetectorKind::UrlChange => self.url_change_enabled,
        }
    }
}

#[cfg(test)]
#[path = "detection_tests.rs"]
mod tests;
