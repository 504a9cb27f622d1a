// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;

#[test]
fn default_priorities_follow_the_documented_order() {
    let config = DetectionConfig::default();
    assert_eq!(config.priority(DetectorKind::WebrtcConnection), 1);
    assert_eq!(config.priority(DetectorKind::TextIndicator), 2);
    assert_eq!(config.priority(DetectorKind::VideoElement), 3);
    assert_eq!(config.priority(DetectorKind::UrlChange), 4);
    assert_eq!(config.priority(DetectorKind::ScreenFreeze), 5);
    assert_eq!(config.priority(DetectorKind::AudioSilence), 6);
}

#[test]
fn freeze_and_silence_are_disabled_by_default() {
    let config = DetectionConfig::default();
    assert!(config.is_enabled(DetectorKind::WebrtcConnection));
    assert!(config.is_enabled(DetectorKind::TextIndicator));
    assert!(config.is_enabled(DetectorKind::VideoElement));
    assert!(config.is_enabled(DetectorKind::UrlChange));
    assert!(!config.is_enabled(DetectorKind::ScreenFreeze));
    assert!(!config.is_enabled(DetectorKind::AudioSilence));
}

#[test]
fn positive_result_clamps_confidence() {
    let now = Utc::now();
    let result = DetectionResult::positive(DetectorKind::TextIndicator, 1.7, "found", now);
    assert_eq!(result.confidence, 1.0);
    assert!(result.detected);

    let result = DetectionResult::negative(DetectorKind::TextIndicator, "nothing", now);
    assert!(!result.detected);
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn detector_kind_serde_tags() {
    assert_eq!(
        serde_json::to_string(&DetectorKind::WebrtcConnection).unwrap(),
        "\"webrtc_connection\""
    );
    assert_eq!(DetectorKind::ScreenFreeze.to_string(), "screen_freeze");
}
