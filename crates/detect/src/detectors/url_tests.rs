// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mrec_adapters::{FakePage, PageScript};

fn page_at(url: &str) -> FakePage {
    FakePage::single(PageScript { url: url.to_string(), ..Default::default() })
}

#[tokio::test]
async fn navigation_away_from_meeting_domain_detects() {
    let mut detector = UrlChangeDetector::new(DetectionConfig::default());

    detector.setup(&page_at("https://meet.jit.si/testroom-1")).await;
    let result = detector.check(&page_at("https://meet.jit.si/testroom-1")).await;
    assert!(!result.detected);

    let result = detector.check(&page_at("https://example.com/farewell")).await;
    assert!(result.detected);
    assert!(result.reason.contains("meet.jit.si"));
}

#[tokio::test]
async fn fragment_changes_on_the_same_domain_are_ignored() {
    let mut detector = UrlChangeDetector::new(DetectionConfig::default());
    detector.setup(&page_at("https://acme.webex.com/meet/alice")).await;

    let result = detector.check(&page_at("https://acme.webex.com/meet/alice#layout")).await;
    assert!(!result.detected);
}

#[tokio::test]
async fn without_setup_nothing_detects() {
    let mut detector = UrlChangeDetector::new(DetectionConfig::default());
    let result = detector.check(&page_at("https://example.com")).await;
    assert!(!result.detected);
    assert!(result.reason.contains("no initial url"));
}

#[tokio::test]
async fn reset_forgets_the_initial_url() {
    let mut detector = UrlChangeDetector::new(DetectionConfig::default());
    detector.setup(&page_at("https://zoom.us/j/123?zc=0")).await;
    detector.reset();

    let result = detector.check(&page_at("https://example.com")).await;
    assert!(!result.detected);
}
