// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mrec_adapters::{FakePage, PageScript};
use std::collections::HashMap;
use std::time::Duration;

fn page_with_videos(count: usize) -> FakePage {
    FakePage::single(PageScript {
        counts: HashMap::from([("video".to_string(), count)]),
        ..Default::default()
    })
}

#[tokio::test(start_paused = true)]
async fn absence_must_persist_before_detection() {
    let mut detector = VideoElementDetector::new(DetectionConfig::default());
    let page = page_with_videos(0);

    // First observation only arms the window.
    assert!(!detector.check(&page).await.detected);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!detector.check(&page).await.detected);

    tokio::time::sleep(Duration::from_secs(4)).await;
    let result = detector.check(&page).await;
    assert!(result.detected);
    assert_eq!(result.confidence, 0.9);
    assert!(result.reason.contains("no video elements"));
}

#[tokio::test(start_paused = true)]
async fn returning_video_rearms_the_window() {
    let mut detector = VideoElementDetector::new(DetectionConfig::default());

    let empty = page_with_videos(0);
    assert!(!detector.check(&empty).await.detected);
    tokio::time::sleep(Duration::from_secs(10)).await;

    // Video came back: the window resets.
    let live = page_with_videos(2);
    assert!(!detector.check(&live).await.detected);

    assert!(!detector.check(&empty).await.detected);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!detector.check(&empty).await.detected);
}

#[tokio::test(start_paused = true)]
async fn reset_restores_post_construct_state() {
    let mut detector = VideoElementDetector::new(DetectionConfig::default());
    let empty = page_with_videos(0);

    detector.check(&empty).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    detector.reset();

    // After reset the first check arms a fresh window again.
    assert!(!detector.check(&empty).await.detected);
}
