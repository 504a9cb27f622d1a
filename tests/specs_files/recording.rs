// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording path scenarios: happy fixed, lobby timeout, auto detection,
//! network retry, cancel.

use crate::specs::harness::*;
use mrec_adapters::{FakePage, NotifyCall, PageScript};
use mrec_core::{
    AutoDetectMode, DurationMode, EndReason, ErrorCode, JobStatus, ScheduleType,
};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn happy_fixed_duration_recording() {
    let world = World::at(anchor(), FakePage::single(joined_script(&[])));
    let schedule = world.seed(|s| {
        s.duration_sec = 60;
        s.min_duration_sec = Some(60);
    });

    assert!(world.runner.queue_schedule(schedule.id));
    let job = world.wait_for_terminal().await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.end_reason, Some(EndReason::Completed));
    assert_eq!(job.id.as_str().len(), 8, "opaque short job id");

    let info = job.recording.as_ref().expect("artifact info");
    assert!(info.file_size > 0);
    assert!(info.duration_sec > 0.0);
    assert!(info.output_path.exists());

    let started = job.timestamps.recording_started_at.unwrap();
    let stopped = job.timestamps.recording_stopped_at.unwrap();
    assert!((stopped - started).num_seconds() >= 58);
    assert!(job.timestamps.is_ordered());

    // Lifecycle notifications arrive strictly ordered.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls = world.notifier.calls();
    assert!(matches!(calls[0], NotifyCall::Started { .. }));
    assert!(matches!(calls[1], NotifyCall::Completed { .. }));

    world.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn lobby_timeout_fails_with_diagnostics() {
    let page = FakePage::single(PageScript {
        counts: HashMap::from([(JOIN_BUTTON.to_string(), 1)]),
        texts: vec!["You are in the waiting room".to_string()],
        screenshot: vec![0x89, 0x50, 0x4e, 0x47],
        url: "https://meet.jit.si/testroom-1".to_string(),
        ..Default::default()
    });
    let world = World::at(anchor(), page);
    let schedule = world.seed(|s| {
        s.duration_sec = 600;
        s.lobby_wait_sec = 5;
    });

    assert!(world.runner.queue_schedule(schedule.id));
    let job = world.wait_for_terminal().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::LobbyTimeout));

    let diag = job.diagnostics.as_ref().expect("diagnostic bundle");
    assert!(diag.has_screenshot);
    assert!(diag.dir.join("screenshot.png").exists());
    assert!(diag.dir.join("metadata.json").exists());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(world
        .notifier
        .calls()
        .iter()
        .any(|c| matches!(c, NotifyCall::Failed { .. })));
    world.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn auto_detection_fires_only_after_min_duration() {
    // The end-of-meeting text appears at t=40s. The same signal below the
    // minimum (t<30) must be ignored; here the page flips at 40s and the
    // run stops on the next poll.
    let page = FakePage::new(vec![
        joined_script(&[]),
        joined_script(&["meeting has ended"]),
    ]);
    let world = World::at(anchor(), page);
    let schedule = world.seed(|s| {
        s.duration_sec = 600;
        s.duration_mode = DurationMode::Auto;
        s.auto_detect_mode = Some(AutoDetectMode::AfterMin);
        s.min_duration_sec = Some(30);
        s.stillness_timeout_sec = 5;
    });

    assert!(world.runner.queue_schedule(schedule.id));

    // Flip the page into its ended state at t=40.
    {
        let page = world.page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(40)).await;
            page.advance();
        });
    }

    let job = world.wait_for_terminal().await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.end_reason, Some(EndReason::AutoDetected));

    let started = job.timestamps.recording_started_at.unwrap();
    let stopped = job.timestamps.recording_stopped_at.unwrap();
    let elapsed = (stopped - started).num_seconds();
    assert!(
        (38..=50).contains(&elapsed),
        "expected a stop just past t=40, got {elapsed}s"
    );

    // The winning vote is in the detection log.
    let entries = world.detections.for_job(&job.id);
    assert!(!entries.is_empty());
    assert!(entries.iter().any(|e| e.detected));
    world.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn network_retry_shrinks_window_then_surfaces_hard_failure() {
    // Attempt one dies on DNS resolution; the retry runs with the window
    // that is left. The page then shows a hard error, which must surface
    // without further retries.
    let page = FakePage::single(PageScript {
        counts: HashMap::from([(JOIN_BUTTON.to_string(), 1)]),
        texts: vec!["Meeting not found".to_string()],
        url: "https://meet.jit.si/testroom-1".to_string(),
        ..Default::default()
    });
    let world = World::at(anchor(), page);
    world.page.set_navigation_failure("Name or service not known");

    let schedule = world.seed(|s| {
        s.duration_sec = 600;
        s.schedule_type = ScheduleType::Once;
        s.start_time = Some(anchor());
    });
    assert!(world.runner.queue_schedule(schedule.id));

    // First failure is retryable: a retry notification with the 15s delay.
    let mut retry_seen = None;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        retry_seen = world.notifier.calls().into_iter().find_map(|c| match c {
            NotifyCall::Retrying { attempt, next_delay_sec, .. } => {
                Some((attempt, next_delay_sec))
            }
            _ => None,
        });
        if retry_seen.is_some() {
            break;
        }
    }
    assert_eq!(retry_seen, Some((1, 15)));

    // Network recovers; the second attempt reaches the page and fails hard.
    world.page.clear_navigation_failure();
    let job = world.wait_for_terminal().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::MeetingNotFound));
    // The requeued attempt had only the remaining window.
    assert!(
        (570..600).contains(&job.duration_sec),
        "window not shrunk: {}",
        job.duration_sec
    );
    // Exactly one retry: the hard failure did not loop.
    let retries = world
        .notifier
        .calls()
        .iter()
        .filter(|c| matches!(c, NotifyCall::Retrying { .. }))
        .count();
    assert_eq!(retries, 1);
    world.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_recording_is_terminal_within_budget() {
    let world = World::at(anchor(), FakePage::single(joined_script(&[])));
    let schedule = world.seed(|s| s.duration_sec = 600);

    assert!(world.runner.queue_schedule(schedule.id));
    let job = world.wait_for_job(|j| j.status == JobStatus::Recording).await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(world.runner.worker().request_cancel());

    // Canceled within one check interval plus the shutdown budget.
    let canceled = world.wait_for_job(|j| j.status == JobStatus::Canceled).await;
    assert_eq!(canceled.id, job.id);
    assert_eq!(canceled.error_code, Some(ErrorCode::Canceled));
    assert_eq!(canceled.end_reason, Some(EndReason::Canceled));

    // The truncated artifact is still on disk.
    let spec = world.muxers.handle().spec().unwrap();
    assert!(spec.output_path.exists());
    assert!(!world.muxers.handle().is_recording());

    assert_no_further_transitions(&world, job.id).await;
    world.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn queued_work_serializes_and_uploads_fan_out() {
    let world = World::at(anchor(), FakePage::single(joined_script(&[])));
    let first = world.seed(|s| {
        s.duration_sec = 60;
        s.upload_enabled = true;
    });
    let second = world.seed(|s| s.duration_sec = 60);

    assert!(world.runner.queue_schedule(first.id));
    assert!(world.runner.queue_schedule(second.id));

    let mut succeeded_count = 0;
    for _ in 0..600 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let jobs = world.jobs.get_all(20, 0);
        assert_single_flight(&jobs);
        succeeded_count = jobs.iter().filter(|j| succeeded(j)).count();
        if succeeded_count == 2 {
            break;
        }
    }
    assert_eq!(succeeded_count, 2);

    // The upload ran under its own lock and set the hosted identity
    // without a status regression.
    let uploaded = world.wait_for_job(|j| j.upload_video_id.is_some()).await;
    assert_eq!(uploaded.status, JobStatus::Succeeded);
    assert_eq!(uploaded.schedule_id, Some(first.id));
    assert!(uploaded.timestamps.uploaded_at.is_some());
    assert_eq!(world.uploader.calls().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(world
        .notifier
        .calls()
        .iter()
        .any(|c| matches!(c, NotifyCall::Uploaded { .. })));
    world.shutdown.cancel();
}
