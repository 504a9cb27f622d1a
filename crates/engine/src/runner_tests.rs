// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::notifier_task::spawn_notifier_task;
use crate::test_support::TokioClock;
use chrono::TimeZone;
use mrec_adapters::{FakeBrowserAdapter, FakeNotifier, FakePage, FakeUploader, NotifyCall, PageScript};
use mrec_capture::{FakeCaptureFactory, FakeMuxerFactory};
use mrec_core::DetectionConfig;
use mrec_storage::Store;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const IN_MEETING: &str = "#largeVideoContainer, .videocontainer";
const JOIN_BUTTON: &str = "[data-testid=\"prejoin.joinMeeting\"]";

fn joined_page() -> FakePage {
    FakePage::single(PageScript {
        counts: HashMap::from([(JOIN_BUTTON.to_string(), 1), (IN_MEETING.to_string(), 1)]),
        url: "https://meet.jit.si/testroom-1".to_string(),
        ..Default::default()
    })
}

struct Fixture {
    runner: JobRunner<TokioClock>,
    jobs: JobRepository,
    schedules: ScheduleRepository,
    meetings: MeetingRepository,
    notifier: FakeNotifier,
    uploader: FakeUploader,
    page: Arc<FakePage>,
    shutdown: CancellationToken,
    _dir: TempDir,
}

fn fixture_at(anchor: DateTime<Utc>, page: FakePage, uploader: FakeUploader) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("state")).unwrap();
    let jobs = JobRepository::new(store.clone());
    let schedules = ScheduleRepository::new(store.clone());
    let meetings = MeetingRepository::new(store);
    let clock = TokioClock::at_utc(anchor);

    let browser = FakeBrowserAdapter::new(page);
    let page = browser.page_handle();
    let worker = Arc::new(crate::worker::RecordingWorker::new(
        clock.clone(),
        crate::worker::WorkerSettings {
            recordings_dir: dir.path().join("recordings"),
            diagnostics_dir: dir.path().join("diagnostics"),
            ..Default::default()
        },
        Arc::new(browser),
        Arc::new(FakeCaptureFactory::new()),
        Arc::new(FakeMuxerFactory::new()),
        DetectionConfig::default(),
    ));

    let notifier = FakeNotifier::new();
    let (notify_tx, notify_rx) = tokio::sync::mpsc::channel(64);
    let shutdown = CancellationToken::new();
    spawn_notifier_task(notify_rx, notifier.clone(), jobs.clone(), shutdown.clone());

    let runner = JobRunner::new(
        clock,
        chrono_tz::Tz::UTC,
        worker,
        jobs.clone(),
        schedules.clone(),
        meetings.clone(),
        Arc::new(uploader.clone()),
        notify_tx,
    );

    Fixture {
        runner,
        jobs,
        schedules,
        meetings,
        notifier,
        uploader,
        page,
        shutdown,
        _dir: dir,
    }
}

fn fixture() -> Fixture {
    fixture_at(
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
        joined_page(),
        FakeUploader::new(),
    )
}

fn seed_schedule(fx: &Fixture, mutate: impl FnOnce(&mut Schedule)) -> Schedule {
    let meeting = Meeting::builder()
        .meeting_code("testroom-1")
        .default_display_name("Bot")
        .build();
    let mut schedule = Schedule::builder().duration_sec(60).build();
    schedule.meeting_id = meeting.id;
    mutate(&mut schedule);
    fx.meetings.upsert(meeting).unwrap();
    fx.schedules.upsert(schedule.clone()).unwrap();
    schedule
}

/// Poll the job table until `pred` holds, advancing virtual time.
async fn wait_for_job(fx: &Fixture, pred: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..1200 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Some(job) = fx.jobs.get_all(10, 0).into_iter().find(|j| pred(j)) {
            return job;
        }
    }
    panic!("job matching predicate never appeared");
}

#[tokio::test(start_paused = true)]
async fn scheduled_run_walks_the_full_lifecycle() {
    let fx = fixture();
    let schedule = seed_schedule(&fx, |_| {});

    assert!(fx.runner.queue_schedule(schedule.id));
    let job = wait_for_job(&fx, |j| j.status == JobStatus::Succeeded).await;

    assert_eq!(job.schedule_id, Some(schedule.id));
    assert_eq!(job.meeting_code, "testroom-1");
    assert_eq!(job.display_name, "Bot");
    assert_eq!(job.end_reason, Some(mrec_core::EndReason::Completed));
    assert!(job.recording.is_some());
    assert!(job.timestamps.is_ordered());
    assert!(job.timestamps.started_at.is_some());
    assert!(job.timestamps.recording_started_at.is_some());
    assert!(job.timestamps.completed_at.is_some());

    // started → completed ordering through the notifier task.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let calls = fx.notifier.calls();
    let job_id = job.id.to_string();
    assert_eq!(
        calls,
        vec![
            NotifyCall::Started { job_id: job_id.clone() },
            NotifyCall::Completed { job_id },
        ]
    );
    // The started message id landed on the row.
    let row = fx.jobs.get_by_job_id(job.id.as_str()).unwrap();
    assert_eq!(row.notify_message_id.as_deref(), Some("msg-1"));

    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn queued_schedules_serialize_behind_the_lock() {
    let fx = fixture();
    let first = seed_schedule(&fx, |_| {});
    let second = seed_schedule(&fx, |_| {});

    assert!(fx.runner.queue_schedule(first.id));
    assert!(fx.runner.queue_schedule(second.id));

    // Single-flight: never more than one non-terminal job at any instant.
    let mut done = 0;
    for _ in 0..600 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let jobs = fx.jobs.get_all(10, 0);
        let non_terminal = jobs.iter().filter(|j| !j.is_terminal()).count();
        assert!(non_terminal <= 1, "single-flight violated");
        done = jobs.iter().filter(|j| j.status == JobStatus::Succeeded).count();
        if done == 2 {
            break;
        }
    }
    assert_eq!(done, 2);
    assert_eq!(fx.runner.queue_length(), 0);
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn duplicate_queue_entries_are_rejected() {
    let fx = fixture();
    let schedule = seed_schedule(&fx, |_| {});
    // Hold the lock so the first entry parks in the queue.
    let blocker = seed_schedule(&fx, |_| {});
    assert!(fx.runner.queue_schedule(blocker.id));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(fx.runner.queue_schedule(schedule.id));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!fx.runner.queue_schedule(schedule.id), "already waiting");

    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn disabled_or_dangling_schedules_create_no_jobs() {
    let fx = fixture();
    let disabled = seed_schedule(&fx, |s| s.enabled = false);
    assert!(fx.runner.queue_schedule(disabled.id));

    let mut dangling = Schedule::builder().build();
    dangling.meeting_id = mrec_core::MeetingId::from_string("mtg-missing");
    fx.schedules.upsert(dangling.clone()).unwrap();
    assert!(fx.runner.queue_schedule(dangling.id));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(fx.jobs.get_all(10, 0).is_empty());
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn network_failure_retries_with_shrunk_window() {
    let fx = fixture();
    let schedule = seed_schedule(&fx, |s| {
        s.duration_sec = 600;
        s.schedule_type = mrec_core::ScheduleType::Once;
        s.start_time = Some(Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap());
    });
    // First attempt dies on DNS.
    fx.page.set_navigation_failure("Name or service not known");

    assert!(fx.runner.queue_schedule(schedule.id));

    // Wait for the retry notification, then let the network recover.
    let mut saw_retry = false;
    for _ in 0..120 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if fx
            .notifier
            .calls()
            .iter()
            .any(|c| matches!(c, NotifyCall::Retrying { .. }))
        {
            saw_retry = true;
            break;
        }
    }
    assert!(saw_retry, "retry notification never arrived");
    fx.page.clear_navigation_failure();

    let job = wait_for_job(&fx, |j| j.status == JobStatus::Succeeded).await;
    // The second attempt records only the remaining window.
    assert!(job.duration_sec < 600, "window was not shrunk");
    assert!(job.duration_sec >= 500, "window shrunk too far: {}", job.duration_sec);
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn non_retryable_failure_surfaces_immediately() {
    let anchor = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    let page = FakePage::single(PageScript {
        counts: HashMap::from([(JOIN_BUTTON.to_string(), 1)]),
        texts: vec!["Meeting not found".to_string()],
        ..Default::default()
    });
    let fx = fixture_at(anchor, page, FakeUploader::new());
    let schedule = seed_schedule(&fx, |_| {});

    assert!(fx.runner.queue_schedule(schedule.id));
    let job = wait_for_job(&fx, |j| j.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(mrec_core::ErrorCode::MeetingNotFound));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(fx
        .notifier
        .calls()
        .iter()
        .any(|c| matches!(c, NotifyCall::Failed { .. })));
    assert!(!fx
        .notifier
        .calls()
        .iter()
        .any(|c| matches!(c, NotifyCall::Retrying { .. })));
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn successful_upload_sets_video_identity() {
    let fx = fixture();
    let schedule = seed_schedule(&fx, |s| {
        s.upload_enabled = true;
        s.upload_privacy = "private".to_string();
    });

    assert!(fx.runner.queue_schedule(schedule.id));
    let job = wait_for_job(&fx, |j| j.upload_video_id.is_some()).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.upload_video_id.as_deref(), Some("vid-1"));
    assert!(job.timestamps.uploaded_at.is_some());

    let calls = fx.uploader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].metadata.privacy, "private");
    assert_eq!(calls[0].metadata.title, "Recording - testroom-1");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(fx
        .notifier
        .calls()
        .iter()
        .any(|c| matches!(c, NotifyCall::Uploaded { .. })));
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn failed_upload_keeps_the_job_succeeded() {
    let anchor = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    let fx = fixture_at(anchor, joined_page(), FakeUploader::failing("quota exceeded"));
    let schedule = seed_schedule(&fx, |s| s.upload_enabled = true);

    assert!(fx.runner.queue_schedule(schedule.id));
    let job = wait_for_job(&fx, |j| j.status == JobStatus::Succeeded).await;

    // Give the upload task time to fail.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let row = fx.jobs.get_by_job_id(job.id.as_str()).unwrap();
    assert_eq!(row.status, JobStatus::Succeeded, "no status regression");
    assert!(row.upload_video_id.is_none());
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn run_immediate_returns_none_when_busy() {
    let fx = fixture();
    let schedule = seed_schedule(&fx, |_| {});
    assert!(fx.runner.queue_schedule(schedule.id));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(fx.runner.is_busy());

    let params = RunImmediateParams {
        provider: ProviderKind::Jitsi,
        meeting_code: "adhoc-room".to_string(),
        display_name: "Bot".to_string(),
        duration_sec: 30,
        base_url: None,
        password: None,
        lobby_wait_sec: 900,
    };
    assert!(fx.runner.run_immediate(params.clone()).is_none());

    wait_for_job(&fx, |j| j.status == JobStatus::Succeeded).await;
    let job_id = fx.runner.run_immediate(params).expect("lock is free now");
    let job = wait_for_job(&fx, |j| j.id == job_id && j.is_terminal()).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.schedule_id.is_none());
    fx.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn catch_up_cron_gets_the_window_deadline() {
    // Monday 09:05; the 09:00 weekday fire was missed but the window runs
    // to 09:10.
    let anchor = Utc.with_ymd_and_hms(2025, 6, 2, 9, 5, 0).unwrap();
    let fx = fixture_at(anchor, joined_page(), FakeUploader::new());
    let schedule = seed_schedule(&fx, |s| {
        s.schedule_type = mrec_core::ScheduleType::Cron;
        s.cron_expression = Some("0 9 * * 1-5".to_string());
        s.duration_sec = 600;
    });

    assert!(fx.runner.queue_schedule(schedule.id));
    let job = wait_for_job(&fx, |j| j.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(
        job.deadline_at,
        Some(Utc.with_ymd_and_hms(2025, 6, 2, 9, 10, 0).unwrap())
    );
    // Snapshot keeps the configured duration; the worker clamps the actual
    // window to the deadline.
    assert_eq!(job.duration_sec, 600);
    let started = job.timestamps.recording_started_at.unwrap();
    let stopped = job.timestamps.recording_stopped_at.unwrap();
    assert!((stopped - started).num_seconds() <= 305, "window not clamped");
    fx.shutdown.cancel();
}
