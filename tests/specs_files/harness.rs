// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scenario harness: the real engine over fake adapters.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use mrec_adapters::{FakeBrowserAdapter, FakeNotifier, FakePage, FakeUploader, PageScript};
use mrec_capture::{FakeCaptureFactory, FakeMuxerFactory};
use mrec_core::{DetectionConfig, Job, JobStatus, Meeting, Schedule};
use mrec_detect::DetectionSink;
use mrec_engine::test_support::TokioClock;
use mrec_engine::{
    notifier_task::NOTIFY_QUEUE_DEPTH, spawn_notifier_task, JobRunner, RecordingWorker,
    Scheduler, StoreDetectionSink, WorkerSettings,
};
use mrec_storage::{
    DetectionLogRepository, JobRepository, MeetingRepository, ScheduleRepository, Store,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const IN_MEETING: &str = "#largeVideoContainer, .videocontainer";
pub const JOIN_BUTTON: &str = "[data-testid=\"prejoin.joinMeeting\"]";

/// A page state where the meeting is joined and live.
pub fn joined_script(texts: &[&str]) -> PageScript {
    PageScript {
        counts: HashMap::from([
            (JOIN_BUTTON.to_string(), 1),
            (IN_MEETING.to_string(), 1),
            ("video".to_string(), 2),
        ]),
        texts: texts.iter().map(|t| t.to_string()).collect(),
        url: "https://meet.jit.si/testroom-1".to_string(),
        title: "testroom-1".to_string(),
        screenshot: vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a],
        ..Default::default()
    }
}

pub struct World {
    pub jobs: JobRepository,
    pub schedules: ScheduleRepository,
    pub meetings: MeetingRepository,
    pub detections: DetectionLogRepository,
    pub runner: JobRunner<TokioClock>,
    pub scheduler: Arc<Scheduler<TokioClock>>,
    pub notifier: FakeNotifier,
    pub uploader: FakeUploader,
    pub page: Arc<FakePage>,
    pub muxers: FakeMuxerFactory,
    pub clock: TokioClock,
    pub shutdown: CancellationToken,
    pub dir: TempDir,
}

impl World {
    /// Build the full stack at `anchor`, reusing `dir` when the scenario
    /// simulates a restart over existing state.
    pub fn new(anchor: DateTime<Utc>, tz: Tz, page: FakePage, dir: Option<TempDir>) -> World {
        let dir = dir.unwrap_or_else(|| TempDir::new().unwrap());
        let store = Store::open(&dir.path().join("store")).unwrap();
        let jobs = JobRepository::new(store.clone());
        let schedules = ScheduleRepository::new(store.clone());
        let meetings = MeetingRepository::new(store.clone());
        let detections = DetectionLogRepository::new(store);
        let clock = TokioClock::at_utc(anchor);

        let browser = FakeBrowserAdapter::new(page);
        let page = browser.page_handle();
        let muxers = FakeMuxerFactory::new();
        let sink: Arc<dyn DetectionSink> =
            Arc::new(StoreDetectionSink::new(detections.clone()));

        let mut worker = RecordingWorker::new(
            clock.clone(),
            WorkerSettings {
                recordings_dir: dir.path().join("recordings"),
                diagnostics_dir: dir.path().join("diagnostics"),
                ..Default::default()
            },
            Arc::new(browser),
            Arc::new(FakeCaptureFactory::new()),
            Arc::new(muxers.clone()),
            DetectionConfig::default(),
        );
        worker.set_detection_sink(sink);
        let worker = Arc::new(worker);

        let notifier = FakeNotifier::new();
        let uploader = FakeUploader::new();
        let (notify_tx, notify_rx) = tokio::sync::mpsc::channel(NOTIFY_QUEUE_DEPTH);
        let shutdown = CancellationToken::new();
        spawn_notifier_task(notify_rx, notifier.clone(), jobs.clone(), shutdown.clone());

        let runner = JobRunner::new(
            clock.clone(),
            tz,
            worker,
            jobs.clone(),
            schedules.clone(),
            meetings.clone(),
            Arc::new(uploader.clone()),
            notify_tx,
        );

        let fire_runner = runner.clone();
        let scheduler = Scheduler::new(
            clock.clone(),
            tz,
            schedules.clone(),
            Arc::new(move |id| {
                fire_runner.queue_schedule(id);
            }),
        );

        World {
            jobs,
            schedules,
            meetings,
            detections,
            runner,
            scheduler,
            notifier,
            uploader,
            page,
            muxers,
            clock,
            shutdown,
            dir,
        }
    }

    pub fn at(anchor: DateTime<Utc>, page: FakePage) -> World {
        World::new(anchor, Tz::UTC, page, None)
    }

    /// Insert a meeting and a schedule pointing at it.
    pub fn seed(&self, mutate: impl FnOnce(&mut Schedule)) -> Schedule {
        let meeting = Meeting::builder()
            .meeting_code("testroom-1")
            .default_display_name("Bot")
            .build();
        let mut schedule = Schedule::builder().duration_sec(60).build();
        schedule.meeting_id = meeting.id;
        mutate(&mut schedule);
        self.meetings.upsert(meeting).unwrap();
        self.schedules.upsert(schedule.clone()).unwrap();
        schedule
    }

    /// Advance virtual time until a job matching `pred` exists.
    pub async fn wait_for_job(&self, pred: impl Fn(&Job) -> bool) -> Job {
        for _ in 0..1200 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if let Some(job) = self.jobs.get_all(20, 0).into_iter().find(|j| pred(j)) {
                return job;
            }
        }
        panic!("expected job never appeared");
    }

    pub async fn wait_for_terminal(&self) -> Job {
        self.wait_for_job(|j| j.is_terminal()).await
    }
}

/// Terminal statuses stay terminal: sample the row for a while and assert
/// no transition happens.
pub async fn assert_no_further_transitions(world: &World, job_id: mrec_core::JobId) {
    let status = world.jobs.get_by_job_id(job_id.as_str()).unwrap().status;
    assert!(status.is_terminal());
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            world.jobs.get_by_job_id(job_id.as_str()).unwrap().status,
            status,
            "terminal status was rewritten"
        );
    }
}

pub fn assert_single_flight(jobs: &[Job]) {
    assert!(
        jobs.iter().filter(|j| !j.is_terminal()).count() <= 1,
        "more than one non-terminal job"
    );
}

pub fn anchor() -> DateTime<Utc> {
    chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 6, 2, 9, 0, 0).unwrap()
}

pub fn succeeded(job: &Job) -> bool {
    job.status == JobStatus::Succeeded
}
