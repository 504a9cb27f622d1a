// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart scenarios: orphan recovery and cron catch-up.

use crate::specs::harness::*;
use chrono::{TimeZone, Utc};
use mrec_adapters::FakePage;
use mrec_core::{Job, JobStatus, ScheduleType};
use mrec_storage::{JobRepository, Store};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn orphaned_jobs_fail_before_the_scheduler_arms() {
    // A previous process died mid-recording.
    let dir = TempDir::new().unwrap();
    let stranded = {
        let store = Store::open(&dir.path().join("store")).unwrap();
        let jobs = JobRepository::new(store);
        jobs.create(Job::builder().status(JobStatus::Recording).build()).unwrap()
    };

    // Boot over the same state dir.
    let world = World::new(
        anchor(),
        chrono_tz::Tz::UTC,
        FakePage::single(joined_script(&[])),
        Some(dir),
    );
    let schedule = world.seed(|s| {
        s.start_time = Some(anchor() + chrono::Duration::seconds(600));
    });

    // Startup order: sweep first, then arm.
    let swept = world.jobs.fail_orphans(world_now(&world)).unwrap();
    assert_eq!(swept, vec![stranded.id]);
    let armed = world.scheduler.load_and_arm_all();
    assert_eq!(armed, 1);

    let row = world.jobs.get_by_job_id(stranded.id.as_str()).unwrap();
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(
        row.error_message.as_deref(),
        Some("Job interrupted by server restart")
    );
    assert!(row.timestamps.completed_at.is_some());

    // The schedule is untouched and armed for its future fire.
    assert_eq!(
        world.scheduler.armed_keys(),
        vec![format!("schedule_{}", schedule.id)]
    );
    assert!(world.jobs.get_non_terminal().is_empty());
    world.shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn catch_up_cron_fires_within_the_misfire_grace() {
    // Weekday cron at 09:00 Taipei; the process was down from 08:55 to
    // 09:05 local. 2025-06-02 is a Monday; 09:05 Taipei == 01:05 UTC.
    let tz: chrono_tz::Tz = "Asia/Taipei".parse().unwrap();
    let boot = Utc.with_ymd_and_hms(2025, 6, 2, 1, 5, 0).unwrap();
    let world = World::new(boot, tz, FakePage::single(joined_script(&[])), None);

    let schedule = world.seed(|s| {
        s.schedule_type = ScheduleType::Cron;
        s.cron_expression = Some("0 9 * * 1-5".to_string());
        s.duration_sec = 600;
        // Last ran the previous Friday.
        s.last_run_at = Some(Utc.with_ymd_and_hms(2025, 5, 30, 1, 0, 0).unwrap());
    });

    let token = world.shutdown.clone();
    let loop_task = world.scheduler.start(token);
    assert_eq!(world.scheduler.load_and_arm_all(), 1);

    // The missed 09:00 fire is inside misfire_grace (= duration_sec) and
    // executes exactly once.
    let job = world.wait_for_terminal().await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.duration_sec, 600, "configured duration is unchanged");
    assert_eq!(
        job.deadline_at,
        Some(Utc.with_ymd_and_hms(2025, 6, 2, 1, 10, 0).unwrap()),
        "deadline computed from the 09:00 window"
    );

    // The recording itself was clamped to what was left of the window.
    let started = job.timestamps.recording_started_at.unwrap();
    let stopped = job.timestamps.recording_stopped_at.unwrap();
    assert!((stopped - started).num_seconds() <= 305);

    // Exactly one fire; the trigger advanced to the next weekday.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(world.jobs.get_all(20, 0).len(), 1);
    let row = world.schedules.get(schedule.id.as_str()).unwrap();
    assert_eq!(
        row.next_run_at,
        Some(Utc.with_ymd_and_hms(2025, 6, 3, 1, 0, 0).unwrap()),
        "next fire is Tuesday 09:00 Taipei"
    );
    assert!(row.last_run_at.unwrap() >= boot);

    world.shutdown.cancel();
    let _ = loop_task.await;
}

fn world_now(world: &World) -> chrono::DateTime<Utc> {
    use mrec_core::Clock;
    world.clock.now_utc()
}
