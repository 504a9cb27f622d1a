// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::TokioClock;
use chrono::{DateTime, TimeZone, Utc};
use mrec_core::Schedule;
use mrec_storage::Store;
use parking_lot::Mutex;
use std::time::Duration;
use tempfile::tempdir;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

struct Fixture {
    scheduler: Arc<Scheduler<TokioClock>>,
    schedules: ScheduleRepository,
    fired: Arc<Mutex<Vec<ScheduleId>>>,
    _dir: tempfile::TempDir,
}

fn fixture(anchor: DateTime<Utc>) -> Fixture {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let schedules = ScheduleRepository::new(store);
    let fired: Arc<Mutex<Vec<ScheduleId>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let scheduler = Scheduler::new(
        TokioClock::at_utc(anchor),
        chrono_tz::Tz::UTC,
        schedules.clone(),
        Arc::new(move |id| sink.lock().push(id)),
    );
    Fixture { scheduler, schedules, fired, _dir: dir }
}

#[tokio::test(start_paused = true)]
async fn once_schedule_arms_early() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);

    let schedule = Schedule::builder()
        .start_time(anchor + chrono::Duration::seconds(300))
        .early_join_sec(30u64)
        .build();
    fx.schedules.upsert(schedule.clone()).unwrap();
    fx.scheduler.add_schedule(&schedule).unwrap();

    // Armed 30 seconds before start.
    assert_eq!(
        fx.scheduler.next_fire(&schedule.id),
        Some(anchor + chrono::Duration::seconds(270))
    );
    // next_run_at persisted, UTC.
    let row = fx.schedules.get(schedule.id.as_str()).unwrap();
    assert_eq!(row.next_run_at, Some(anchor + chrono::Duration::seconds(270)));
}

#[tokio::test(start_paused = true)]
async fn once_schedule_in_the_past_is_refused() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);

    let schedule = Schedule::builder()
        .start_time(anchor - chrono::Duration::seconds(10))
        .build();
    fx.schedules.upsert(schedule.clone()).unwrap();

    let err = fx.scheduler.add_schedule(&schedule).unwrap_err();
    assert!(matches!(err, SchedulerError::TriggerInPast { .. }));
    assert!(fx.scheduler.armed_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn add_then_remove_leaves_armed_set_unchanged() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);
    let before = fx.scheduler.armed_keys();

    let schedule = Schedule::builder()
        .start_time(anchor + chrono::Duration::seconds(600))
        .build();
    fx.schedules.upsert(schedule.clone()).unwrap();
    fx.scheduler.add_schedule(&schedule).unwrap();
    assert_eq!(fx.scheduler.armed_keys().len(), 1);

    assert!(fx.scheduler.remove_schedule(&schedule.id));
    assert_eq!(fx.scheduler.armed_keys(), before);
}

#[tokio::test(start_paused = true)]
async fn arming_the_same_schedule_twice_replaces() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);

    let schedule = Schedule::builder()
        .start_time(anchor + chrono::Duration::seconds(600))
        .build();
    fx.schedules.upsert(schedule.clone()).unwrap();
    fx.scheduler.add_schedule(&schedule).unwrap();
    fx.scheduler.add_schedule(&schedule).unwrap();

    assert_eq!(fx.scheduler.armed_keys().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cron_weekday_convention_is_converted_before_arming() {
    // Saturday. Stored POSIX "0 9 * * 1-5" means Mon-Fri; next fire must
    // be Monday 09:00, which only holds if the conversion was applied.
    let anchor = utc(2025, 6, 7, 12, 0);
    let fx = fixture(anchor);

    let schedule = Schedule::builder()
        .schedule_type(mrec_core::ScheduleType::Cron)
        .cron_expression("0 9 * * 1-5")
        .build();
    fx.schedules.upsert(schedule.clone()).unwrap();
    fx.scheduler.add_schedule(&schedule).unwrap();

    assert_eq!(fx.scheduler.next_fire(&schedule.id), Some(utc(2025, 6, 9, 9, 0)));
}

#[tokio::test(start_paused = true)]
async fn invalid_cron_expression_is_rejected() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);

    let schedule = Schedule::builder()
        .schedule_type(mrec_core::ScheduleType::Cron)
        .cron_expression("61 * * * *")
        .build();
    fx.schedules.upsert(schedule.clone()).unwrap();

    assert!(matches!(
        fx.scheduler.add_schedule(&schedule),
        Err(SchedulerError::Cron(_))
    ));

    let missing = Schedule::builder()
        .schedule_type(mrec_core::ScheduleType::Cron)
        .build();
    assert!(matches!(
        fx.scheduler.add_schedule(&missing),
        Err(SchedulerError::MissingCronExpression(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn fire_updates_run_times_and_invokes_callback() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);
    let shutdown = CancellationToken::new();
    let loop_task = fx.scheduler.start(shutdown.clone());

    let schedule = Schedule::builder()
        .start_time(anchor + chrono::Duration::seconds(60))
        .early_join_sec(30u64)
        .build();
    fx.schedules.upsert(schedule.clone()).unwrap();
    fx.scheduler.add_schedule(&schedule).unwrap();

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(fx.fired.lock().clone(), vec![schedule.id]);

    let row = fx.schedules.get(schedule.id.as_str()).unwrap();
    assert_eq!(row.last_run_at, Some(anchor + chrono::Duration::seconds(30)));
    assert_eq!(row.next_run_at, None, "one-shot trigger is spent");

    shutdown.cancel();
    let _ = loop_task.await;
}

#[tokio::test(start_paused = true)]
async fn manual_trigger_fires_and_stamps_last_run() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);

    let schedule = Schedule::builder().build();
    fx.schedules.upsert(schedule.clone()).unwrap();

    fx.scheduler.trigger_schedule(&schedule.id);
    assert_eq!(fx.fired.lock().clone(), vec![schedule.id]);
    let row = fx.schedules.get(schedule.id.as_str()).unwrap();
    assert_eq!(row.last_run_at, Some(anchor));
}

#[tokio::test(start_paused = true)]
async fn load_and_arm_all_skips_disabled_and_past() {
    let anchor = utc(2025, 6, 2, 9, 0);
    let fx = fixture(anchor);

    let good = Schedule::builder()
        .start_time(anchor + chrono::Duration::seconds(600))
        .build();
    let disabled = Schedule::builder()
        .start_time(anchor + chrono::Duration::seconds(600))
        .enabled(false)
        .build();
    let past = Schedule::builder()
        .start_time(anchor - chrono::Duration::seconds(600))
        .build();
    for s in [&good, &disabled, &past] {
        fx.schedules.upsert((*s).clone()).unwrap();
    }

    let armed = fx.scheduler.load_and_arm_all();
    assert_eq!(armed, 1);
    assert_eq!(
        fx.scheduler.armed_keys(),
        vec![format!("schedule_{}", good.id)]
    );
}
