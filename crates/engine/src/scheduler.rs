// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: persisted schedules in, armed triggers out.
//!
//! Wraps the trigger engine with schedule semantics: one-shot triggers fire
//! `early_join_sec` before the start time, cron expressions are converted
//! from the stored POSIX weekday convention before arming, and every fire
//! updates `last_run_at` / `next_run_at` on the row (UTC, always).

use crate::trigger::{parse_engine_expression, FireFn, TriggerEngine, TriggerRule};
use chrono::Duration as ChronoDuration;
use chrono_tz::Tz;
use mrec_core::{Clock, CronError, Schedule, ScheduleId, ScheduleType};
use mrec_storage::{ScheduleRepository, StorageError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Errors from scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Cron(#[from] CronError),
    #[error("cron expression {expr:?} not accepted by the trigger engine: {reason}")]
    Engine { expr: String, reason: String },
    #[error("schedule {0} has no start time")]
    MissingStartTime(ScheduleId),
    #[error("schedule {0} has no cron expression")]
    MissingCronExpression(ScheduleId),
    #[error("schedule {id} trigger time {at} is in the past")]
    TriggerInPast {
        id: ScheduleId,
        at: chrono::DateTime<chrono::Utc>,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct Scheduler<C: Clock> {
    clock: C,
    engine: Arc<TriggerEngine<C>>,
    schedules: ScheduleRepository,
    on_fire: FireFn,
}

impl<C: Clock> Scheduler<C> {
    /// `on_fire` receives each fired schedule id (the runner's
    /// `queue_schedule`). Run-time bookkeeping wraps it: `last_run_at` is
    /// written before the callback, `next_run_at` refreshed after.
    pub fn new(
        clock: C,
        tz: Tz,
        schedules: ScheduleRepository,
        on_fire: FireFn,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let weak = weak.clone();
            let engine_callback: FireFn = Arc::new(move |schedule_id| {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.handle_fire(schedule_id);
                }
            });
            Self {
                engine: Arc::new(TriggerEngine::new(clock.clone(), tz, engine_callback)),
                clock,
                schedules,
                on_fire,
            }
        })
    }

    /// Spawn the wake loop.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.engine.run(shutdown).await })
    }

    /// Arm every enabled schedule. Runs at startup, after the orphan sweep.
    pub fn load_and_arm_all(&self) -> usize {
        let mut armed = 0;
        for schedule in self.schedules.list_enabled() {
            match self.add_schedule(&schedule) {
                Ok(()) => armed += 1,
                Err(e) => {
                    tracing::warn!(schedule_id = %schedule.id, error = %e, "could not arm schedule");
                }
            }
        }
        tracing::info!(armed, "schedules loaded");
        armed
    }

    /// Arm a schedule; arming the same id twice replaces the trigger.
    pub fn add_schedule(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        let key = trigger_key(&schedule.id);
        let now = self.clock.now_utc();

        let rule = match schedule.schedule_type {
            ScheduleType::Once => {
                let start = schedule
                    .start_time
                    .ok_or(SchedulerError::MissingStartTime(schedule.id))?;
                let at = start - ChronoDuration::seconds(schedule.early_join_sec as i64);
                if at <= now {
                    return Err(SchedulerError::TriggerInPast { id: schedule.id, at });
                }
                tracing::info!(
                    schedule_id = %schedule.id,
                    trigger_at = %at,
                    early_join_sec = schedule.early_join_sec,
                    "arming one-shot schedule"
                );
                TriggerRule::Once { at }
            }
            ScheduleType::Cron => {
                let expr = schedule
                    .cron_expression
                    .as_deref()
                    .ok_or(SchedulerError::MissingCronExpression(schedule.id))?;
                // Stored expressions are POSIX (0=Sun); the engine wants
                // 0=Mon. Conversion happens here and nowhere else.
                let engine_expr = mrec_core::to_engine_expression(expr)?;
                let parsed = parse_engine_expression(&engine_expr).map_err(|reason| {
                    SchedulerError::Engine { expr: engine_expr.clone(), reason }
                })?;
                TriggerRule::Cron { schedule: parsed }
            }
        };

        // A fire within the recording window still executes after a
        // restart, so the grace window is the schedule's duration.
        let grace = ChronoDuration::seconds(schedule.duration_sec as i64);
        let next = self
            .engine
            .arm(&key, schedule.id, rule, grace, schedule.last_run_at);
        self.schedules.set_next_run(&schedule.id, next)?;
        Ok(())
    }

    /// Re-arm or disarm to match the row's current state.
    pub fn update_schedule(&self, schedule: &Schedule) -> Result<(), SchedulerError> {
        if schedule.enabled {
            self.add_schedule(schedule)
        } else {
            self.remove_schedule(&schedule.id);
            Ok(())
        }
    }

    pub fn remove_schedule(&self, id: &ScheduleId) -> bool {
        self.engine.disarm(&trigger_key(id))
    }

    /// Manual immediate fire, same bookkeeping as a timed one.
    pub fn trigger_schedule(&self, id: &ScheduleId) {
        tracing::info!(schedule_id = %id, "manual trigger");
        self.handle_fire(*id);
    }

    pub fn armed_keys(&self) -> Vec<String> {
        self.engine.armed_keys()
    }

    pub fn next_fire(&self, id: &ScheduleId) -> Option<chrono::DateTime<chrono::Utc>> {
        self.engine.next_fire(&trigger_key(id))
    }

    fn handle_fire(&self, schedule_id: ScheduleId) {
        let now = self.clock.now_utc();
        if let Err(e) = self.schedules.set_last_run(&schedule_id, now) {
            tracing::warn!(%schedule_id, error = %e, "could not persist last_run_at");
        }

        (self.on_fire)(schedule_id);

        let next = self.engine.next_fire(&trigger_key(&schedule_id));
        if let Err(e) = self.schedules.set_next_run(&schedule_id, next) {
            tracing::warn!(%schedule_id, error = %e, "could not persist next_run_at");
        }
    }
}

fn trigger_key(id: &ScheduleId) -> String {
    format!("schedule_{id}")
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
