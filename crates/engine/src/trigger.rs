// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process trigger engine.
//!
//! Holds the armed set, computes fire times in the configured zone, and
//! runs the wake loop. Missed fires are coalesced into one, and a fire is
//! still honored late when it lands inside the trigger's misfire grace
//! window, which is what makes catch-up after a restart work.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use mrec_core::{Clock, ScheduleId, ENGINE_WEEKDAY_NAMES};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fallback poll when no trigger is armed.
const IDLE_WAIT: std::time::Duration = std::time::Duration::from_secs(60);

/// How far back a cron expression is scanned for its most recent fire.
fn backscan() -> ChronoDuration {
    ChronoDuration::days(8)
}

/// When an armed trigger fires.
#[derive(Clone)]
pub enum TriggerRule {
    /// Fire once at this instant.
    Once { at: DateTime<Utc> },
    /// Fire on a cron schedule (already in the engine weekday convention).
    Cron { schedule: cron::Schedule },
}

/// Parse a five-field engine-convention expression into a stepping
/// schedule. Weekday digits (0=Mon..6=Sun) are rendered as day names so the
/// stepping engine cannot misread the convention; a seconds field of zero
/// is prepended.
pub fn parse_engine_expression(engine_expr: &str) -> Result<cron::Schedule, String> {
    let parts: Vec<&str> = engine_expr.split_whitespace().collect();
    let [minute, hour, dom, month, dow] = parts[..] else {
        return Err(format!("expected 5 fields, got {}", parts.len()));
    };

    let mut named_dow = String::with_capacity(dow.len() * 3);
    let mut digits = String::new();
    for c in dow.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            flush_day_name(&mut named_dow, &mut digits)?;
            named_dow.push(c);
        }
    }
    flush_day_name(&mut named_dow, &mut digits)?;

    let full = format!("0 {minute} {hour} {dom} {month} {named_dow}");
    cron::Schedule::from_str(&full).map_err(|e| e.to_string())
}

fn flush_day_name(out: &mut String, digits: &mut String) -> Result<(), String> {
    if digits.is_empty() {
        return Ok(());
    }
    let n: usize = digits.parse().map_err(|_| format!("bad weekday {digits:?}"))?;
    let name = ENGINE_WEEKDAY_NAMES
        .get(n)
        .ok_or_else(|| format!("weekday {n} out of range"))?;
    out.push_str(name);
    digits.clear();
    Ok(())
}

struct ArmedTrigger {
    schedule_id: ScheduleId,
    rule: TriggerRule,
    misfire_grace: ChronoDuration,
    next_fire: Option<DateTime<Utc>>,
}

/// Callback invoked on each fire.
pub type FireFn = Arc<dyn Fn(ScheduleId) + Send + Sync>;

/// The armed set plus the wake loop.
pub struct TriggerEngine<C: Clock> {
    clock: C,
    tz: Tz,
    triggers: Arc<Mutex<HashMap<String, ArmedTrigger>>>,
    wake: Arc<tokio::sync::Notify>,
    on_fire: FireFn,
}

impl<C: Clock> TriggerEngine<C> {
    pub fn new(clock: C, tz: Tz, on_fire: FireFn) -> Self {
        Self {
            clock,
            tz,
            triggers: Arc::new(Mutex::new(HashMap::new())),
            wake: Arc::new(tokio::sync::Notify::new()),
            on_fire,
        }
    }

    /// Arm (or re-arm: replace semantics) a trigger. Returns the computed
    /// next fire time.
    ///
    /// For cron rules, a recent fire that was missed (later than
    /// `last_run` but still inside the grace window) becomes the next
    /// fire, so a restart inside the recording window still records.
    pub fn arm(
        &self,
        key: &str,
        schedule_id: ScheduleId,
        rule: TriggerRule,
        misfire_grace: ChronoDuration,
        last_run: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let now = self.clock.now_utc();
        let next_fire = self.initial_fire(&rule, now, misfire_grace, last_run);

        self.triggers.lock().insert(
            key.to_string(),
            ArmedTrigger { schedule_id, rule, misfire_grace, next_fire },
        );
        self.wake.notify_one();
        tracing::info!(key, next_fire = ?next_fire, "trigger armed");
        next_fire
    }

    pub fn disarm(&self, key: &str) -> bool {
        let removed = self.triggers.lock().remove(key).is_some();
        if removed {
            self.wake.notify_one();
            tracing::info!(key, "trigger disarmed");
        }
        removed
    }

    pub fn next_fire(&self, key: &str) -> Option<DateTime<Utc>> {
        self.triggers.lock().get(key).and_then(|t| t.next_fire)
    }

    pub fn armed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.triggers.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn initial_fire(
        &self,
        rule: &TriggerRule,
        now: DateTime<Utc>,
        grace: ChronoDuration,
        last_run: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        match rule {
            TriggerRule::Once { at } => Some(*at),
            TriggerRule::Cron { schedule } => {
                if let Some(missed) = self.most_recent_fire(schedule, now) {
                    let fresh = last_run.map_or(true, |lr| missed > lr);
                    if fresh && now - missed <= grace {
                        return Some(missed);
                    }
                }
                self.next_cron_fire(schedule, now)
            }
        }
    }

    /// Most recent cron fire at or before `now`, found by scanning forward
    /// from a bounded horizon (the stepping engine only iterates forward).
    fn most_recent_fire(
        &self,
        schedule: &cron::Schedule,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let now_tz = now.with_timezone(&self.tz);
        let horizon = now_tz - backscan();
        let mut last = None;
        for fire in schedule.after(&horizon) {
            if fire <= now_tz {
                last = Some(fire);
            } else {
                break;
            }
        }
        last.map(|dt| dt.with_timezone(&Utc))
    }

    fn next_cron_fire(
        &self,
        schedule: &cron::Schedule,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let now_tz = now.with_timezone(&self.tz);
        schedule
            .after(&now_tz)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The wake loop. Runs until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            let now = self.clock.now_utc();
            let due = self.pop_due(now);
            for (key, schedule_id, fired_at, within_grace) in due {
                if within_grace {
                    tracing::info!(key, %schedule_id, "trigger fired");
                    (self.on_fire)(schedule_id);
                } else {
                    tracing::warn!(
                        key,
                        %schedule_id,
                        fired_at = %fired_at,
                        "skipping fire outside misfire grace"
                    );
                }
            }

            let wait = self
                .earliest_fire()
                .map(|at| {
                    let delta = at - self.clock.now_utc();
                    delta.to_std().unwrap_or(std::time::Duration::ZERO)
                })
                .unwrap_or(IDLE_WAIT);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {}
                _ = shutdown.cancelled() => {
                    tracing::debug!("trigger engine stopped");
                    return;
                }
            }
        }
    }

    /// Collect every due trigger, advancing each to its next fire.
    /// Multiple missed cron fires coalesce into the single most recent one.
    fn pop_due(&self, now: DateTime<Utc>) -> Vec<(String, ScheduleId, DateTime<Utc>, bool)> {
        let mut due = Vec::new();
        let mut triggers = self.triggers.lock();
        let mut finished = Vec::new();

        for (key, trigger) in triggers.iter_mut() {
            let Some(fire_at) = trigger.next_fire else {
                continue;
            };
            if fire_at > now {
                continue;
            }
            // Coalesce: any further misses collapse into this one fire.
            let fire_at = match &trigger.rule {
                TriggerRule::Cron { schedule } => {
                    self.most_recent_fire(schedule, now).unwrap_or(fire_at)
                }
                TriggerRule::Once { .. } => fire_at,
            };
            let within_grace = now - fire_at <= trigger.misfire_grace;
            due.push((key.clone(), trigger.schedule_id, fire_at, within_grace));

            match &trigger.rule {
                TriggerRule::Once { .. } => {
                    finished.push(key.clone());
                }
                TriggerRule::Cron { schedule } => {
                    trigger.next_fire = self.next_cron_fire(schedule, now);
                }
            }
        }
        for key in finished {
            triggers.remove(&key);
        }
        due
    }

    fn earliest_fire(&self) -> Option<DateTime<Utc>> {
        self.triggers
            .lock()
            .values()
            .filter_map(|t| t.next_fire)
            .min()
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
