// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule rows: firing rules attached to a meeting.

use crate::meeting::Meeting;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a schedule.
    pub struct ScheduleId("sch-");
}

/// When a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    /// Fire once at `start_time` (minus the early-join offset).
    Once,
    /// Fire on a five-field cron expression (POSIX weekday convention).
    Cron,
}

crate::simple_display! {
    ScheduleType {
        Once => "once",
        Cron => "cron",
    }
}

/// How the recording window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationMode {
    /// Record for `duration_sec`, bounded by the meeting-end deadline.
    Fixed,
    /// Record until the detection ensemble votes the meeting over.
    Auto,
}

crate::simple_display! {
    DurationMode {
        Fixed => "fixed",
        Auto => "auto",
    }
}

/// When auto end-detection starts voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoDetectMode {
    Immediate,
    AfterMin,
}

crate::simple_display! {
    AutoDetectMode {
        Immediate => "immediate",
        AfterMin => "after_min",
    }
}

/// A firing rule attached to a [`Meeting`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub meeting_id: crate::meeting::MeetingId,

    pub schedule_type: ScheduleType,
    /// One-shot start instant (UTC). Required for `once`.
    pub start_time: Option<DateTime<Utc>>,
    /// Five-field cron expression in POSIX weekday convention (0=Sun).
    /// Required for `cron`.
    pub cron_expression: Option<String>,

    pub duration_sec: u64,
    pub duration_mode: DurationMode,
    pub auto_detect_mode: Option<AutoDetectMode>,
    /// Minimum recording time before end detection may stop the run.
    /// `None` means use `duration_sec`.
    pub min_duration_sec: Option<u64>,
    /// Screen-freeze confirmation window used in auto mode.
    pub stillness_timeout_sec: u64,
    /// Join this many seconds before `start_time`.
    pub early_join_sec: u64,
    pub lobby_wait_sec: u64,
    pub resolution_w: u32,
    pub resolution_h: u32,
    pub layout_preset: String,
    /// Detection logs results but never stops the recording.
    pub dry_run: bool,

    pub upload_enabled: bool,
    pub upload_privacy: String,

    pub override_meeting_code: Option<String>,
    pub override_display_name: Option<String>,
    pub override_guest_name: Option<String>,
    pub override_guest_email: Option<String>,

    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Meeting code to join: the per-schedule override, else the meeting's.
    pub fn effective_meeting_code<'a>(&'a self, meeting: &'a Meeting) -> &'a str {
        self.override_meeting_code.as_deref().unwrap_or(&meeting.meeting_code)
    }

    /// Display name to use: the per-schedule override, else the meeting's.
    pub fn effective_display_name<'a>(&'a self, meeting: &'a Meeting) -> &'a str {
        self.override_display_name
            .as_deref()
            .unwrap_or(&meeting.default_display_name)
    }

    pub fn effective_guest_name<'a>(&'a self, meeting: &'a Meeting) -> Option<&'a str> {
        self.override_guest_name
            .as_deref()
            .or(meeting.default_guest_name.as_deref())
    }

    pub fn effective_guest_email<'a>(&'a self, meeting: &'a Meeting) -> Option<&'a str> {
        self.override_guest_email
            .as_deref()
            .or(meeting.default_guest_email.as_deref())
    }
}

crate::builder! {
    pub struct ScheduleBuilder => Schedule {
        into {
            layout_preset: String = "speaker",
            upload_privacy: String = "unlisted",
        }
        set {
            schedule_type: ScheduleType = ScheduleType::Once,
            duration_sec: u64 = 4200,
            duration_mode: DurationMode = DurationMode::Fixed,
            stillness_timeout_sec: u64 = 180,
            early_join_sec: u64 = 30,
            lobby_wait_sec: u64 = 900,
            resolution_w: u32 = 1920,
            resolution_h: u32 = 1080,
            dry_run: bool = false,
            upload_enabled: bool = false,
            enabled: bool = true,
            meeting_id: crate::meeting::MeetingId = crate::meeting::MeetingId::new_random(),
        }
        option {
            start_time: DateTime<Utc> = None,
            cron_expression: String = None,
            auto_detect_mode: AutoDetectMode = None,
            min_duration_sec: u64 = None,
            override_meeting_code: String = None,
            override_display_name: String = None,
            override_guest_name: String = None,
            override_guest_email: String = None,
            last_run_at: DateTime<Utc> = None,
            next_run_at: DateTime<Utc> = None,
        }
        computed {
            id: ScheduleId = ScheduleId::new_random(),
            created_at: DateTime<Utc> = Utc::now(),
            updated_at: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
