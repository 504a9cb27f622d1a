// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::meeting::Meeting;

#[test]
fn effective_fields_fall_back_to_meeting() {
    let meeting = Meeting::builder()
        .meeting_code("room-a")
        .default_display_name("Bot")
        .default_guest_name("Guest")
        .build();
    let schedule = Schedule::builder().build();

    assert_eq!(schedule.effective_meeting_code(&meeting), "room-a");
    assert_eq!(schedule.effective_display_name(&meeting), "Bot");
    assert_eq!(schedule.effective_guest_name(&meeting), Some("Guest"));
    assert_eq!(schedule.effective_guest_email(&meeting), None);
}

#[test]
fn overrides_win_over_meeting_defaults() {
    let meeting = Meeting::builder().meeting_code("room-a").build();
    let schedule = Schedule::builder()
        .override_meeting_code("room-b")
        .override_display_name("Override Bot")
        .build();

    assert_eq!(schedule.effective_meeting_code(&meeting), "room-b");
    assert_eq!(schedule.effective_display_name(&meeting), "Override Bot");
}

#[test]
fn builder_defaults_match_model() {
    let schedule = Schedule::builder().build();
    assert_eq!(schedule.schedule_type, ScheduleType::Once);
    assert_eq!(schedule.duration_sec, 4200);
    assert_eq!(schedule.duration_mode, DurationMode::Fixed);
    assert_eq!(schedule.early_join_sec, 30);
    assert_eq!(schedule.lobby_wait_sec, 900);
    assert!(schedule.enabled);
    assert!(!schedule.dry_run);
}

#[yare::parameterized(
    once = { ScheduleType::Once, "once" },
    cron = { ScheduleType::Cron, "cron" },
)]
fn schedule_type_display(ty: ScheduleType, expected: &str) {
    assert_eq!(ty.to_string(), expected);
}

#[yare::parameterized(
    immediate = { AutoDetectMode::Immediate, "\"immediate\"" },
    after_min = { AutoDetectMode::AfterMin, "\"after_min\"" },
)]
fn auto_detect_mode_serde(mode: AutoDetectMode, json: &str) {
    assert_eq!(serde_json::to_string(&mode).unwrap(), json);
    let parsed: AutoDetectMode = serde_json::from_str(json).unwrap();
    assert_eq!(parsed, mode);
}
