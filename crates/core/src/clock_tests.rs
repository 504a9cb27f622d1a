// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

#[test]
fn system_clock_advances() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
    assert!(clock.epoch_ms() > 0);
}

#[test]
fn fake_clock_advance_moves_both_views() {
    let clock = FakeClock::new();
    let start_instant = clock.now();
    let start_ms = clock.epoch_ms();

    clock.advance(Duration::from_secs(90));

    assert_eq!(clock.now() - start_instant, Duration::from_secs(90));
    assert_eq!(clock.epoch_ms() - start_ms, 90_000);
}

#[test]
fn now_utc_tracks_epoch_ms() {
    let clock = FakeClock::new();
    let dt = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
    clock.set_utc(dt);
    assert_eq!(clock.now_utc(), dt);
    assert_eq!(clock.epoch_ms(), dt.timestamp_millis() as u64);
}

#[test]
fn set_epoch_ms_overrides() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42_000);
    assert_eq!(clock.epoch_ms(), 42_000);
    assert_eq!(clock.now_utc().timestamp(), 42);
}
