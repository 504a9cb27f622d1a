// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::NaiveDate;

#[test]
fn parses_known_zones() {
    assert!(parse_tz("Asia/Taipei").is_ok());
    assert!(parse_tz("UTC").is_ok());
    assert!(parse_tz("America/New_York").is_ok());
}

#[test]
fn unknown_zone_returns_the_name() {
    assert_eq!(parse_tz("Mars/Olympus").unwrap_err(), "Mars/Olympus");
}

#[test]
fn ensure_utc_attaches_utc_offset() {
    let naive = NaiveDate::from_ymd_opt(2025, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    let utc = ensure_utc(naive);
    assert_eq!(utc.naive_utc(), naive);
    assert_eq!(utc.timezone(), Utc);
}
