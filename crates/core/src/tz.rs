// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timezone handling.
//!
//! The daemon persists UTC everywhere; the configured zone is used only to
//! interpret cron expressions and schedule windows.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone name. Returns `Err` with the offending name so the
/// caller can log the fallback-to-UTC warning.
pub fn parse_tz(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>().map_err(|_| name.to_string())
}

/// Interpret a naive datetime (stored without offset) as UTC.
pub fn ensure_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

#[cfg(test)]
#[path = "tz_tests.rs"]
mod tests;
