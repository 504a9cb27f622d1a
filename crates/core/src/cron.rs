// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five-field cron expressions and the weekday convention conversion.
//!
//! Stored expressions use the POSIX weekday convention (0=Sun..6=Sat).
//! The trigger engine interprets weekdays as 0=Mon..6=Sun, so every armed
//! expression passes through [`convert_cron_weekday`] exactly once. The
//! conversion is a bijection over {0..6} but deliberately not an involution;
//! nothing in the tree parses a stored expression without converting first.

use thiserror::Error;

/// Engine weekday digit → unambiguous day name, index 0=Mon..6=Sun.
///
/// Rendering digits as names when handing an expression to the stepping
/// engine makes the converted convention explicit at the boundary.
pub const ENGINE_WEEKDAY_NAMES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Errors from cron expression handling.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("cron expression must have 5 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field {value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

const FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day-of-month", 1, 31),
    ("month", 1, 12),
    // 7 accepted as an alias for Sunday, as crontabs commonly allow.
    ("day-of-week", 0, 7),
];

/// Validate a five-field cron expression (numeric fields; `*`, lists,
/// ranges, and `/step` supported).
pub fn validate(expression: &str) -> Result<(), CronError> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(CronError::FieldCount(parts.len()));
    }
    for ((name, min, max), part) in FIELDS.into_iter().zip(parts) {
        validate_field(name, part, min, max)?;
    }
    Ok(())
}

fn validate_field(name: &'static str, field: &str, min: u32, max: u32) -> Result<(), CronError> {
    let invalid = |reason: String| CronError::InvalidField {
        field: name,
        value: field.to_string(),
        reason,
    };

    if field.is_empty() {
        return Err(invalid("empty field".to_string()));
    }

    for item in field.split(',') {
        let (body, step) = match item.split_once('/') {
            Some((body, step)) => (body, Some(step)),
            None => (item, None),
        };
        if let Some(step) = step {
            let n: u32 = step
                .parse()
                .map_err(|_| invalid(format!("bad step {step:?}")))?;
            if n == 0 {
                return Err(invalid("step must be positive".to_string()));
            }
        }
        if body == "*" {
            continue;
        }
        let (lo, hi) = match body.split_once('-') {
            Some((lo, hi)) => (lo, Some(hi)),
            None => (body, None),
        };
        let lo: u32 = lo
            .parse()
            .map_err(|_| invalid(format!("bad number {lo:?}")))?;
        if lo < min || lo > max {
            return Err(invalid(format!("{lo} outside {min}..={max}")));
        }
        if let Some(hi) = hi {
            let hi: u32 = hi
                .parse()
                .map_err(|_| invalid(format!("bad number {hi:?}")))?;
            if hi < min || hi > max {
                return Err(invalid(format!("{hi} outside {min}..={max}")));
            }
            if hi < lo {
                return Err(invalid(format!("range {lo}-{hi} is inverted")));
            }
        }
    }
    Ok(())
}

/// Convert the weekday field from POSIX convention (0=Sun..6=Sat) to the
/// engine convention (0=Mon..6=Sun).
///
/// 0 (and its alias 7) map to 6; every other day maps to `n - 1`. Ranges
/// and lists are rewritten digit-run by digit-run; expressions that are not
/// five fields are returned unchanged.
pub fn convert_cron_weekday(expression: &str) -> String {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    let [minute, hour, day, month, weekday] = parts[..] else {
        return expression.to_string();
    };

    let converted = rewrite_digit_runs(weekday, |n| if n == 0 || n == 7 { 6 } else { n - 1 });
    format!("{minute} {hour} {day} {month} {converted}")
}

/// Validate and convert a stored POSIX expression into the engine
/// convention. The only entry point the scheduler and runner use.
pub fn to_engine_expression(expression: &str) -> Result<String, CronError> {
    validate(expression)?;
    Ok(convert_cron_weekday(expression))
}

fn rewrite_digit_runs(field: &str, map: impl Fn(u32) -> u32) -> String {
    let mut out = String::with_capacity(field.len());
    let mut digits = String::new();
    for c in field.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            flush_digits(&mut out, &mut digits, &map);
            out.push(c);
        }
    }
    flush_digits(&mut out, &mut digits, &map);
    out
}

fn flush_digits(out: &mut String, digits: &mut String, map: impl Fn(u32) -> u32) {
    if digits.is_empty() {
        return;
    }
    match digits.parse::<u32>() {
        Ok(n) => out.push_str(&map(n).to_string()),
        Err(_) => out.push_str(digits),
    }
    digits.clear();
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
