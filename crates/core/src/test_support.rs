// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proptest strategies shared across crates' tests.

use proptest::prelude::*;

/// A valid five-field POSIX cron expression with an interesting weekday
/// field. Ranges start at Monday or later: a range that crosses Sunday-as-0
/// is rejected by validation after conversion, matching what the trigger
/// engine would refuse to arm.
pub fn posix_weekday_expression() -> impl Strategy<Value = String> {
    let single = (0u32..=6).prop_map(|d| d.to_string());
    let range = (1u32..=6)
        .prop_flat_map(|lo| (Just(lo), lo..=6))
        .prop_map(|(lo, hi)| format!("{lo}-{hi}"));
    let list = proptest::collection::vec(0u32..=6, 2..4)
        .prop_map(|days| days.iter().map(u32::to_string).collect::<Vec<_>>().join(","));
    let weekday = prop_oneof![single, range, list, Just("*".to_string())];

    (0u32..=59, 0u32..=23, weekday)
        .prop_map(|(minute, hour, weekday)| format!("{minute} {hour} * * {weekday}"))
}
