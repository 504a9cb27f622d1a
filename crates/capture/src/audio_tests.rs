// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    typical   = { "Volume: front-left: 65536 / 100% / 0.00 dB", Some(1.0) },
    quiet     = { "Volume: front-left: 3277 / 5% / -78.00 dB", Some(0.05) },
    zero      = { "Volume: mono: 0 / 0%", Some(0.0) },
    no_figure = { "Volume: mono: 0", None },
    empty     = { "", None },
)]
fn volume_percent_parsing(output: &str, expected: Option<f64>) {
    assert_eq!(parse_volume_percent(output), expected);
}

#[test]
fn percent_is_normalized_to_unit_range() {
    let level = parse_volume_percent("Volume: front-left: 42000 / 64% / -11.7 dB").unwrap();
    assert!((level - 0.64).abs() < f64::EPSILON);
}
