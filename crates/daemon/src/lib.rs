// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mrec-daemon: the `mrecd` binary.
//!
//! Loads settings, sets up tracing, takes the per-state-dir daemon lock,
//! runs the orphan sweep, and wires store → worker → runner → scheduler
//! together before arming schedules.

pub mod bootstrap;
pub mod settings;

pub use bootstrap::{run, DaemonError};
pub use settings::Settings;
