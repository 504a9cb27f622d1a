// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mrec-core: domain types for the meeting recorder daemon

pub mod macros;

pub mod clock;
pub mod cron;
pub mod detection;
pub mod id;
pub mod job;
pub mod meeting;
pub mod schedule;
pub mod tz;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use cron::{convert_cron_weekday, to_engine_expression, CronError, ENGINE_WEEKDAY_NAMES};
pub use detection::{DetectionConfig, DetectionResult, DetectorKind};
pub use id::short;
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{
    DiagnosticInfo, EndReason, ErrorCode, Job, JobId, JobStatus, JobTimestamps, RecordingInfo,
};
#[cfg(any(test, feature = "test-support"))]
pub use meeting::MeetingBuilder;
pub use meeting::{Meeting, MeetingId, ProviderKind};
#[cfg(any(test, feature = "test-support"))]
pub use schedule::ScheduleBuilder;
pub use schedule::{AutoDetectMode, DurationMode, Schedule, ScheduleId, ScheduleType};
pub use tz::{ensure_utc, parse_tz};
