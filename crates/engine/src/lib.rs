// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mrec-engine: worker, runner, and scheduler.
//!
//! The worker executes one recording at a time; the runner serializes all
//! recording work behind the recording lock and fans uploads out under a
//! separate lock; the scheduler arms one-shot and cron triggers and feeds
//! fired schedule ids into the runner. None of these are process globals:
//! the daemon builds them once at startup and wires them together, and the
//! single-flight property comes from the runner's lock alone.

pub mod notifier_task;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod sink;
pub mod trigger;
pub mod worker;

pub use notifier_task::{spawn_notifier_task, NotifyEvent};
pub use retry::is_retryable;
pub use runner::{JobRunner, RunImmediateParams};
pub use scheduler::{Scheduler, SchedulerError};
pub use sink::StoreDetectionSink;
pub use trigger::{TriggerEngine, TriggerRule};
pub use worker::{RecordingResult, RecordingWorker, WorkerSettings};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use mrec_core::Clock;
    use std::time::Instant;

    /// Clock that follows tokio's (possibly paused and auto-advanced)
    /// virtual time, so timestamps and elapsed measurements line up with
    /// `tokio::time::sleep` in tests.
    #[derive(Clone)]
    pub struct TokioClock {
        base_std: Instant,
        base_tokio: tokio::time::Instant,
        base_epoch_ms: u64,
    }

    impl TokioClock {
        /// Anchor at the current tokio instant and the given epoch.
        pub fn at_epoch_ms(base_epoch_ms: u64) -> Self {
            Self {
                base_std: Instant::now(),
                base_tokio: tokio::time::Instant::now(),
                base_epoch_ms,
            }
        }

        pub fn at_utc(base: chrono::DateTime<chrono::Utc>) -> Self {
            Self::at_epoch_ms(base.timestamp_millis().max(0) as u64)
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> Instant {
            self.base_std + self.base_tokio.elapsed()
        }

        fn epoch_ms(&self) -> u64 {
            self.base_epoch_ms + self.base_tokio.elapsed().as_millis() as u64
        }
    }
}
