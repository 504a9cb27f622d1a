// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifier port: job lifecycle events to the operator.
//!
//! Delivery is best-effort. Failures are logged by the caller and never
//! affect job state.

use async_trait::async_trait;
use mrec_core::Job;
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Adapter for operator notifications over the job lifecycle.
///
/// `recording_started` may return an opaque message id; the engine persists
/// it on the job so later events can update the same message in place.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn recording_started(&self, job: &Job) -> Result<Option<String>, NotifyError>;

    async fn recording_completed(&self, job: &Job) -> Result<(), NotifyError>;

    async fn recording_failed(&self, job: &Job) -> Result<(), NotifyError>;

    async fn recording_canceled(&self, job: &Job) -> Result<(), NotifyError>;

    async fn recording_retrying(
        &self,
        job: &Job,
        attempt: u32,
        next_delay_sec: u64,
        error: &str,
    ) -> Result<(), NotifyError>;

    async fn upload_completed(&self, job: &Job, video_url: &str) -> Result<(), NotifyError>;
}

/// Desktop notification adapter using notify-rust.
///
/// On macOS, `notify-rust` uses `mac-notification-sys` (Cocoa bindings) to
/// send notifications via the Notification Center. The first notification
/// triggers `ensure_application_set()` which runs an AppleScript to look up
/// a bundle identifier. In a daemon context without Automation permissions,
/// that AppleScript blocks forever. We pre-set the bundle identifier at
/// construction time to bypass the lookup entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        #[cfg(target_os = "macos")]
        {
            let _ = mac_notification_sys::set_application("com.apple.Terminal");
        }
        Self
    }

    fn send(&self, title: String, message: String) {
        // notify_rust::Notification::show() is synchronous on macOS.
        // Fire-and-forget on tokio's bounded blocking thread pool to avoid
        // blocking the async runtime while capping OS thread count.
        tokio::task::spawn_blocking(move || {
            match notify_rust::Notification::new().summary(&title).body(&message).show() {
                Ok(_) => tracing::debug!(%title, "desktop notification sent"),
                Err(e) => tracing::warn!(%title, error = %e, "desktop notification failed"),
            }
        });
    }

    fn job_line(job: &Job) -> String {
        format!("{} · {} · {}", job.id, job.provider, job.meeting_code)
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn recording_started(&self, job: &Job) -> Result<Option<String>, NotifyError> {
        self.send("Recording started".to_string(), Self::job_line(job));
        // Desktop notifications cannot be edited in place.
        Ok(None)
    }

    async fn recording_completed(&self, job: &Job) -> Result<(), NotifyError> {
        let detail = match &job.recording {
            Some(info) => format!(
                "{}\n{:.1} MB, {:.0}s",
                Self::job_line(job),
                info.file_size as f64 / 1024.0 / 1024.0,
                info.duration_sec
            ),
            None => Self::job_line(job),
        };
        self.send("Recording completed".to_string(), detail);
        Ok(())
    }

    async fn recording_failed(&self, job: &Job) -> Result<(), NotifyError> {
        let code = job
            .error_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "INTERNAL_ERROR".to_string());
        self.send(
            "Recording failed".to_string(),
            format!("{}\n{}", Self::job_line(job), code),
        );
        Ok(())
    }

    async fn recording_canceled(&self, job: &Job) -> Result<(), NotifyError> {
        self.send("Recording canceled".to_string(), Self::job_line(job));
        Ok(())
    }

    async fn recording_retrying(
        &self,
        job: &Job,
        attempt: u32,
        next_delay_sec: u64,
        error: &str,
    ) -> Result<(), NotifyError> {
        self.send(
            "Recording retrying".to_string(),
            format!(
                "{}\nattempt {} in {}s: {}",
                Self::job_line(job),
                attempt,
                next_delay_sec,
                error
            ),
        );
        Ok(())
    }

    async fn upload_completed(&self, job: &Job, video_url: &str) -> Result<(), NotifyError> {
        self.send(
            "Upload completed".to_string(),
            format!("{}\n{}", Self::job_line(job), video_url),
        );
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{Notifier, NotifyError};
    use async_trait::async_trait;
    use mrec_core::Job;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notification
    #[derive(Debug, Clone, PartialEq)]
    pub enum NotifyCall {
        Started { job_id: String },
        Completed { job_id: String },
        Failed { job_id: String, error_code: Option<String> },
        Canceled { job_id: String },
        Retrying { job_id: String, attempt: u32, next_delay_sec: u64 },
        Uploaded { job_id: String, video_url: String },
    }

    struct FakeNotifierState {
        calls: Vec<NotifyCall>,
        next_message_id: u64,
    }

    /// Fake notifier for testing; hands out sequential message ids.
    #[derive(Clone)]
    pub struct FakeNotifier {
        inner: Arc<Mutex<FakeNotifierState>>,
    }

    impl Default for FakeNotifier {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeNotifierState {
                    calls: Vec::new(),
                    next_message_id: 1,
                })),
            }
        }
    }

    impl FakeNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Get all recorded notifications
        pub fn calls(&self) -> Vec<NotifyCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn recording_started(&self, job: &Job) -> Result<Option<String>, NotifyError> {
            let mut state = self.inner.lock();
            let id = state.next_message_id;
            state.next_message_id += 1;
            state.calls.push(NotifyCall::Started { job_id: job.id.to_string() });
            Ok(Some(format!("msg-{id}")))
        }

        async fn recording_completed(&self, job: &Job) -> Result<(), NotifyError> {
            self.inner
                .lock()
                .calls
                .push(NotifyCall::Completed { job_id: job.id.to_string() });
            Ok(())
        }

        async fn recording_failed(&self, job: &Job) -> Result<(), NotifyError> {
            self.inner.lock().calls.push(NotifyCall::Failed {
                job_id: job.id.to_string(),
                error_code: job.error_code.map(|c| c.to_string()),
            });
            Ok(())
        }

        async fn recording_canceled(&self, job: &Job) -> Result<(), NotifyError> {
            self.inner
                .lock()
                .calls
                .push(NotifyCall::Canceled { job_id: job.id.to_string() });
            Ok(())
        }

        async fn recording_retrying(
            &self,
            job: &Job,
            attempt: u32,
            next_delay_sec: u64,
            _error: &str,
        ) -> Result<(), NotifyError> {
            self.inner.lock().calls.push(NotifyCall::Retrying {
                job_id: job.id.to_string(),
                attempt,
                next_delay_sec,
            });
            Ok(())
        }

        async fn upload_completed(&self, job: &Job, video_url: &str) -> Result<(), NotifyError> {
            self.inner.lock().calls.push(NotifyCall::Uploaded {
                job_id: job.id.to_string(),
                video_url: video_url.to_string(),
            });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifier, NotifyCall};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
