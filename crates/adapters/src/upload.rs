// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uploader port: ship a finished artifact to the hosting service.
//!
//! The OAuth flow and chunked transfer live outside the core; this port
//! takes a path and metadata and returns the hosted video's identity.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from upload operations.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("uploader not configured")]
    NotConfigured,
    #[error("uploader not authorized")]
    NotAuthorized,
    #[error("upload failed: {0}")]
    Failed(String),
}

/// Metadata attached to the hosted video.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    /// Privacy tag, e.g. "public" | "private" | "unlisted".
    pub privacy: String,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub video_id: String,
    pub video_url: String,
}

/// Progress callback: (bytes uploaded, total bytes).
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Adapter for the video hosting service.
#[async_trait]
pub trait Uploader: Send + Sync + 'static {
    /// Whether credentials are present at all. Unconfigured uploaders are
    /// skipped silently so recording never depends on hosting setup.
    fn is_configured(&self) -> bool;

    async fn upload(
        &self,
        path: &Path,
        metadata: UploadMetadata,
        progress: Option<ProgressFn>,
    ) -> Result<UploadOutcome, UploadError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Recorded upload call.
    #[derive(Debug, Clone, PartialEq)]
    pub struct UploadCall {
        pub path: PathBuf,
        pub metadata: UploadMetadata,
    }

    struct FakeUploaderState {
        calls: Vec<UploadCall>,
        next_id: u64,
        fail_with: Option<String>,
    }

    /// Fake uploader handing out sequential video ids.
    #[derive(Clone)]
    pub struct FakeUploader {
        inner: Arc<Mutex<FakeUploaderState>>,
        configured: bool,
    }

    impl Default for FakeUploader {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeUploaderState {
                    calls: Vec::new(),
                    next_id: 1,
                    fail_with: None,
                })),
                configured: true,
            }
        }
    }

    impl FakeUploader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn unconfigured() -> Self {
            Self { configured: false, ..Self::default() }
        }

        pub fn failing(message: impl Into<String>) -> Self {
            let uploader = Self::default();
            uploader.inner.lock().fail_with = Some(message.into());
            uploader
        }

        pub fn calls(&self) -> Vec<UploadCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn upload(
            &self,
            path: &Path,
            metadata: UploadMetadata,
            progress: Option<super::ProgressFn>,
        ) -> Result<UploadOutcome, UploadError> {
            let mut state = self.inner.lock();
            if let Some(msg) = &state.fail_with {
                return Err(UploadError::Failed(msg.clone()));
            }
            state.calls.push(UploadCall {
                path: path.to_path_buf(),
                metadata,
            });
            if let Some(progress) = progress {
                progress(512, 1024);
                progress(1024, 1024);
            }
            let id = state.next_id;
            state.next_id += 1;
            Ok(UploadOutcome {
                video_id: format!("vid-{id}"),
                video_url: format!("https://video.example.test/watch?v=vid-{id}"),
            })
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeUploader, UploadCall};

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
