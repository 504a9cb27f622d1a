// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The provider capability set.

use crate::diagnostics;
use async_trait::async_trait;
use mrec_adapters::{BrowserError, PagePort};
use mrec_core::{DiagnosticInfo, ErrorCode, ProviderKind};
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown provider {tag:?} (available: {available})")]
    Unknown { tag: String, available: String },
    #[error(transparent)]
    Browser(#[from] BrowserError),
    /// The vendor page did not look like expected (missing join button,
    /// missing iframe, …).
    #[error("{0}")]
    Protocol(String),
}

/// Who joins the meeting.
#[derive(Debug, Clone, Default)]
pub struct JoinIdentity {
    pub display_name: String,
    pub password: Option<String>,
    /// Guest identity for vendors whose forms ask for it.
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
}

/// Outcome of waiting to enter the meeting.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinResult {
    pub success: bool,
    pub in_lobby: bool,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

impl JoinResult {
    pub fn joined() -> Self {
        Self { success: true, in_lobby: false, error_code: None, error_message: None }
    }

    pub fn lobby() -> Self {
        Self { success: false, in_lobby: true, error_code: None, error_message: None }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            in_lobby: false,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }
}

/// Failure context for the diagnostic bundle.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticContext {
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

/// A meeting platform adapter.
///
/// `wait_until_joined` evaluates every signal class on each poll iteration
/// and resolves them with priority in-meeting > error > lobby. A lobby-only
/// check would block vendors that go straight from prejoin to joined.
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    fn name(&self) -> ProviderKind;

    /// Build the join URL. Pure; vendor config to start muted is included
    /// where the platform supports it.
    fn build_join_url(
        &self,
        meeting_code: &str,
        base_url: Option<&str>,
    ) -> Result<String, ProviderError>;

    /// Fill the landing page: display name, optional password, camera and
    /// microphone off, cookie consent where applicable.
    async fn prejoin(&self, page: &dyn PagePort, identity: &JoinIdentity)
        -> Result<(), ProviderError>;

    /// Activate the join action.
    async fn click_join(&self, page: &dyn PagePort) -> Result<(), ProviderError>;

    /// Handle an in-flow password prompt. Returns whether a prompt was
    /// found and filled.
    async fn apply_password(
        &self,
        _page: &dyn PagePort,
        _password: &str,
    ) -> Result<bool, ProviderError> {
        Ok(false)
    }

    async fn wait_until_joined(
        &self,
        page: &dyn PagePort,
        timeout: Duration,
        password: Option<&str>,
    ) -> Result<JoinResult, ProviderError>;

    /// Block until admitted (true), rejected (false), or timeout (false).
    async fn wait_in_lobby(&self, page: &dyn PagePort, max_wait: Duration) -> bool;

    /// Best-effort layout selection; never fatal.
    async fn set_layout(&self, page: &dyn PagePort, preset: &str) -> bool;

    /// Legacy single-signal end probe, kept as the fixed-duration fallback.
    async fn detect_meeting_end(&self, page: &dyn PagePort) -> bool;

    /// Write the diagnostic bundle. Each artifact is independent; a failed
    /// write is logged and skipped.
    async fn collect_diagnostics(
        &self,
        page: &dyn PagePort,
        dir: &Path,
        context: &DiagnosticContext,
    ) -> DiagnosticInfo {
        diagnostics::collect(self.name(), page, dir, context).await
    }
}

/// Poll-loop interval shared by the vendor join waits.
pub(crate) const JOIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Lobby polls are slower; admission takes human time.
pub(crate) const LOBBY_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
