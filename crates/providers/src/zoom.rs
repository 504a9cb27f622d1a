// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Zoom adapter (guest join via the web client).
//!
//! Zoom pushes the desktop app by default; appending `zc=0` to the query
//! forces the browser client.

use crate::provider::{
    JoinIdentity, JoinResult, MeetingProvider, ProviderError, JOIN_POLL_INTERVAL,
    LOBBY_POLL_INTERVAL,
};
use async_trait::async_trait;
use mrec_adapters::PagePort;
use mrec_core::{ErrorCode, ProviderKind};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://zoom.us";

const IN_MEETING_SELECTORS: [&str; 3] = [
    ".meeting-app",
    "[aria-label*=\"leave\" i]",
    "#wc-footer",
];

const NAME_SELECTORS: [&str; 3] = [
    "#input-for-name",
    "input[placeholder*=\"name\" i]",
    "input[type=\"text\"]",
];

const LOBBY_TEXTS: [&str; 3] = [
    "Please wait, the meeting host will let you in soon",
    "Waiting for the host to start this meeting",
    "請稍候，會議主持人馬上讓您加入",
];

const ERROR_TEXTS: [(&str, ErrorCode, &str); 5] = [
    ("This meeting ID is not valid", ErrorCode::MeetingNotFound, "meeting not found"),
    ("Invalid meeting ID", ErrorCode::MeetingNotFound, "meeting not found"),
    ("This meeting has ended", ErrorCode::MeetingEnded, "meeting has ended"),
    ("Passcode wrong", ErrorCode::PasswordIncorrect, "wrong passcode"),
    ("Enter meeting passcode", ErrorCode::PasswordRequired, "passcode required"),
];

const END_TEXTS: [&str; 4] = [
    "This meeting has been ended by host",
    "You have been removed",
    "The meeting has ended",
    "會議已結束",
];

#[derive(Debug)]
pub struct ZoomProvider;

#[async_trait]
impl MeetingProvider for ZoomProvider {
    fn name(&self) -> ProviderKind {
        ProviderKind::Zoom
    }

    /// Full URLs get `zc=0` appended to their query; meeting ids map to
    /// `/j/<id>?zc=0` with spaces and dashes stripped from numeric ids.
    fn build_join_url(
        &self,
        meeting_code: &str,
        base_url: Option<&str>,
    ) -> Result<String, ProviderError> {
        if meeting_code.starts_with("http://") || meeting_code.starts_with("https://") {
            let separator = if meeting_code.contains('?') { '&' } else { '?' };
            return Ok(format!("{meeting_code}{separator}zc=0"));
        }

        let mut base = base_url.unwrap_or(DEFAULT_BASE_URL).to_string();
        while base.ends_with('/') {
            base.pop();
        }

        let compact: String = meeting_code
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();
        if compact.chars().all(|c| c.is_ascii_digit()) && !compact.is_empty() {
            Ok(format!("{base}/j/{compact}?zc=0"))
        } else {
            Ok(format!("{base}/j/{meeting_code}?zc=0"))
        }
    }

    async fn prejoin(
        &self,
        page: &dyn PagePort,
        identity: &JoinIdentity,
    ) -> Result<(), ProviderError> {
        tracing::info!(display_name = %identity.display_name, "handling zoom prejoin");
        tokio::time::sleep(Duration::from_secs(3)).await;

        // Cookie banner.
        if page.count("#onetrust-accept-btn-handler").await.unwrap_or(0) > 0 {
            let _ = page.click("#onetrust-accept-btn-handler").await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        // The interstitial still offers the app; pick the browser link.
        for selector in ["a[href*=\"/wc/\"]", "a.mbTuto", "[role=\"button\"][aria-label*=\"browser\" i]"] {
            if page.count(selector).await.unwrap_or(0) > 0 {
                let _ = page.click(selector).await;
                tracing::info!("chose join from browser");
                tokio::time::sleep(Duration::from_secs(2)).await;
                break;
            }
        }

        let mut name_filled = false;
        for selector in NAME_SELECTORS {
            if page.count(selector).await? > 0 {
                page.fill(selector, &identity.display_name).await?;
                tracing::debug!(selector, "display name filled");
                name_filled = true;
                break;
            }
        }
        if !name_filled {
            tracing::warn!("could not find zoom name input");
        }

        if let Some(password) = &identity.password {
            for selector in ["#input-for-pwd", "input[type=\"password\"]"] {
                if page.count(selector).await? > 0 {
                    page.fill(selector, password).await?;
                    tracing::debug!("passcode filled");
                    break;
                }
            }
        }

        // Make sure both media toggles are off before joining.
        for selector in ["#preview-video-control-button[aria-label*=\"Stop\" i]", "[aria-label*=\"Stop Video\" i]"] {
            if page.count(selector).await.unwrap_or(0) > 0 {
                let _ = page.click(selector).await;
                break;
            }
        }
        for selector in ["[aria-label*=\"Mute\" i]:not([aria-label*=\"Unmute\" i])"] {
            if page.count(selector).await.unwrap_or(0) > 0 {
                let _ = page.click(selector).await;
                break;
            }
        }
        Ok(())
    }

    async fn click_join(&self, page: &dyn PagePort) -> Result<(), ProviderError> {
        for selector in [
            "button.preview-join-button",
            "#joinBtn",
            "button[type=\"submit\"]",
        ] {
            if page.count(selector).await? > 0 {
                page.click(selector).await?;
                tracing::debug!(selector, "clicked zoom join");
                return Ok(());
            }
        }
        Err(ProviderError::Protocol("could not find zoom join button".to_string()))
    }

    async fn apply_password(
        &self,
        page: &dyn PagePort,
        password: &str,
    ) -> Result<bool, ProviderError> {
        tokio::time::sleep(Duration::from_secs(1)).await;

        for selector in ["#input-for-pwd", "input[type=\"password\"]"] {
            if page.count(selector).await? > 0 {
                page.fill(selector, password).await?;
                if page.count("#joinBtn").await? > 0 {
                    page.click("#joinBtn").await?;
                } else {
                    page.press(selector, "Enter").await?;
                }
                tracing::info!("zoom passcode submitted");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn wait_until_joined(
        &self,
        page: &dyn PagePort,
        timeout: Duration,
        password: Option<&str>,
    ) -> Result<JoinResult, ProviderError> {
        tracing::info!(timeout_sec = timeout.as_secs(), "waiting to join zoom meeting");
        let deadline = tokio::time::Instant::now() + timeout;
        let mut password_attempted = false;

        while tokio::time::Instant::now() < deadline {
            for selector in IN_MEETING_SELECTORS {
                if page.count(selector).await? > 0 {
                    tracing::info!("joined zoom meeting");
                    return Ok(JoinResult::joined());
                }
            }

            if let (Some(password), false) = (password, password_attempted) {
                if page.count("#input-for-pwd").await? > 0
                    && self.apply_password(page, password).await?
                {
                    password_attempted = true;
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            }

            for (text, code, message) in ERROR_TEXTS {
                // A passcode form we have already answered is not an error.
                if code == ErrorCode::PasswordRequired && (password_attempted || password.is_some())
                {
                    continue;
                }
                if page.contains_text(text).await? {
                    tracing::warn!(%message, "zoom join error");
                    return Ok(JoinResult::error(code, message));
                }
            }

            for text in LOBBY_TEXTS {
                if page.contains_text(text).await? {
                    tracing::info!("zoom waiting room detected");
                    return Ok(JoinResult::lobby());
                }
            }

            tokio::time::sleep(JOIN_POLL_INTERVAL).await;
        }

        Ok(JoinResult::error(
            ErrorCode::JoinTimeout,
            format!("timeout after {}s", timeout.as_secs()),
        ))
    }

    async fn wait_in_lobby(&self, page: &dyn PagePort, max_wait: Duration) -> bool {
        tracing::info!(max_wait_sec = max_wait.as_secs(), "waiting in zoom waiting room");
        let deadline = tokio::time::Instant::now() + max_wait;

        while tokio::time::Instant::now() < deadline {
            for selector in IN_MEETING_SELECTORS {
                if page.count(selector).await.unwrap_or(0) > 0 {
                    tracing::info!("admitted from zoom waiting room");
                    return true;
                }
            }
            for text in ["removed", "declined", "host has removed you"] {
                if page.contains_text(text).await.unwrap_or(false) {
                    tracing::warn!("rejected from zoom waiting room");
                    return false;
                }
            }
            tokio::time::sleep(LOBBY_POLL_INTERVAL).await;
        }

        tracing::warn!("zoom waiting room timeout");
        false
    }

    async fn set_layout(&self, page: &dyn PagePort, preset: &str) -> bool {
        if page.count("[aria-label*=\"View\" i]").await.unwrap_or(0) == 0 {
            return false;
        }
        if page.click("[aria-label*=\"View\" i]").await.is_err() {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        let option = match preset {
            "grid" => "[aria-label*=\"Gallery\" i]",
            _ => "[aria-label*=\"Speaker\" i]",
        };
        page.click(option).await.is_ok()
    }

    async fn detect_meeting_end(&self, page: &dyn PagePort) -> bool {
        for text in END_TEXTS {
            if page.contains_text(text).await.unwrap_or(false) {
                tracing::info!(%text, "zoom end text detected");
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "zoom_tests.rs"]
mod tests;
