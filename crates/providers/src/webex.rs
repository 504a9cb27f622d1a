// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webex adapter.
//!
//! The web client renders inside the `#unified-webclient-iframe` iframe;
//! every in-meeting interaction routes through that content frame.

use crate::provider::{
    JoinIdentity, JoinResult, MeetingProvider, ProviderError, JOIN_POLL_INTERVAL,
    LOBBY_POLL_INTERVAL,
};
use async_trait::async_trait;
use mrec_adapters::{PagePort, BrowserError};
use mrec_core::{ErrorCode, ProviderKind};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://webex.com/";
const CLIENT_IFRAME: &str = "#unified-webclient-iframe";

const IN_MEETING_SELECTORS: [&str; 4] = [
    "[data-test=\"participants-toggle-button\"]",
    "[data-test=\"meeting-info-container\"]",
    "[data-test=\"leave-button\"]",
    "[class*=\"meeting-container\"]",
];

const LOBBY_TEXTS: [&str; 5] = [
    "Waiting for host",
    "等待主持人",
    "waiting room",
    "Let you in",
    "allow you to join",
];

const ERROR_TEXTS: [(&str, ErrorCode, &str); 6] = [
    ("Meeting not found", ErrorCode::MeetingNotFound, "meeting not found"),
    ("Invalid meeting", ErrorCode::MeetingNotFound, "invalid meeting"),
    ("Meeting has ended", ErrorCode::MeetingEnded, "meeting has ended"),
    ("會議已結束", ErrorCode::MeetingEnded, "meeting has ended"),
    ("Incorrect password", ErrorCode::PasswordIncorrect, "wrong password"),
    ("meeting is locked", ErrorCode::JoinFailed, "meeting is locked"),
];

const END_TEXTS: [&str; 4] = [
    "Meeting has ended",
    "會議已結束",
    "The host ended the meeting",
    "You have left the meeting",
];

#[derive(Debug)]
pub struct WebexProvider;

impl WebexProvider {
    async fn client_frame(
        &self,
        page: &dyn PagePort,
    ) -> Result<Arc<dyn PagePort>, ProviderError> {
        if page.count(CLIENT_IFRAME).await? == 0 {
            return Err(ProviderError::Protocol("webex iframe not found".to_string()));
        }
        Ok(page.in_frame(CLIENT_IFRAME).await?)
    }

    async fn in_meeting(&self, frame: &dyn PagePort) -> Result<bool, BrowserError> {
        for selector in IN_MEETING_SELECTORS {
            if frame.count(selector).await? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl MeetingProvider for WebexProvider {
    fn name(&self) -> ProviderKind {
        ProviderKind::Webex
    }

    /// Full URLs pass through; meeting numbers use the MTID join endpoint;
    /// anything else is treated as a Personal Room name.
    fn build_join_url(
        &self,
        meeting_code: &str,
        base_url: Option<&str>,
    ) -> Result<String, ProviderError> {
        if meeting_code.starts_with("http") {
            return Ok(meeting_code.to_string());
        }
        let mut base = base_url.unwrap_or(DEFAULT_BASE_URL).to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        if meeting_code.chars().all(|c| c.is_ascii_digit()) {
            Ok(format!("{base}meet/j.php?MTID={meeting_code}"))
        } else {
            Ok(format!("{base}meet/{meeting_code}"))
        }
    }

    async fn prejoin(
        &self,
        page: &dyn PagePort,
        identity: &JoinIdentity,
    ) -> Result<(), ProviderError> {
        tracing::info!(display_name = %identity.display_name, "handling webex prejoin");
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Cookie consent lives on the outer page.
        if page.count("#onetrust-accept-btn-handler").await.unwrap_or(0) > 0 {
            let _ = page.click("#onetrust-accept-btn-handler").await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        // "Join from this browser" choice, skipped when cookies remember it.
        let mut join_clicked = false;
        for selector in ["[data-test=\"join-browser-button\"]", "a[href*=\"launch=browser\"]"] {
            if page.count(selector).await.unwrap_or(0) > 0 && page.click(selector).await.is_ok() {
                tracing::info!("chose join from browser");
                join_clicked = true;
                tokio::time::sleep(Duration::from_secs(2)).await;
                break;
            }
        }
        if !join_clicked {
            tracing::debug!("no join-from-browser choice, assuming prejoin page");
        }

        // From here on everything happens inside the client iframe.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        while page.count(CLIENT_IFRAME).await? == 0 {
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Protocol("webex iframe not found".to_string()));
            }
            tokio::time::sleep(JOIN_POLL_INTERVAL).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        let frame = self.client_frame(page).await?;

        // Dismiss the media permission dialogs if they came up.
        for selector in ["[data-test=\"close-dialog-button\"]", "[aria-label=\"Close dialog\"]"] {
            if frame.count(selector).await.unwrap_or(0) > 0 {
                let _ = frame.click(selector).await;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        // The vendor UI forces video on by default; click it off.
        for selector in ["[data-test=\"video-button\"]", "[aria-label*=\"Stop video\" i]"] {
            if frame.count(selector).await.unwrap_or(0) > 0 {
                let _ = frame.click(selector).await;
                tracing::debug!(selector, "video toggled off");
                break;
            }
        }
        for selector in ["[data-test=\"audio-button\"]", "[aria-label*=\"Mute\" i]"] {
            if frame.count(selector).await.unwrap_or(0) > 0 {
                let _ = frame.click(selector).await;
                tracing::debug!(selector, "microphone toggled off");
                break;
            }
        }

        // Guest identity: name, and email when the form asks for it.
        let name = identity
            .guest_name
            .as_deref()
            .unwrap_or(&identity.display_name);
        let mut name_filled = false;
        for selector in [
            "[data-test=\"guest-name-input\"]",
            "input[placeholder*=\"name\" i]",
            "input[type=\"text\"]",
        ] {
            if frame.count(selector).await? > 0 {
                frame.fill(selector, name).await?;
                name_filled = true;
                break;
            }
        }
        if !name_filled {
            tracing::warn!("could not find guest name input");
        }

        if let Some(email) = identity.guest_email.as_deref() {
            for selector in ["input[type=\"email\"]", "input[placeholder*=\"email\" i]"] {
                if frame.count(selector).await? > 0 {
                    frame.fill(selector, email).await?;
                    tracing::debug!("guest email filled");
                    break;
                }
            }
        }

        if let Some(password) = &identity.password {
            if frame.count("input[type=\"password\"]").await? > 0 {
                frame.fill("input[type=\"password\"]", password).await?;
            }
        }
        Ok(())
    }

    async fn click_join(&self, page: &dyn PagePort) -> Result<(), ProviderError> {
        if let Ok(frame) = self.client_frame(page).await {
            for selector in ["[data-test=\"join-button\"]", "button[type=\"submit\"]"] {
                if frame.count(selector).await? > 0 {
                    frame.click(selector).await?;
                    tracing::debug!(selector, "clicked webex join");
                    return Ok(());
                }
            }
        }
        // Fallback to the outer page.
        for selector in ["button[type=\"submit\"]", "[data-test=\"join-button\"]"] {
            if page.count(selector).await? > 0 {
                page.click(selector).await?;
                return Ok(());
            }
        }
        Err(ProviderError::Protocol("could not find webex join button".to_string()))
    }

    async fn apply_password(
        &self,
        page: &dyn PagePort,
        password: &str,
    ) -> Result<bool, ProviderError> {
        tokio::time::sleep(Duration::from_secs(1)).await;

        if let Ok(frame) = self.client_frame(page).await {
            for selector in ["input[type=\"password\"]", "input[placeholder*=\"password\" i]"] {
                if frame.count(selector).await? > 0 {
                    frame.fill(selector, password).await?;
                    if frame.count("[data-test=\"submit-button\"]").await? > 0 {
                        frame.click("[data-test=\"submit-button\"]").await?;
                    } else {
                        frame.press(selector, "Enter").await?;
                    }
                    tracing::info!("webex password submitted");
                    return Ok(true);
                }
            }
        }
        if page.count("input[type=\"password\"]").await? > 0 {
            page.fill("input[type=\"password\"]", password).await?;
            page.press("input[type=\"password\"]", "Enter").await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn wait_until_joined(
        &self,
        page: &dyn PagePort,
        timeout: Duration,
        password: Option<&str>,
    ) -> Result<JoinResult, ProviderError> {
        tracing::info!(timeout_sec = timeout.as_secs(), "waiting to join webex meeting");
        let deadline = tokio::time::Instant::now() + timeout;
        let mut password_attempted = false;

        while tokio::time::Instant::now() < deadline {
            if let Ok(frame) = self.client_frame(page).await {
                if self.in_meeting(frame.as_ref()).await? {
                    tracing::info!("joined webex meeting");
                    return Ok(JoinResult::joined());
                }

                if let (Some(password), false) = (password, password_attempted) {
                    if frame.count("input[type=\"password\"]").await? > 0
                        && self.apply_password(page, password).await?
                    {
                        password_attempted = true;
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        continue;
                    }
                }

                for (text, code, message) in ERROR_TEXTS {
                    if frame.contains_text(text).await? {
                        tracing::warn!(%message, "webex join error");
                        return Ok(JoinResult::error(code, message));
                    }
                }

                let mut in_lobby = frame.count("[data-test=\"lobby-container\"]").await? > 0;
                for text in LOBBY_TEXTS {
                    if in_lobby {
                        break;
                    }
                    in_lobby = frame.contains_text(text).await?;
                }
                if in_lobby {
                    tracing::info!("webex lobby detected");
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
        tracing::info!(max_wait_sec = max_wait.as_secs(), "waiting in webex lobby");
        let deadline = tokio::time::Instant::now() + max_wait;

        while tokio::time::Instant::now() < deadline {
            if let Ok(frame) = self.client_frame(page).await {
                match self.in_meeting(frame.as_ref()).await {
                    Ok(true) => {
                        tracing::info!("admitted from webex lobby");
                        return true;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "webex lobby poll failed");
                        return false;
                    }
                }
                for text in ["You can't join", "removed you", "declined"] {
                    if frame.contains_text(text).await.unwrap_or(false) {
                        tracing::warn!("rejected from webex lobby");
                        return false;
                    }
                }
            }
            tokio::time::sleep(LOBBY_POLL_INTERVAL).await;
        }

        tracing::warn!("webex lobby timeout");
        false
    }

    async fn set_layout(&self, page: &dyn PagePort, preset: &str) -> bool {
        let Ok(frame) = self.client_frame(page).await else {
            return false;
        };
        if frame.count("[data-test=\"layout-button\"]").await.unwrap_or(0) == 0 {
            return false;
        }
        if frame.click("[data-test=\"layout-button\"]").await.is_err() {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        let option = match preset {
            "grid" => "[data-test=\"layout-grid\"]",
            _ => "[data-test=\"layout-stage\"]",
        };
        let ok = frame.click(option).await.is_ok();
        // Close the menu either way.
        let _ = frame.press("body", "Escape").await;
        ok
    }

    async fn detect_meeting_end(&self, page: &dyn PagePort) -> bool {
        let Ok(frame) = self.client_frame(page).await else {
            // Iframe gone usually means the client navigated away.
            return true;
        };
        for text in END_TEXTS {
            if frame.contains_text(text).await.unwrap_or(false) {
                tracing::info!(%text, "webex end text detected");
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "webex_tests.rs"]
mod tests;
