// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jitsi Meet adapter.

use crate::provider::{
    JoinIdentity, JoinResult, MeetingProvider, ProviderError, JOIN_POLL_INTERVAL,
    LOBBY_POLL_INTERVAL,
};
use async_trait::async_trait;
use mrec_adapters::PagePort;
use mrec_core::{ErrorCode, ProviderKind};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://meet.jit.si/";

/// Conference container present once we are in the meeting.
const IN_MEETING: &str = "#largeVideoContainer, .videocontainer";
const JOIN_BUTTON: &str = "[data-testid=\"prejoin.joinMeeting\"]";

const NAME_SELECTORS: [&str; 3] = [
    "input[data-testid=\"prejoin.input\"]",
    "input[placeholder*=\"name\" i]",
    "input[placeholder*=\"Enter your name\" i]",
];

const ALT_JOIN_SELECTORS: [&str; 2] = ["button[aria-label*=\"Join\" i]", "button[type=\"submit\"]"];

const LOBBY_TEXTS: [&str; 3] = [
    "Waiting for the host",
    "等待主持人",
    "You are in the waiting room",
];

const END_TEXTS: [&str; 5] = [
    "meeting has ended",
    "會議已結束",
    "You have been disconnected",
    "連線已中斷",
    "kicked",
];

const REJECTED_TEXTS: [&str; 3] = ["rejected", "denied", "拒絕"];

const ERROR_TEXTS: [(&str, ErrorCode, &str); 7] = [
    ("Meeting not found", ErrorCode::MeetingNotFound, "meeting not found"),
    ("會議不存在", ErrorCode::MeetingNotFound, "meeting not found"),
    ("Password required", ErrorCode::PasswordRequired, "password required"),
    ("需要密碼", ErrorCode::PasswordRequired, "password required"),
    ("Wrong password", ErrorCode::PasswordIncorrect, "wrong password"),
    ("Invalid password", ErrorCode::PasswordIncorrect, "wrong password"),
    ("密碼錯誤", ErrorCode::PasswordIncorrect, "wrong password"),
];

const PASSWORD_INPUTS: [&str; 3] = [
    "input[name=\"lockKey\"]",
    "input[type=\"password\"]",
    "input[placeholder*=\"password\" i]",
];

const PASSWORD_SUBMITS: [&str; 3] = [
    "button[aria-label*=\"OK\" i]",
    "button[type=\"submit\"]",
    "button[aria-label*=\"Add\" i]",
];

#[derive(Debug)]
pub struct JitsiProvider;

#[async_trait]
impl MeetingProvider for JitsiProvider {
    fn name(&self) -> ProviderKind {
        ProviderKind::Jitsi
    }

    /// `base + code` plus the URL config to come up muted on both tracks.
    fn build_join_url(
        &self,
        meeting_code: &str,
        base_url: Option<&str>,
    ) -> Result<String, ProviderError> {
        let mut base = base_url.unwrap_or(DEFAULT_BASE_URL).to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(format!(
            "{base}{meeting_code}#config.startWithVideoMuted=true&config.startWithAudioMuted=true"
        ))
    }

    async fn prejoin(
        &self,
        page: &dyn PagePort,
        identity: &JoinIdentity,
    ) -> Result<(), ProviderError> {
        tracing::info!(display_name = %identity.display_name, "handling jitsi prejoin");

        // The join button appearing means the prejoin screen is fully up.
        // Camera and microphone are already muted via the URL config.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        while page.count(JOIN_BUTTON).await? == 0 {
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Protocol(
                    "prejoin screen did not load".to_string(),
                ));
            }
            tokio::time::sleep(JOIN_POLL_INTERVAL).await;
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
            tracing::warn!("could not find display name input");
        }

        if let Some(password) = &identity.password {
            if page.count("input[type=\"password\"]").await? > 0 {
                page.fill("input[type=\"password\"]", password).await?;
                tracing::debug!("prejoin password filled");
            }
        }
        Ok(())
    }

    async fn click_join(&self, page: &dyn PagePort) -> Result<(), ProviderError> {
        if page.count(JOIN_BUTTON).await? > 0 {
            page.click(JOIN_BUTTON).await?;
            return Ok(());
        }
        for selector in ALT_JOIN_SELECTORS {
            if page.count(selector).await? > 0 {
                page.click(selector).await?;
                tracing::debug!(selector, "clicked fallback join button");
                return Ok(());
            }
        }
        Err(ProviderError::Protocol("could not find join button".to_string()))
    }

    async fn apply_password(
        &self,
        page: &dyn PagePort,
        password: &str,
    ) -> Result<bool, ProviderError> {
        tokio::time::sleep(Duration::from_secs(1)).await;

        for selector in PASSWORD_INPUTS {
            if page.count(selector).await? == 0 {
                continue;
            }
            page.fill(selector, password).await?;
            for submit in PASSWORD_SUBMITS {
                if page.count(submit).await? > 0 {
                    page.click(submit).await?;
                    tracing::info!("password submitted");
                    return Ok(true);
                }
            }
            // No button found; Enter usually commits the dialog.
            page.press(selector, "Enter").await?;
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
        tracing::info!(timeout_sec = timeout.as_secs(), "waiting to join meeting");
        let deadline = tokio::time::Instant::now() + timeout;
        let mut password_attempted = false;

        while tokio::time::Instant::now() < deadline {
            // All signal classes are probed each iteration and resolved
            // with priority in-meeting > error > lobby.
            if page.count(IN_MEETING).await? > 0 {
                tracing::info!("joined meeting");
                return Ok(JoinResult::joined());
            }

            if let (Some(password), false) = (password, password_attempted) {
                if page.count("input[name=\"lockKey\"]").await? > 0
                    && self.apply_password(page, password).await?
                {
                    password_attempted = true;
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            }

            for (text, code, message) in ERROR_TEXTS {
                if page.contains_text(text).await? {
                    tracing::warn!(%message, "join error detected");
                    return Ok(JoinResult::error(code, message));
                }
            }

            let mut in_lobby = page.count("[class*=\"lobby\"]").await? > 0;
            for text in LOBBY_TEXTS {
                if in_lobby {
                    break;
                }
                in_lobby = page.contains_text(text).await?;
            }
            if in_lobby {
                tracing::info!("lobby detected");
                return Ok(JoinResult::lobby());
            }

            tokio::time::sleep(JOIN_POLL_INTERVAL).await;
        }

        Ok(JoinResult::error(
            ErrorCode::JoinTimeout,
            format!("timeout after {}s", timeout.as_secs()),
        ))
    }

    async fn wait_in_lobby(&self, page: &dyn PagePort, max_wait: Duration) -> bool {
        tracing::info!(max_wait_sec = max_wait.as_secs(), "waiting in lobby");
        let deadline = tokio::time::Instant::now() + max_wait;

        while tokio::time::Instant::now() < deadline {
            match page.count(IN_MEETING).await {
                Ok(count) if count > 0 => {
                    tracing::info!("admitted from lobby");
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "lobby poll failed");
                    return false;
                }
            }
            for text in REJECTED_TEXTS {
                if page.contains_text(text).await.unwrap_or(false) {
                    tracing::warn!("rejected from lobby");
                    return false;
                }
            }
            tokio::time::sleep(LOBBY_POLL_INTERVAL).await;
        }

        tracing::warn!("lobby timeout");
        false
    }

    async fn set_layout(&self, page: &dyn PagePort, preset: &str) -> bool {
        if preset != "speaker" {
            tracing::warn!(%preset, "unsupported layout preset, using speaker");
        }
        // Toggling the tile-view button twice lands on speaker view
        // regardless of the starting state.
        let toggle = "[aria-label*=\"tile\" i], [aria-label*=\"grid\" i]";
        match page.count(toggle).await {
            Ok(count) if count > 0 => {
                let first = page.click(toggle).await;
                tokio::time::sleep(Duration::from_millis(500)).await;
                let second = page.click(toggle).await;
                first.is_ok() && second.is_ok()
            }
            _ => false,
        }
    }

    async fn detect_meeting_end(&self, page: &dyn PagePort) -> bool {
        for text in END_TEXTS {
            if page.contains_text(text).await.unwrap_or(false) {
                tracing::info!(%text, "meeting end text detected");
                return true;
            }
        }
        // Conference container gone counts as navigated away.
        match page.url().await {
            Ok(url) if url.contains("meet.jit.si") => {
                matches!(page.count(IN_MEETING).await, Ok(0))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "jitsi_tests.rs"]
mod tests;
