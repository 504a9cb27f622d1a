// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Navigation-away probe.

use crate::orchestrator::Detector;
use async_trait::async_trait;
use chrono::Utc;
use mrec_adapters::PagePort;
use mrec_core::{DetectionConfig, DetectionResult, DetectorKind};

const MEETING_DOMAINS: [&str; 4] = [
    "meet.jit.si",
    "webex.com",
    "zoom.us",
    "teams.microsoft.com",
];

pub struct UrlChangeDetector {
    config: DetectionConfig,
    initial_url: Option<String>,
}

impl UrlChangeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config, initial_url: None }
    }
}

#[async_trait]
impl Detector for UrlChangeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::UrlChange
    }

    fn priority(&self) -> u32 {
        self.config.priority(self.kind())
    }

    fn enabled(&self) -> bool {
        self.config.is_enabled(self.kind())
    }

    async fn setup(&mut self, page: &dyn PagePort) {
        match page.url().await {
            Ok(url) => self.initial_url = Some(url),
            Err(e) => tracing::warn!(error = %e, "could not record initial url"),
        }
    }

    async fn check(&mut self, page: &dyn PagePort) -> DetectionResult {
        let now = Utc::now();
        let Some(initial) = &self.initial_url else {
            return DetectionResult::negative(self.kind(), "no initial url recorded", now);
        };
        let current = match page.url().await {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(error = %e, "url probe failed");
                return DetectionResult::negative(self.kind(), "url unreadable", now);
            }
        };

        for domain in MEETING_DOMAINS {
            if initial.contains(domain) && !current.contains(domain) {
                return DetectionResult::positive(
                    self.kind(),
                    1.0,
                    format!("navigated away from {domain}"),
                    now,
                );
            }
        }
        DetectionResult::negative(self.kind(), "still on meeting domain", now)
    }

    fn reset(&mut self) {
        self.initial_url = None;
    }
}

#[cfg(test)]
#[path = "url_tests.rs"]
mod tests;
