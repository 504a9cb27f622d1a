// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebRTC connection-state probe.
//!
//! The setup script patches `RTCPeerConnection` so any connection entering
//! `disconnected`, `failed`, or `closed` (for either `connectionState` or
//! `iceConnectionState`) raises `window._rtcConnectionLost`. The check just
//! reads that flag.

use crate::orchestrator::Detector;
use async_trait::async_trait;
use chrono::Utc;
use mrec_adapters::PagePort;
use mrec_core::{DetectionConfig, DetectionResult, DetectorKind};

const INJECT_SCRIPT: &str = r#"
window._rtcConnectionLost = false;
window._rtcConnectionChecked = true;

if (window.RTCPeerConnection && !window._rtcPatched) {
    window._rtcPatched = true;
    const OriginalRTCPeerConnection = window.RTCPeerConnection;

    window.RTCPeerConnection = function(...args) {
        const pc = new OriginalRTCPeerConnection(...args);

        pc.addEventListener('connectionstatechange', () => {
            if (pc.connectionState === 'disconnected' ||
                pc.connectionState === 'failed' ||
                pc.connectionState === 'closed') {
                console.log('[RTCDetector] Connection state:', pc.connectionState);
                window._rtcConnectionLost = true;
            }
        });

        pc.addEventListener('iceconnectionstatechange', () => {
            if (pc.iceConnectionState === 'disconnected' ||
                pc.iceConnectionState === 'failed' ||
                pc.iceConnectionState === 'closed') {
                console.log('[RTCDetector] ICE state:', pc.iceConnectionState);
                window._rtcConnectionLost = true;
            }
        });

        return pc;
    };

    Object.assign(window.RTCPeerConnection, OriginalRTCPeerConnection);
    window.RTCPeerConnection.prototype = OriginalRTCPeerConnection.prototype;
}
"#;

pub struct WebRtcConnectionDetector {
    config: DetectionConfig,
    injected: bool,
}

impl WebRtcConnectionDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config, injected: false }
    }
}

#[async_trait]
impl Detector for WebRtcConnectionDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::WebrtcConnection
    }

    fn priority(&self) -> u32 {
        self.config.priority(self.kind())
    }

    fn enabled(&self) -> bool {
        self.config.is_enabled(self.kind())
    }

    async fn setup(&mut self, page: &dyn PagePort) {
        match page.evaluate(INJECT_SCRIPT).await {
            Ok(_) => {
                self.injected = true;
                tracing::info!("WebRTC connection monitoring injected");
            }
            Err(e) => {
                self.injected = false;
                tracing::warn!(error = %e, "failed to inject WebRTC monitor");
            }
        }
    }

    async fn check(&mut self, page: &dyn PagePort) -> DetectionResult {
        let now = Utc::now();
        if !self.injected {
            return DetectionResult::negative(self.kind(), "WebRTC monitoring not injected", now);
        }
        match page.evaluate("window._rtcConnectionLost === true").await {
            Ok(value) if value.as_bool() == Some(true) => {
                DetectionResult::positive(self.kind(), 1.0, "WebRTC connection lost", now)
            }
            Ok(_) => DetectionResult::negative(self.kind(), "WebRTC connection active", now),
            Err(e) => {
                tracing::debug!(error = %e, "WebRTC check failed");
                DetectionResult::negative(self.kind(), "WebRTC state unreadable", now)
            }
        }
    }

    fn reset(&mut self) {
        self.injected = false;
    }
}

#[cfg(test)]
#[path = "webrtc_tests.rs"]
mod tests;
