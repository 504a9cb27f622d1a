// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mrec-providers: vendor adapters for the join state machine.
//!
//! Each provider drives prejoin → join → (lobby) → admitted for one meeting
//! platform through the [`mrec_adapters::PagePort`] surface.

mod diagnostics;
mod jitsi;
mod provider;
mod webex;
mod zoom;

pub use jitsi::JitsiProvider;
pub use provider::{
    DiagnosticContext, JoinIdentity, JoinResult, MeetingProvider, ProviderError,
};
pub use webex::WebexProvider;
pub use zoom::ZoomProvider;

use mrec_core::ProviderKind;
use std::sync::Arc;

/// Look up a provider adapter by tag.
///
/// Returns a fresh instance; adapters are stateless between calls.
pub fn get_provider(tag: &str) -> Result<Arc<dyn MeetingProvider>, ProviderError> {
    let kind: ProviderKind = tag.parse().map_err(|_| ProviderError::Unknown {
        tag: tag.to_string(),
        available: ProviderKind::ALL
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })?;
    Ok(provider_for(kind))
}

/// Provider adapter for a known kind.
pub fn provider_for(kind: ProviderKind) -> Arc<dyn MeetingProvider> {
    match kind {
        ProviderKind::Jitsi => Arc::new(JitsiProvider),
        ProviderKind::Webex => Arc::new(WebexProvider),
        ProviderKind::Zoom => Arc::new(ZoomProvider),
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
