// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retryable-network error classification.
//!
//! Only transient network failures are worth another join attempt; anything
//! else surfaces on the job immediately. Classification is a substring
//! match over the error message, covering resolver failures, connection
//! errors, timeout classes, and the browser's network error tags.

use std::time::Duration;

/// First retry delay; doubles per attempt up to [`MAX_RETRY_DELAY`].
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(15);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

const RETRYABLE_PATTERNS: [&str; 11] = [
    "Name or service not known",
    "Temporary failure in name resolution",
    "nodename nor servname provided",
    "Connection reset",
    "Connection refused",
    "Connection timed out",
    "timed out",
    "Timeout",
    "net::ERR_NAME_NOT_RESOLVED",
    "net::ERR_INTERNET_DISCONNECTED",
    "net::ERR_NETWORK_CHANGED",
];

/// Whether this failure is in the retryable-network class.
pub fn is_retryable(error_message: &str) -> bool {
    RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| error_message.contains(pattern))
}

/// Next backoff delay after `current`.
pub fn next_delay(current: Duration) -> Duration {
    (current * 2).min(MAX_RETRY_DELAY)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
