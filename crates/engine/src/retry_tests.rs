// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    dns_glibc    = { "page operation failed: Name or service not known" },
    dns_transient = { "Temporary failure in name resolution" },
    conn_reset   = { "Connection reset by peer" },
    conn_refused = { "Connection refused (os error 111)" },
    timed_out    = { "navigation timed out after 30000ms" },
    browser_dns  = { "net::ERR_NAME_NOT_RESOLVED" },
    offline      = { "net::ERR_INTERNET_DISCONNECTED" },
)]
fn network_class_errors_are_retryable(message: &str) {
    assert!(is_retryable(message), "{message:?}");
}

#[yare::parameterized(
    lobby     = { "Lobby timeout - not admitted to meeting" },
    not_found = { "meeting not found" },
    ffmpeg    = { "muxer exited with code 1" },
    internal  = { "something unexpected" },
    empty     = { "" },
)]
fn other_errors_are_not_retryable(message: &str) {
    assert!(!is_retryable(message), "{message:?}");
}

#[test]
fn delay_doubles_up_to_the_cap() {
    let mut delay = INITIAL_RETRY_DELAY;
    assert_eq!(delay, Duration::from_secs(15));
    delay = next_delay(delay);
    assert_eq!(delay, Duration::from_secs(30));
    delay = next_delay(delay);
    delay = next_delay(delay);
    delay = next_delay(delay);
    assert_eq!(delay, Duration::from_secs(240));
    delay = next_delay(delay);
    assert_eq!(delay, MAX_RETRY_DELAY);
    assert_eq!(next_delay(delay), MAX_RETRY_DELAY);
}
