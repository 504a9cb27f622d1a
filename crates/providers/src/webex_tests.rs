// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mrec_adapters::{FakePage, PageScript};
use std::collections::HashMap;

fn script(counts: &[(&str, usize)], texts: &[&str]) -> PageScript {
    PageScript {
        counts: counts
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<HashMap<_, _>>(),
        texts: texts.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

#[yare::parameterized(
    full_url      = { "https://acme.webex.com/meet/alice", None, "https://acme.webex.com/meet/alice" },
    meeting_number = { "123456789", None, "https://webex.com/meet/j.php?MTID=123456789" },
    personal_room = { "alice", Some("https://acme.webex.com"), "https://acme.webex.com/meet/alice" },
    base_with_slash = { "alice", Some("https://acme.webex.com/"), "https://acme.webex.com/meet/alice" },
)]
fn join_url_forms(code: &str, base: Option<&str>, expected: &str) {
    assert_eq!(WebexProvider.build_join_url(code, base).unwrap(), expected);
}

#[tokio::test(start_paused = true)]
async fn prejoin_fails_without_client_iframe() {
    let page = FakePage::single(script(&[], &[]));
    let identity = JoinIdentity { display_name: "Bot".to_string(), ..Default::default() };

    let err = WebexProvider.prejoin(&page, &identity).await.unwrap_err();
    assert!(err.to_string().contains("iframe"));
}

#[tokio::test(start_paused = true)]
async fn prejoin_fills_guest_identity_in_frame() {
    // The fake routes in_frame back to the same page, so frame fills land
    // in the same recorder.
    let page = FakePage::single(script(
        &[
            (CLIENT_IFRAME, 1),
            ("[data-test=\"guest-name-input\"]", 1),
            ("input[type=\"email\"]", 1),
        ],
        &[],
    ));
    let identity = JoinIdentity {
        display_name: "Bot".to_string(),
        guest_name: Some("Recorder".to_string()),
        guest_email: Some("recorder@example.com".to_string()),
        ..Default::default()
    };

    WebexProvider.prejoin(&page, &identity).await.unwrap();

    let fills = page.fills();
    assert!(fills.contains(&("[data-test=\"guest-name-input\"]".to_string(), "Recorder".to_string())));
    assert!(fills.contains(&("input[type=\"email\"]".to_string(), "recorder@example.com".to_string())));
}

#[tokio::test(start_paused = true)]
async fn joined_when_meeting_ui_is_present() {
    let page = FakePage::single(script(
        &[(CLIENT_IFRAME, 1), ("[data-test=\"leave-button\"]", 1)],
        &[],
    ));
    let result = WebexProvider
        .wait_until_joined(&page, Duration::from_secs(10), None)
        .await
        .unwrap();
    assert!(result.success);
}

#[tokio::test(start_paused = true)]
async fn error_beats_lobby_in_the_same_poll() {
    let page = FakePage::single(script(
        &[(CLIENT_IFRAME, 1)],
        &["Meeting has ended", "Waiting for host"],
    ));
    let result = WebexProvider
        .wait_until_joined(&page, Duration::from_secs(10), None)
        .await
        .unwrap();
    assert_eq!(result.error_code, Some(ErrorCode::MeetingEnded));
    assert!(!result.in_lobby);
}

#[tokio::test(start_paused = true)]
async fn lobby_detection() {
    let page = FakePage::single(script(&[(CLIENT_IFRAME, 1)], &["Waiting for host"]));
    let result = WebexProvider
        .wait_until_joined(&page, Duration::from_secs(10), None)
        .await
        .unwrap();
    assert_eq!(result, JoinResult::lobby());
}

#[tokio::test(start_paused = true)]
async fn join_times_out_without_iframe() {
    let page = FakePage::single(script(&[], &[]));
    let result = WebexProvider
        .wait_until_joined(&page, Duration::from_secs(5), None)
        .await
        .unwrap();
    assert_eq!(result.error_code, Some(ErrorCode::JoinTimeout));
}

#[tokio::test(start_paused = true)]
async fn meeting_end_when_iframe_disappears() {
    let page = FakePage::single(script(&[], &[]));
    assert!(WebexProvider.detect_meeting_end(&page).await);

    let live = FakePage::single(script(&[(CLIENT_IFRAME, 1)], &[]));
    assert!(!WebexProvider.detect_meeting_end(&live).await);
}
