// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::provider::JoinIdentity;
use mrec_adapters::{FakePage, PageScript};
use std::collections::HashMap;

fn script(counts: &[(&str, usize)], texts: &[&str]) -> PageScript {
    PageScript {
        counts: counts
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<HashMap<_, _>>(),
        texts: texts.iter().map(|t| t.to_string()).collect(),
        url: "https://meet.jit.si/testroom-1".to_string(),
        ..Default::default()
    }
}

#[test]
fn join_url_includes_muted_config() {
    let url = JitsiProvider
        .build_join_url("testroom-1", None)
        .unwrap();
    assert_eq!(
        url,
        "https://meet.jit.si/testroom-1#config.startWithVideoMuted=true&config.startWithAudioMuted=true"
    );
}

#[yare::parameterized(
    with_slash    = { "https://jitsi.example.org/", "https://jitsi.example.org/room-a" },
    without_slash = { "https://jitsi.example.org", "https://jitsi.example.org/room-a" },
)]
fn join_url_respects_base(base: &str, expected_prefix: &str) {
    let url = JitsiProvider.build_join_url("room-a", Some(base)).unwrap();
    assert!(url.starts_with(expected_prefix), "{url}");
}

#[tokio::test(start_paused = true)]
async fn prejoin_fills_name_and_password() {
    let page = FakePage::single(script(
        &[
            (JOIN_BUTTON, 1),
            ("input[data-testid=\"prejoin.input\"]", 1),
            ("input[type=\"password\"]", 1),
        ],
        &[],
    ));
    let identity = JoinIdentity {
        display_name: "Bot".to_string(),
        password: Some("hunter2".to_string()),
        ..Default::default()
    };

    JitsiProvider.prejoin(&page, &identity).await.unwrap();

    let fills = page.fills();
    assert!(fills.contains(&("input[data-testid=\"prejoin.input\"]".to_string(), "Bot".to_string())));
    assert!(fills.contains(&("input[type=\"password\"]".to_string(), "hunter2".to_string())));
}

#[tokio::test(start_paused = true)]
async fn prejoin_times_out_when_screen_never_loads() {
    let page = FakePage::single(script(&[], &[]));
    let identity = JoinIdentity { display_name: "Bot".to_string(), ..Default::default() };

    let err = JitsiProvider.prejoin(&page, &identity).await.unwrap_err();
    assert!(err.to_string().contains("prejoin screen did not load"));
}

#[tokio::test(start_paused = true)]
async fn wait_until_joined_detects_meeting() {
    let page = FakePage::single(script(&[(IN_MEETING, 1)], &[]));
    let result = JitsiProvider
        .wait_until_joined(&page, Duration::from_secs(10), None)
        .await
        .unwrap();
    assert_eq!(result, JoinResult::joined());
}

#[tokio::test(start_paused = true)]
async fn in_meeting_wins_over_lobby_signals() {
    // Both signal classes present at once: success has priority, so
    // vendors that flash lobby markup while entering still join.
    let page = FakePage::single(script(&[(IN_MEETING, 1)], &["Waiting for the host"]));
    let result = JitsiProvider
        .wait_until_joined(&page, Duration::from_secs(10), None)
        .await
        .unwrap();
    assert!(result.success);
}

#[tokio::test(start_paused = true)]
async fn error_wins_over_lobby_signals() {
    let page = FakePage::single(script(&[], &["Meeting not found", "Waiting for the host"]));
    let result = JitsiProvider
        .wait_until_joined(&page, Duration::from_secs(10), None)
        .await
        .unwrap();
    assert_eq!(result.error_code, Some(ErrorCode::MeetingNotFound));
    assert!(!result.in_lobby);
}

#[tokio::test(start_paused = true)]
async fn lobby_is_reported_when_it_is_the_only_signal() {
    let page = FakePage::single(script(&[], &["You are in the waiting room"]));
    let result = JitsiProvider
        .wait_until_joined(&page, Duration::from_secs(10), None)
        .await
        .unwrap();
    assert_eq!(result, JoinResult::lobby());
}

#[tokio::test(start_paused = true)]
async fn error_texts_map_to_codes() {
    let cases = [
        ("Wrong password", ErrorCode::PasswordIncorrect),
        ("Password required", ErrorCode::PasswordRequired),
        ("會議不存在", ErrorCode::MeetingNotFound),
    ];
    for (text, code) in cases {
        let page = FakePage::single(script(&[], &[text]));
        let result = JitsiProvider
            .wait_until_joined(&page, Duration::from_secs(10), None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(code), "{text}");
    }
}

#[tokio::test(start_paused = true)]
async fn join_timeout_when_nothing_appears() {
    let page = FakePage::single(script(&[], &[]));
    let result = JitsiProvider
        .wait_until_joined(&page, Duration::from_secs(5), None)
        .await
        .unwrap();
    assert_eq!(result.error_code, Some(ErrorCode::JoinTimeout));
}

#[tokio::test(start_paused = true)]
async fn lobby_admission_is_detected() {
    let page = FakePage::new(vec![
        script(&[], &["Waiting for the host"]),
        script(&[(IN_MEETING, 1)], &[]),
    ]);

    let waiter = {
        let page = page.clone();
        tokio::spawn(async move {
            JitsiProvider.wait_in_lobby(&page, Duration::from_secs(60)).await
        })
    };
    tokio::time::sleep(Duration::from_secs(6)).await;
    page.advance();

    assert!(waiter.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn lobby_rejection_and_timeout_return_false() {
    let rejected = FakePage::single(script(&[], &["rejected"]));
    assert!(!JitsiProvider.wait_in_lobby(&rejected, Duration::from_secs(30)).await);

    let silent = FakePage::single(script(&[], &[]));
    assert!(!JitsiProvider.wait_in_lobby(&silent, Duration::from_secs(10)).await);
}

#[tokio::test(start_paused = true)]
async fn detect_meeting_end_on_text_and_navigation() {
    let ended = FakePage::single(script(&[(IN_MEETING, 1)], &["meeting has ended"]));
    assert!(JitsiProvider.detect_meeting_end(&ended).await);

    let live = FakePage::single(script(&[(IN_MEETING, 1)], &[]));
    assert!(!JitsiProvider.detect_meeting_end(&live).await);

    // Still on the vendor domain but the conference UI is gone.
    let navigated = FakePage::single(script(&[], &[]));
    assert!(JitsiProvider.detect_meeting_end(&navigated).await);
}

#[tokio::test(start_paused = true)]
async fn apply_password_fills_and_submits() {
    let page = FakePage::single(script(
        &[("input[name=\"lockKey\"]", 1), ("button[type=\"submit\"]", 1)],
        &[],
    ));

    let applied = JitsiProvider.apply_password(&page, "hunter2").await.unwrap();
    assert!(applied);
    assert_eq!(
        page.fills(),
        vec![("input[name=\"lockKey\"]".to_string(), "hunter2".to_string())]
    );
    assert_eq!(page.clicks(), vec!["button[type=\"submit\"]"]);
}
