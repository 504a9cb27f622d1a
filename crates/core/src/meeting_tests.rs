// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    jitsi = { ProviderKind::Jitsi, "jitsi" },
    webex = { ProviderKind::Webex, "webex" },
    zoom  = { ProviderKind::Zoom, "zoom" },
)]
fn provider_display_parse_roundtrip(kind: ProviderKind, tag: &str) {
    assert_eq!(kind.to_string(), tag);
    assert_eq!(tag.parse::<ProviderKind>().unwrap(), kind);
}

#[test]
fn provider_parse_rejects_unknown() {
    let err = "teams".parse::<ProviderKind>().unwrap_err();
    assert!(err.to_string().contains("teams"));
}

#[test]
fn provider_serde_tag_matches_display() {
    let json = serde_json::to_string(&ProviderKind::Webex).unwrap();
    assert_eq!(json, "\"webex\"");
}

#[test]
fn meeting_builder_defaults() {
    let meeting = Meeting::builder().build();
    assert_eq!(meeting.provider, ProviderKind::Jitsi);
    assert_eq!(meeting.meeting_code, "testroom-1");
    assert!(meeting.password.is_none());
    assert!(meeting.id.as_str().starts_with("mtg-"));
}
