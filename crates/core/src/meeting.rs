// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Meeting configuration rows.
//!
//! A `Meeting` is the static description of a joinable room. It is read-only
//! from the recording path: jobs snapshot the fields they need at creation
//! time, so later edits never affect a run in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a meeting configuration.
    pub struct MeetingId("mtg-");
}

/// Error for unrecognized string tags (provider kinds, schedule types, …).
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {tag:?}")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub tag: String,
}

/// Supported meeting platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Jitsi,
    Webex,
    Zoom,
}

crate::simple_display! {
    ProviderKind {
        Jitsi => "jitsi",
        Webex => "webex",
        Zoom => "zoom",
    }
}

crate::simple_parse! {
    ProviderKind, "provider" => {
        "jitsi" => Jitsi,
        "webex" => Webex,
        "zoom" => Zoom,
    }
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Jitsi, ProviderKind::Webex, ProviderKind::Zoom];
}

/// A joinable room configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub name: String,
    pub provider: ProviderKind,
    /// Vendor site base URL (e.g. `https://meet.jit.si/`). `None` uses the
    /// provider default.
    pub site_base_url: Option<String>,
    pub meeting_code: String,
    /// Full join URL override; providers pass it through when set.
    pub join_url: Option<String>,
    pub password: Option<String>,
    pub default_display_name: String,
    /// Guest identity for providers that ask for it (Webex).
    pub default_guest_name: Option<String>,
    pub default_guest_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

crate::builder! {
    pub struct MeetingBuilder => Meeting {
        into {
            name: String = "test meeting",
            meeting_code: String = "testroom-1",
            default_display_name: String = "Recorder Bot",
        }
        set {
            provider: ProviderKind = ProviderKind::Jitsi,
        }
        option {
            site_base_url: String = None,
            join_url: String = None,
            password: String = None,
            default_guest_name: String = None,
            default_guest_email: String = None,
        }
        computed {
            id: MeetingId = MeetingId::new_random(),
            created_at: DateTime<Utc> = Utc::now(),
            updated_at: DateTime<Utc> = Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "meeting_tests.rs"]
mod tests;
