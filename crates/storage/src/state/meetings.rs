// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Meeting row event handlers.

use super::{MaterializedState, RowEvent};

pub(crate) fn apply(state: &mut MaterializedState, event: &RowEvent) {
    match event {
        RowEvent::MeetingUpserted { meeting } => {
            state.meetings.insert(meeting.id.to_string(), meeting.clone());
        }

        RowEvent::MeetingDeleted { id } => {
            state.meetings.remove(id.as_str());
            // Schedules cascade with their meeting.
            state.schedules.retain(|_, s| s.meeting_id != *id);
        }

        _ => {}
    }
}
