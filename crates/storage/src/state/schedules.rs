// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule row event handlers.

use super::{MaterializedState, RowEvent};

pub(crate) fn apply(state: &mut MaterializedState, event: &RowEvent) {
    match event {
        RowEvent::ScheduleUpserted { schedule } => {
            state.schedules.insert(schedule.id.to_string(), schedule.clone());
        }

        RowEvent::ScheduleDeleted { id } => {
            state.schedules.remove(id.as_str());
        }

        RowEvent::ScheduleLastRun { id, at } => {
            if let Some(schedule) = state.schedules.get_mut(id.as_str()) {
                schedule.last_run_at = Some(*at);
                schedule.updated_at = *at;
            }
        }

        RowEvent::ScheduleNextRun { id, at } => {
            if let Some(schedule) = state.schedules.get_mut(id.as_str()) {
                schedule.next_run_at = *at;
            }
        }

        _ => {}
    }
}
