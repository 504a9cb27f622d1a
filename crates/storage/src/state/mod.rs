// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized row state and the events that mutate it.

mod detections;
mod jobs;
mod meetings;
mod schedules;
mod types;

pub use types::{DetectionLogEntry, RowEvent};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every table, fully materialized in memory.
///
/// Maps are keyed by the row's string id. Detection logs are append-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    pub meetings: HashMap<String, mrec_core::Meeting>,
    pub schedules: HashMap<String, mrec_core::Schedule>,
    pub jobs: HashMap<String, mrec_core::Job>,
    pub detections: Vec<DetectionLogEntry>,
}

impl MaterializedState {
    /// Apply one event. Mechanical by design: validation happens in the
    /// repositories before the event is committed, so WAL replay reproduces
    /// exactly what was accepted.
    pub fn apply(&mut self, event: &RowEvent) {
        match event {
            RowEvent::MeetingUpserted { .. } | RowEvent::MeetingDeleted { .. } => {
                meetings::apply(self, event)
            }
            RowEvent::ScheduleUpserted { .. }
            | RowEvent::ScheduleDeleted { .. }
            | RowEvent::ScheduleLastRun { .. }
            | RowEvent::ScheduleNextRun { .. } => schedules::apply(self, event),
            RowEvent::JobCreated { .. }
            | RowEvent::JobUpdated { .. }
            | RowEvent::JobDeleted { .. } => jobs::apply(self, event),
            RowEvent::DetectionLogged { .. } => detections::apply(self, event),
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
