// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job row event handlers.

use super::{MaterializedState, RowEvent};

pub(crate) fn apply(state: &mut MaterializedState, event: &RowEvent) {
    match event {
        RowEvent::JobCreated { job } => {
            state.jobs.insert(job.id.to_string(), job.clone());
        }

        RowEvent::JobUpdated { id, status, update } => {
            if let Some(job) = state.jobs.get_mut(id.as_str()) {
                job.status = *status;
                update.apply_to(job);
            }
        }

        RowEvent::JobDeleted { id } => {
            state.jobs.remove(id.as_str());
            state.detections.retain(|entry| entry.job_id != *id);
        }

        _ => {}
    }
}
