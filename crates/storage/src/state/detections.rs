// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detection log event handlers.

use super::{MaterializedState, RowEvent};

pub(crate) fn apply(state: &mut MaterializedState, event: &RowEvent) {
    if let RowEvent::DetectionLogged { entry } = event {
        state.detections.push(entry.clone());
    }
}
