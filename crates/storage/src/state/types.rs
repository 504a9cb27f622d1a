// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row event and detection log row types.

use chrono::{DateTime, Utc};
use mrec_core::{
    DetectionResult, DetectorKind, Job, JobId, JobStatus, Meeting, MeetingId, Schedule, ScheduleId,
};
use serde::{Deserialize, Serialize};

use crate::repository::JobUpdate;

/// One persisted probe result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionLogEntry {
    pub job_id: JobId,
    pub detector: DetectorKind,
    pub detected: bool,
    pub confidence: f64,
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
    /// Accuracy label for offline review of tuning runs.
    pub was_accurate: Option<bool>,
}

impl DetectionLogEntry {
    pub fn from_result(job_id: JobId, result: &DetectionResult) -> Self {
        Self {
            job_id,
            detector: result.detector,
            detected: result.detected,
            confidence: result.confidence,
            reason: result.reason.clone(),
            triggered_at: result.timestamp,
            was_accurate: None,
        }
    }
}

/// A single row mutation, written to the WAL before it is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowEvent {
    MeetingUpserted { meeting: Meeting },
    MeetingDeleted { id: MeetingId },

    ScheduleUpserted { schedule: Schedule },
    ScheduleDeleted { id: ScheduleId },
    ScheduleLastRun { id: ScheduleId, at: DateTime<Utc> },
    ScheduleNextRun { id: ScheduleId, at: Option<DateTime<Utc>> },

    JobCreated { job: Job },
    JobUpdated { id: JobId, status: JobStatus, update: JobUpdate },
    JobDeleted { id: JobId },

    DetectionLogged { entry: DetectionLogEntry },
}
