// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repositories: the persistence port the engine talks to.
//!
//! Each call is one atomic store operation. `update_status` never throws for
//! a missing row and refuses to rewrite a terminal status, returning `false`
//! in both cases.

use crate::error::StorageError;
use crate::state::{DetectionLogEntry, RowEvent};
use crate::store::Store;
use chrono::{DateTime, Utc};
use mrec_core::{
    DiagnosticInfo, EndReason, ErrorCode, Job, JobId, JobStatus, Meeting, MeetingId, RecordingInfo,
    Schedule, ScheduleId,
};
use serde::{Deserialize, Serialize};

/// Message for jobs orphaned by a process restart.
pub const ORPHAN_ERROR_MESSAGE: &str = "Job interrupted by server restart";

/// Optional field writes carried by a status update. `None` leaves the
/// field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub end_reason: Option<EndReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub recording_started_at: Option<DateTime<Utc>>,
    pub recording_stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub recording: Option<RecordingInfo>,
    pub diagnostics: Option<DiagnosticInfo>,
    pub upload_video_id: Option<String>,
    pub notify_message_id: Option<String>,
    pub duration_sec: Option<u64>,
}

impl JobUpdate {
    pub(crate) fn apply_to(&self, job: &mut Job) {
        if let Some(v) = self.error_code {
            job.error_code = Some(v);
        }
        if let Some(v) = &self.error_message {
            job.error_message = Some(v.clone());
        }
        if let Some(v) = self.end_reason {
            job.end_reason = Some(v);
        }
        if let Some(v) = self.started_at {
            job.timestamps.started_at = Some(v);
        }
        if let Some(v) = self.joined_at {
            job.timestamps.joined_at = Some(v);
        }
        if let Some(v) = self.recording_started_at {
            job.timestamps.recording_started_at = Some(v);
        }
        if let Some(v) = self.recording_stopped_at {
            job.timestamps.recording_stopped_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            job.timestamps.completed_at = Some(v);
        }
        if let Some(v) = self.uploaded_at {
            job.timestamps.uploaded_at = Some(v);
        }
        if let Some(v) = &self.recording {
            // An artifact path, once written, is never mutated.
            if job.recording.is_none() {
                job.recording = Some(v.clone());
            }
        }
        if let Some(v) = &self.diagnostics {
            job.diagnostics = Some(v.clone());
        }
        if let Some(v) = &self.upload_video_id {
            job.upload_video_id = Some(v.clone());
        }
        if let Some(v) = &self.notify_message_id {
            job.notify_message_id = Some(v.clone());
        }
        if let Some(v) = self.duration_sec {
            job.duration_sec = v;
        }
    }
}

/// Job table operations.
#[derive(Clone)]
pub struct JobRepository {
    store: Store,
}

impl JobRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create(&self, job: Job) -> Result<Job, StorageError> {
        self.store.commit(RowEvent::JobCreated { job: job.clone() })?;
        Ok(job)
    }

    pub fn get_by_job_id(&self, id: &str) -> Option<Job> {
        self.store.read(|state| state.jobs.get(id).cloned())
    }

    /// All jobs, newest first, with pagination.
    pub fn get_all(&self, limit: usize, offset: usize) -> Vec<Job> {
        self.store.read(|state| {
            let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
            jobs.sort_by(|a, b| b.timestamps.created_at.cmp(&a.timestamps.created_at));
            jobs.into_iter().skip(offset).take(limit).collect()
        })
    }

    pub fn get_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.store.read(|state| {
            state
                .jobs
                .values()
                .filter(|j| j.status == status)
                .cloned()
                .collect()
        })
    }

    pub fn get_non_terminal(&self) -> Vec<Job> {
        self.store.read(|state| {
            state
                .jobs
                .values()
                .filter(|j| !j.is_terminal())
                .cloned()
                .collect()
        })
    }

    /// Atomically set `status` and apply `update`.
    ///
    /// Returns `false` (without writing) when the row is missing, when the
    /// current status is terminal, or when the transition is not allowed by
    /// the state machine. Same-status calls are field-only updates.
    pub fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        update: JobUpdate,
    ) -> Result<bool, StorageError> {
        let id = *id;
        let applied = self.store.commit_if(
            |state| match state.jobs.get(id.as_str()) {
                None => false,
                Some(job) if job.status == status => true,
                Some(job) => JobStatus::can_transition(job.status, status),
            },
            RowEvent::JobUpdated { id, status, update },
        )?;
        if !applied {
            tracing::warn!(job_id = %id, status = %status, "rejected job status update");
        }
        Ok(applied)
    }

    pub fn delete(&self, id: &JobId) -> Result<bool, StorageError> {
        let id = *id;
        self.store.commit_if(
            |state| state.jobs.contains_key(id.as_str()),
            RowEvent::JobDeleted { id },
        )
    }

    /// Startup pass: any job left in a non-terminal status by a previous
    /// process is rewritten to `failed`. Must run before the scheduler arms
    /// any trigger.
    pub fn fail_orphans(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, StorageError> {
        let orphans: Vec<JobId> = self
            .get_non_terminal()
            .into_iter()
            .map(|job| job.id)
            .collect();
        for id in &orphans {
            let update = JobUpdate {
                error_code: Some(ErrorCode::InternalError),
                error_message: Some(ORPHAN_ERROR_MESSAGE.to_string()),
                end_reason: Some(EndReason::Failed),
                completed_at: Some(now),
                ..Default::default()
            };
            self.update_status(id, JobStatus::Failed, update)?;
            tracing::warn!(job_id = %id, "orphaned job marked failed");
        }
        Ok(orphans)
    }
}

/// Schedule table operations.
#[derive(Clone)]
pub struct ScheduleRepository {
    store: Store,
}

impl ScheduleRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn upsert(&self, schedule: Schedule) -> Result<Schedule, StorageError> {
        self.store.commit(RowEvent::ScheduleUpserted {
            schedule: schedule.clone(),
        })?;
        Ok(schedule)
    }

    pub fn get(&self, id: &str) -> Option<Schedule> {
        self.store.read(|state| state.schedules.get(id).cloned())
    }

    pub fn get_all(&self) -> Vec<Schedule> {
        self.store
            .read(|state| state.schedules.values().cloned().collect())
    }

    pub fn list_enabled(&self) -> Vec<Schedule> {
        self.store.read(|state| {
            state
                .schedules
                .values()
                .filter(|s| s.enabled)
                .cloned()
                .collect()
        })
    }

    pub fn delete(&self, id: &ScheduleId) -> Result<bool, StorageError> {
        let id = *id;
        self.store.commit_if(
            |state| state.schedules.contains_key(id.as_str()),
            RowEvent::ScheduleDeleted { id },
        )
    }

    pub fn set_last_run(&self, id: &ScheduleId, at: DateTime<Utc>) -> Result<bool, StorageError> {
        let id = *id;
        self.store.commit_if(
            |state| state.schedules.contains_key(id.as_str()),
            RowEvent::ScheduleLastRun { id, at },
        )
    }

    pub fn set_next_run(
        &self,
        id: &ScheduleId,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        let id = *id;
        self.store.commit_if(
            |state| state.schedules.contains_key(id.as_str()),
            RowEvent::ScheduleNextRun { id, at },
        )
    }
}

/// Meeting table operations.
#[derive(Clone)]
pub struct MeetingRepository {
    store: Store,
}

impl MeetingRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn upsert(&self, meeting: Meeting) -> Result<Meeting, StorageError> {
        self.store.commit(RowEvent::MeetingUpserted {
            meeting: meeting.clone(),
        })?;
        Ok(meeting)
    }

    pub fn get(&self, id: &str) -> Option<Meeting> {
        self.store.read(|state| state.meetings.get(id).cloned())
    }

    pub fn get_all(&self) -> Vec<Meeting> {
        self.store
            .read(|state| state.meetings.values().cloned().collect())
    }

    pub fn delete(&self, id: &MeetingId) -> Result<bool, StorageError> {
        let id = *id;
        self.store.commit_if(
            |state| state.meetings.contains_key(id.as_str()),
            RowEvent::MeetingDeleted { id },
        )
    }
}

/// Detection log operations.
#[derive(Clone)]
pub struct DetectionLogRepository {
    store: Store,
}

impl DetectionLogRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn append(&self, entry: DetectionLogEntry) -> Result<(), StorageError> {
        self.store.commit(RowEvent::DetectionLogged { entry })
    }

    pub fn for_job(&self, job_id: &JobId) -> Vec<DetectionLogEntry> {
        self.store.read(|state| {
            state
                .detections
                .iter()
                .filter(|e| e.job_id == *job_id)
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
