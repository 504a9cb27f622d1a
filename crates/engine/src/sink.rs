// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store-backed detection sink.

use mrec_core::{DetectionResult, JobId};
use mrec_detect::DetectionSink;
use mrec_storage::{DetectionLogEntry, DetectionLogRepository};

/// Persists every positive probe result as a detection log row.
pub struct StoreDetectionSink {
    repo: DetectionLogRepository,
}

impl StoreDetectionSink {
    pub fn new(repo: DetectionLogRepository) -> Self {
        Self { repo }
    }
}

impl DetectionSink for StoreDetectionSink {
    fn record(&self, job_id: &JobId, result: &DetectionResult) {
        let entry = DetectionLogEntry::from_result(*job_id, result);
        if let Err(e) = self.repo.append(entry) {
            tracing::warn!(job_id = %job_id, error = %e, "could not persist detection log");
        }
    }
}
