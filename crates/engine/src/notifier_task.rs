// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The notifier task.
//!
//! Lifecycle events are posted to a bounded channel and delivered by this
//! one task, which keeps per-job notification ordering without spawning
//! ad-hoc tasks from status callbacks. Delivery is best-effort; failures
//! are logged and never touch job state.

use mrec_adapters::Notifier;
use mrec_core::JobId;
use mrec_storage::{JobRepository, JobUpdate};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Queue depth for pending notifications.
pub const NOTIFY_QUEUE_DEPTH: usize = 64;

/// One lifecycle event for the notifier.
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    Started { job_id: JobId },
    Completed { job_id: JobId },
    Failed { job_id: JobId },
    Canceled { job_id: JobId },
    Retrying {
        job_id: JobId,
        attempt: u32,
        next_delay_sec: u64,
        error: String,
    },
    Uploaded { job_id: JobId, video_url: String },
}

impl NotifyEvent {
    fn job_id(&self) -> JobId {
        match self {
            NotifyEvent::Started { job_id }
            | NotifyEvent::Completed { job_id }
            | NotifyEvent::Failed { job_id }
            | NotifyEvent::Canceled { job_id }
            | NotifyEvent::Retrying { job_id, .. }
            | NotifyEvent::Uploaded { job_id, .. } => *job_id,
        }
    }
}

/// Spawn the notifier task. It drains the channel on shutdown before
/// exiting so already-posted events still go out.
pub fn spawn_notifier_task<N: Notifier>(
    mut rx: mpsc::Receiver<NotifyEvent>,
    notifier: N,
    jobs: JobRepository,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    rx.close();
                    while let Ok(event) = rx.try_recv() {
                        deliver(&notifier, &jobs, event).await;
                    }
                    break;
                }
            };
            deliver(&notifier, &jobs, event).await;
        }
        tracing::debug!("notifier task stopped");
    })
}

async fn deliver<N: Notifier>(notifier: &N, jobs: &JobRepository, event: NotifyEvent) {
    let job_id = event.job_id();
    let Some(job) = jobs.get_by_job_id(job_id.as_str()) else {
        tracing::warn!(%job_id, "notify event for unknown job");
        return;
    };

    let result = match &event {
        NotifyEvent::Started { .. } => match notifier.recording_started(&job).await {
            Ok(Some(message_id)) => {
                // Keep the message id on the row for later in-place updates.
                let update = JobUpdate {
                    notify_message_id: Some(message_id),
                    ..Default::default()
                };
                if let Err(e) = jobs.update_status(&job.id, job.status, update) {
                    tracing::warn!(%job_id, error = %e, "could not store notify message id");
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        },
        NotifyEvent::Completed { .. } => notifier.recording_completed(&job).await,
        NotifyEvent::Failed { .. } => notifier.recording_failed(&job).await,
        NotifyEvent::Canceled { .. } => notifier.recording_canceled(&job).await,
        NotifyEvent::Retrying { attempt, next_delay_sec, error, .. } => {
            notifier
                .recording_retrying(&job, *attempt, *next_delay_sec, error)
                .await
        }
        NotifyEvent::Uploaded { video_url, .. } => {
            notifier.upload_completed(&job, video_url).await
        }
    };

    if let Err(e) = result {
        tracing::warn!(%job_id, error = %e, "notification delivery failed");
    }
}

#[cfg(test)]
#[path = "notifier_task_tests.rs"]
mod tests;
