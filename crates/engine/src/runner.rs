// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job runner.
//!
//! All recording work is serialized behind the recording lock with a FIFO
//! queue of waiting schedule ids; the queue is bookkeeping, the actual wait
//! is on the lock itself. Failed attempts in the retryable-network class
//! are retried with doubling backoff until the meeting-end deadline.
//! Uploads run after the recording lock is released, under their own lock,
//! so a slow upload never blocks the next recording.

use crate::notifier_task::NotifyEvent;
use crate::retry;
use crate::trigger::parse_engine_expression;
use crate::worker::{RecordingResult, RecordingWorker, StatusCallback};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use mrec_adapters::{UploadMetadata, Uploader};
use mrec_core::{
    Clock, Job, JobId, JobStatus, JobTimestamps, Meeting, ProviderKind, Schedule, ScheduleId,
    ScheduleType,
};
use mrec_storage::{JobRepository, JobUpdate, MeetingRepository, ScheduleRepository};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Parameters for a one-shot, schedule-less execution.
#[derive(Debug, Clone)]
pub struct RunImmediateParams {
    pub provider: ProviderKind,
    pub meeting_code: String,
    pub display_name: String,
    pub duration_sec: u64,
    pub base_url: Option<String>,
    pub password: Option<String>,
    pub lobby_wait_sec: u64,
}

struct RunnerInner<C: Clock> {
    clock: C,
    tz: Tz,
    worker: Arc<RecordingWorker<C>>,
    jobs: JobRepository,
    schedules: ScheduleRepository,
    meetings: MeetingRepository,
    uploader: Arc<dyn Uploader>,
    notify_tx: mpsc::Sender<NotifyEvent>,
    recording_lock: Arc<tokio::sync::Mutex<()>>,
    upload_lock: Arc<tokio::sync::Mutex<()>>,
    queue: Mutex<Vec<ScheduleId>>,
    current_schedule: Mutex<Option<ScheduleId>>,
}

/// Cheap-clone handle to the runner.
#[derive(Clone)]
pub struct JobRunner<C: Clock> {
    inner: Arc<RunnerInner<C>>,
}

impl<C: Clock> JobRunner<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: C,
        tz: Tz,
        worker: Arc<RecordingWorker<C>>,
        jobs: JobRepository,
        schedules: ScheduleRepository,
        meetings: MeetingRepository,
        uploader: Arc<dyn Uploader>,
        notify_tx: mpsc::Sender<NotifyEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                clock,
                tz,
                worker,
                jobs,
                schedules,
                meetings,
                uploader,
                notify_tx,
                recording_lock: Arc::new(tokio::sync::Mutex::new(())),
                upload_lock: Arc::new(tokio::sync::Mutex::new(())),
                queue: Mutex::new(Vec::new()),
                current_schedule: Mutex::new(None),
            }),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.recording_lock.try_lock().is_err()
    }

    pub fn current_schedule_id(&self) -> Option<ScheduleId> {
        *self.inner.current_schedule.lock()
    }

    pub fn queue_length(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn worker(&self) -> &Arc<RecordingWorker<C>> {
        &self.inner.worker
    }

    /// Schedule an execution: immediately when the recording lock is free,
    /// otherwise queued behind it. Returns `false` for duplicates already
    /// waiting.
    pub fn queue_schedule(&self, schedule_id: ScheduleId) -> bool {
        {
            let queue = self.inner.queue.lock();
            if queue.contains(&schedule_id) {
                tracing::warn!(%schedule_id, "schedule already queued");
                return false;
            }
        }
        let runner = self.clone();
        tokio::spawn(async move { runner.run_when_available(schedule_id).await });
        true
    }

    /// One-shot execution. Returns `None` without queueing when busy.
    pub fn run_immediate(&self, params: RunImmediateParams) -> Option<JobId> {
        let guard = self.inner.recording_lock.clone().try_lock_owned().ok()?;
        let job = self.build_immediate_job(&params);
        let job_id = job.id;
        let runner = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = runner.inner.jobs.create(job.clone()) {
                tracing::error!(%job_id, error = %e, "could not persist immediate job");
                return;
            }
            let deadline = runner.inner.clock.now_utc()
                + ChronoDuration::seconds(job.duration_sec as i64);
            runner.attempt_with_retries(job, deadline).await;
        });
        Some(job_id)
    }

    async fn run_when_available(&self, schedule_id: ScheduleId) {
        if self.inner.recording_lock.try_lock().is_err() {
            let mut queue = self.inner.queue.lock();
            if !queue.contains(&schedule_id) {
                queue.push(schedule_id);
                tracing::info!(%schedule_id, queued = queue.len(), "schedule waiting for recording lock");
            }
        }

        let _guard = self.inner.recording_lock.lock().await;
        self.inner.queue.lock().retain(|id| *id != schedule_id);
        *self.inner.current_schedule.lock() = Some(schedule_id);
        self.execute_schedule(schedule_id).await;
        *self.inner.current_schedule.lock() = None;
    }

    async fn execute_schedule(&self, schedule_id: ScheduleId) {
        tracing::info!(%schedule_id, "executing schedule");

        let Some(schedule) = self.inner.schedules.get(schedule_id.as_str()) else {
            tracing::error!(%schedule_id, "schedule not found");
            return;
        };
        if !schedule.enabled {
            tracing::warn!(%schedule_id, "schedule disabled, skipping");
            return;
        }
        let Some(meeting) = self.inner.meetings.get(schedule.meeting_id.as_str()) else {
            tracing::error!(%schedule_id, meeting_id = %schedule.meeting_id, "meeting not found");
            return;
        };

        let now = self.inner.clock.now_utc();
        let deadline = self.compute_deadline(&schedule, now);
        // The retry horizon: no attempt starts past the end of the window.
        let meeting_end_time =
            deadline.unwrap_or(now + ChronoDuration::seconds(schedule.duration_sec as i64));

        let job = self.build_job(&schedule, &meeting, deadline);
        if let Err(e) = self.inner.jobs.create(job.clone()) {
            tracing::error!(%schedule_id, error = %e, "could not persist job");
            return;
        }
        tracing::info!(job_id = %job.id, %schedule_id, "created job");

        self.attempt_with_retries(job, meeting_end_time).await;
    }

    /// Run the worker, retrying transient network failures with doubling
    /// backoff while the meeting window lasts.
    async fn attempt_with_retries(&self, mut job: Job, meeting_end_time: DateTime<Utc>) {
        let mut delay = retry::INITIAL_RETRY_DELAY;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.install_status_callback();
            let result = self.inner.worker.record(&job).await;

            let retryable = result.status == JobStatus::Failed
                && result
                    .error_message
                    .as_deref()
                    .map(retry::is_retryable)
                    .unwrap_or(false);
            let now = self.inner.clock.now_utc();
            let retry_fits = now + ChronoDuration::from_std(delay).unwrap_or_default()
                < meeting_end_time;

            if retryable && retry_fits {
                tracing::warn!(
                    job_id = %job.id,
                    attempt,
                    delay_sec = delay.as_secs(),
                    error = result.error_message.as_deref().unwrap_or(""),
                    "retryable network failure, backing off"
                );
                self.persist_attempt_failure(&job, &result);
                self.notify(NotifyEvent::Retrying {
                    job_id: job.id,
                    attempt,
                    next_delay_sec: delay.as_secs(),
                    error: result.error_message.clone().unwrap_or_default(),
                });

                tokio::time::sleep(delay).await;
                delay = retry::next_delay(delay);

                // The next attempt only records what is left of the window.
                let remaining =
                    (meeting_end_time - self.inner.clock.now_utc()).num_seconds();
                if remaining <= 0 {
                    self.persist_final(&job, &result);
                    return;
                }
                job.duration_sec = remaining as u64;
                let requeued = self
                    .inner
                    .jobs
                    .update_status(
                        &job.id,
                        JobStatus::Queued,
                        JobUpdate {
                            duration_sec: Some(job.duration_sec),
                            ..Default::default()
                        },
                    )
                    .unwrap_or(false);
                if !requeued {
                    tracing::error!(job_id = %job.id, "could not requeue job for retry");
                    self.persist_final(&job, &result);
                    return;
                }
                continue;
            }

            self.persist_final(&job, &result);
            self.spawn_upload_if_eligible(&job, &result);
            return;
        }
    }

    /// Status callback: persists non-terminal transitions with their
    /// timestamps, and posts the start notification on entry to
    /// `recording`. Terminal statuses are persisted by the runner once the
    /// retry decision is made.
    fn install_status_callback(&self) {
        let jobs = self.inner.jobs.clone();
        let clock = self.inner.clock.clone();
        let notify_tx = self.inner.notify_tx.clone();

        let callback: StatusCallback = Arc::new(move |job_id, status| {
            if status.is_terminal() {
                return;
            }
            let mut update = JobUpdate::default();
            match status {
                JobStatus::Starting => update.started_at = Some(clock.now_utc()),
                JobStatus::Recording => update.recording_started_at = Some(clock.now_utc()),
                _ => {}
            }
            match jobs.update_status(&job_id, status, update) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(%job_id, %status, "status update not applied"),
                Err(e) => tracing::error!(%job_id, %status, error = %e, "status update failed"),
            }
            if status == JobStatus::Recording {
                if let Err(e) = notify_tx.try_send(NotifyEvent::Started { job_id }) {
                    tracing::warn!(%job_id, error = %e, "start notification dropped");
                }
            }
        });
        self.inner.worker.set_status_callback(callback);
    }

    /// Record an attempt's failure details without a terminal status; the
    /// row is re-queued right after.
    fn persist_attempt_failure(&self, job: &Job, result: &RecordingResult) {
        let current = self
            .inner
            .jobs
            .get_by_job_id(job.id.as_str())
            .map(|row| row.status)
            .unwrap_or(JobStatus::Queued);
        let update = JobUpdate {
            error_code: result.error_code,
            error_message: result.error_message.clone(),
            joined_at: result.joined_at,
            diagnostics: result.diagnostics.clone(),
            ..Default::default()
        };
        if let Err(e) = self.inner.jobs.update_status(&job.id, current, update) {
            tracing::warn!(job_id = %job.id, error = %e, "could not persist attempt failure");
        }
    }

    /// Persist the final result and emit the matching lifecycle event.
    fn persist_final(&self, job: &Job, result: &RecordingResult) {
        let update = JobUpdate {
            error_code: result.error_code,
            error_message: result.error_message.clone(),
            end_reason: result.end_reason,
            joined_at: result.joined_at,
            recording_started_at: result.recording_started_at,
            recording_stopped_at: result.recording_stopped_at,
            completed_at: result.completed_at,
            recording: result.recording.clone(),
            diagnostics: result.diagnostics.clone(),
            ..Default::default()
        };
        match self.inner.jobs.update_status(&job.id, result.status, update) {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(job_id = %job.id, status = %result.status, "final status rejected")
            }
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "final status persist failed"),
        }
        tracing::info!(job_id = %job.id, status = %result.status, "job finished");

        let event = match result.status {
            JobStatus::Succeeded => NotifyEvent::Completed { job_id: job.id },
            JobStatus::Canceled => NotifyEvent::Canceled { job_id: job.id },
            _ => NotifyEvent::Failed { job_id: job.id },
        };
        self.notify(event);
    }

    /// Post-recording fan-out: the upload task acquires the upload lock, so
    /// uploads serialize among themselves while the next recording starts.
    fn spawn_upload_if_eligible(&self, job: &Job, result: &RecordingResult) {
        if result.status != JobStatus::Succeeded || !job.upload_enabled {
            return;
        }
        let Some(info) = result.recording.clone() else {
            return;
        };
        if !info.output_path.exists() {
            tracing::warn!(job_id = %job.id, "artifact missing, skipping upload");
            return;
        }
        if !self.inner.uploader.is_configured() {
            tracing::warn!(job_id = %job.id, "uploader not configured, skipping upload");
            return;
        }

        let runner = self.clone();
        let job_id = job.id;
        let metadata = UploadMetadata {
            title: format!("Recording - {}", job.meeting_code),
            description: format!("Recorded meeting - {job_id}"),
            privacy: job.upload_privacy.clone(),
        };
        tokio::spawn(async move {
            let _guard = runner.inner.upload_lock.lock().await;
            runner.upload(job_id, info.output_path, metadata).await;
        });
    }

    async fn upload(&self, job_id: JobId, path: std::path::PathBuf, metadata: UploadMetadata) {
        tracing::info!(%job_id, "starting upload");
        if let Ok(false) | Err(_) =
            self.inner
                .jobs
                .update_status(&job_id, JobStatus::Uploading, JobUpdate::default())
        {
            tracing::warn!(%job_id, "could not mark job uploading");
        }

        let progress_job = job_id;
        let outcome = self
            .inner
            .uploader
            .upload(
                &path,
                metadata,
                Some(Box::new(move |done, total| {
                    let percent = if total > 0 { done * 100 / total } else { 0 };
                    tracing::debug!(job_id = %progress_job, percent, "upload progress");
                })),
            )
            .await;

        match outcome {
            Ok(outcome) => {
                let update = JobUpdate {
                    upload_video_id: Some(outcome.video_id.clone()),
                    uploaded_at: Some(self.inner.clock.now_utc()),
                    ..Default::default()
                };
                match self.inner.jobs.update_status(&job_id, JobStatus::Succeeded, update) {
                    Ok(true) => {
                        tracing::info!(%job_id, video_url = %outcome.video_url, "upload succeeded")
                    }
                    Ok(false) | Err(_) => {
                        tracing::warn!(%job_id, "could not persist upload result")
                    }
                }
                self.notify(NotifyEvent::Uploaded { job_id, video_url: outcome.video_url });
            }
            Err(e) => {
                // Upload failure never regresses a succeeded recording.
                tracing::error!(%job_id, error = %e, "upload failed");
                let _ = self
                    .inner
                    .jobs
                    .update_status(&job_id, JobStatus::Succeeded, JobUpdate::default());
            }
        }
    }

    fn notify(&self, event: NotifyEvent) {
        if let Err(e) = self.inner.notify_tx.try_send(event) {
            tracing::warn!(error = %e, "notification dropped");
        }
    }

    /// Wall-clock end of the schedule's current window.
    ///
    /// Cron windows step the expression backwards from now in the
    /// configured zone; `last_run_at` alone would be stale for catch-up
    /// runs. One-shot windows start at `start_time`.
    fn compute_deadline(&self, schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if schedule.duration_mode != mrec_core::DurationMode::Fixed {
            return None;
        }
        let window_start = match schedule.schedule_type {
            ScheduleType::Cron => schedule
                .cron_expression
                .as_deref()
                .and_then(|expr| self.cron_window_start(expr, now)),
            ScheduleType::Once => schedule.start_time,
        }
        .or(schedule.last_run_at)
        .or(schedule.next_run_at)
        .unwrap_or(now);

        Some(window_start + ChronoDuration::seconds(schedule.duration_sec as i64))
    }

    fn cron_window_start(
        &self,
        posix_expr: &str,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let engine_expr = mrec_core::to_engine_expression(posix_expr).ok()?;
        let parsed = parse_engine_expression(&engine_expr).ok()?;
        let now_tz = now.with_timezone(&self.inner.tz);
        let horizon = now_tz - ChronoDuration::days(8);
        let mut last = None;
        for fire in parsed.after(&horizon) {
            if fire <= now_tz {
                last = Some(fire);
            } else {
                break;
            }
        }
        last.map(|dt| dt.with_timezone(&Utc))
    }

    /// Snapshot the schedule × meeting into a job row.
    fn build_job(
        &self,
        schedule: &Schedule,
        meeting: &Meeting,
        deadline: Option<DateTime<Utc>>,
    ) -> Job {
        // A full join-URL override takes the meeting code's place; the
        // provider adapters pass URLs through.
        let meeting_code = meeting
            .join_url
            .clone()
            .unwrap_or_else(|| schedule.effective_meeting_code(meeting).to_string());
        Job {
            id: JobId::new_random(),
            schedule_id: Some(schedule.id),
            provider: meeting.provider,
            meeting_code,
            display_name: schedule.effective_display_name(meeting).to_string(),
            base_url: meeting.site_base_url.clone(),
            password: meeting.password.clone(),
            guest_name: schedule.effective_guest_name(meeting).map(str::to_string),
            guest_email: schedule.effective_guest_email(meeting).map(str::to_string),
            duration_sec: schedule.duration_sec,
            lobby_wait_sec: schedule.lobby_wait_sec,
            resolution_w: schedule.resolution_w,
            resolution_h: schedule.resolution_h,
            layout_preset: schedule.layout_preset.clone(),
            duration_mode: schedule.duration_mode,
            auto_detect_mode: schedule.auto_detect_mode,
            min_duration_sec: schedule.min_duration_sec,
            stillness_timeout_sec: schedule.stillness_timeout_sec,
            dry_run: schedule.dry_run,
            deadline_at: deadline,
            status: JobStatus::Queued,
            error_code: None,
            error_message: None,
            end_reason: None,
            timestamps: JobTimestamps {
                created_at: Some(self.inner.clock.now_utc()),
                ..Default::default()
            },
            recording: None,
            diagnostics: None,
            upload_enabled: schedule.upload_enabled,
            upload_privacy: schedule.upload_privacy.clone(),
            upload_video_id: None,
            notify_message_id: None,
        }
    }

    fn build_immediate_job(&self, params: &RunImmediateParams) -> Job {
        Job {
            id: JobId::new_random(),
            schedule_id: None,
            provider: params.provider,
            meeting_code: params.meeting_code.clone(),
            display_name: params.display_name.clone(),
            base_url: params.base_url.clone(),
            password: params.password.clone(),
            guest_name: None,
            guest_email: None,
            duration_sec: params.duration_sec,
            lobby_wait_sec: params.lobby_wait_sec,
            resolution_w: 1920,
            resolution_h: 1080,
            layout_preset: "speaker".to_string(),
            duration_mode: mrec_core::DurationMode::Fixed,
            auto_detect_mode: None,
            min_duration_sec: None,
            stillness_timeout_sec: 180,
            dry_run: false,
            deadline_at: None,
            status: JobStatus::Queued,
            error_code: None,
            error_message: None,
            end_reason: None,
            timestamps: JobTimestamps {
                created_at: Some(self.inner.clock.now_utc()),
                ..Default::default()
            },
            recording: None,
            diagnostics: None,
            upload_enabled: false,
            upload_privacy: "unlisted".to_string(),
            upload_video_id: None,
            notify_message_id: None,
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
