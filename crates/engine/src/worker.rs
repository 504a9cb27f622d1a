// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The recording worker.
//!
//! One instance per process, one job at a time. Composes the capture
//! environment, browser, provider, muxer, and detection ensemble; drives
//! the provider join state machine; runs the main loop; and guarantees
//! that every external resource is torn down on every exit path.
//!
//! Control is flag-based: `request_cancel` and `request_finish` set flags
//! that the main loop observes at its next suspension point. There is no
//! pre-emptive termination of in-flight page calls, so the soonest cancel
//! latency is one check interval.

use chrono::{DateTime, Utc};
use mrec_adapters::{BrowserAdapter, BrowserLaunchSpec, BrowserSession, PagePort};
use mrec_capture::{CaptureFactory, CaptureHandles, Muxer, MuxerFactory, MuxerSpec};
use mrec_core::{
    AutoDetectMode, Clock, DetectionConfig, DiagnosticInfo, DurationMode, EndReason, ErrorCode,
    Job, JobId, JobStatus, RecordingInfo,
};
use mrec_detect::{default_detectors, DetectionOrchestrator, DetectionSink};
use mrec_providers::{provider_for, DiagnosticContext, JoinIdentity, MeetingProvider};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub recordings_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
    /// Muxer container extension (the resilient default is Matroska).
    pub container_ext: String,
    pub join_timeout: Duration,
    /// Main loop cadence; also the worst-case cancel latency.
    pub check_interval: Duration,
    /// No stall verdict before this much recording time has passed.
    pub stall_grace: Duration,
    /// Output not growing for this long fails the job.
    pub stall_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("./recordings"),
            diagnostics_dir: PathBuf::from("./diagnostics"),
            container_ext: "mkv".to_string(),
            join_timeout: Duration::from_secs(60),
            check_interval: Duration::from_secs(5),
            stall_grace: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(120),
        }
    }
}

/// Callback invoked on every status transition.
pub type StatusCallback = Arc<dyn Fn(JobId, JobStatus) + Send + Sync>;

/// Result of one recording run. No error escapes [`RecordingWorker::record`];
/// failures are mapped onto this.
#[derive(Debug, Clone)]
pub struct RecordingResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub recording: Option<RecordingInfo>,
    pub diagnostics: Option<DiagnosticInfo>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub end_reason: Option<EndReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub recording_started_at: Option<DateTime<Utc>>,
    pub recording_stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordingResult {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            recording: None,
            diagnostics: None,
            error_code: None,
            error_message: None,
            end_reason: None,
            started_at: None,
            joined_at: None,
            recording_started_at: None,
            recording_stopped_at: None,
            completed_at: None,
        }
    }
}

/// How the inner run ended, before mapping to a result.
enum RunError {
    Canceled,
    Fail {
        code: ErrorCode,
        message: String,
        end_reason: EndReason,
    },
}

impl RunError {
    fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        RunError::Fail { code, message: message.into(), end_reason: EndReason::Failed }
    }
}

struct RunSuccess {
    recording: Option<RecordingInfo>,
    end_reason: EndReason,
}

/// Resources that must be torn down whatever happens. Kept outside the run
/// function so the cleanup path can reach whatever was actually acquired.
#[derive(Default)]
struct RunResources {
    capture: Option<Box<dyn mrec_capture::CaptureEnvironment>>,
    session: Option<Box<dyn BrowserSession>>,
    muxer: Option<Box<dyn Muxer>>,
    page: Option<Arc<dyn PagePort>>,
    provider: Option<Arc<dyn MeetingProvider>>,
}

pub struct RecordingWorker<C: Clock> {
    clock: C,
    settings: WorkerSettings,
    browser: Arc<dyn BrowserAdapter>,
    capture: Arc<dyn CaptureFactory>,
    muxers: Arc<dyn MuxerFactory>,
    detection_config: DetectionConfig,
    detection_sink: Option<Arc<dyn DetectionSink>>,
    busy: AtomicBool,
    current_job: Mutex<Option<JobId>>,
    status: Mutex<JobStatus>,
    cancel_requested: AtomicBool,
    finish_requested: AtomicBool,
    status_callback: Mutex<Option<StatusCallback>>,
}

impl<C: Clock> RecordingWorker<C> {
    pub fn new(
        clock: C,
        settings: WorkerSettings,
        browser: Arc<dyn BrowserAdapter>,
        capture: Arc<dyn CaptureFactory>,
        muxers: Arc<dyn MuxerFactory>,
        detection_config: DetectionConfig,
    ) -> Self {
        Self {
            clock,
            settings,
            browser,
            capture,
            muxers,
            detection_config,
            detection_sink: None,
            busy: AtomicBool::new(false),
            current_job: Mutex::new(None),
            status: Mutex::new(JobStatus::Queued),
            cancel_requested: AtomicBool::new(false),
            finish_requested: AtomicBool::new(false),
            status_callback: Mutex::new(None),
        }
    }

    pub fn set_detection_sink(&mut self, sink: Arc<dyn DetectionSink>) {
        self.detection_sink = Some(sink);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn current_status(&self) -> JobStatus {
        *self.status.lock()
    }

    pub fn current_job(&self) -> Option<JobId> {
        *self.current_job.lock()
    }

    pub fn set_status_callback(&self, callback: StatusCallback) {
        *self.status_callback.lock() = Some(callback);
    }

    /// Ask the running job to abort. Observed at the next suspension point.
    pub fn request_cancel(&self) -> bool {
        if self.is_busy() {
            self.cancel_requested.store(true, Ordering::SeqCst);
            tracing::info!("cancel requested");
            true
        } else {
            false
        }
    }

    /// Ask the running job to stop early through the normal success path.
    pub fn request_finish(&self) -> bool {
        if self.is_busy() {
            self.finish_requested.store(true, Ordering::SeqCst);
            tracing::info!("finish requested");
            true
        } else {
            false
        }
    }

    fn update_status(&self, job_id: JobId, status: JobStatus) {
        *self.status.lock() = status;
        let callback = self.status_callback.lock().clone();
        if let Some(callback) = callback {
            callback(job_id, status);
        }
    }

    fn cancel_pending(&self) -> Result<(), RunError> {
        if self.cancel_requested.load(Ordering::SeqCst) {
            Err(RunError::Canceled)
        } else {
            Ok(())
        }
    }

    fn finish_pending(&self) -> bool {
        self.finish_requested.load(Ordering::SeqCst)
    }

    /// Execute a recording job end to end.
    pub async fn record(&self, job: &Job) -> RecordingResult {
        self.busy.store(true, Ordering::SeqCst);
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.finish_requested.store(false, Ordering::SeqCst);
        *self.current_job.lock() = Some(job.id);

        let mut result = RecordingResult::new(job.id);
        result.started_at = Some(self.clock.now_utc());
        self.update_status(job.id, JobStatus::Starting);

        let mut resources = RunResources::default();
        let outcome = self.run(job, &mut result, &mut resources).await;

        match outcome {
            Ok(success) => {
                result.status = JobStatus::Succeeded;
                result.recording = success.recording;
                result.end_reason = Some(success.end_reason);
                result.completed_at = Some(self.clock.now_utc());
                self.update_status(job.id, JobStatus::Succeeded);
                tracing::info!(job_id = %job.id, "recording succeeded");
            }
            Err(RunError::Canceled) => {
                result.status = JobStatus::Canceled;
                result.error_code = Some(ErrorCode::Canceled);
                result.error_message = Some("Job was cancelled".to_string());
                result.end_reason = Some(EndReason::Canceled);
                result.completed_at = Some(self.clock.now_utc());
                self.update_status(job.id, JobStatus::Canceled);
                tracing::info!(job_id = %job.id, "recording cancelled");
                self.collect_diagnostics(job, &mut result, &resources).await;
            }
            Err(RunError::Fail { code, message, end_reason }) => {
                result.status = JobStatus::Failed;
                result.error_code = Some(code);
                result.error_message = Some(message.clone());
                result.end_reason = Some(end_reason);
                result.completed_at = Some(self.clock.now_utc());
                self.update_status(job.id, JobStatus::Failed);
                tracing::error!(job_id = %job.id, %code, %message, "recording failed");
                self.collect_diagnostics(job, &mut result, &resources).await;
            }
        }

        self.cleanup(&mut resources).await;
        *self.current_job.lock() = None;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn run(
        &self,
        job: &Job,
        result: &mut RecordingResult,
        resources: &mut RunResources,
    ) -> Result<RunSuccess, RunError> {
        let provider = provider_for(job.provider);
        resources.provider = Some(provider.clone());
        tracing::info!(job_id = %job.id, provider = %provider.name(), "starting recording job");

        // Capture environment first; everything else runs inside it.
        let mut capture = self.capture.create(job.resolution_w, job.resolution_h);
        let handles = match capture.start().await {
            Ok(handles) => handles,
            Err(e) => {
                resources.capture = Some(capture);
                return Err(RunError::fail(ErrorCode::VirtualEnvError, e.to_string()));
            }
        };
        resources.capture = Some(capture);
        self.cancel_pending()?;

        let session = self
            .browser
            .launch(BrowserLaunchSpec {
                width: job.resolution_w,
                height: job.resolution_h,
                env: handles.env.clone(),
            })
            .await
            .map_err(|e| RunError::fail(ErrorCode::BrowserCrashed, e.to_string()))?;
        let page = session.page();
        resources.session = Some(session);
        resources.page = Some(page.clone());
        self.cancel_pending()?;

        self.update_status(job.id, JobStatus::Joining);
        let join_url = provider
            .build_join_url(&job.meeting_code, job.base_url.as_deref())
            .map_err(|e| RunError::fail(ErrorCode::InvalidUrl, e.to_string()))?;
        tracing::info!(%join_url, "navigating to meeting");
        page.goto(&join_url)
            .await
            .map_err(|e| RunError::fail(ErrorCode::InternalError, e.to_string()))?;

        let identity = JoinIdentity {
            display_name: job.display_name.clone(),
            password: job.password.clone(),
            guest_name: job.guest_name.clone(),
            guest_email: job.guest_email.clone(),
        };
        provider
            .prejoin(page.as_ref(), &identity)
            .await
            .map_err(|e| RunError::fail(ErrorCode::JoinFailed, e.to_string()))?;
        self.cancel_pending()?;

        provider
            .click_join(page.as_ref())
            .await
            .map_err(|e| RunError::fail(ErrorCode::JoinFailed, e.to_string()))?;

        let join = provider
            .wait_until_joined(page.as_ref(), self.settings.join_timeout, job.password.as_deref())
            .await
            .map_err(|e| RunError::fail(ErrorCode::JoinFailed, e.to_string()))?;

        if join.in_lobby {
            self.update_status(job.id, JobStatus::WaitingLobby);
            self.cancel_pending()?;
            let admitted = provider
                .wait_in_lobby(page.as_ref(), Duration::from_secs(job.lobby_wait_sec))
                .await;
            self.cancel_pending()?;
            if !admitted {
                return Err(RunError::fail(
                    ErrorCode::LobbyTimeout,
                    "Lobby timeout - not admitted to meeting",
                ));
            }
        } else if !join.success {
            return Err(RunError::Fail {
                code: join.error_code.unwrap_or(ErrorCode::JoinFailed),
                message: join
                    .error_message
                    .unwrap_or_else(|| "failed to join meeting".to_string()),
                end_reason: EndReason::Failed,
            });
        }

        result.joined_at = Some(self.clock.now_utc());
        self.cancel_pending()?;

        if !provider.set_layout(page.as_ref(), &job.layout_preset).await {
            tracing::debug!("layout not applied");
        }

        // Fixed-duration catch-up runs record only the remaining window.
        let mut max_duration = Duration::from_secs(job.duration_sec);
        if job.duration_mode == DurationMode::Fixed {
            if let Some(deadline) = job.deadline_at {
                let remaining = (deadline - self.clock.now_utc()).num_seconds();
                if remaining <= 0 {
                    return Err(RunError::Fail {
                        code: ErrorCode::MeetingEnded,
                        message: "meeting window already ended".to_string(),
                        end_reason: EndReason::Timeout,
                    });
                }
                max_duration = max_duration.min(Duration::from_secs(remaining as u64));
            }
        }

        if self.finish_pending() {
            tracing::info!("finish requested before recording started");
            return Ok(RunSuccess { recording: None, end_reason: EndReason::Completed });
        }

        self.update_status(job.id, JobStatus::Recording);
        result.recording_started_at = Some(self.clock.now_utc());

        let mut muxer = self.muxers.create(self.muxer_spec(job, &handles));
        if let Err(e) = muxer.start().await {
            resources.muxer = Some(muxer);
            return Err(RunError::fail(ErrorCode::RecordingStartFailed, e.to_string()));
        }
        resources.muxer = Some(muxer);

        let mut orchestrator = self.build_orchestrator(job, &handles);
        if let Some(orchestrator) = orchestrator.as_mut() {
            orchestrator.setup_all(page.as_ref()).await;
        }

        let end_reason = self
            .main_loop(
                job,
                page.as_ref(),
                provider.as_ref(),
                resources,
                orchestrator.as_mut(),
                max_duration,
            )
            .await?;

        self.update_status(job.id, JobStatus::Finalizing);
        let info = match resources.muxer.as_mut() {
            Some(muxer) => muxer
                .stop()
                .await
                .map_err(|e| RunError::fail(ErrorCode::FfmpegError, e.to_string()))?,
            None => return Err(RunError::fail(ErrorCode::InternalError, "muxer missing")),
        };
        result.recording_stopped_at = Some(self.clock.now_utc());

        Ok(RunSuccess { recording: Some(info), end_reason })
    }

    /// The recording main loop. Every iteration is a suspension point where
    /// both control flags are honored.
    async fn main_loop(
        &self,
        job: &Job,
        page: &dyn PagePort,
        provider: &dyn MeetingProvider,
        resources: &mut RunResources,
        mut orchestrator: Option<&mut DetectionOrchestrator>,
        max_duration: Duration,
    ) -> Result<EndReason, RunError> {
        let started = tokio::time::Instant::now();
        // Immediate auto-detection votes from the first poll; otherwise the
        // effective minimum suppresses every end signal but cancellation.
        let effective_min = match job.auto_detect_mode {
            Some(AutoDetectMode::Immediate) => Duration::ZERO,
            _ => Duration::from_secs(job.effective_min_duration_sec()),
        };
        let mut last_size: Option<u64> = None;
        let mut last_growth = started;

        loop {
            tokio::time::sleep(self.settings.check_interval).await;
            let elapsed = started.elapsed();

            if self.finish_pending() {
                tracing::info!("finish requested, stopping recording");
                return Ok(EndReason::Completed);
            }

            let muxer = resources
                .muxer
                .as_mut()
                .ok_or_else(|| RunError::fail(ErrorCode::InternalError, "muxer missing"))?;

            if let Some(code) = muxer.try_wait().await {
                return Err(RunError::fail(
                    ErrorCode::FfmpegError,
                    format!("muxer exited with code {code}"),
                ));
            }

            if elapsed >= self.settings.stall_grace {
                if let Some(size) = muxer.output_size().await {
                    if last_size != Some(size) {
                        last_size = Some(size);
                        last_growth = tokio::time::Instant::now();
                    } else if last_growth.elapsed() >= self.settings.stall_timeout {
                        return Err(RunError::fail(
                            ErrorCode::FfmpegError,
                            format!(
                                "output stalled for {}s",
                                last_growth.elapsed().as_secs()
                            ),
                        ));
                    }
                }
            }

            if elapsed >= max_duration {
                tracing::info!(elapsed_sec = elapsed.as_secs(), "duration reached");
                return Ok(EndReason::Completed);
            }

            self.cancel_pending()?;

            // Below the effective minimum only cancellation is honored.
            if elapsed < effective_min {
                continue;
            }
            let ended = match orchestrator.as_mut() {
                Some(orchestrator) => orchestrator.check_all(page).await.0,
                None => provider.detect_meeting_end(page).await,
            };
            if ended {
                tracing::info!("meeting end detected");
                return Ok(EndReason::AutoDetected);
            }
        }
    }

    fn muxer_spec(&self, job: &Job, handles: &CaptureHandles) -> MuxerSpec {
        let stamp = self.clock.now_utc().format("%Y%m%d_%H%M%S");
        let output_dir = self
            .settings
            .recordings_dir
            .join(format!("{stamp}_{}", job.id));
        MuxerSpec {
            output_path: output_dir.join(format!(
                "recording_{}.{}",
                job.id, self.settings.container_ext
            )),
            display: handles.display.clone(),
            audio_source: handles
                .audio_available
                .then(|| handles.monitor_source.clone()),
            width: job.resolution_w,
            height: job.resolution_h,
            stderr_log: self
                .settings
                .diagnostics_dir
                .join(job.id.as_str())
                .join("muxer.log"),
            env: handles.env.clone(),
        }
    }

    /// Auto mode gets the full ensemble, with the freeze probe armed and
    /// its window taken from the job. Fixed mode keeps the provider's
    /// legacy single-signal probe instead.
    fn build_orchestrator(
        &self,
        job: &Job,
        handles: &CaptureHandles,
    ) -> Option<DetectionOrchestrator> {
        if job.duration_mode != DurationMode::Auto {
            return None;
        }
        let mut config = self.detection_config.clone();
        config.screen_freeze_enabled = true;
        config.screen_freeze_timeout_sec = job.stillness_timeout_sec;

        let audio_source = (config.audio_silence_enabled && handles.audio_available)
            .then(|| handles.monitor_source.clone());

        let mut orchestrator = DetectionOrchestrator::new(config.clone());
        for detector in default_detectors(&config, audio_source) {
            orchestrator.register(detector);
        }
        orchestrator.set_dry_run(job.dry_run);
        orchestrator.set_job(job.id);
        if let Some(sink) = &self.detection_sink {
            orchestrator.set_sink(sink.clone());
        }
        Some(orchestrator)
    }

    async fn collect_diagnostics(
        &self,
        job: &Job,
        result: &mut RecordingResult,
        resources: &RunResources,
    ) {
        let (Some(page), Some(provider)) = (&resources.page, &resources.provider) else {
            return;
        };
        let dir = self.settings.diagnostics_dir.join(job.id.as_str());
        let context = DiagnosticContext {
            error_code: result.error_code,
            error_message: result.error_message.clone(),
        };
        let info = provider
            .collect_diagnostics(page.as_ref(), &dir, &context)
            .await;
        result.diagnostics = Some(info);
    }

    /// Teardown in order: muxer, browser, capture environment. Each step is
    /// logged on failure; none propagates.
    async fn cleanup(&self, resources: &mut RunResources) {
        if let Some(mut muxer) = resources.muxer.take() {
            if muxer.is_recording() {
                if let Err(e) = muxer.stop().await {
                    tracing::warn!(error = %e, "error stopping muxer during cleanup");
                }
            }
        }
        if let Some(mut session) = resources.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "error closing browser");
            }
        }
        if let Some(mut capture) = resources.capture.take() {
            capture.stop().await;
        }
        resources.page = None;
        resources.provider = None;
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
