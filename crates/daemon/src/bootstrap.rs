// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Ordering matters here: the orphan sweep rewrites every job a previous
//! process left non-terminal *before* the scheduler arms a single trigger,
//! so a catch-up fire can never race a stale row.

use crate::settings::Settings;
use fs2::FileExt;
use mrec_adapters::{CdpBrowserAdapter, DesktopNotifier};
use mrec_capture::{FfmpegMuxerFactory, XvfbCaptureFactory};
use mrec_core::SystemClock;
use mrec_engine::notifier_task::NOTIFY_QUEUE_DEPTH;
use mrec_engine::{
    spawn_notifier_task, JobRunner, RecordingWorker, Scheduler, StoreDetectionSink,
};
use mrec_storage::{
    DetectionLogRepository, JobRepository, MeetingRepository, ScheduleRepository, Store,
};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] mrec_storage::StorageError),
    #[error("another instance holds the daemon lock at {0}")]
    AlreadyRunning(PathBuf),
}

/// Install the tracing subscriber: env-filtered, daily-rotated file output
/// plus stderr. The returned guard must stay alive for the process.
pub fn init_tracing(logs_dir: &std::path::Path) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;
    let file_appender = tracing_appender::rolling::daily(logs_dir, "mrecd.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info")
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(guard)
}

/// Run the daemon until ctrl-c / SIGTERM.
pub async fn run(settings: Settings) -> Result<(), DaemonError> {
    let state_dir = settings.state_dir();
    std::fs::create_dir_all(&state_dir)?;
    std::fs::create_dir_all(&settings.recordings_dir)?;
    std::fs::create_dir_all(&settings.diagnostics_dir)?;

    // One daemon per state dir.
    let lock_path = state_dir.join("mrecd.lock");
    let lock_file = File::create(&lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(DaemonError::AlreadyRunning(lock_path));
    }

    let tz = settings.timezone();
    let clock = SystemClock;
    tracing::info!(tz = %tz, state_dir = %state_dir.display(), "mrecd starting");

    let store = Store::open(&state_dir.join("store"))?;
    let jobs = JobRepository::new(store.clone());
    let schedules = ScheduleRepository::new(store.clone());
    let meetings = MeetingRepository::new(store.clone());
    let detections = DetectionLogRepository::new(store.clone());

    // Any job a previous process left non-terminal is failed now, before
    // the scheduler can arm anything.
    let swept = jobs.fail_orphans(chrono::Utc::now())?;
    if !swept.is_empty() {
        tracing::warn!(count = swept.len(), "orphaned jobs failed on startup");
    }

    let shutdown = CancellationToken::new();
    let (notify_tx, notify_rx) = tokio::sync::mpsc::channel(NOTIFY_QUEUE_DEPTH);
    let notifier_task = spawn_notifier_task(
        notify_rx,
        DesktopNotifier::new(),
        jobs.clone(),
        shutdown.clone(),
    );

    let mut worker = RecordingWorker::new(
        clock.clone(),
        settings.worker_settings(),
        Arc::new(CdpBrowserAdapter::new(settings.browser_binary.clone())),
        Arc::new(XvfbCaptureFactory::new(settings.xvfb_config())),
        Arc::new(FfmpegMuxerFactory::new(settings.muxer_settings())),
        settings.detection.clone(),
    );
    worker.set_detection_sink(Arc::new(StoreDetectionSink::new(detections)));
    let worker = Arc::new(worker);

    let runner = JobRunner::new(
        clock.clone(),
        tz,
        worker,
        jobs,
        schedules.clone(),
        meetings,
        Arc::new(NullUploader),
        notify_tx,
    );

    let fire_runner = runner.clone();
    let scheduler = Scheduler::new(
        clock,
        tz,
        schedules,
        Arc::new(move |schedule_id| {
            fire_runner.queue_schedule(schedule_id);
        }),
    );
    let scheduler_task = scheduler.start(shutdown.clone());
    scheduler.load_and_arm_all();

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received");
    shutdown.cancel();
    let _ = scheduler_task.await;
    let _ = notifier_task.await;

    store.checkpoint()?;
    let _ = lock_file.unlock();
    tracing::info!("mrecd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

/// Uploads are disabled until a hosting adapter is wired in; the port stays
/// in place so enabling one is a construction-site change only.
struct NullUploader;

#[async_trait::async_trait]
impl mrec_adapters::Uploader for NullUploader {
    fn is_configured(&self) -> bool {
        false
    }

    async fn upload(
        &self,
        _path: &std::path::Path,
        _metadata: mrec_adapters::UploadMetadata,
        _progress: Option<mrec_adapters::upload::ProgressFn>,
    ) -> Result<mrec_adapters::UploadOutcome, mrec_adapters::UploadError> {
        Err(mrec_adapters::UploadError::NotConfigured)
    }
}
