// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The screen+audio muxer process.
//!
//! ffmpeg grabs the virtual display (x11grab) and the sink monitor (pulse)
//! into a Matroska file, which stays playable when the process dies
//! mid-write. Audio timestamps are taken from the wall clock and resampled
//! to absorb drift from the virtual sink. Stderr goes straight to the
//! per-job log file; holding a pipe the parent never drains has been
//! observed to block ffmpeg.

use crate::CaptureError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mrec_core::RecordingInfo;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

/// Everything needed to record one job.
#[derive(Debug, Clone)]
pub struct MuxerSpec {
    pub output_path: PathBuf,
    pub display: String,
    /// Pulse monitor source; `None` records a silent audio track.
    pub audio_source: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Muxer stderr is appended here (`muxer.log` in the diagnostic dir).
    pub stderr_log: PathBuf,
    pub env: HashMap<String, String>,
}

/// Encoder and shutdown knobs.
#[derive(Debug, Clone)]
pub struct MuxerSettings {
    pub framerate: u32,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
    pub thread_queue_size: u32,
    pub use_wallclock_timestamps: bool,
    pub audio_filter: Option<String>,
    /// How long `start` watches for an immediate exit.
    pub start_settle: Duration,
    /// Wait after writing 'q' before escalating.
    pub stop_grace: Duration,
    pub sigint_timeout: Duration,
    pub sigterm_timeout: Duration,
}

impl Default for MuxerSettings {
    fn default() -> Self {
        Self {
            framerate: 30,
            preset: "ultrafast".to_string(),
            crf: 23,
            audio_bitrate: "128k".to_string(),
            thread_queue_size: 1024,
            use_wallclock_timestamps: true,
            audio_filter: Some("aresample=async=1:first_pts=0".to_string()),
            start_settle: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            sigint_timeout: Duration::from_secs(8),
            sigterm_timeout: Duration::from_secs(5),
        }
    }
}

/// A muxer bound to one output file.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Launch the process. Fails fast when it exits within the settle
    /// window, with stderr already captured in the log file.
    async fn start(&mut self) -> Result<(), CaptureError>;

    /// Graceful shutdown escalation, then artifact metadata.
    async fn stop(&mut self) -> Result<RecordingInfo, CaptureError>;

    fn is_recording(&self) -> bool;

    /// Exit code if the process has died on its own.
    async fn try_wait(&mut self) -> Option<i32>;

    /// Current artifact size, for the worker's stall check.
    async fn output_size(&self) -> Option<u64>;

    fn output_path(&self) -> &Path;
}

/// Creates muxers, one per job.
pub trait MuxerFactory: Send + Sync + 'static {
    fn create(&self, spec: MuxerSpec) -> Box<dyn Muxer>;
}

/// Production factory.
#[derive(Clone, Default)]
pub struct FfmpegMuxerFactory {
    settings: MuxerSettings,
}

impl FfmpegMuxerFactory {
    pub fn new(settings: MuxerSettings) -> Self {
        Self { settings }
    }
}

impl MuxerFactory for FfmpegMuxerFactory {
    fn create(&self, spec: MuxerSpec) -> Box<dyn Muxer> {
        Box::new(FfmpegMuxer {
            settings: self.settings.clone(),
            spec,
            process: None,
            start_time: None,
        })
    }
}

struct FfmpegMuxer {
    settings: MuxerSettings,
    spec: MuxerSpec,
    process: Option<Child>,
    start_time: Option<DateTime<Utc>>,
}

impl FfmpegMuxer {
    fn build_args(&self) -> Vec<String> {
        let s = &self.settings;
        let mut args: Vec<String> = vec!["-y".into()];

        // Video input: X11 grab.
        args.extend([
            "-f".into(),
            "x11grab".into(),
            "-video_size".into(),
            format!("{}x{}", self.spec.width, self.spec.height),
            "-framerate".into(),
            s.framerate.to_string(),
            "-thread_queue_size".into(),
            s.thread_queue_size.to_string(),
            "-i".into(),
            self.spec.display.clone(),
        ]);

        // Audio input: pulse monitor, or silence when the stack is down.
        match &self.spec.audio_source {
            Some(source) => {
                args.extend(["-f".into(), "pulse".into()]);
                if s.use_wallclock_timestamps {
                    args.extend(["-use_wallclock_as_timestamps".into(), "1".into()]);
                }
                args.extend([
                    "-thread_queue_size".into(),
                    s.thread_queue_size.to_string(),
                    "-i".into(),
                    source.clone(),
                ]);
                if let Some(filter) = &s.audio_filter {
                    args.extend(["-af".into(), filter.clone()]);
                }
            }
            None => {
                args.extend([
                    "-f".into(),
                    "lavfi".into(),
                    "-i".into(),
                    "anullsrc=r=44100:cl=stereo".into(),
                ]);
            }
        }

        // Encoding: H.264 + AAC, constant frame rate on the output side.
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            s.preset.clone(),
            "-crf".into(),
            s.crf.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-r".into(),
            s.framerate.to_string(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            s.audio_bitrate.clone(),
        ]);

        if self.spec.audio_source.is_none() {
            args.push("-shortest".into());
        }

        args.push(self.spec.output_path.display().to_string());
        args
    }

    fn stderr_tail(&self) -> String {
        match std::fs::read_to_string(&self.spec.stderr_log) {
            Ok(content) => {
                let tail: Vec<&str> = content.lines().rev().take(12).collect();
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            }
            Err(_) => String::new(),
        }
    }

    async fn probe_duration(&self) -> Option<f64> {
        let output = Command::new("ffprobe")
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(&self.spec.output_path)
            .stdin(Stdio::null())
            .output()
            .await;
        match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().parse().ok()
            }
            Ok(_) | Err(_) => {
                tracing::warn!("could not probe artifact duration, using wall clock");
                None
            }
        }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn start(&mut self) -> Result<(), CaptureError> {
        if self.process.is_some() {
            return Err(CaptureError::StartFailed("already recording".to_string()));
        }
        if let Some(parent) = self.spec.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.spec.stderr_log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stderr_log = std::fs::File::create(&self.spec.stderr_log)?;

        let args = self.build_args();
        tracing::info!(output = %self.spec.output_path.display(), "starting muxer");
        tracing::debug!(args = %args.join(" "), "muxer command");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_log))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::StartFailed(format!("ffmpeg spawn failed: {e}")))?;

        tokio::time::sleep(self.settings.start_settle).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(CaptureError::StartFailed(format!(
                "ffmpeg exited immediately ({status}): {}",
                self.stderr_tail()
            )));
        }

        self.start_time = Some(Utc::now());
        self.process = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<RecordingInfo, CaptureError> {
        let mut child = self
            .process
            .take()
            .ok_or_else(|| CaptureError::Muxer("not recording".to_string()))?;
        let end_time = Utc::now();

        // Escalation: 'q' on stdin, SIGINT, SIGTERM, SIGKILL. Each step has
        // its own timeout so shutdown never blocks indefinitely.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
            drop(stdin);
        }
        let pid = child.id().map(|pid| nix::unistd::Pid::from_raw(pid as i32));
        let mut stopped =
            tokio::time::timeout(self.settings.stop_grace, child.wait()).await.is_ok();

        for (signal, timeout) in [
            (nix::sys::signal::Signal::SIGINT, self.settings.sigint_timeout),
            (nix::sys::signal::Signal::SIGTERM, self.settings.sigterm_timeout),
        ] {
            if stopped {
                break;
            }
            tracing::warn!(?signal, "muxer still running, escalating");
            if let Some(pid) = pid {
                let _ = nix::sys::signal::kill(pid, signal);
            }
            stopped = tokio::time::timeout(timeout, child.wait()).await.is_ok();
        }
        if !stopped {
            tracing::warn!("muxer ignored signals, killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        let start_time = self.start_time.take().unwrap_or(end_time);
        if !self.spec.output_path.exists() {
            return Err(CaptureError::Muxer(format!(
                "output file not created: {}",
                self.spec.output_path.display()
            )));
        }
        let file_size = std::fs::metadata(&self.spec.output_path)?.len();
        let wall_duration = (end_time - start_time).num_milliseconds() as f64 / 1000.0;
        let duration_sec = self.probe_duration().await.unwrap_or(wall_duration);

        let info = RecordingInfo {
            output_path: self.spec.output_path.clone(),
            file_size,
            duration_sec,
            start_time,
            end_time,
        };
        tracing::info!(
            output = %info.output_path.display(),
            size_mb = format!("{:.1}", info.file_size as f64 / 1024.0 / 1024.0),
            duration_sec = format!("{:.1}", info.duration_sec),
            "muxer stopped"
        );
        Ok(info)
    }

    fn is_recording(&self) -> bool {
        self.process.is_some()
    }

    async fn try_wait(&mut self) -> Option<i32> {
        match self.process.as_mut()?.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
            _ => None,
        }
    }

    async fn output_size(&self) -> Option<u64> {
        tokio::fs::metadata(&self.spec.output_path)
            .await
            .ok()
            .map(|m| m.len())
    }

    fn output_path(&self) -> &Path {
        &self.spec.output_path
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct FakeMuxerBehavior {
        fail_start: Option<String>,
        /// Simulated process exit after this many size polls.
        exit_after_polls: Option<(u32, i32)>,
        /// Output stops growing after this many size polls.
        stall_after_polls: Option<u32>,
    }

    #[derive(Debug)]
    struct FakeMuxerState {
        behavior: FakeMuxerBehavior,
        spec: Option<MuxerSpec>,
        recording: bool,
        polls: u32,
        size: u64,
        stop_count: u32,
    }

    /// Shared inspection/controls for the muxers a [`FakeMuxerFactory`]
    /// hands out.
    #[derive(Clone)]
    pub struct FakeMuxerHandle {
        state: Arc<Mutex<FakeMuxerState>>,
    }

    impl FakeMuxerHandle {
        pub fn spec(&self) -> Option<MuxerSpec> {
            self.state.lock().spec.clone()
        }

        pub fn stop_count(&self) -> u32 {
            self.state.lock().stop_count
        }

        pub fn is_recording(&self) -> bool {
            self.state.lock().recording
        }
    }

    /// Fake muxer factory: deterministic sizes, scripted failure modes, and
    /// a real artifact file on disk so path assertions hold.
    #[derive(Clone)]
    pub struct FakeMuxerFactory {
        state: Arc<Mutex<FakeMuxerState>>,
    }

    impl Default for FakeMuxerFactory {
        fn default() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeMuxerState {
                    behavior: FakeMuxerBehavior {
                        fail_start: None,
                        exit_after_polls: None,
                        stall_after_polls: None,
                    },
                    spec: None,
                    recording: false,
                    polls: 0,
                    size: 0,
                    stop_count: 0,
                })),
            }
        }
    }

    impl FakeMuxerFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_start(self, message: impl Into<String>) -> Self {
            self.state.lock().behavior.fail_start = Some(message.into());
            self
        }

        pub fn exit_after_polls(self, polls: u32, code: i32) -> Self {
            self.state.lock().behavior.exit_after_polls = Some((polls, code));
            self
        }

        pub fn stall_after_polls(self, polls: u32) -> Self {
            self.state.lock().behavior.stall_after_polls = Some(polls);
            self
        }

        pub fn handle(&self) -> FakeMuxerHandle {
            FakeMuxerHandle { state: self.state.clone() }
        }
    }

    impl MuxerFactory for FakeMuxerFactory {
        fn create(&self, spec: MuxerSpec) -> Box<dyn Muxer> {
            {
                let mut state = self.state.lock();
                state.spec = Some(spec.clone());
                state.polls = 0;
                state.size = 0;
            }
            Box::new(FakeMuxer { state: self.state.clone(), spec })
        }
    }

    struct FakeMuxer {
        state: Arc<Mutex<FakeMuxerState>>,
        spec: MuxerSpec,
    }

    #[async_trait]
    impl Muxer for FakeMuxer {
        async fn start(&mut self) -> Result<(), CaptureError> {
            let mut state = self.state.lock();
            if let Some(msg) = &state.behavior.fail_start {
                return Err(CaptureError::StartFailed(msg.clone()));
            }
            if let Some(parent) = self.spec.output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.spec.output_path, vec![0u8; 1024])?;
            state.recording = true;
            state.size = 1024;
            Ok(())
        }

        async fn stop(&mut self) -> Result<RecordingInfo, CaptureError> {
            let mut state = self.state.lock();
            if !state.recording {
                return Err(CaptureError::Muxer("not recording".to_string()));
            }
            state.recording = false;
            state.stop_count += 1;
            let now = Utc::now();
            Ok(RecordingInfo {
                output_path: self.spec.output_path.clone(),
                file_size: state.size.max(1024),
                duration_sec: (state.polls.max(1) as f64) * 5.0,
                start_time: now,
                end_time: now,
            })
        }

        fn is_recording(&self) -> bool {
            self.state.lock().recording
        }

        async fn try_wait(&mut self) -> Option<i32> {
            let state = self.state.lock();
            match state.behavior.exit_after_polls {
                Some((after, code)) if state.polls >= after => Some(code),
                _ => None,
            }
        }

        async fn output_size(&self) -> Option<u64> {
            let mut state = self.state.lock();
            state.polls += 1;
            let stalled = matches!(
                state.behavior.stall_after_polls,
                Some(after) if state.polls > after
            );
            if !stalled && state.recording {
                state.size += 4096;
            }
            Some(state.size)
        }

        fn output_path(&self) -> &Path {
            &self.spec.output_path
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMuxerFactory, FakeMuxerHandle};

#[cfg(test)]
#[path = "muxer_tests.rs"]
mod tests;
