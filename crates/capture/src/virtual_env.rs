// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Virtual display and audio sink management.
//!
//! The display server is started fresh for every recording; state
//! accumulated in a long-lived Xvfb has been observed to stall the muxer's
//! screen grab. The audio sink is shared across runs, but a per-run silent
//! keepalive stream is required: the audio server suspends idle sinks,
//! which stalls muxer audio capture.

use crate::{child_env, CaptureError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

const XVFB_SETTLE: Duration = Duration::from_secs(1);
const KEEPALIVE_SETTLE: Duration = Duration::from_millis(500);
const PACTL_TIMEOUT: Duration = Duration::from_secs(5);

/// What a started capture environment exposes to the rest of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureHandles {
    /// X display, e.g. `":99"`.
    pub display: String,
    pub sink_name: String,
    /// Monitor source the muxer records from, `<sink>.monitor`.
    pub monitor_source: String,
    /// Whether the audio stack actually came up; when false the muxer
    /// substitutes a silent track.
    pub audio_available: bool,
    /// Environment for child processes (browser, muxer).
    pub env: HashMap<String, String>,
}

/// One job's capture environment.
#[async_trait]
pub trait CaptureEnvironment: Send + Sync {
    async fn start(&mut self) -> Result<CaptureHandles, CaptureError>;

    /// Teardown never fails; each step is logged on error.
    async fn stop(&mut self);
}

/// Creates capture environments, one per job.
pub trait CaptureFactory: Send + Sync + 'static {
    fn create(&self, width: u32, height: u32) -> Box<dyn CaptureEnvironment>;
}

/// Configuration for the Xvfb + PulseAudio environment.
#[derive(Debug, Clone)]
pub struct XvfbConfig {
    pub display_num: u32,
    pub depth: u32,
    pub sink_name: String,
}

impl Default for XvfbConfig {
    fn default() -> Self {
        Self {
            display_num: 99,
            depth: 24,
            sink_name: "virtual_speaker".to_string(),
        }
    }
}

/// Production factory.
#[derive(Clone, Default)]
pub struct XvfbCaptureFactory {
    config: XvfbConfig,
}

impl XvfbCaptureFactory {
    pub fn new(config: XvfbConfig) -> Self {
        Self { config }
    }
}

impl CaptureFactory for XvfbCaptureFactory {
    fn create(&self, width: u32, height: u32) -> Box<dyn CaptureEnvironment> {
        Box::new(XvfbEnvironment {
            config: self.config.clone(),
            width,
            height,
            xvfb: None,
            keepalive: None,
        })
    }
}

struct XvfbEnvironment {
    config: XvfbConfig,
    width: u32,
    height: u32,
    xvfb: Option<Child>,
    keepalive: Option<Child>,
}

impl XvfbEnvironment {
    fn display(&self) -> String {
        format!(":{}", self.config.display_num)
    }

    async fn start_xvfb(&mut self) -> Result<(), CaptureError> {
        let display_name = self.display();

        // Remove a stale lock left by a crashed server, then make sure no
        // previous display process is still holding the number.
        let lock_file = format!("/tmp/.X{}-lock", self.config.display_num);
        if std::path::Path::new(&lock_file).exists() {
            tracing::warn!(%lock_file, "removing stale display lock");
            let _ = std::fs::remove_file(&lock_file);
        }
        let _ = run_quiet(
            Command::new("pkill").arg("-f").arg(format!("Xvfb {display_name}")),
            PACTL_TIMEOUT,
        )
        .await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let screen = format!("{}x{}x{}", self.width, self.height, self.config.depth);
        let mut child = Command::new("Xvfb")
            .arg(&display_name)
            .args(["-screen", "0", &screen])
            .arg("-ac")
            .args(["+extension", "GLX"])
            .args(["+extension", "RANDR"])
            .args(["+extension", "RENDER"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::VirtualEnv(format!("Xvfb spawn failed: {e}")))?;

        tokio::time::sleep(XVFB_SETTLE).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(CaptureError::VirtualEnv(format!(
                "Xvfb exited immediately ({status})"
            )));
        }

        tracing::info!(%display_name, %screen, "virtual display started");
        self.xvfb = Some(child);
        Ok(())
    }

    /// Best-effort audio sink setup. A missing audio stack downgrades to a
    /// silent track rather than failing the job.
    async fn setup_audio(&mut self) -> bool {
        let sink = self.config.sink_name.clone();

        let info = run_capture(Command::new("pactl").arg("info"), PACTL_TIMEOUT).await;
        let info = match info {
            Some((true, stdout)) => stdout,
            _ => {
                tracing::warn!("audio server not running, recording will use a silent track");
                return false;
            }
        };
        if info.contains("PipeWire") {
            tracing::info!("using PipeWire audio server");
        } else {
            tracing::info!("using PulseAudio audio server");
        }

        let sinks = run_capture(
            Command::new("pactl").args(["list", "sinks", "short"]),
            PACTL_TIMEOUT,
        )
        .await;
        let have_sink = matches!(&sinks, Some((true, out)) if out.contains(&sink));
        if !have_sink {
            tracing::info!(%sink, "creating virtual audio sink");
            let created = run_quiet(
                Command::new("pactl").args([
                    "load-module",
                    "module-null-sink",
                    &format!("sink_name={sink}"),
                    &format!("sink_properties=device.description={sink}"),
                    "rate=48000",
                    "channels=2",
                ]),
                PACTL_TIMEOUT,
            )
            .await;
            if !created {
                tracing::warn!(%sink, "could not create audio sink");
                return false;
            }
        }

        let _ = run_quiet(
            Command::new("pactl").args(["set-default-sink", &sink]),
            PACTL_TIMEOUT,
        )
        .await;

        self.start_keepalive().await;
        true
    }

    /// Silent stream into the sink so the audio server keeps it running.
    async fn start_keepalive(&mut self) {
        let result = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "lavfi", "-i", "anullsrc=r=48000:cl=stereo"])
            .args(["-f", "pulse", &self.config.sink_name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match result {
            Ok(mut child) => {
                tokio::time::sleep(KEEPALIVE_SETTLE).await;
                match child.try_wait() {
                    Ok(Some(status)) => {
                        tracing::warn!(%status, "audio keepalive exited immediately");
                    }
                    _ => {
                        tracing::info!("audio keepalive running");
                        self.keepalive = Some(child);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not start audio keepalive"),
        }
    }
}

#[async_trait]
impl CaptureEnvironment for XvfbEnvironment {
    async fn start(&mut self) -> Result<CaptureHandles, CaptureError> {
        self.start_xvfb().await?;
        let audio_available = self.setup_audio().await;

        let display = self.display();
        Ok(CaptureHandles {
            env: child_env(&display),
            monitor_source: format!("{}.monitor", self.config.sink_name),
            sink_name: self.config.sink_name.clone(),
            audio_available,
            display,
        })
    }

    async fn stop(&mut self) {
        // Keepalive first, then the display. The sink itself is shared and
        // stays loaded.
        if let Some(mut child) = self.keepalive.take() {
            stop_child(&mut child, Duration::from_secs(2)).await;
            tracing::debug!("audio keepalive stopped");
        }
        if let Some(mut child) = self.xvfb.take() {
            stop_child(&mut child, Duration::from_secs(5)).await;
            tracing::info!("virtual display stopped");
        }
    }
}

async fn stop_child(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

async fn run_quiet(cmd: &mut Command, timeout: Duration) -> bool {
    matches!(run_capture(cmd, timeout).await, Some((true, _)))
}

async fn run_capture(cmd: &mut Command, timeout: Duration) -> Option<(bool, String)> {
    let fut = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) => Some((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
        )),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "subprocess failed to run");
            None
        }
        Err(_) => {
            tracing::warn!("subprocess timed out");
            None
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeCaptureState {
        starts: u32,
        stops: u32,
        fail_start: Option<String>,
    }

    /// Fake capture factory: hands out environments that share one counter
    /// so tests can assert start/stop pairing.
    #[derive(Clone, Default)]
    pub struct FakeCaptureFactory {
        state: Arc<Mutex<FakeCaptureState>>,
    }

    impl FakeCaptureFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(message: impl Into<String>) -> Self {
            let factory = Self::default();
            factory.state.lock().fail_start = Some(message.into());
            factory
        }

        pub fn starts(&self) -> u32 {
            self.state.lock().starts
        }

        pub fn stops(&self) -> u32 {
            self.state.lock().stops
        }
    }

    impl CaptureFactory for FakeCaptureFactory {
        fn create(&self, _width: u32, _height: u32) -> Box<dyn CaptureEnvironment> {
            Box::new(FakeEnvironment { state: self.state.clone() })
        }
    }

    struct FakeEnvironment {
        state: Arc<Mutex<FakeCaptureState>>,
    }

    #[async_trait]
    impl CaptureEnvironment for FakeEnvironment {
        async fn start(&mut self) -> Result<CaptureHandles, CaptureError> {
            let mut state = self.state.lock();
            if let Some(msg) = &state.fail_start {
                return Err(CaptureError::VirtualEnv(msg.clone()));
            }
            state.starts += 1;
            Ok(CaptureHandles {
                display: ":99".to_string(),
                sink_name: "virtual_speaker".to_string(),
                monitor_source: "virtual_speaker.monitor".to_string(),
                audio_available: true,
                env: HashMap::from([("DISPLAY".to_string(), ":99".to_string())]),
            })
        }

        async fn stop(&mut self) {
            self.state.lock().stops += 1;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCaptureFactory;

#[cfg(test)]
#[path = "virtual_env_tests.rs"]
mod tests;
