// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon settings: TOML file plus `MREC_*` environment overrides.

use mrec_capture::{MuxerSettings, XvfbConfig};
use mrec_core::DetectionConfig;
use mrec_engine::WorkerSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Muxer encoder and shutdown knobs as they appear in the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegSettings {
    pub framerate: u32,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
    pub thread_queue_size: u32,
    pub use_wallclock_timestamps: bool,
    pub audio_filter: Option<String>,
    pub stop_grace_sec: u64,
    pub sigint_timeout_sec: u64,
    pub sigterm_timeout_sec: u64,
    pub stall_grace_sec: u64,
    pub stall_timeout_sec: u64,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        let muxer = MuxerSettings::default();
        Self {
            framerate: muxer.framerate,
            preset: muxer.preset,
            crf: muxer.crf,
            audio_bitrate: muxer.audio_bitrate,
            thread_queue_size: muxer.thread_queue_size,
            use_wallclock_timestamps: muxer.use_wallclock_timestamps,
            audio_filter: muxer.audio_filter,
            stop_grace_sec: 5,
            sigint_timeout_sec: 8,
            sigterm_timeout_sec: 5,
            stall_grace_sec: 30,
            stall_timeout_sec: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Zone for interpreting cron expressions and schedule windows.
    pub tz: String,
    /// State directory; defaults to the platform state dir + `/mrec`.
    pub state_dir: Option<PathBuf>,
    pub recordings_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
    pub logs_dir: PathBuf,

    pub resolution_w: u32,
    pub resolution_h: u32,
    pub browser_binary: String,
    pub display_num: u32,
    pub audio_sink: String,

    pub join_timeout_sec: u64,
    pub check_interval_sec: u64,

    pub ffmpeg: FfmpegSettings,
    pub detection: DetectionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tz: "Asia/Taipei".to_string(),
            state_dir: None,
            recordings_dir: PathBuf::from("./recordings"),
            diagnostics_dir: PathBuf::from("./diagnostics"),
            logs_dir: PathBuf::from("./logs"),
            resolution_w: 1920,
            resolution_h: 1080,
            browser_binary: "chromium".to_string(),
            display_num: 99,
            audio_sink: "virtual_speaker".to_string(),
            join_timeout_sec: 60,
            check_interval_sec: 5,
            ffmpeg: FfmpegSettings::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl Settings {
    /// Load from a TOML file (when present), then apply `MREC_*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Settings, SettingsError> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path).map_err(|source| {
                    SettingsError::Read { path: path.to_path_buf(), source }
                })?;
                toml::from_str(&raw).map_err(|source| SettingsError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            _ => Settings::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        env_string("MREC_TZ", &mut self.tz);
        if let Ok(dir) = std::env::var("MREC_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(dir));
        }
        env_path("MREC_RECORDINGS_DIR", &mut self.recordings_dir);
        env_path("MREC_DIAGNOSTICS_DIR", &mut self.diagnostics_dir);
        env_path("MREC_LOGS_DIR", &mut self.logs_dir);
        env_string("MREC_BROWSER", &mut self.browser_binary);
        env_parse("MREC_RESOLUTION_W", &mut self.resolution_w);
        env_parse("MREC_RESOLUTION_H", &mut self.resolution_h);
        env_parse("MREC_DISPLAY_NUM", &mut self.display_num);
        env_parse("MREC_JOIN_TIMEOUT_SEC", &mut self.join_timeout_sec);
        env_parse("MREC_CHECK_INTERVAL_SEC", &mut self.check_interval_sec);
    }

    /// Resolved state directory: explicit > platform state dir > ~/.local/state.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::state_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mrec")
    }

    /// Configured zone, warning and falling back to UTC on a bad name.
    pub fn timezone(&self) -> chrono_tz::Tz {
        match mrec_core::parse_tz(&self.tz) {
            Ok(tz) => tz,
            Err(name) => {
                tracing::warn!(%name, "invalid timezone, falling back to UTC");
                chrono_tz::Tz::UTC
            }
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            recordings_dir: self.recordings_dir.clone(),
            diagnostics_dir: self.diagnostics_dir.clone(),
            container_ext: "mkv".to_string(),
            join_timeout: Duration::from_secs(self.join_timeout_sec),
            check_interval: Duration::from_secs(self.check_interval_sec),
            stall_grace: Duration::from_secs(self.ffmpeg.stall_grace_sec),
            stall_timeout: Duration::from_secs(self.ffmpeg.stall_timeout_sec),
        }
    }

    pub fn muxer_settings(&self) -> MuxerSettings {
        MuxerSettings {
            framerate: self.ffmpeg.framerate,
            preset: self.ffmpeg.preset.clone(),
            crf: self.ffmpeg.crf,
            audio_bitrate: self.ffmpeg.audio_bitrate.clone(),
            thread_queue_size: self.ffmpeg.thread_queue_size,
            use_wallclock_timestamps: self.ffmpeg.use_wallclock_timestamps,
            audio_filter: self.ffmpeg.audio_filter.clone(),
            start_settle: Duration::from_secs(1),
            stop_grace: Duration::from_secs(self.ffmpeg.stop_grace_sec),
            sigint_timeout: Duration::from_secs(self.ffmpeg.sigint_timeout_sec),
            sigterm_timeout: Duration::from_secs(self.ffmpeg.sigterm_timeout_sec),
        }
    }

    pub fn xvfb_config(&self) -> XvfbConfig {
        XvfbConfig {
            display_num: self.display_num,
            depth: 24,
            sink_name: self.audio_sink.clone(),
        }
    }
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

fn env_path(key: &str, target: &mut PathBuf) {
    if let Ok(value) = std::env::var(key) {
        if !value.is_empty() {
            *target = PathBuf::from(value);
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.parse() {
            *target = parsed;
        }
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
