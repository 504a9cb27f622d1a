// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mrec-capture: the disposable capture stack for one recording.
//!
//! A virtual X display plus a virtual audio sink ([`virtual_env`]), and the
//! screen+audio muxer process that records them ([`muxer`]). Both sit behind
//! traits so the worker can be driven end-to-end without X11 or ffmpeg.

pub mod audio;
pub mod muxer;
pub mod virtual_env;

use std::collections::HashMap;
use thiserror::Error;

pub use muxer::{FfmpegMuxerFactory, Muxer, MuxerFactory, MuxerSettings, MuxerSpec};
#[cfg(any(test, feature = "test-support"))]
pub use muxer::{FakeMuxerFactory, FakeMuxerHandle};
#[cfg(any(test, feature = "test-support"))]
pub use virtual_env::FakeCaptureFactory;
pub use virtual_env::{
    CaptureEnvironment, CaptureFactory, CaptureHandles, XvfbCaptureFactory, XvfbConfig,
};

/// Errors from the capture stack.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The display stack could not come up. Fatal for the job.
    #[error("virtual environment error: {0}")]
    VirtualEnv(String),
    /// The muxer process died inside its start window.
    #[error("recording start failed: {0}")]
    StartFailed(String),
    #[error("muxer error: {0}")]
    Muxer(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Environment variables for children of the capture environment.
pub(crate) fn child_env(display: &str) -> HashMap<String, String> {
    let xdg_runtime =
        std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/run/user/0".to_string());
    HashMap::from([
        ("DISPLAY".to_string(), display.to_string()),
        (
            "PULSE_SERVER".to_string(),
            format!("unix:{xdg_runtime}/pulse/native"),
        ),
        ("XDG_RUNTIME_DIR".to_string(), xdg_runtime),
    ])
}
