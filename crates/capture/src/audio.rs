// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audio level probing via the pulse CLI, for the silence detector.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Current level of a pulse source in [0, 1], or `None` when the audio
/// stack cannot be queried.
///
/// Parses the percentage out of `pactl get-source-volume`; when that yields
/// nothing, the presence of active source-outputs counts as moderate audio.
pub async fn source_level(source: &str) -> Option<f64> {
    if let Some(output) = run(Command::new("pactl").args(["get-source-volume", source])).await {
        if let Some(percent) = parse_volume_percent(&output) {
            return Some(percent);
        }
    }

    let outputs = run(Command::new("pactl").args(["list", "source-outputs", "short"])).await?;
    if outputs.trim().is_empty() {
        Some(0.0)
    } else {
        Some(0.5)
    }
}

/// Extract the first "NN%" figure from pactl volume output.
pub(crate) fn parse_volume_percent(output: &str) -> Option<f64> {
    let percent_pos = output.find('%')?;
    let head = &output[..percent_pos];
    let digits: String = head
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse::<f64>().ok().map(|n| n / 100.0)
}

async fn run(cmd: &mut Command) -> Option<String> {
    let fut = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();
    match tokio::time::timeout(PROBE_TIMEOUT, fut).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "pactl unavailable");
            None
        }
        Err(_) => None,
    }
}

#[cfg(test)]
#[path = "audio_tests.rs"]
mod tests;
