// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared diagnostic bundle collection.
//!
//! Writes `screenshot.png`, `page.html`, `console.log`, `metadata.json`
//! into the job's diagnostic directory. Every artifact is attempted
//! independently; the returned flags say which ones actually landed.

use crate::provider::DiagnosticContext;
use chrono::Utc;
use mrec_adapters::PagePort;
use mrec_core::{DiagnosticInfo, ProviderKind};
use std::path::Path;

pub(crate) async fn collect(
    provider: ProviderKind,
    page: &dyn PagePort,
    dir: &Path,
    context: &DiagnosticContext,
) -> DiagnosticInfo {
    let mut info = DiagnosticInfo { dir: dir.to_path_buf(), ..Default::default() };

    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), error = %e, "cannot create diagnostic dir");
        return info;
    }

    match page.screenshot_png().await {
        Ok(png) if !png.is_empty() => {
            let path = dir.join("screenshot.png");
            match std::fs::write(&path, &png) {
                Ok(()) => info.has_screenshot = true,
                Err(e) => tracing::warn!(error = %e, "screenshot write failed"),
            }
        }
        Ok(_) => tracing::debug!("screenshot was empty, skipping"),
        Err(e) => tracing::warn!(error = %e, "screenshot capture failed"),
    }

    match page.content().await {
        Ok(html) => {
            let path = dir.join("page.html");
            match std::fs::write(&path, html) {
                Ok(()) => info.has_html_dump = true,
                Err(e) => tracing::warn!(error = %e, "html dump write failed"),
            }
        }
        Err(e) => tracing::warn!(error = %e, "html dump failed"),
    }

    let console = page.console_messages();
    if !console.is_empty() {
        let body = console
            .iter()
            .map(|m| format!("[{}] {}", m.level, m.text))
            .collect::<Vec<_>>()
            .join("\n");
        let path = dir.join("console.log");
        match std::fs::write(&path, body) {
            Ok(()) => info.has_console_log = true,
            Err(e) => tracing::warn!(error = %e, "console log write failed"),
        }
    }

    let metadata = serde_json::json!({
        "collected_at": Utc::now().to_rfc3339(),
        "url": page.url().await.unwrap_or_default(),
        "title": page.title().await.unwrap_or_default(),
        "viewport": { "width": page.viewport().0, "height": page.viewport().1 },
        "error_code": context.error_code.map(|c| c.to_string()),
        "error_message": context.error_message.clone(),
        "provider": provider.to_string(),
    });
    match serde_json::to_string_pretty(&metadata) {
        Ok(body) => {
            if let Err(e) = std::fs::write(dir.join("metadata.json"), body) {
                tracing::warn!(error = %e, "metadata write failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "metadata serialization failed"),
    }

    tracing::info!(dir = %dir.display(), "diagnostics collected");
    info
}
