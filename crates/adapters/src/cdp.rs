// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production browser adapter: Chromium driven over CDP.
//!
//! The browser process is spawned directly so the capture environment's
//! DISPLAY and PULSE_SERVER variables reach it, then chromiumoxide connects
//! to the DevTools websocket the process prints on stderr. Stderr keeps
//! draining in the background afterwards; a full unread pipe would block the
//! browser.

use crate::browser::{
    BrowserAdapter, BrowserError, BrowserLaunchSpec, BrowserSession, ConsoleMessage, PagePort,
};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Browser;
use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

const DEVTOOLS_BANNER: &str = "DevTools listening on ";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches Chromium with the capture environment injected.
#[derive(Clone)]
pub struct CdpBrowserAdapter {
    binary: String,
}

impl CdpBrowserAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl BrowserAdapter for CdpBrowserAdapter {
    async fn launch(
        &self,
        spec: BrowserLaunchSpec,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let user_data_dir = std::env::temp_dir().join(format!(
            "mrec-browser-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        ));

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--remote-debugging-port=0")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--window-size={},{}", spec.width, spec.height))
            .arg("--window-position=0,0")
            .arg("--autoplay-policy=no-user-gesture-required")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg(format!("--user-data-dir={}", user_data_dir.display()))
            .arg("about:blank")
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed(format!("spawn {}: {}", self.binary, e)))?;

        let ws_url = wait_for_devtools_url(&mut child).await?;
        tracing::debug!(%ws_url, "browser devtools ready");

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("CDP connect: {}", e)))?;

        // Drive the CDP message loop for the lifetime of the session.
        let handler_task = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if result.is_err() {
                    break;
                }
            }
        });

        // Microphone granted; camera denied by omission, which keeps video off.
        if let Ok(params) = GrantPermissionsParams::builder()
            .permission(PermissionType::AudioCapture)
            .build()
        {
            if let Err(e) = browser.execute(params).await {
                tracing::warn!(error = %e, "could not grant microphone permission");
            }
        }

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("new page: {}", e)))?;

        let console = Arc::new(Mutex::new(Vec::new()));
        spawn_console_collector(&page, console.clone()).await;

        Ok(Box::new(CdpSession {
            page: Arc::new(CdpPage {
                page,
                console,
                viewport: (spec.width, spec.height),
                frame: None,
            }),
            browser: Some(browser),
            child: Some(child),
            handler_task: Some(handler_task),
            user_data_dir,
        }))
    }
}

/// Read stderr lines until the DevTools banner shows up, then keep draining
/// in the background.
async fn wait_for_devtools_url(child: &mut Child) -> Result<String, BrowserError> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BrowserError::LaunchFailed("stderr not captured".to_string()))?;
    let mut lines = BufReader::new(stderr).lines();

    let found = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(rest) = line.trim().strip_prefix(DEVTOOLS_BANNER) {
                return Some(rest.trim().to_string());
            }
        }
        None
    })
    .await;

    tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    match found {
        Ok(Some(url)) => Ok(url),
        Ok(None) => Err(BrowserError::LaunchFailed(
            "browser exited before DevTools came up".to_string(),
        )),
        Err(_) => Err(BrowserError::LaunchFailed(format!(
            "no DevTools banner within {:?}",
            CONNECT_TIMEOUT
        ))),
    }
}

async fn spawn_console_collector(
    page: &chromiumoxide::Page,
    sink: Arc<Mutex<Vec<ConsoleMessage>>>,
) {
    match page.event_listener::<EventConsoleApiCalled>().await {
        Ok(mut events) => {
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let text = event
                        .args
                        .iter()
                        .filter_map(|arg| arg.value.as_ref())
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(" ");
                    sink.lock().push(ConsoleMessage {
                        level: format!("{:?}", event.r#type).to_lowercase(),
                        text,
                        timestamp: Utc::now(),
                    });
                }
            });
        }
        Err(e) => tracing::warn!(error = %e, "console collector unavailable"),
    }
}

struct CdpSession {
    page: Arc<CdpPage>,
    browser: Option<Browser>,
    child: Option<Child>,
    handler_task: Option<tokio::task::JoinHandle<()>>,
    user_data_dir: PathBuf,
}

#[async_trait]
impl BrowserSession for CdpSession {
    fn page(&self) -> Arc<dyn PagePort> {
        self.page.clone()
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::debug!(error = %e, "browser close command failed");
            }
        }
        if let Some(mut child) = self.child.take() {
            let exited = tokio::time::timeout(CLOSE_TIMEOUT, child.wait()).await;
            if exited.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
        Ok(())
    }
}

struct CdpPage {
    page: chromiumoxide::Page,
    console: Arc<Mutex<Vec<ConsoleMessage>>>,
    viewport: (u32, u32),
    /// When set, element operations route through this iframe's document.
    frame: Option<String>,
}

impl CdpPage {
    fn js_str(s: &str) -> String {
        serde_json::Value::String(s.to_string()).to_string()
    }

    /// Expression evaluating to the document to query: the page's, or the
    /// scoped iframe's (null when the frame is missing or cross-origin).
    fn doc_expr(&self) -> String {
        match &self.frame {
            None => "document".to_string(),
            Some(frame) => format!(
                "(() => {{ const f = document.querySelector({}); \
                 return f ? (f.contentDocument || (f.contentWindow && f.contentWindow.document) || null) : null; }})()",
                Self::js_str(frame)
            ),
        }
    }

    async fn eval(&self, js: String) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl PagePort for CdpPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        if let Err(e) = self.page.wait_for_navigation().await {
            tracing::debug!(error = %e, "navigation settle wait failed");
        }
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize, BrowserError> {
        let js = format!(
            "(() => {{ const d = {}; return d ? d.querySelectorAll({}).length : 0; }})()",
            self.doc_expr(),
            Self::js_str(selector)
        );
        let value = self.eval(js).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn contains_text(&self, needle: &str) -> Result<bool, BrowserError> {
        let js = format!(
            "(() => {{ const d = {}; return !!(d && d.body && d.body.innerText.includes({})); }})()",
            self.doc_expr(),
            Self::js_str(needle)
        );
        Ok(self.eval(js).await?.as_bool().unwrap_or(false))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let js = format!(
            "(() => {{ const d = {}; const el = d && d.querySelector({}); if (!el) return false; \
             el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
            self.doc_expr(),
            Self::js_str(selector),
            Self::js_str(value)
        );
        match self.eval(js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(BrowserError::Page(format!("no element for fill: {selector}"))),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let js = format!(
            "(() => {{ const d = {}; const el = d && d.querySelector({}); if (!el) return false; \
             el.click(); return true; }})()",
            self.doc_expr(),
            Self::js_str(selector)
        );
        match self.eval(js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(BrowserError::Page(format!("no element for click: {selector}"))),
        }
    }

    async fn press(&self, selector: &str, key: &str) -> Result<(), BrowserError> {
        let js = format!(
            "(() => {{ const d = {}; const el = d && d.querySelector({}); if (!el) return false; \
             for (const type of ['keydown', 'keypress', 'keyup']) {{ \
               el.dispatchEvent(new KeyboardEvent(type, {{key: {}, bubbles: true}})); \
             }} return true; }})()",
            self.doc_expr(),
            Self::js_str(selector),
            Self::js_str(key)
        );
        match self.eval(js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(BrowserError::Page(format!("no element for press: {selector}"))),
        }
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value, BrowserError> {
        self.eval(js.to_string()).await
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))
    }

    async fn url(&self) -> Result<String, BrowserError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn in_frame(&self, selector: &str) -> Result<Arc<dyn PagePort>, BrowserError> {
        Ok(Arc::new(CdpPage {
            page: self.page.clone(),
            console: self.console.clone(),
            viewport: self.viewport,
            frame: Some(selector.to_string()),
        }))
    }

    fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.console.lock().clone()
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}
