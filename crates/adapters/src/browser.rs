// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser port: launch a browser against the virtual display and drive a
//! page through a narrow, selector-based surface.
//!
//! Providers and detectors only see [`PagePort`]; the production
//! implementation lives in [`crate::cdp`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from browser operations
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),
    #[error("page operation failed: {0}")]
    Page(String),
    #[error("browser closed")]
    Closed,
}

/// One captured console message.
#[derive(Debug, Clone)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// How to launch the browser for one job.
#[derive(Debug, Clone, Default)]
pub struct BrowserLaunchSpec {
    pub width: u32,
    pub height: u32,
    /// DISPLAY / PULSE_SERVER vars from the capture environment.
    pub env: HashMap<String, String>,
}

/// A live page inside a launched browser.
///
/// Selectors are CSS. Text probes (`contains_text`) match against the
/// rendered body text, which is how the vendor end-of-meeting banners are
/// found without vendor-specific markup.
#[async_trait]
pub trait PagePort: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Number of elements matching a CSS selector.
    async fn count(&self, selector: &str) -> Result<usize, BrowserError>;

    /// Whether the rendered page text contains `needle`.
    async fn contains_text(&self, needle: &str) -> Result<bool, BrowserError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Send a key to the first element matching `selector`.
    async fn press(&self, selector: &str, key: &str) -> Result<(), BrowserError>;

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value, BrowserError>;

    /// PNG screenshot of the viewport.
    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError>;

    /// Full HTML content.
    async fn content(&self) -> Result<String, BrowserError>;

    async fn url(&self) -> Result<String, BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    /// A page port scoped to the iframe matching `selector`; interactions
    /// route into the frame's document (Webex renders its whole client in
    /// one).
    async fn in_frame(&self, selector: &str) -> Result<Arc<dyn PagePort>, BrowserError>;

    /// Console messages collected since page creation.
    fn console_messages(&self) -> Vec<ConsoleMessage>;

    fn viewport(&self) -> (u32, u32);
}

/// A launched browser owning one page.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn page(&self) -> Arc<dyn PagePort>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Launches browsers. One implementation per environment.
#[async_trait]
pub trait BrowserAdapter: Send + Sync + 'static {
    async fn launch(
        &self,
        spec: BrowserLaunchSpec,
    ) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Scripted page state: what the fake page reports at a point in time.
    #[derive(Debug, Clone, Default)]
    pub struct PageScript {
        /// CSS selector → element count.
        pub counts: HashMap<String, usize>,
        /// Text needles present on the page.
        pub texts: Vec<String>,
        pub url: String,
        pub title: String,
        /// Responses for `evaluate`, keyed by a substring of the script.
        pub eval_results: Vec<(String, serde_json::Value)>,
        /// PNG bytes returned by `screenshot_png`.
        pub screenshot: Vec<u8>,
    }

    struct FakePageState {
        /// Scripted states, consumed head-first; the last state sticks.
        states: Vec<PageScript>,
        step: usize,
        fills: Vec<(String, String)>,
        clicks: Vec<String>,
        visited: Vec<String>,
        console: Vec<ConsoleMessage>,
        fail_goto: Option<String>,
    }

    /// Scriptable in-memory page for provider and detector tests.
    ///
    /// Each interaction that *reads* the page (count / contains_text / url /
    /// evaluate / screenshot) observes the current scripted state; calling
    /// [`FakePage::advance`] moves to the next one.
    #[derive(Clone)]
    pub struct FakePage {
        state: Arc<Mutex<FakePageState>>,
        viewport: (u32, u32),
    }

    impl FakePage {
        pub fn new(states: Vec<PageScript>) -> Self {
            Self {
                state: Arc::new(Mutex::new(FakePageState {
                    states,
                    step: 0,
                    fills: Vec::new(),
                    clicks: Vec::new(),
                    visited: Vec::new(),
                    console: Vec::new(),
                    fail_goto: None,
                })),
                viewport: (1280, 720),
            }
        }

        pub fn single(script: PageScript) -> Self {
            Self::new(vec![script])
        }

        /// Make every `goto` fail with the given message (network errors).
        pub fn fail_navigation(self, message: impl Into<String>) -> Self {
            self.state.lock().fail_goto = Some(message.into());
            self
        }

        /// Start failing `goto` mid-test (the network went away).
        pub fn set_navigation_failure(&self, message: impl Into<String>) {
            self.state.lock().fail_goto = Some(message.into());
        }

        /// Let navigation succeed again ("the network came back").
        pub fn clear_navigation_failure(&self) {
            self.state.lock().fail_goto = None;
        }

        /// Move to the next scripted state.
        pub fn advance(&self) {
            let mut state = self.state.lock();
            if state.step + 1 < state.states.len() {
                state.step += 1;
            }
        }

        pub fn push_console(&self, level: &str, text: &str) {
            self.state.lock().console.push(ConsoleMessage {
                level: level.to_string(),
                text: text.to_string(),
                timestamp: Utc::now(),
            });
        }

        pub fn fills(&self) -> Vec<(String, String)> {
            self.state.lock().fills.clone()
        }

        pub fn clicks(&self) -> Vec<String> {
            self.state.lock().clicks.clone()
        }

        pub fn visited(&self) -> Vec<String> {
            self.state.lock().visited.clone()
        }

        fn current<R>(&self, f: impl FnOnce(&PageScript) -> R) -> R {
            let state = self.state.lock();
            if state.states.is_empty() {
                return f(&PageScript::default());
            }
            let idx = state.step.min(state.states.len() - 1);
            f(&state.states[idx])
        }
    }

    #[async_trait]
    impl PagePort for FakePage {
        async fn goto(&self, url: &str) -> Result<(), BrowserError> {
            let mut state = self.state.lock();
            if let Some(msg) = &state.fail_goto {
                return Err(BrowserError::Page(msg.clone()));
            }
            state.visited.push(url.to_string());
            Ok(())
        }

        async fn count(&self, selector: &str) -> Result<usize, BrowserError> {
            Ok(self.current(|s| s.counts.get(selector).copied().unwrap_or(0)))
        }

        async fn contains_text(&self, needle: &str) -> Result<bool, BrowserError> {
            Ok(self.current(|s| s.texts.iter().any(|t| t.contains(needle))))
        }

        async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
            self.state
                .lock()
                .fills
                .push((selector.to_string(), value.to_string()));
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<(), BrowserError> {
            self.state.lock().clicks.push(selector.to_string());
            Ok(())
        }

        async fn press(&self, selector: &str, key: &str) -> Result<(), BrowserError> {
            self.state
                .lock()
                .clicks
                .push(format!("{selector}:{key}"));
            Ok(())
        }

        async fn evaluate(&self, js: &str) -> Result<serde_json::Value, BrowserError> {
            Ok(self.current(|s| {
                s.eval_results
                    .iter()
                    .find(|(needle, _)| js.contains(needle.as_str()))
                    .map(|(_, value)| value.clone())
                    .unwrap_or(serde_json::Value::Null)
            }))
        }

        async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
            Ok(self.current(|s| s.screenshot.clone()))
        }

        async fn content(&self) -> Result<String, BrowserError> {
            Ok(self.current(|s| format!("<html><body>{}</body></html>", s.texts.join(" "))))
        }

        async fn url(&self) -> Result<String, BrowserError> {
            Ok(self.current(|s| s.url.clone()))
        }

        async fn title(&self) -> Result<String, BrowserError> {
            Ok(self.current(|s| s.title.clone()))
        }

        async fn in_frame(&self, _selector: &str) -> Result<Arc<dyn PagePort>, BrowserError> {
            Ok(Arc::new(self.clone()))
        }

        fn console_messages(&self) -> Vec<ConsoleMessage> {
            self.state.lock().console.clone()
        }

        fn viewport(&self) -> (u32, u32) {
            self.viewport
        }
    }

    struct FakeSession {
        page: Arc<FakePage>,
        closed: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        fn page(&self) -> Arc<dyn PagePort> {
            self.page.clone()
        }

        async fn close(&mut self) -> Result<(), BrowserError> {
            *self.closed.lock() = true;
            Ok(())
        }
    }

    /// Fake browser adapter handing out a pre-built page.
    #[derive(Clone)]
    pub struct FakeBrowserAdapter {
        page: Arc<FakePage>,
        launches: Arc<Mutex<Vec<BrowserLaunchSpec>>>,
        closed: Arc<Mutex<bool>>,
        fail_launch: Option<String>,
    }

    impl FakeBrowserAdapter {
        pub fn new(page: FakePage) -> Self {
            Self {
                page: Arc::new(page),
                launches: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(Mutex::new(false)),
                fail_launch: None,
            }
        }

        pub fn failing(message: impl Into<String>) -> Self {
            let mut adapter = Self::new(FakePage::new(Vec::new()));
            adapter.fail_launch = Some(message.into());
            adapter
        }

        pub fn page_handle(&self) -> Arc<FakePage> {
            self.page.clone()
        }

        pub fn launches(&self) -> Vec<BrowserLaunchSpec> {
            self.launches.lock().clone()
        }

        pub fn was_closed(&self) -> bool {
            *self.closed.lock()
        }
    }

    #[async_trait]
    impl BrowserAdapter for FakeBrowserAdapter {
        async fn launch(
            &self,
            spec: BrowserLaunchSpec,
        ) -> Result<Box<dyn BrowserSession>, BrowserError> {
            if let Some(msg) = &self.fail_launch {
                return Err(BrowserError::LaunchFailed(msg.clone()));
            }
            self.launches.lock().push(spec);
            Ok(Box::new(FakeSession {
                page: self.page.clone(),
                closed: self.closed.clone(),
            }))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBrowserAdapter, FakePage, PageScript};

#[cfg(test)]
#[path = "browser_tests.rs"]
mod tests;
