// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mrec-adapters: ports to the outside world.
//!
//! Each port is a trait with a production implementation and a fake gated
//! behind the `test-support` feature. The engine only ever sees the traits.

pub mod browser;
pub mod cdp;
pub mod notify;
pub mod upload;

pub use browser::{
    BrowserAdapter, BrowserError, BrowserLaunchSpec, BrowserSession, ConsoleMessage, PagePort,
};
#[cfg(any(test, feature = "test-support"))]
pub use browser::{FakeBrowserAdapter, FakePage, PageScript};
pub use cdp::CdpBrowserAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifier, NotifyCall};
pub use notify::{DesktopNotifier, Notifier, NotifyError};
#[cfg(any(test, feature = "test-support"))]
pub use upload::FakeUploader;
pub use upload::{UploadError, UploadMetadata, UploadOutcome, Uploader};
