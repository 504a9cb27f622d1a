// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end scenarios.
//!
//! Every scenario drives the real scheduler/runner/worker/store stack
//! against fake browser, capture, muxer, notifier, and uploader adapters,
//! under tokio's paused virtual time.

#[path = "specs_files/mod.rs"]
mod specs;
