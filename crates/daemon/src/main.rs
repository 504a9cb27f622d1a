// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `mrecd` entrypoint.

use mrec_daemon::{bootstrap, Settings};
use std::path::PathBuf;

fn main() {
    let config_path = std::env::var("MREC_CONFIG").ok().map(PathBuf::from);
    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("mrecd: {e}");
            std::process::exit(2);
        }
    };

    let _log_guard = match bootstrap::init_tracing(&settings.logs_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("mrecd: cannot set up logging: {e}");
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "cannot build runtime");
            std::process::exit(2);
        }
    };

    if let Err(e) = runtime.block_on(bootstrap::run(settings)) {
        tracing::error!(error = %e, "daemon exited with error");
        std::process::exit(1);
    }
}
