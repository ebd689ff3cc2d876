//! JSON-lines log capture for test binaries.
//!
//! ```ignore
//! #[ctor::ctor]
//! fn setup() {
//!     cts_common::testing::init_global_test_logging();
//! }
//! ```

use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::logging::open_log_file;

static INIT: Once = Once::new();

const DEFAULT_TEST_FILTER: &str = "cts=info,cts_common=info";

/// Send scenario and watcher events to the captured test output and to a
/// shared JSONL file. Later calls do nothing.
///
/// `CTS_TEST_LOG` overrides the filter and `CTS_TEST_LOG_FILE` the file.
pub fn init_global_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("CTS_TEST_LOG")
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));

        let file_layer = open_log_file(&test_log_path()).ok().map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_thread_names(true)
                .with_line_number(true)
        });
        let output_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .compact();

        // Another subscriber may already be installed by the harness.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(output_layer)
            .try_init();
    });
}

fn test_log_path() -> PathBuf {
    if let Some(path) = std::env::var_os("CTS_TEST_LOG_FILE") {
        return PathBuf::from(path);
    }
    let target = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("target"));
    target.join("test-logs").join("all_tests.jsonl")
}
