pub use crate::bridge::collaborators::{
    ActivityLauncher, LaunchError, SignerDiscovery, SignerProvider, StaticDiscovery,
};
pub use crate::bridge::router::RouteOutcome;
pub use crate::bridge::{BridgeConfig, Nip55Bridge};
pub use crate::error::{BridgeError, Result, SignerError};
pub use crate::types::*;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

use std::path::Path;
use std::sync::{Mutex, OnceLock};

pub mod api;
pub mod bridge;
mod error;
pub mod signers;
mod types;

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();
static TRACING_INIT: OnceLock<core::result::Result<(), String>> = OnceLock::new();

/// Installs the global subscriber: stdout plus a daily rolling file in `logs_dir`.
///
/// Only the first call does anything; later calls return its outcome.
pub fn init_tracing(logs_dir: &Path) -> Result<()> {
    TRACING_INIT
        .get_or_init(|| {
            let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix("nip55_bridge")
                .filename_suffix("log")
                .build(logs_dir)
                .map_err(|e| format!("Failed to create file appender: {e}"))?;

            let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
            let (non_blocking_stdout, stdout_guard) =
                tracing_appender::non_blocking(std::io::stdout());

            TRACING_GUARDS
                .set(Mutex::new(Some((file_guard, stdout_guard))))
                .ok();

            let stdout_layer = Layer::new()
                .with_writer(non_blocking_stdout)
                .with_ansi(true)
                .with_target(true);

            let file_layer = Layer::new()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true);

            Registry::default()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .with(stdout_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(BridgeError::LoggingSetup)
}
