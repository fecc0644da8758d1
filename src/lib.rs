pub mod adapters;
pub mod alerts;
pub mod bridge;
pub mod classifier;
pub mod config;
pub mod cycle;
pub mod db;
pub mod errors;
pub mod guide;
pub mod harness;
pub mod health;
pub mod ledger;
pub mod models;
pub mod policy;
pub mod portfolio;
pub mod validation;
pub mod zombie;

pub use crate::config::AppConfig;
pub use crate::errors::{AppError, AppResult, ErrorKind, InvocationFailure};
pub use crate::portfolio::PortfolioCore;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the JSON file logger under `log_dir`. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing(log_dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "portfolio.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
