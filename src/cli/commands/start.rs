//! Start command - loads extensions and hosts the pipeline until ctrl-c.

use crate::cli::args::StartArgs;
use crate::config::Config;
use crate::extensions::{builtin_catalog, BrokerServices, ExtensionRegistry};
use crate::pipeline::Pipeline;
use crate::telemetry::{self, LogHandle};
use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run_start(args: StartArgs) -> Result<()> {
    // Set config path via environment so Config::load_from_env picks it up
    env::set_var("GATEHOUSE_CONFIG", args.config.display().to_string());

    let config = Config::load_from_env()?;
    let log_handle = telemetry::init_tracing(config.telemetry.log_level.as_deref())?;
    config.validate()?;

    let services = Arc::new(BrokerServices::new(Arc::new(config.packet_limits())));
    let registry = Arc::new(ExtensionRegistry::new(Arc::clone(&services)));
    let report = registry.load_folder(&config.extensions.folder, &builtin_catalog());
    info!(
        folder = %config.extensions.folder.display(),
        started = ?report.started,
        skipped = ?report.skipped,
        failed = report.failures.len(),
        "extensions loaded"
    );

    let mut settings = config.chain_settings();
    settings.limits = Arc::clone(services.limits());
    let pipeline = Pipeline::new(Arc::clone(&registry), settings)
        .with_queue_capacity(config.extensions.chain_queue_capacity);
    info!(active = registry.active().len(), "interception pipeline ready");

    wait_for_shutdown(&log_handle).await?;

    info!(metrics = ?pipeline.metrics(), "shutting down");
    registry.stop_all();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(log_handle: &LogHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                return res.context("failed to listen for ctrl-c");
            }
            _ = hangup.recv() => reload_log_level(log_handle),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_log_handle: &LogHandle) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}

/// Re-reads the config file and applies its log level.
#[cfg_attr(not(unix), allow(dead_code))]
fn reload_log_level(log_handle: &LogHandle) {
    let level = match Config::load_from_env() {
        Ok(config) => config.telemetry.log_level,
        Err(err) => {
            warn!(error = %err, "config reload failed; keeping log level");
            return;
        }
    };
    match telemetry::set_log_level(log_handle, level.as_deref()) {
        Ok(()) => info!(level = level.as_deref().unwrap_or("info"), "log level reloaded"),
        Err(err) => warn!(error = %err, "log level reload failed"),
    }
}
