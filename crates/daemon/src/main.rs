// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! keeld: control plane daemon for cluster agents.

use std::ffi::OsStr;
use std::process::ExitCode;

use keel_daemon::{env, startup, Config, LifecycleError};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("keeld: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("keeld: cannot open log at {}: {e}", config.log_path.display());
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "daemon failed");
            eprintln!("keeld: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), LifecycleError> {
    let daemon = startup(&config).await?;
    println!("READY {}", daemon.listen_addr);

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received");
    daemon.shutdown().await
}

/// Log to `<state_dir>/keeld.log` through a non-blocking writer.
fn init_logging(config: &Config) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.state_dir)?;
    let file_name = config.log_path.file_name().unwrap_or_else(|| OsStr::new("keeld.log"));
    let appender = tracing_appender::rolling::never(&config.state_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_new(env::log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
    Ok(guard)
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
