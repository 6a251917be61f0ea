// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quittung — local receipt print server.
//
// Entry point. Loads configuration, initialises logging, restores the
// persisted queue, and serves HTTP until SIGINT/SIGTERM, then drains the
// queue one last time before exiting.

mod services;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use quittung_core::AppConfig;
use quittung_core::config::LogFormat;
use quittung_core::error::{QuittungError, Result};
use quittung_print::{JsonFileStore, PrinterMonitor, QueueEngine, ReceiptPrinter, RetryConfig};

use services::routes::{AppState, router};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("quittung: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Dropping the guard flushes the log file; keep it until exit.
    let _log_guard = match init_tracing(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("quittung: cannot set up logging: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(version = env!("CARGO_PKG_VERSION"), "Quittung starting");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "print server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

/// Console output in the configured format, plus JSON lines in a log file
/// rotated daily (`print-server.YYYY-MM-DD.log`).
fn init_tracing(config: &AppConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("print-server")
        .filename_suffix("log")
        .max_log_files(config.log_max_files)
        .build(&config.log_dir)
        .map_err(|e| QuittungError::Config {
            var: "LOG_DIR".into(),
            reason: e.to_string(),
        })?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let console = match config.log_format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().boxed(),
    };
    let file = fmt::layer().json().with_ansi(false).with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}

async fn run(config: AppConfig) -> Result<()> {
    let store = Arc::new(JsonFileStore::new(config.queue_path(), config.dead_letter_path()));
    let printer = ReceiptPrinter::from_config(&config)?;
    let monitor = Arc::new(PrinterMonitor::new(
        printer.interface().clone(),
        Duration::from_secs(config.printer_timeout_secs),
    ));
    info!(
        interface = %printer.interface(),
        data_dir = %config.data_dir.display(),
        log_dir = %config.log_dir.display(),
        "printer configured"
    );

    let engine = Arc::new(QueueEngine::new(
        Arc::new(printer),
        store,
        RetryConfig::from(&config),
    ));
    if engine.rehydrate().await > 0 {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine.drain().await;
        });
    }

    let poller = Arc::clone(&monitor).spawn(Duration::from_secs(config.poll_interval_secs));

    let app = router(AppState {
        engine: Arc::clone(&engine),
        monitor,
        validate: config.validate_print_data,
    });

    let addr = SocketAddr::new(config.server_host, config.server_port);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| QuittungError::Server(format!("bind {addr}: {e}")))?;
    info!(%addr, "local print server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| QuittungError::Server(e.to_string()))?;

    info!("shutdown initiated, waiting for queue processing");
    poller.abort();
    let report = engine.drain_to_completion().await;
    engine.persist().await?;
    info!(
        delivered = report.delivered,
        dead_lettered = report.dead_lettered,
        remaining = engine.queue_length(),
        "print server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
