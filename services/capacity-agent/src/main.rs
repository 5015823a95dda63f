//! capseek capacity agent
//!
//! Runs the reconcile loop that keeps the configured instance alive at its
//! final profile, plus a small HTTP listener for liveness checks.
//!
//! ## Architecture
//!
//! - **Reconcile worker**: one check at a time, then a jittered timer
//! - **Gateway**: provider compute API over HTTP
//! - **Notifier**: SMTP or webhook, log-only when neither is configured
//! - **Health API**: `GET /health`

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use capseek_agent::{
    api, config,
    gateway::{HttpGateway, HttpGatewayConfig, ResourceGateway},
    notifier::{LogNotifier, MailNotifier, Notifier, WebhookNotifier},
    orchestrator::Orchestrator,
    scheduler::{ReconcileWorker, Scheduler, WorkerExit},
};
use ninelives::TokioSleeper;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before anything starts
    let config = config::Config::from_env()?;

    // Optional JSON log files: everything, plus errors only
    let mut log_guards: Vec<WorkerGuard> = Vec::new();
    let file_layers = match &config.log_dir {
        Some(dir) => {
            let (all, all_guard) = tracing_appender::non_blocking(log_file(dir, "capseek-agent")?);
            let (errors, errors_guard) =
                tracing_appender::non_blocking(log_file(dir, "capseek-agent-error")?);
            log_guards.extend([all_guard, errors_guard]);

            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(all)
                    .and_then(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(errors.with_max_level(Level::ERROR)),
                    ),
            )
        }
        None => None,
    };

    // Initialize tracing (prefer RUST_LOG, fallback to CAPSEEK_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .with(file_layers)
        .init();

    info!("Starting capseek capacity agent");
    info!(
        listen_addr = %config.listen_addr,
        region = %config.provider.region,
        endpoint = %config.provider.endpoint,
        log_dir = ?config.log_dir,
        display_name = %config.spec.display_name,
        initial_profile = %config.spec.initial_profile,
        final_profile = %config.spec.final_profile,
        fatal_policy = ?config.fatal_policy,
        "Configuration loaded"
    );
    info!(
        "Checking every ~{} seconds (jitter +/-{} seconds)",
        config.retry.base_interval().as_secs(),
        config.retry.jitter_range().as_secs()
    );

    let gateway: Arc<dyn ResourceGateway> = Arc::new(
        HttpGateway::new(HttpGatewayConfig {
            endpoint: config.provider.endpoint.clone(),
            credentials: config.provider.credentials.clone(),
            compartment_id: config.spec.compartment_id.clone(),
            request_timeout: config.provider.request_timeout,
            wait: config.wait.clone(),
        })
        .context("failed to create provider gateway")?,
    );

    let notifications = &config.notifications;
    let notifier: Arc<dyn Notifier> = match (&notifications.mail, &notifications.webhook_url) {
        (Some(mail), _) => {
            info!(host = %mail.host, port = mail.port, "Notifications will be mailed");
            Arc::new(MailNotifier::new(mail).context("failed to create mail notifier")?)
        }
        (None, Some(url)) => Arc::new(
            WebhookNotifier::new(url.clone(), notifications.webhook_timeout)
                .context("failed to create webhook notifier")?,
        ),
        (None, None) => {
            warn!("Neither CAPSEEK_MAIL_HOST nor CAPSEEK_WEBHOOK_URL set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = Orchestrator::new(Arc::new(config.spec.clone()), gateway, notifier);
    let scheduler = Scheduler::new(config.retry.clone(), Arc::new(TokioSleeper));
    let mut worker = ReconcileWorker::new(orchestrator, scheduler, config.fatal_policy);
    let mut worker_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { worker.run(shutdown_rx).await }
    });

    // Build and run the server
    let app = api::create_router();
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let mut server_handle = tokio::spawn({
        let mut shutdown_rx = shutdown_rx.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    loop {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                    info!("HTTP server shutting down");
                })
                .await
        }
    });

    // Wait for a shutdown signal, or for the worker or the server to stop on its own
    let stop = tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            Stop::Clean
        }
        result = &mut worker_handle => worker_stopped(result),
        result = &mut server_handle => server_stopped(result),
    };
    // Signal shutdown to the worker and the server
    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = Duration::from_secs(10);
    if !worker_handle.is_finished()
        && tokio::time::timeout(shutdown_timeout, &mut worker_handle)
            .await
            .is_err()
    {
        warn!("Reconcile worker did not shut down in time");
    }
    if !server_handle.is_finished()
        && tokio::time::timeout(shutdown_timeout, &mut server_handle)
            .await
            .is_err()
    {
        warn!("HTTP server did not shut down in time");
    }

    match stop {
        Stop::Clean => {
            info!("Capacity agent shutdown complete");
            Ok(())
        }
        Stop::Halted { consecutive_fatal } => {
            error!(consecutive_fatal, "Capacity agent halted");
            anyhow::bail!("halted after {consecutive_fatal} consecutive fatal failures")
        }
        Stop::Failed(reason) => {
            error!(reason = %reason, "Capacity agent stopped on a task failure");
            anyhow::bail!(reason)
        }
    }
}

/// How the agent stops, and with it the exit status.
#[derive(Debug, PartialEq, Eq)]
enum Stop {
    Clean,
    Halted { consecutive_fatal: u32 },
    Failed(String),
}

fn worker_stopped(result: Result<WorkerExit, JoinError>) -> Stop {
    match result {
        Ok(WorkerExit::Shutdown) => {
            info!("Reconcile worker exited");
            Stop::Clean
        }
        Ok(WorkerExit::Halted { consecutive_fatal }) => Stop::Halted { consecutive_fatal },
        Err(e) => Stop::Failed(format!("reconcile worker task failed: {e}")),
    }
}

/// The server only returns early when something went wrong.
fn server_stopped(result: Result<io::Result<()>, JoinError>) -> Stop {
    Stop::Failed(match result {
        Ok(Ok(())) => "HTTP server stopped unexpectedly".to_string(),
        Ok(Err(e)) => format!("HTTP server failed: {e}"),
        Err(e) => format!("HTTP server task failed: {e}"),
    })
}

/// Non-rotating log file `<dir>/<name>.log`.
fn log_file(dir: &Path, name: &str) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("failed to open {name}.log in {}", dir.display()))
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
