//! Task Assignment API
//!
//! A REST backend for tasks and users that keeps task assignments and user
//! pending lists in sync.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` (default) | `postgres`
//! - `DATABASE_URL`: `PostgreSQL` connection URL (required when `STORAGE_MODE=postgres`)
//! - `DATABASE_MAX_CONNECTIONS`: `PostgreSQL` pool size (default: `10`)
//! - `USER_UPDATE_POLICY`: `checked` (default) | `unchecked`
//! - `RUST_LOG`: Logging level (e.g., `debug`, `info`, `task_assignment_api=debug`)
//! - `LOG_FORMAT`: `json` for JSON log lines, anything else for text
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `3000`)
//! - `WORKER_THREADS`: Number of tokio worker threads (default: logical CPU count)

use std::env;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use task_assignment_api::api::{AppConfig, AppState, ServerConfig, serve};
use task_assignment_api::infrastructure::StoreFactory;

fn main() {
    dotenvy::dotenv().ok();

    let server_config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration error: {error}");
            std::process::exit(1);
        }
    };

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = server_config.worker_threads.threads {
        builder.worker_threads(threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create tokio runtime: {error}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async_main(server_config));
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "task_assignment_api=debug,tower_http=debug".into());

    let json_output = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    let (json_layer, text_layer) = if json_output {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Logs the error and exits with status 1.
fn fail(context: &str, error: &dyn std::fmt::Display) -> ! {
    tracing::error!(error = %error, "{context}");
    std::process::exit(1);
}

async fn async_main(server_config: ServerConfig) {
    init_tracing();

    tracing::info!("Starting Task Assignment API");
    if let Some(warning) = &server_config.worker_threads.warning {
        tracing::warn!("{warning}");
    }
    tracing::info!(
        worker_threads = ?server_config.worker_threads.threads,
        "Tokio runtime started"
    );

    let factory = StoreFactory::from_env().unwrap_or_else(|error| fail("Configuration error", &error));
    let config = AppConfig::from_env().unwrap_or_else(|error| fail("Configuration error", &error));
    let address = server_config
        .socket_address()
        .unwrap_or_else(|error| fail("Configuration error", &error));

    tracing::info!(
        storage_mode = ?factory.config().storage_mode,
        user_update_policy = ?config.user_update_policy,
        "Configuration loaded"
    );

    let store = factory
        .create()
        .await
        .unwrap_or_else(|error| fail("Failed to initialize document store", &error));
    tracing::info!("Document store initialized successfully");

    let listener = TcpListener::bind(address)
        .await
        .unwrap_or_else(|error| fail("Failed to bind server address", &error));
    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    let state = AppState::with_config(store, config);
    if let Err(error) = serve(listener, state, shutdown_signal()).await {
        fail("Server error", &error);
    }

    tracing::info!("Server shutdown complete");
}

/// Completes on Ctrl+C, or on SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
