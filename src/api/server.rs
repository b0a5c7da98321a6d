//! Listener configuration and the serve loop.

use std::env;
use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use super::handlers::AppState;
use super::router;
use crate::infrastructure::ConfigurationError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

/// Worker threads allowed per available CPU before `WORKER_THREADS` is capped.
const THREADS_PER_CPU: usize = 4;

// =============================================================================
// Worker Threads
// =============================================================================

/// Resolved tokio worker thread count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerThreads {
    /// `None` keeps tokio's default of one thread per logical CPU.
    pub threads: Option<usize>,
    /// Set when the requested value was rejected or capped.
    pub warning: Option<String>,
}

impl WorkerThreads {
    /// Resolves a raw `WORKER_THREADS` value against the available
    /// parallelism. Zero and non-numbers fall back to the default, and values
    /// above `THREADS_PER_CPU` times `parallelism` are capped.
    #[must_use]
    pub fn resolve(raw: Option<&str>, parallelism: usize) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };

        match raw.parse::<usize>() {
            Ok(0) => Self {
                threads: None,
                warning: Some("WORKER_THREADS=0 is invalid (must be > 0), using default".to_string()),
            },
            Ok(requested) => {
                let limit = parallelism.max(1).saturating_mul(THREADS_PER_CPU);
                if requested > limit {
                    Self {
                        threads: Some(limit),
                        warning: Some(format!(
                            "WORKER_THREADS={requested} exceeds recommended limit ({limit}), capping to {limit}"
                        )),
                    }
                } else {
                    Self {
                        threads: Some(requested),
                        warning: None,
                    }
                }
            }
            Err(error) => Self {
                threads: None,
                warning: Some(format!(
                    "WORKER_THREADS='{raw}' is not a valid number ({error}), using default"
                )),
            },
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Where to listen and how many runtime threads to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub worker_threads: WorkerThreads,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            worker_threads: WorkerThreads::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `HOST`, `PORT` and `WORKER_THREADS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidPort` if `PORT` is set but is not
    /// a port number.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let parallelism = std::thread::available_parallelism().map_or(16, usize::from);
        Self::from_values(
            env::var("HOST").ok().as_deref(),
            env::var("PORT").ok().as_deref(),
            env::var("WORKER_THREADS").ok().as_deref(),
            parallelism,
        )
    }

    fn from_values(
        host: Option<&str>,
        port: Option<&str>,
        worker_threads: Option<&str>,
        parallelism: usize,
    ) -> Result<Self, ConfigurationError> {
        let host = host
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .unwrap_or(DEFAULT_HOST)
            .to_string();
        let port = match port.map(str::trim).filter(|port| !port.is_empty()) {
            Some(port) => port
                .parse()
                .map_err(|_| ConfigurationError::InvalidPort(port.to_string()))?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            host,
            port,
            worker_threads: WorkerThreads::resolve(worker_threads, parallelism),
        })
    }

    /// The socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidServerAddress` if `host` is not an
    /// IP address.
    pub fn socket_address(&self) -> Result<SocketAddr, ConfigurationError> {
        let address = format!("{}:{}", self.host, self.port);
        address
            .parse()
            .map_err(|_| ConfigurationError::InvalidServerAddress(address))
    }
}

// =============================================================================
// Serve
// =============================================================================

/// Serves the application on `listener` until `shutdown` completes, then
/// waits for the reference sync writes still in flight.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let synchronizer = state.synchronizer.clone();

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    let pending = synchronizer.in_flight();
    if pending > 0 {
        tracing::info!(pending, "Waiting for reference sync writes to finish");
    }
    synchronizer.settle().await;
    Ok(())
}
