// # ddnsbrokerd - dyndns2 Update Broker Daemon
//
// Thin integration layer: all update logic lives in ddnsbroker-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Opening the store and starting the propagation engine
// 4. Serving the HTTP surface until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `DDNSBROKER_LISTEN`: Listen address (default `0.0.0.0:8000`)
// - `DDNSBROKER_REALM`: Basic auth realm (default `ddnsbroker`)
// - `DDNSBROKER_STORE_TYPE`: Store type (file, memory; default file)
// - `DDNSBROKER_STORE_PATH`: Path to the store file (default `var/ddnsbroker.json`)
// - `DDNSBROKER_OUTBOUND_TIMEOUT_SECS`: Timeout for one outbound update (1-300, default 30)
// - `DDNSBROKER_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DDNSBROKER_LISTEN=127.0.0.1:8000
// export DDNSBROKER_STORE_PATH=/var/lib/ddnsbroker/store.json
//
// ddnsbrokerd
// ```

mod http;

use anyhow::Result;
use ddnsbroker_core::{
    BrokerConfig, EngineConfig, PropagationEngine, Repository, StoreConfig, UpdateHandler,
};
use ddnsbroker_dyndns2::Dyndns2Client;
use std::env;
use std::future::Future;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
const DEFAULT_STORE_PATH: &str = "var/ddnsbroker.json";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum BrokerExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<BrokerExitCode> for ExitCode {
    fn from(code: BrokerExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    listen: String,
    realm: Option<String>,
    store_type: String,
    store_path: String,
    outbound_timeout_secs: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let outbound_timeout_secs = match env::var("DDNSBROKER_OUTBOUND_TIMEOUT_SECS") {
            Ok(raw) => Some(raw.trim().parse().map_err(|_| {
                anyhow::anyhow!(
                    "DDNSBROKER_OUTBOUND_TIMEOUT_SECS must be a number of seconds. Got: {}",
                    raw
                )
            })?),
            Err(_) => None,
        };

        Ok(Self {
            listen: env::var("DDNSBROKER_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string()),
            realm: env::var("DDNSBROKER_REALM").ok(),
            store_type: env::var("DDNSBROKER_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("DDNSBROKER_STORE_PATH")
                .unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string()),
            outbound_timeout_secs,
            log_level: env::var("DDNSBROKER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        match self.store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "DDNSBROKER_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        if self.store_type == "file" && self.store_path.trim().is_empty() {
            anyhow::bail!(
                "DDNSBROKER_STORE_PATH cannot be empty when DDNSBROKER_STORE_TYPE=file"
            );
        }

        if let Some(timeout) = self.outbound_timeout_secs
            && !(1..=300).contains(&timeout)
        {
            anyhow::bail!(
                "DDNSBROKER_OUTBOUND_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                timeout
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DDNSBROKER_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.broker_config().validate()?;

        Ok(())
    }

    fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|_| {
            anyhow::anyhow!(
                "DDNSBROKER_LISTEN must be an address:port pair. Got: {}",
                self.listen
            )
        })
    }

    fn broker_config(&self) -> BrokerConfig {
        let mut config = BrokerConfig::new();
        if let Some(realm) = &self.realm {
            config.realm = realm.clone();
        }
        config.store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::File {
                path: self.store_path.clone(),
            },
        };
        config.engine = EngineConfig {
            outbound_timeout_secs: self
                .outbound_timeout_secs
                .unwrap_or(EngineConfig::default().outbound_timeout_secs),
            ..EngineConfig::default()
        };
        config
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return BrokerExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return BrokerExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return BrokerExitCode::ConfigError.into();
    }

    info!("Starting ddnsbrokerd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return BrokerExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            BrokerExitCode::RuntimeError
        } else {
            BrokerExitCode::CleanShutdown
        }
    })
    .into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let listen = config.listen_addr()?;
    let broker = config.broker_config();

    let store = ddnsbroker_core::store::open(&broker.store).await?;
    info!("Store opened: {:?}", broker.store);

    let (repo, queue) = Repository::with_queue(store, broker.engine.queue_capacity);
    let repo = Arc::new(repo);

    let client = Dyndns2Client::new(Duration::from_secs(broker.engine.outbound_timeout_secs))?;
    let (engine, mut events) = PropagationEngine::new(repo.clone(), Arc::new(client), &broker.engine)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    let (engine_stop_tx, engine_stop_rx) = oneshot::channel();
    let engine_task =
        tokio::spawn(async move { engine.run_with_shutdown(queue, engine_stop_rx).await });

    let shutdown = shutdown_signal()?;

    let app = http::build_router(http::AppState {
        handler: Arc::new(UpdateHandler::new(repo.clone(), broker.realm.clone())),
    });
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", listen, e))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let signal = shutdown.await;
        info!("Received shutdown signal: {}", signal);
    })
    .await?;

    info!("HTTP server stopped, stopping propagation engine");
    let _ = engine_stop_tx.send(());

    // The engine bounds its own wait for in-flight pushes (drain_timeout_secs)
    match engine_task.await {
        Ok(result) => result?,
        Err(e) => anyhow::bail!("Propagation engine task failed: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Install SIGTERM and SIGINT handlers
///
/// Handlers are installed up front so a setup failure aborts startup
/// instead of silently disabling shutdown.
///
/// # Returns
///
/// A future resolving to the name of the first signal received.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Fallback for non-Unix platforms (Ctrl-C only)
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
        "SIGINT"
    })
}
