// # hostsyncd - Inventory to IPAM Sync Daemon
//
// The hostsyncd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering connectors and building the sync engine
// 4. Serving the HTTP front-end until SIGINT/SIGTERM
//
// All sync logic lives in hostsync-core.
//
// ## Configuration
//
// ### Service
// - `SYNC_HOST` / `SYNC_PORT`: Listen address (default `0.0.0.0:8080`)
// - `SYNC_TIMEOUT_SECONDS`: Per HTTP request timeout (default 30)
// - `SYNC_RUN_TIMEOUT_SECONDS`: Whole run bound (default 300)
// - `SYNC_VERIFY_SSL`: Verify upstream TLS certificates (default false)
// - `SYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `SYNC_DNS_ZONE`: Zone appended to device names (required)
//
// ### Engine
// - `SYNC_MAX_ATTEMPTS`: Attempts per remote operation (default 3)
// - `SYNC_RETRY_BASE_MS` / `SYNC_RETRY_MAX_MS`: Backoff bounds (default 500 / 10000)
// - `SYNC_CONCURRENCY`: Devices processed in parallel (default 1)
//
// ### WhatsUp Gold
// - `WUG_BASE_URL`, `WUG_USERNAME`, `WUG_PASSWORD` (required)
// - `WUG_AUTH_MODE`: token or basic (default token)
// - `WUG_TOKEN_ENDPOINT`, `WUG_DEVICES_ENDPOINT`, `WUG_PAGE_SIZE`
//
// ### Infoblox
// - `INFOBLOX_BASE_URL`, `INFOBLOX_USERNAME`, `INFOBLOX_PASSWORD` (required)
// - `INFOBLOX_WAPI_VERSION` (default v2.12.3), `INFOBLOX_DNS_VIEW` (default default)
//
// ## Example
//
// ```bash
// export WUG_BASE_URL=https://wug.example.com
// export WUG_USERNAME=api WUG_PASSWORD=...
// export INFOBLOX_BASE_URL=https://gm.example.com
// export INFOBLOX_USERNAME=sync INFOBLOX_PASSWORD=...
// export SYNC_DNS_ZONE=example.com
//
// hostsyncd
// curl -X POST localhost:8080/dry-run -d '{"limit": 10}'
// ```

mod config;
mod routes;

use anyhow::{Context, Result};
use config::DaemonConfig;
use hostsync_core::{ConnectorRegistry, SyncEngine};
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum HostsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<HostsyncExitCode> for ExitCode {
    fn from(code: HostsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match DaemonConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return HostsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {e:#}");
        return HostsyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return HostsyncExitCode::ConfigError.into();
    }

    info!("Starting hostsyncd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HostsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let state = match build_state(&config) {
            Ok(state) => state,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return HostsyncExitCode::ConfigError;
            }
        };

        if let Err(e) = serve(&config, state).await {
            error!("Daemon error: {:#}", e);
            HostsyncExitCode::RuntimeError
        } else {
            HostsyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Register connectors and build the engine behind the router state
fn build_state(config: &DaemonConfig) -> Result<routes::AppState> {
    let registry = ConnectorRegistry::new();

    #[cfg(feature = "wug")]
    {
        info!("Registering WhatsUp Gold inventory source");
        hostsync_inventory_wug::register(&registry);
    }

    #[cfg(feature = "infoblox")]
    {
        info!("Registering Infoblox IPAM sink");
        hostsync_ipam_infoblox::register(&registry);
    }

    let sync = &config.sync;
    let source = registry
        .create_inventory_source(&sync.inventory, &sync.engine.retry_policy())
        .context("Failed to create inventory source")?;
    let sink = registry
        .create_ipam_sink(&sync.ipam)
        .context("Failed to create IPAM sink")?;

    info!(
        source = source.source_name(),
        sink = sink.sink_name(),
        zone = %sync.mapping.zone,
        "Connectors ready"
    );

    let (engine, events) = SyncEngine::new(source, sink, sync.mapping.clone(), sync.engine.clone())
        .context("Failed to create sync engine")?;
    routes::spawn_event_logger(events);

    Ok(routes::AppState::new(engine, config.run_timeout))
}

/// Serve the HTTP front-end until a shutdown signal arrives
async fn serve(config: &DaemonConfig, state: routes::AppState) -> Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async {
            match wait_for_shutdown().await {
                Ok(signal) => info!("Received shutdown signal: {}", signal),
                Err(e) => error!("Shutdown signal error: {}", e),
            }
        })
        .await
        .context("HTTP server failed")?;

    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(received)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
