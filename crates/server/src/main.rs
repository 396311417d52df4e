//! nodewatch server binary.
//!
//! Launches the node status service: the gRPC surface (write + read +
//! watch), the event broker, and the health HTTP endpoints, backed by
//! a Redis store.
//!
//! # Usage
//!
//! ```bash
//! ADMIN_TOKEN=s3cret nodewatch-server
//!
//! ADMIN_TOKEN=s3cret \
//! STORE_ADDR=redis.internal:6379 \
//! RPC_ADDR=0.0.0.0:50051 \
//! LOG_LEVEL=debug \
//! nodewatch-server
//! ```

use std::io::IsTerminal;
use std::sync::Arc;

use nodewatch_server::config::LogFormat;
use nodewatch_server::{Config, EventBroker, NodeWatchServer, health, shutdown};
use nodewatch_store::{NodeStore, RedisBackend};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_logging(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        rpc_addr = %config.rpc_addr,
        health_addr = %config.health_addr,
        "starting nodewatch"
    );

    let backend = RedisBackend::connect(
        &config.store_addr,
        config.store_db,
        config.store_password.as_deref(),
    )
    .await?;
    let store = NodeStore::new(backend);
    tracing::info!(store_addr = %config.store_addr, db = config.store_db, "store connected");

    let broker = Arc::new(EventBroker::new());

    // Health surface runs beside the gRPC listener
    let health_store = store.clone();
    let health_addr = config.health_addr;
    tokio::spawn(async move {
        if let Err(err) = health::serve(health_store, health_addr).await {
            tracing::error!(error = %err, "health server failed");
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let server = NodeWatchServer::builder()
        .store(store)
        .broker(broker)
        .admin_token(config.admin_token.clone())
        .addr(config.rpc_addr)
        .shutdown_rx(shutdown_rx)
        .build();

    tracing::info!(addr = %config.rpc_addr, "gRPC server listening");
    server.serve().await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Initializes the logging system based on configuration.
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` supplies the filter.
/// JSON output is used in production (`auto` picks it whenever stdout
/// is not a TTY).
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let use_json = match config.log_format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}
