//! Process configuration.
//!
//! Everything comes from the environment:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `ADMIN_TOKEN` | required | shared bearer secret for mutating RPCs |
//! | `STORE_ADDR` | `localhost:6379` | backing store address |
//! | `STORE_DB` | `0` | numeric database selector |
//! | `STORE_PASSWORD` | none | backing store password |
//! | `RPC_ADDR` | `0.0.0.0:50051` | gRPC listen address |
//! | `HEALTH_ADDR` | `0.0.0.0:8080` | health HTTP listen address |
//! | `PORT` | none | overrides the `HEALTH_ADDR` port when set |
//! | `LOG_LEVEL` | `info` | debug / info / warn / error |
//! | `LOG_FORMAT` | `auto` | text / json / auto (JSON when not a TTY) |

use std::net::SocketAddr;

use serde::Deserialize;
use snafu::Snafu;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text (development).
    Text,
    /// JSON structured logging (production).
    Json,
    /// JSON when stdout is not a TTY, text otherwise.
    Auto,
}

/// Raw environment mapping; resolved into [`Config`] by validation.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    admin_token: Option<String>,
    #[serde(default = "default_store_addr")]
    store_addr: String,
    #[serde(default)]
    store_db: i64,
    #[serde(default)]
    store_password: Option<String>,
    #[serde(default = "default_rpc_addr")]
    rpc_addr: String,
    #[serde(default = "default_health_addr")]
    health_addr: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_log_format")]
    log_format: LogFormat,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared bearer secret gating mutating RPCs.
    pub admin_token: String,
    /// Backing store address (`host:port`).
    pub store_addr: String,
    /// Backing store database selector.
    pub store_db: i64,
    /// Optional backing store password.
    pub store_password: Option<String>,
    /// gRPC listen address.
    pub rpc_addr: SocketAddr,
    /// Health HTTP listen address, with `PORT` already applied.
    pub health_addr: SocketAddr,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

/// Configuration error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// The environment could not be read or parsed.
    #[snafu(display("failed to load config: {message}"))]
    Load {
        /// Loader error description.
        message: String,
    },

    /// `ADMIN_TOKEN` is missing or empty.
    #[snafu(display("ADMIN_TOKEN environment variable is required"))]
    MissingAdminToken,

    /// A listen address did not parse.
    #[snafu(display("invalid {variable}: {value:?}"))]
    InvalidAddr {
        /// Which environment variable was rejected.
        variable: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the environment cannot be
    /// parsed, `ADMIN_TOKEN` is absent, or an address is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| ConfigError::Load { message: e.to_string() })?
            .try_deserialize::<RawConfig>()
            .map_err(|e| ConfigError::Load { message: e.to_string() })?;

        raw.resolve()
    }

    /// Creates a configuration for testing; no environment involved.
    #[allow(clippy::unwrap_used, clippy::disallowed_methods)]
    pub fn for_test(admin_token: &str) -> Self {
        Self {
            admin_token: admin_token.to_string(),
            store_addr: default_store_addr(),
            store_db: 0,
            store_password: None,
            rpc_addr: "127.0.0.1:50051".parse().unwrap(),
            health_addr: "127.0.0.1:8080".parse().unwrap(),
            log_level: default_log_level(),
            log_format: LogFormat::Text,
        }
    }
}

impl RawConfig {
    fn resolve(self) -> Result<Config, ConfigError> {
        let admin_token = match self.admin_token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ConfigError::MissingAdminToken),
        };

        let rpc_addr = parse_addr("RPC_ADDR", &self.rpc_addr)?;
        let mut health_addr = parse_addr("HEALTH_ADDR", &self.health_addr)?;
        // Cloud convention: PORT wins over HEALTH_ADDR's port
        if let Some(port) = self.port {
            health_addr.set_port(port);
        }

        Ok(Config {
            admin_token,
            store_addr: self.store_addr,
            store_db: self.store_db,
            store_password: self.store_password,
            rpc_addr,
            health_addr,
            log_level: self.log_level,
            log_format: self.log_format,
        })
    }
}

fn parse_addr(variable: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidAddr { variable, value: value.to_string() })
}

fn default_store_addr() -> String {
    "localhost:6379".to_string()
}

fn default_rpc_addr() -> String {
    "0.0.0.0:50051".to_string()
}

fn default_health_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Auto
}
