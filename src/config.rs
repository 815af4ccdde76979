use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Per-provider payment gateway credentials.
///
/// `secret_key` signs/authorizes API calls; `webhook_secret` verifies
/// inbound webhook signatures. Paystack signs webhooks with the secret
/// key itself, so its `webhook_secret` defaults to `secret_key` when
/// unset. Flutterwave uses a dedicated verification hash.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GatewayConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
}

impl GatewayConfig {
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret
            .as_deref()
            .or(self.secret_key.as_deref())
    }
}

/// Application configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (stock lock store)
    pub redis_url: String,

    /// HTTP bind host/port
    pub host: String,
    pub port: u16,

    /// Runtime environment: development, test, production
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Payment gateways accepted at checkout, e.g. ["paystack", "flutterwave"].
    #[serde(default = "default_gateways")]
    #[validate(length(min = 1, message = "at least one payment gateway must be enabled"))]
    pub enabled_gateways: Vec<String>,

    #[serde(default)]
    pub paystack: GatewayConfig,

    #[serde(default)]
    pub flutterwave: GatewayConfig,

    /// How long a stock reservation is held before the sweep may cancel
    /// the unpaid order.
    #[serde(default = "default_reservation_lease_secs")]
    pub reservation_lease_secs: u64,

    /// Interval between reservation expiry sweeps.
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,

    /// Interval between payment reconciliation sweeps, which re-verify
    /// pending orders that already carry a payment reference.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Per-SKU lock lease. Must outlast the reservation transaction but
    /// stay short enough that a crashed holder does not block the SKU.
    #[serde(default = "default_stock_lock_lease_ms")]
    pub stock_lock_lease_ms: u64,

    /// Outbound HTTP timeout for payment-provider calls.
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_gateways() -> Vec<String> {
    vec!["paystack".to_string()]
}

fn default_reservation_lease_secs() -> u64 {
    1800
}

fn default_expiry_sweep_interval_secs() -> u64 {
    60
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_stock_lock_lease_ms() -> u64 {
    30_000
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    /// Programmatic constructor with sane defaults, used by tests and
    /// embedding callers; production deployments go through `load_config`.
    pub fn new(
        database_url: String,
        redis_url: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            enabled_gateways: default_gateways(),
            paystack: GatewayConfig::default(),
            flutterwave: GatewayConfig::default(),
            reservation_lease_secs: default_reservation_lease_secs(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            stock_lock_lease_ms: default_stock_lock_lease_ms(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Startup-time validation beyond field constraints.
    ///
    /// An enabled gateway with no webhook secret would mean accepting
    /// unverified webhooks; that is a refuse-to-start condition, never a
    /// silent downgrade.
    pub fn validate_gateways(&self) -> Result<(), AppConfigError> {
        for gateway in &self.enabled_gateways {
            let cfg = match gateway.as_str() {
                "paystack" => &self.paystack,
                "flutterwave" => &self.flutterwave,
                other => {
                    return Err(AppConfigError::Invalid(format!(
                        "unknown payment gateway '{}'",
                        other
                    )))
                }
            };
            if cfg.secret_key.as_deref().unwrap_or("").is_empty() {
                return Err(AppConfigError::Invalid(format!(
                    "payment gateway '{}' is enabled but has no secret key",
                    gateway
                )));
            }
            if cfg.webhook_secret().unwrap_or("").is_empty() {
                return Err(AppConfigError::Invalid(format!(
                    "payment gateway '{}' is enabled but has no webhook secret",
                    gateway
                )));
            }
        }
        Ok(())
    }
}

/// Loads configuration from `config/` files layered with `APP__`-prefixed
/// environment variables (e.g. `APP__PAYSTACK__SECRET_KEY`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://orderflow.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", run_env.clone())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;

    cfg.validate()
        .map_err(|e| AppConfigError::Invalid(e.to_string()))?;
    cfg.validate_gateways()?;

    Ok(cfg)
}

/// Initializes the tracing subscriber (plain or JSON formatting).
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("orderflow_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
