use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Default values for configuration
const DEFAULT_LEAD_TIME_DAYS: u32 = 7;
const DEFAULT_SAFETY_STOCK_DAYS: u32 = 7;
const DEFAULT_FORECAST_DAYS: u32 = 30;
const DEFAULT_HISTORY_DAYS: u32 = 90;
const DEFAULT_BATCH_CONCURRENCY: usize = 4;
const DEFAULT_BATCH_PAGE_SIZE: usize = 500;
const ENV_PREFIX: &str = "STOCKCAST";

/// Batch analysis configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Number of products analyzed concurrently. 1 reproduces the
    /// sequential reference behavior.
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: usize,

    /// Maximum products fetched per batch run
    #[serde(default = "default_batch_page_size")]
    pub page_size: usize,

    /// Optional per-product analysis timeout in seconds. Tree-model
    /// training dominates the cost of a single analysis.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_batch_concurrency(),
            page_size: default_batch_page_size(),
            timeout_secs: None,
        }
    }
}

/// Engine configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Days between placing a restock order and stock arrival
    #[serde(default = "default_lead_time_days")]
    pub lead_time_days: u32,

    /// Days of demand held as safety buffer
    #[serde(default = "default_safety_stock_days")]
    pub safety_stock_days: u32,

    /// Forward horizon of every demand forecast
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,

    /// Days of sales history pulled per analysis
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Daily-demand floor used for cold-start products
    #[serde(default = "default_cold_start_floor")]
    pub cold_start_floor: f64,

    /// Apply the price-elasticity heuristic to forecasts. Off by default:
    /// the heuristic is advisory, not a demand model.
    #[serde(default)]
    pub price_elasticity_enabled: bool,

    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lead_time_days: default_lead_time_days(),
            safety_stock_days: default_safety_stock_days(),
            forecast_days: default_forecast_days(),
            history_days: default_history_days(),
            cold_start_floor: default_cold_start_floor(),
            price_elasticity_enabled: false,
            batch: BatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from an optional file plus `STOCKCAST_`-prefixed
    /// environment variables, falling back to defaults for anything unset.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: EngineConfig = settings.try_deserialize()?;
        cfg.validate()?;
        info!(
            lead_time_days = cfg.lead_time_days,
            forecast_days = cfg.forecast_days,
            "engine configuration loaded"
        );
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.forecast_days == 0 {
            return Err(ConfigError::Message(
                "forecast_days must be greater than zero".to_string(),
            ));
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::Message(
                "batch.concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_lead_time_days() -> u32 {
    DEFAULT_LEAD_TIME_DAYS
}

fn default_safety_stock_days() -> u32 {
    DEFAULT_SAFETY_STOCK_DAYS
}

fn default_forecast_days() -> u32 {
    DEFAULT_FORECAST_DAYS
}

fn default_history_days() -> u32 {
    DEFAULT_HISTORY_DAYS
}

fn default_cold_start_floor() -> f64 {
    0.5
}

fn default_batch_concurrency() -> usize {
    DEFAULT_BATCH_CONCURRENCY
}

fn default_batch_page_size() -> usize {
    DEFAULT_BATCH_PAGE_SIZE
}
