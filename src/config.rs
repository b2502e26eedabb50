//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::jobs::SchedulerConfig;
use crate::manager::ManagerConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of sales pending or active at once
    pub max_active_sales: usize,

    /// Interval of the expiry sweep
    pub sweep_interval: Duration,

    /// Upper bound for a single currency/inventory/persistence call
    pub port_timeout: Duration,

    /// Environment (development, production)
    pub environment: String,

    /// Sale created by the service binary at startup, if configured
    pub demo_sale: Option<DemoSaleConfig>,
}

/// Sale definition read from `DEMO_SALE_*` variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSaleConfig {
    pub item: String,
    pub price: String,
    pub quantity: u32,
    pub start_delay: String,
    pub duration: String,
}

impl DemoSaleConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(item) = lookup("DEMO_SALE_ITEM") else {
            return Ok(None);
        };

        let price = lookup("DEMO_SALE_PRICE").ok_or(ConfigError::MissingEnv("DEMO_SALE_PRICE"))?;

        let quantity = parse_positive(lookup, "DEMO_SALE_QUANTITY")?
            .ok_or(ConfigError::MissingEnv("DEMO_SALE_QUANTITY"))?;
        let quantity =
            u32::try_from(quantity).map_err(|_| ConfigError::InvalidValue("DEMO_SALE_QUANTITY"))?;

        Ok(Some(Self {
            item,
            price,
            quantity,
            start_delay: lookup("DEMO_SALE_START_DELAY").unwrap_or_else(|| "0s".to_string()),
            duration: lookup("DEMO_SALE_DURATION").unwrap_or_else(|| "10m".to_string()),
        }))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_active_sales: 4,
            sweep_interval: Duration::from_millis(1_000),
            port_timeout: Duration::from_millis(5_000),
            environment: "development".to_string(),
            demo_sale: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_active_sales = parse_positive(&lookup, "MAX_ACTIVE_SALES")?
            .map(|v| v as usize)
            .unwrap_or(defaults.max_active_sales);

        let sweep_interval = parse_positive(&lookup, "SWEEP_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.sweep_interval);

        let port_timeout = parse_positive(&lookup, "PORT_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.port_timeout);

        let environment = lookup("ENVIRONMENT").unwrap_or(defaults.environment);

        let demo_sale = DemoSaleConfig::from_lookup(&lookup)?;

        Ok(Self {
            max_active_sales,
            sweep_interval,
            port_timeout,
            environment,
            demo_sale,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_active_sales: self.max_active_sales,
            port_timeout: self.port_timeout,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: self.sweep_interval,
        }
    }
}

fn parse_positive<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidValue(key)),
            Ok(value) => Ok(Some(value)),
        },
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
