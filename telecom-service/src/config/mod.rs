//! Configuration module for telecom-service.

use crate::services::WalletMode;
use rust_decimal::Decimal;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "STORAGE_BACKEND must be 'postgres' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelecomConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageBackend,
    pub database: DatabaseConfig,
    pub notifications: NotificationConfig,
    pub renewal: RenewalConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<Secret<String>>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    /// Events go to the log when unset.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// Price of one period, in major units.
    pub amount: Decimal,
    pub currency_code: String,
    pub wallet_mode: WalletMode,
    /// Zero disables the background sweep.
    pub sweep_interval_secs: u64,
    pub sweep_batch: i64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            amount: Decimal::new(29900, 2),
            currency_code: "inr".to_string(),
            wallet_mode: WalletMode::Random(0.7),
            sweep_interval_secs: 3600,
            sweep_batch: 100,
        }
    }
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl TelecomConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let storage: StorageBackend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok().map(Secret::new);
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_URL is required"
            )));
        }

        let defaults = RenewalConfig::default();
        let wallet_mode = match env::var("WALLET_MODE") {
            Ok(raw) => raw
                .parse::<WalletMode>()
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!("WALLET_MODE: {}", e)))?,
            Err(_) => defaults.wallet_mode,
        };
        // RENEWAL_AMOUNT is in minor units (paise).
        let amount = env::var("RENEWAL_AMOUNT")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(|minor| Decimal::new(minor, 2))
            .unwrap_or(defaults.amount);

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "telecom-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            storage,
            database: DatabaseConfig {
                url: database_url,
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parsed_or("DATABASE_MIN_CONNECTIONS", 2),
            },
            notifications: NotificationConfig {
                webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                    .ok()
                    .filter(|url| !url.is_empty()),
            },
            renewal: RenewalConfig {
                amount,
                currency_code: env::var("RENEWAL_CURRENCY")
                    .unwrap_or(defaults.currency_code),
                wallet_mode,
                sweep_interval_secs: parsed_or(
                    "RENEWAL_SWEEP_INTERVAL_SECS",
                    defaults.sweep_interval_secs,
                ),
                sweep_batch: parsed_or("RENEWAL_SWEEP_BATCH", defaults.sweep_batch),
            },
        })
    }

    /// In-memory backend on a random local port, no background sweep.
    pub fn in_memory() -> Self {
        Self {
            common: core_config::Config {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            service_name: "telecom-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            storage: StorageBackend::Memory,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 2,
            },
            notifications: NotificationConfig::default(),
            renewal: RenewalConfig {
                wallet_mode: WalletMode::Approve,
                sweep_interval_secs: 0,
                ..RenewalConfig::default()
            },
        }
    }
}
