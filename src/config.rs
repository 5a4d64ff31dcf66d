//! Environment-driven configuration.

use std::env;
use std::time::Duration;

use crate::{CommerceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend { Postgres, Memory }

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Account the buyer wires money to; shown next to the reference code.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BankAccount {
    pub bank_name: String,
    pub account_holder: String,
    pub iban: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    /// Used to build gateway callback and result-page URLs.
    pub public_base_url: String,
    pub currency: String,
    pub gateway: GatewayConfig,
    pub bank_account: BankAccount,
    /// Gateway orders still pending after this long are reconciled.
    pub reconcile_after: Duration,
    pub reconcile_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| get(key).ok_or_else(|| CommerceError::Config(format!("missing environment variable '{key}'")));
        let number = |key: &str, default: u64| -> Result<u64> {
            or(key, &default.to_string()).parse::<u64>().map_err(|e| CommerceError::Config(format!("invalid {key}: {e}")))
        };

        let storage = match or("STORAGE", "postgres").as_str() {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => return Err(CommerceError::Config(format!("unknown STORAGE '{other}'"))),
        };
        let database_url = match storage {
            StorageBackend::Postgres => Some(required("DATABASE_URL")?),
            StorageBackend::Memory => get("DATABASE_URL"),
        };
        let port = u16::try_from(number("PORT", 8083)?).map_err(|e| CommerceError::Config(format!("invalid PORT: {e}")))?;
        let database_max_connections = u32::try_from(number("DATABASE_MAX_CONNECTIONS", 10)?).map_err(|e| CommerceError::Config(format!("invalid DATABASE_MAX_CONNECTIONS: {e}")))?;

        let config = Self {
            port,
            storage,
            database_url,
            database_max_connections,
            nats_url: get("NATS_URL"),
            public_base_url: or("PUBLIC_BASE_URL", &format!("http://localhost:{port}")).trim_end_matches('/').to_string(),
            currency: or("CURRENCY", "USD"),
            gateway: GatewayConfig {
                base_url: or("GATEWAY_BASE_URL", "https://sandbox-api.gateway.example").trim_end_matches('/').to_string(),
                api_key: or("GATEWAY_API_KEY", ""),
                timeout: Duration::from_secs(number("GATEWAY_TIMEOUT_SECS", 15)?),
            },
            bank_account: BankAccount {
                bank_name: or("BANK_NAME", ""),
                account_holder: or("BANK_ACCOUNT_HOLDER", ""),
                iban: or("BANK_IBAN", ""),
            },
            reconcile_after: Duration::from_secs(
                number("RECONCILE_AFTER_MINUTES", 60)?
                    .checked_mul(60)
                    .ok_or_else(|| CommerceError::Config("RECONCILE_AFTER_MINUTES is too large".into()))?,
            ),
            reconcile_interval: Duration::from_secs(number("RECONCILE_INTERVAL_SECS", 300)?),
        };

        if chrono::Duration::from_std(config.reconcile_after).is_err() {
            return Err(CommerceError::Config("RECONCILE_AFTER_MINUTES is too large".into()));
        }
        if config.reconcile_interval.is_zero() {
            return Err(CommerceError::Config("RECONCILE_INTERVAL_SECS must be greater than 0".into()));
        }
        tracing::info!(storage = ?config.storage, currency = %config.currency, "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_memory_storage() {
        let config = AppConfig::from_lookup(lookup(&[("STORAGE", "memory")])).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.public_base_url, "http://localhost:8083");
        assert_eq!(config.reconcile_after, Duration::from_secs(3600));
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert!(matches!(AppConfig::from_lookup(lookup(&[])), Err(CommerceError::Config(_))));
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/shop"), ("PUBLIC_BASE_URL", "https://shop.example/")])).unwrap();
        assert_eq!(config.public_base_url, "https://shop.example");
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(AppConfig::from_lookup(lookup(&[("STORAGE", "memory"), ("PORT", "99999")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("STORAGE", "memory"), ("RECONCILE_INTERVAL_SECS", "0")])).is_err());
        let overflow = AppConfig::from_lookup(lookup(&[("STORAGE", "memory"), ("RECONCILE_AFTER_MINUTES", u64::MAX.to_string().as_str())]));
        assert!(matches!(overflow, Err(CommerceError::Config(ref m)) if m.contains("RECONCILE_AFTER_MINUTES")));
        let unrepresentable = AppConfig::from_lookup(lookup(&[("STORAGE", "memory"), ("RECONCILE_AFTER_MINUTES", "1000000000000000")]));
        assert!(matches!(unrepresentable, Err(CommerceError::Config(_))));
    }
}
