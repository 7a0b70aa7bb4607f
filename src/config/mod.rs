//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `SUBSCRIPTION_BILLING`
//! prefix and `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use subscription_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod error;
mod gateway;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::GatewayConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration. No URL selects the in-memory store.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// PortOne credentials
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Plan prices and schedule policy
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SUBSCRIPTION_BILLING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `SUBSCRIPTION_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SUBSCRIPTION_BILLING__GATEWAY__IMP_KEY=...` -> `gateway.imp_key = ...`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SUBSCRIPTION_BILLING")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.gateway.validate(self.server.is_production())?;
        self.billing.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SUBSCRIPTION_BILLING__GATEWAY__IMP_KEY",
        "SUBSCRIPTION_BILLING__GATEWAY__IMP_SECRET",
        "SUBSCRIPTION_BILLING__SERVER__PORT",
        "SUBSCRIPTION_BILLING__SERVER__ENVIRONMENT",
        "SUBSCRIPTION_BILLING__DATABASE__URL",
        "SUBSCRIPTION_BILLING__BILLING__BASIC_PRICE",
    ];

    fn set_minimal_env() {
        env::set_var("SUBSCRIPTION_BILLING__GATEWAY__IMP_KEY", "imp_key_123");
        env::set_var("SUBSCRIPTION_BILLING__GATEWAY__IMP_SECRET", "imp_secret_456");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.gateway.imp_key, "imp_key_123");
        assert_eq!(config.gateway.imp_secret.expose_secret(), "imp_secret_456");
        assert!(config.database.url().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("SUBSCRIPTION_BILLING__SERVER__PORT", "3000");
        env::set_var("SUBSCRIPTION_BILLING__BILLING__BASIC_PRICE", "12000");
        env::set_var(
            "SUBSCRIPTION_BILLING__DATABASE__URL",
            "postgres://billing@localhost/billing",
        );
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.billing.policy().prices.basic, 12_000);
        assert_eq!(
            config.database.url(),
            Some("postgres://billing@localhost/billing")
        );
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("SUBSCRIPTION_BILLING__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        assert!(result.unwrap().is_production());
    }

    #[test]
    fn test_missing_gateway_credentials_fail_validation() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired(_))
        ));
    }
}
