//! Payment gateway configuration (PortOne)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::portone::PortOneConfig;

/// PortOne REST credentials and transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// REST API key
    #[serde(default)]
    pub imp_key: String,

    /// REST API secret
    #[serde(default = "empty_secret")]
    pub imp_secret: SecretString,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Adapter configuration built from these settings.
    pub fn portone(&self) -> PortOneConfig {
        PortOneConfig::new(self.imp_key.clone(), self.imp_secret.clone())
            .with_base_url(self.api_base_url.clone())
            .with_timeout(self.request_timeout())
    }

    /// Validate gateway configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.imp_key.trim().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__IMP_KEY"));
        }
        if self.imp_secret.expose_secret().trim().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__IMP_SECRET"));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if production && !self.api_base_url.starts_with("https://") {
            return Err(ValidationError::GatewayMustBeHttps);
        }
        if !(1..=60).contains(&self.request_timeout_secs) {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            imp_key: String::new(),
            imp_secret: empty_secret(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_api_base_url() -> String {
    "https://api.iamport.kr".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> GatewayConfig {
        GatewayConfig {
            imp_key: "imp_key_123".to_string(),
            imp_secret: SecretString::new("imp_secret_456".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.api_base_url, "https://api.iamport.kr");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_credentials() {
        assert_eq!(
            GatewayConfig::default().validate(false),
            Err(ValidationError::MissingRequired("GATEWAY__IMP_KEY"))
        );

        let config = GatewayConfig {
            imp_key: "imp_key_123".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(false),
            Err(ValidationError::MissingRequired("GATEWAY__IMP_SECRET"))
        );
    }

    #[test]
    fn test_timeout_bounds() {
        let config = GatewayConfig {
            request_timeout_secs: 61,
            ..valid()
        };
        assert_eq!(
            config.validate(false),
            Err(ValidationError::InvalidGatewayTimeout)
        );
    }

    #[test]
    fn test_plain_http_only_outside_production() {
        let config = GatewayConfig {
            api_base_url: "http://localhost:9090".to_string(),
            ..valid()
        };
        assert!(config.validate(false).is_ok());
        assert_eq!(
            config.validate(true),
            Err(ValidationError::GatewayMustBeHttps)
        );
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        assert!(!format!("{:?}", valid()).contains("imp_secret_456"));
    }

    #[test]
    fn test_portone_config_carries_settings() {
        let portone = valid().portone();
        assert_eq!(portone.api_base_url(), "https://api.iamport.kr");
        assert_eq!(portone.timeout(), Duration::from_secs(10));
    }
}
