//! Billing policy configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::application::BillingPolicy;
use crate::domain::billing::PlanPrices;

/// Plan prices (KRW) and schedule policy.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_basic_price")]
    pub basic_price: i64,

    #[serde(default = "default_enterprise_price")]
    pub enterprise_price: i64,

    /// Months registered per schedule batch
    #[serde(default = "default_horizon")]
    pub schedule_horizon_months: u32,

    /// Top up once fewer than this many charges remain scheduled
    #[serde(default = "default_top_up_threshold")]
    pub top_up_threshold: usize,

    #[serde(default = "default_charge_name_suffix")]
    pub charge_name_suffix: String,
}

impl BillingConfig {
    pub fn policy(&self) -> BillingPolicy {
        BillingPolicy {
            prices: PlanPrices::new(self.basic_price, self.enterprise_price),
            horizon_months: self.schedule_horizon_months,
            top_up_threshold: self.top_up_threshold,
            charge_name_suffix: self.charge_name_suffix.clone(),
        }
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.basic_price <= 0 || self.enterprise_price <= 0 {
            return Err(ValidationError::InvalidPrice);
        }
        if !(1..=36).contains(&self.schedule_horizon_months) {
            return Err(ValidationError::InvalidHorizon);
        }
        if self.top_up_threshold >= self.schedule_horizon_months as usize {
            return Err(ValidationError::InvalidTopUpThreshold);
        }
        if self.charge_name_suffix.trim().is_empty() {
            return Err(ValidationError::MissingRequired("BILLING__CHARGE_NAME_SUFFIX"));
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            basic_price: default_basic_price(),
            enterprise_price: default_enterprise_price(),
            schedule_horizon_months: default_horizon(),
            top_up_threshold: default_top_up_threshold(),
            charge_name_suffix: default_charge_name_suffix(),
        }
    }
}

fn default_basic_price() -> i64 {
    9_900
}

fn default_enterprise_price() -> i64 {
    29_900
}

fn default_horizon() -> u32 {
    12
}

fn default_top_up_threshold() -> usize {
    3
}

fn default_charge_name_suffix() -> String {
    "subscription".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_default_policy() {
        let config = BillingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.policy(), BillingPolicy::default());
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let config = BillingConfig {
            basic_price: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPrice));
    }

    #[test]
    fn test_threshold_must_fit_in_horizon() {
        let config = BillingConfig {
            schedule_horizon_months: 3,
            top_up_threshold: 3,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidTopUpThreshold)
        );
    }

    #[test]
    fn test_horizon_bounds() {
        let config = BillingConfig {
            schedule_horizon_months: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidHorizon));
    }
}
