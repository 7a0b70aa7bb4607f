//! Subscription plans and their price table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::BillingError;

/// Plan a subscriber pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanCode {
    Basic,
    Enterprise,
}

impl PlanCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCode::Basic => "BASIC",
            PlanCode::Enterprise => "ENTERPRISE",
        }
    }

    /// Name shown on the gateway receipt and in payment history,
    /// e.g. `"BASIC subscription"`.
    pub fn charge_name(&self, suffix: &str) -> String {
        format!("{} {}", self.as_str(), suffix)
    }
}

impl fmt::Display for PlanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanCode {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BASIC" => Ok(PlanCode::Basic),
            "ENTERPRISE" => Ok(PlanCode::Enterprise),
            _ => Err(BillingError::unknown_plan(s)),
        }
    }
}

/// Static plan -> price mapping, in KRW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanPrices {
    pub basic: i64,
    pub enterprise: i64,
}

impl PlanPrices {
    pub fn new(basic: i64, enterprise: i64) -> Self {
        Self { basic, enterprise }
    }

    pub fn price_of(&self, plan: PlanCode) -> i64 {
        match plan {
            PlanCode::Basic => self.basic,
            PlanCode::Enterprise => self.enterprise,
        }
    }
}

impl Default for PlanPrices {
    fn default() -> Self {
        Self {
            basic: 9_900,
            enterprise: 29_900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("basic".parse::<PlanCode>().unwrap(), PlanCode::Basic);
        assert_eq!(" ENTERPRISE ".parse::<PlanCode>().unwrap(), PlanCode::Enterprise);
    }

    #[test]
    fn unknown_plan_is_rejected() {
        let err = "PREMIUM".parse::<PlanCode>().unwrap_err();
        assert!(matches!(err, BillingError::UnknownPlan(ref p) if p == "PREMIUM"));
    }

    #[test]
    fn charge_name_uses_plan_code() {
        assert_eq!(PlanCode::Basic.charge_name("subscription"), "BASIC subscription");
    }

    #[test]
    fn serializes_as_screaming_case() {
        let json = serde_json::to_string(&PlanCode::Enterprise).unwrap();
        assert_eq!(json, "\"ENTERPRISE\"");
    }

    #[test]
    fn default_prices_differ_per_plan() {
        let prices = PlanPrices::default();
        assert_eq!(prices.price_of(PlanCode::Basic), 9_900);
        assert_eq!(prices.price_of(PlanCode::Enterprise), 29_900);
    }
}
