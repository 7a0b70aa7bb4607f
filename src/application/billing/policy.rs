//! Tunable billing policy.

use crate::domain::billing::{PlanCode, PlanPrices};

/// Prices, schedule horizon and top-up threshold used by the use cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingPolicy {
    pub prices: PlanPrices,
    /// Months registered per schedule batch.
    pub horizon_months: u32,
    /// Top up once fewer than this many charges remain scheduled.
    pub top_up_threshold: usize,
    /// Appended to the plan code to name charges.
    pub charge_name_suffix: String,
}

impl BillingPolicy {
    pub fn charge_name(&self, plan: PlanCode) -> String {
        plan.charge_name(&self.charge_name_suffix)
    }
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            prices: PlanPrices::default(),
            horizon_months: 12,
            top_up_threshold: 3,
            charge_name_suffix: "subscription".to_string(),
        }
    }
}
