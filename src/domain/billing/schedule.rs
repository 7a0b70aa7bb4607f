//! Charge date planning for gateway schedules.

use crate::domain::foundation::Timestamp;

/// Length of one billing period, in calendar months.
pub const BILLING_PERIOD_MONTHS: u32 = 1;

/// First charge date of the next batch: one period after the latest open
/// schedule, or one period from `now` when nothing is scheduled.
pub fn schedule_base(latest_scheduled: Option<Timestamp>, now: Timestamp) -> Timestamp {
    latest_scheduled
        .unwrap_or(now)
        .add_months(BILLING_PERIOD_MONTHS)
}

/// `count` monthly charge dates starting at `base`.
///
/// Each date is computed from `base` rather than from its predecessor, so a
/// base on the 31st yields Feb 28/29 then Mar 31 instead of sticking to 28.
pub fn charge_dates(base: Timestamp, count: u32) -> Vec<Timestamp> {
    (0..count)
        .map(|offset| base.add_months(offset * BILLING_PERIOD_MONTHS))
        .collect()
}

/// Next billing date used when no open schedule exists.
pub fn fallback_next_billing_date(now: Timestamp) -> Timestamp {
    now.add_months(BILLING_PERIOD_MONTHS)
}
