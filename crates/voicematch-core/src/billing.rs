//! Client-side billing estimate
//!
//! The values produced here are for display only. The backend computes the
//! authoritative duration and cost when the call ends, and those always
//! replace the local estimate.
//!
//! Policy:
//! - the first `GRACE_PERIOD_SECS` seconds are free
//! - any call past the grace period is charged the full first minute
//! - after the first minute every second bills proportionally, rounded to
//!   2 decimal places

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Seconds at the start of a call that are never charged
pub const GRACE_PERIOD_SECS: u64 = 5;

/// Length of the flat-charged first minute
pub const FIRST_MINUTE_SECS: u64 = 60;

/// Estimated cost of a call that has been active for `elapsed_seconds`
pub fn estimate_cost(elapsed_seconds: u64, rate_per_min: Decimal) -> Decimal {
    if elapsed_seconds <= GRACE_PERIOD_SECS {
        return Decimal::ZERO;
    }
    if elapsed_seconds <= FIRST_MINUTE_SECS {
        return rate_per_min;
    }

    let extra = Decimal::from(elapsed_seconds - FIRST_MINUTE_SECS);
    let cost = rate_per_min + rate_per_min * extra / Decimal::from(FIRST_MINUTE_SECS);
    cost.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A labeled, non-authoritative cost projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    pub elapsed_seconds: u64,
    pub amount: Decimal,
}

/// Elapsed-time counter for an active call
///
/// The estimate is recomputed from `elapsed_seconds` and the rate on every
/// tick and is never stored independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingMeter {
    rate_per_min: Decimal,
    elapsed_seconds: u64,
}

impl BillingMeter {
    pub fn new(rate_per_min: Decimal) -> Self {
        Self {
            rate_per_min,
            elapsed_seconds: 0,
        }
    }

    /// Advance by one second and return the new estimate
    pub fn tick(&mut self) -> CostEstimate {
        self.elapsed_seconds += 1;
        self.estimate()
    }

    pub fn estimate(&self) -> CostEstimate {
        CostEstimate {
            elapsed_seconds: self.elapsed_seconds,
            amount: estimate_cost(self.elapsed_seconds, self.rate_per_min),
        }
    }

    #[inline]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    #[inline]
    pub fn rate_per_min(&self) -> Decimal {
        self.rate_per_min
    }
}

/// `MM:SS` clock used by the in-call timer
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `Xm Ys` duration used by the post-call summary
pub fn format_duration(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_grace_period_is_free() {
        assert_eq!(estimate_cost(0, dec!(5)), Decimal::ZERO);
        assert_eq!(estimate_cost(5, dec!(5)), Decimal::ZERO);
    }

    #[test]
    fn test_first_minute_is_flat() {
        assert_eq!(estimate_cost(6, dec!(5)), dec!(5));
        assert_eq!(estimate_cost(60, dec!(5)), dec!(5));
    }

    #[test]
    fn test_per_second_after_first_minute() {
        assert_eq!(estimate_cost(90, dec!(5)), dec!(7.5));
        assert_eq!(estimate_cost(120, dec!(8)), dec!(16));
        // 5 + 5/60 = 5.0833...
        assert_eq!(estimate_cost(61, dec!(5)), dec!(5.08));
    }

    #[test]
    fn test_first_call_rate() {
        assert_eq!(estimate_cost(61, dec!(1)), dec!(1.02));
        assert_eq!(estimate_cost(300, dec!(1)), dec!(5));
    }

    #[test]
    fn test_meter_ticks() {
        let mut meter = BillingMeter::new(dec!(5));
        assert_eq!(meter.estimate().amount, Decimal::ZERO);

        for _ in 0..5 {
            meter.tick();
        }
        assert_eq!(meter.estimate().amount, Decimal::ZERO);

        let estimate = meter.tick();
        assert_eq!(estimate.elapsed_seconds, 6);
        assert_eq!(estimate.amount, dec!(5));

        for _ in 0..84 {
            meter.tick();
        }
        assert_eq!(meter.elapsed_seconds(), 90);
        assert_eq!(meter.estimate().amount, dec!(7.5));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(95), "01:35");
        assert_eq!(format_clock(3600), "60:00");
        assert_eq!(format_duration(95), "1m 35s");
    }

    proptest! {
        #[test]
        fn prop_estimate_follows_policy(elapsed in 0u64..20_000, cents in 1i64..10_000) {
            let rate = Decimal::new(cents, 2);
            let cost = estimate_cost(elapsed, rate);

            if elapsed <= GRACE_PERIOD_SECS {
                prop_assert_eq!(cost, Decimal::ZERO);
            } else if elapsed <= FIRST_MINUTE_SECS {
                prop_assert_eq!(cost, rate);
            } else {
                let exact = rate + rate * Decimal::from(elapsed - 60) / Decimal::from(60u64);
                prop_assert!((cost - exact).abs() <= dec!(0.005));
                prop_assert!(cost.scale() <= 2);
            }
        }

        #[test]
        fn prop_estimate_never_decreases(elapsed in 0u64..20_000, cents in 1i64..10_000) {
            let rate = Decimal::new(cents, 2);
            prop_assert!(estimate_cost(elapsed + 1, rate) >= estimate_cost(elapsed, rate));
        }
    }
}
