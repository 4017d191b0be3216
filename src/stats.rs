// 5.0: platform-wide fee totals and the sweeper heartbeat. one record, merged
// into by every trade and position action.

use crate::types::{checked, AccountId, Overflow, Quote, Timestamp};
use serde::{Deserialize, Serialize};

/// Which bucket a fee is attributed to. Same rate either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeBucket {
    Admin,
    User,
}

impl FeeBucket {
    pub fn for_caller(caller: AccountId, operator: AccountId) -> Self {
        if caller == operator {
            FeeBucket::Admin
        } else {
            FeeBucket::User
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeStats {
    pub total_fees_generated: Quote,
    pub total_user_fees: Quote,
    pub total_admin_fees: Quote,
    pub perp_liquidations: u64,
    pub last_perp_sweep_at: Option<Timestamp>,
}

impl FeeStats {
    /// Adds `fee` to the total and to its bucket. Nothing changes on overflow.
    pub fn record_fee(&mut self, fee: Quote, bucket: FeeBucket) -> Result<(), Overflow> {
        let total = checked(self.total_fees_generated.checked_add(fee), "total_fees_generated")?;
        match bucket {
            FeeBucket::Admin => {
                self.total_admin_fees = checked(self.total_admin_fees.checked_add(fee), "total_admin_fees")?
            }
            FeeBucket::User => {
                self.total_user_fees = checked(self.total_user_fees.checked_add(fee), "total_user_fees")?
            }
        }
        self.total_fees_generated = total;
        Ok(())
    }

    pub fn record_liquidation(&mut self) {
        self.perp_liquidations = self.perp_liquidations.saturating_add(1);
    }

    pub fn heartbeat(&mut self, at: Timestamp) {
        self.last_perp_sweep_at = Some(at);
    }

    /// True when the last sweep is older than `max_age_ms` (or never ran).
    pub fn sweep_is_stale(&self, now: Timestamp, max_age_ms: i64) -> bool {
        match self.last_perp_sweep_at {
            Some(at) => now.as_millis() - at.as_millis() > max_age_ms,
            None => true,
        }
    }

    pub fn apply(&mut self, delta: &StatsDelta) -> Result<(), Overflow> {
        if let Some((fee, bucket)) = delta.fee {
            self.record_fee(fee, bucket)?;
        }
        for _ in 0..delta.liquidations {
            self.record_liquidation();
        }
        if let Some(at) = delta.heartbeat {
            self.heartbeat(at);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        let split = self
            .total_user_fees
            .checked_add(self.total_admin_fees)
            .ok_or_else(|| "fee buckets overflow".to_string())?;
        if split != self.total_fees_generated {
            return Err(format!(
                "fee buckets {} do not add up to total {}",
                split, self.total_fees_generated
            ));
        }
        Ok(())
    }
}

/// Increment merged into the singleton stats record at commit time. Merges do
/// not take part in version checks, so concurrent trades never conflict on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub fee: Option<(Quote, FeeBucket)>,
    pub liquidations: u64,
    pub heartbeat: Option<Timestamp>,
}

impl StatsDelta {
    pub fn fee(fee: Quote, bucket: FeeBucket) -> Self {
        Self {
            fee: Some((fee, bucket)),
            ..Default::default()
        }
    }

    pub fn liquidation() -> Self {
        Self {
            liquidations: 1,
            ..Default::default()
        }
    }

    pub fn heartbeat(at: Timestamp) -> Self {
        Self {
            heartbeat: Some(at),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fees_split_by_caller() {
        let operator = AccountId(1);
        let mut stats = FeeStats::default();

        stats.record_fee(Quote::new(dec!(20)), FeeBucket::for_caller(AccountId(5), operator)).unwrap();
        stats.record_fee(Quote::new(dec!(4)), FeeBucket::for_caller(operator, operator)).unwrap();

        assert_eq!(stats.total_fees_generated.value(), dec!(24));
        assert_eq!(stats.total_user_fees.value(), dec!(20));
        assert_eq!(stats.total_admin_fees.value(), dec!(4));
        assert!(stats.validate().is_ok());
    }

    #[test]
    fn deltas_merge() {
        let mut stats = FeeStats::default();
        stats.apply(&StatsDelta::fee(Quote::new(dec!(10)), FeeBucket::User)).unwrap();
        stats.apply(&StatsDelta::liquidation()).unwrap();
        stats.apply(&StatsDelta::heartbeat(Timestamp::from_millis(42))).unwrap();

        assert_eq!(stats.total_user_fees.value(), dec!(10));
        assert_eq!(stats.perp_liquidations, 1);
        assert_eq!(stats.last_perp_sweep_at, Some(Timestamp::from_millis(42)));
    }

    #[test]
    fn fee_overflow_keeps_totals() {
        let mut stats = FeeStats::default();
        stats.record_fee(Quote::new(rust_decimal::Decimal::MAX), FeeBucket::User).unwrap();
        let before = stats.clone();

        assert!(stats.record_fee(Quote::new(dec!(1)), FeeBucket::Admin).is_err());
        assert_eq!(stats, before);
        assert!(stats.validate().is_ok());
    }

    #[test]
    fn heartbeat_staleness() {
        let mut stats = FeeStats::default();
        assert!(stats.sweep_is_stale(Timestamp::from_millis(0), 30_000));

        stats.heartbeat(Timestamp::from_millis(100_000));
        assert!(!stats.sweep_is_stale(Timestamp::from_millis(120_000), 30_000));
        assert!(stats.sweep_is_stale(Timestamp::from_millis(140_000), 30_000));
    }
}
