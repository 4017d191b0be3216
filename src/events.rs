// 11.0: every balance-moving action leaves one activity record. records are
// append-only and carry enough denormalized data (ticker name/icon, value, fee,
// tokens, unit price) to render history without joining other records.

use crate::types::{AccountId, ActivityId, PositionId, Quote, Side, TickerId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Deposit,
    Withdrawal,
    Buy,
    Sell,
    Create,
    PerpOpen,
    PerpClose,
    Liquidation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub account_id: AccountId,
    pub kind: ActivityKind,
    pub timestamp: Timestamp,
    /// Ledger-currency amount that moved, fee excluded.
    pub value: Quote,
    pub fee: Quote,
    pub detail: ActivityDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityDetail {
    Cash,
    Ticker(TickerTrade),
    Perp(PerpAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerTrade {
    pub ticker_id: TickerId,
    pub ticker_name: String,
    pub ticker_symbol: String,
    pub ticker_icon: Option<String>,
    pub token_amount: Decimal,
    pub price_per_token: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpAction {
    pub position_id: PositionId,
    pub pair: String,
    pub side: Side,
    pub lots: Decimal,
    pub leverage: Decimal,
    pub price: Decimal,
    pub realized_pnl: Option<Quote>,
}

impl Activity {
    pub fn new(
        account_id: AccountId,
        kind: ActivityKind,
        timestamp: Timestamp,
        value: Quote,
        fee: Quote,
        detail: ActivityDetail,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            account_id,
            kind,
            timestamp,
            value,
            fee,
            detail,
        }
    }

    pub fn cash(account_id: AccountId, kind: ActivityKind, timestamp: Timestamp, value: Quote) -> Self {
        Self::new(account_id, kind, timestamp, value, Quote::zero(), ActivityDetail::Cash)
    }

    pub fn ticker_trade(&self) -> Option<&TickerTrade> {
        match &self.detail {
            ActivityDetail::Ticker(trade) => Some(trade),
            _ => None,
        }
    }

    pub fn perp_action(&self) -> Option<&PerpAction> {
        match &self.detail {
            ActivityDetail::Perp(action) => Some(action),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ticker_activity_carries_denormalized_fields() {
        let activity = Activity::new(
            AccountId(1),
            ActivityKind::Buy,
            Timestamp::from_millis(1000),
            Quote::new(dec!(10000)),
            Quote::new(dec!(20)),
            ActivityDetail::Ticker(TickerTrade {
                ticker_id: TickerId::generate(),
                ticker_name: "Naira Moon".to_string(),
                ticker_symbol: "NMOON".to_string(),
                ticker_icon: Some("🌙".to_string()),
                token_amount: dec!(90743771.59),
                price_per_token: dec!(0.00011),
            }),
        );

        let trade = activity.ticker_trade().unwrap();
        assert_eq!(trade.ticker_name, "Naira Moon");
        assert!(activity.perp_action().is_none());
    }

    #[test]
    fn activity_json_is_tagged() {
        let activity = Activity::cash(
            AccountId(2),
            ActivityKind::Withdrawal,
            Timestamp::from_millis(0),
            Quote::new(dec!(500)),
        );
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["kind"], "withdrawal");
        assert_eq!(json["detail"]["type"], "cash");

        let back: Activity = serde_json::from_value(json).unwrap();
        assert_eq!(back, activity);
    }
}
