// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::curve::CurveError;
use crate::ledger::TxnError;
use crate::market::MarketError;
use crate::position::{PerpPosition, PositionError};
use crate::price_feed::OracleError;
use crate::types::{AccountId, Leverage, PositionId, Price, Quote, Side, TickerId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResult {
    pub account_id: AccountId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyResult {
    pub ticker_id: TickerId,
    pub tokens_out: Decimal,
    pub fee: Quote,
    pub price_per_token: Decimal,
    pub new_price: Decimal,
    pub new_balance: Quote,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SellResult {
    pub ticker_id: TickerId,
    pub tokens_sold: Decimal,
    pub proceeds: Quote,
    pub fee: Quote,
    pub new_price: Decimal,
    pub new_balance: Quote,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResult {
    pub ticker_id: TickerId,
    pub creation_fee: Quote,
    /// Tokens received from the opening buy, zero when none was requested.
    pub tokens_out: Decimal,
    pub price: Decimal,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionPreview {
    pub pair: String,
    pub side: Side,
    pub oracle_price: Price,
    pub entry_price: Price,
    pub liquidation_price: Price,
    pub lots: Decimal,
    pub effective_leverage: Leverage,
    pub position_value_usd: Decimal,
    pub margin: Quote,
    pub fee: Quote,
    pub total_debit: Quote,
    pub quote_rate: Decimal,
    pub instantly_liquidated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenResult {
    pub position: PerpPosition,
    pub is_liquidated: bool,
    pub debited: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseResult {
    pub position_id: PositionId,
    pub exit_price: Price,
    pub realized_pnl: Quote,
    pub payout: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationResult {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub liquidated: bool,
    pub oracle_price: Option<Price>,
    pub liquidation_price: Price,
    /// Percent of the oracle price left before the trigger, for positions
    /// that were priced and found safe.
    pub buffer_percent: Option<Decimal>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Ticker {0} not found")]
    TickerNotFound(TickerId),

    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("Oracle unavailable: {0}")]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Txn(#[from] TxnError),
}
