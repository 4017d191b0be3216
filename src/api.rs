//! Caller boundary.
//!
//! Every engine operation is reachable as an [`EngineCommand`]. Results and
//! failures both come back as an [`ApiResponse`]; errors carry a stable
//! [`ErrorCode`] so callers can tell validation failures from terminal-state
//! rejections and infrastructure trouble.

use crate::curve::CurveError;
use crate::engine::{CreateTickerRequest, Engine, EngineError, OpenPositionRequest};
use crate::account::AccountError;
use crate::ledger::TxnError;
use crate::market::MarketError;
use crate::position::PositionError;
use crate::types::{AccountId, PositionId, TickerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineCommand {
    Deposit { account: AccountId, amount: Decimal },
    Withdraw { account: AccountId, amount: Decimal },
    Buy { account: AccountId, ticker_id: TickerId, amount: Decimal },
    Sell { account: AccountId, ticker_id: TickerId, token_amount: Decimal },
    CreateTicker { account: AccountId, request: CreateTickerRequest },
    QuoteBuy { ticker_id: TickerId, amount: Decimal },
    QuoteSell { ticker_id: TickerId, token_amount: Decimal },
    HoldingValue { ticker_id: TickerId, amount: Decimal },
    PreviewPosition { request: OpenPositionRequest },
    OpenPosition { account: AccountId, request: OpenPositionRequest },
    ClosePosition { account: AccountId, position_id: PositionId },
    ForceLiquidate { account: AccountId, position_id: PositionId },
    CheckPosition { account: AccountId, position_id: PositionId },
    SweepAll,
}

impl EngineCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Deposit { .. } => "deposit",
            EngineCommand::Withdraw { .. } => "withdraw",
            EngineCommand::Buy { .. } => "buy",
            EngineCommand::Sell { .. } => "sell",
            EngineCommand::CreateTicker { .. } => "create_ticker",
            EngineCommand::QuoteBuy { .. } => "quote_buy",
            EngineCommand::QuoteSell { .. } => "quote_sell",
            EngineCommand::HoldingValue { .. } => "holding_value",
            EngineCommand::PreviewPosition { .. } => "preview_position",
            EngineCommand::OpenPosition { .. } => "open_position",
            EngineCommand::ClosePosition { .. } => "close_position",
            EngineCommand::ForceLiquidate { .. } => "force_liquidate",
            EngineCommand::CheckPosition { .. } => "check_position",
            EngineCommand::SweepAll => "sweep_all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidAmount,
    InvalidInput,
    NotFound,
    InsufficientBalance,
    InsufficientHoldings,
    ZeroOutput,
    NegativeProceeds,
    PricingCorruption,
    PositionNotOpen,
    OracleUnavailable,
    RetriesExhausted,
    Internal,
}

impl From<&EngineError> for ErrorCode {
    fn from(error: &EngineError) -> Self {
        match error {
            EngineError::AccountNotFound(_)
            | EngineError::TickerNotFound(_)
            | EngineError::PositionNotFound(_) => ErrorCode::NotFound,
            EngineError::InvalidAmount(_) => ErrorCode::InvalidAmount,
            EngineError::InvalidInput(_) => ErrorCode::InvalidInput,
            EngineError::Account(AccountError::InsufficientBalance { .. }) => ErrorCode::InsufficientBalance,
            EngineError::Account(AccountError::InsufficientHoldings { .. }) => ErrorCode::InsufficientHoldings,
            EngineError::Account(AccountError::BalanceOverflow { .. }) => ErrorCode::InvalidAmount,
            EngineError::Curve(CurveError::InvalidAmount(_)) => ErrorCode::InvalidAmount,
            EngineError::Curve(CurveError::InvalidCurve { .. }) => ErrorCode::InvalidInput,
            EngineError::Curve(CurveError::ZeroOutput) => ErrorCode::ZeroOutput,
            EngineError::Curve(CurveError::NegativeProceeds(_)) => ErrorCode::NegativeProceeds,
            EngineError::Curve(CurveError::PricingCorruption(_)) => ErrorCode::PricingCorruption,
            EngineError::Market(MarketError::UnknownPair(_)) => ErrorCode::NotFound,
            EngineError::Market(MarketError::PositionTooSmall { .. }) => ErrorCode::InvalidAmount,
            EngineError::Market(MarketError::SpreadExceedsPrice { .. })
            | EngineError::Market(MarketError::Overflow(_)) => ErrorCode::PricingCorruption,
            EngineError::Position(PositionError::NotOpen { .. }) => ErrorCode::PositionNotOpen,
            EngineError::Position(PositionError::Overflow(_)) => ErrorCode::PricingCorruption,
            EngineError::Oracle(_) => ErrorCode::OracleUnavailable,
            EngineError::Txn(TxnError::RetriesExhausted { .. }) => ErrorCode::RetriesExhausted,
            EngineError::Txn(_) => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ApiResponse {
    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
                code: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(format!("failed to encode response: {}", e)),
                code: Some(ErrorCode::Internal),
            },
        }
    }

    pub fn failure(error: &EngineError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            code: Some(ErrorCode::from(error)),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => Self::ok(&data),
            Err(e) => Self::failure(&e),
        }
    }
}

impl Engine {
    /// Runs one command and folds the outcome into an [`ApiResponse`].
    pub async fn execute(&self, command: EngineCommand) -> ApiResponse {
        let op = command.name();
        let response = match command {
            EngineCommand::Deposit { account, amount } => ApiResponse::from_result(self.deposit(account, amount).await),
            EngineCommand::Withdraw { account, amount } => ApiResponse::from_result(self.withdraw(account, amount).await),
            EngineCommand::Buy { account, ticker_id, amount } => {
                ApiResponse::from_result(self.buy(account, ticker_id, amount).await)
            }
            EngineCommand::Sell { account, ticker_id, token_amount } => {
                ApiResponse::from_result(self.sell(account, ticker_id, token_amount).await)
            }
            EngineCommand::CreateTicker { account, request } => {
                ApiResponse::from_result(self.create_ticker(account, request).await)
            }
            EngineCommand::QuoteBuy { ticker_id, amount } => ApiResponse::from_result(self.quote_buy(ticker_id, amount)),
            EngineCommand::QuoteSell { ticker_id, token_amount } => {
                ApiResponse::from_result(self.quote_sell(ticker_id, token_amount))
            }
            EngineCommand::HoldingValue { ticker_id, amount } => {
                ApiResponse::from_result(self.holding_value(ticker_id, amount))
            }
            EngineCommand::PreviewPosition { request } => ApiResponse::from_result(self.preview_position(&request).await),
            EngineCommand::OpenPosition { account, request } => {
                ApiResponse::from_result(self.open_position(account, request).await)
            }
            EngineCommand::ClosePosition { account, position_id } => {
                ApiResponse::from_result(self.close_position(account, position_id).await)
            }
            EngineCommand::ForceLiquidate { account, position_id } => {
                ApiResponse::from_result(self.force_liquidate(account, position_id).await)
            }
            EngineCommand::CheckPosition { account, position_id } => {
                ApiResponse::from_result(self.check_position(account, position_id).await)
            }
            EngineCommand::SweepAll => ApiResponse::from_result(self.sweep_all().await),
        };

        match (&response.code, &response.error) {
            (Some(ErrorCode::Internal), Some(error)) | (Some(ErrorCode::RetriesExhausted), Some(error)) => {
                warn!(op, %error, "command failed");
            }
            (Some(code), Some(error)) => debug!(op, ?code, %error, "command rejected"),
            _ => debug!(op, "command ok"),
        }
        response
    }
}
