// 8.0: engine front. ticker trading, perp open/close, liquidations and the
// sweep entry point. each mutating op is one optimistic ledger transaction;
// oracle reads happen before the transaction starts.

mod accounts;
mod config;
mod core;
mod liquidations;
mod positions;
mod results;
mod trading;

pub use config::EngineConfig;
pub use core::Engine;
pub use positions::{build_preview, OpenPositionRequest};
pub use results::{
    BalanceResult, BuyResult, CloseResult, CreateResult, EngineError, LiquidationResult, OpenResult, PositionPreview,
    SellResult,
};
pub use trading::CreateTickerRequest;
