// curveperp-core: bonding-curve ticker trading and perpetual margin engine.
// all state lives in a versioned ledger; every mutating op is one optimistic
// transaction that retries on conflict.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Side, Price, Quote, Leverage, Bps, clock
//   2.x  curve.rs: constant-product pricing, creation fees, trending score
//   2.1  ticker.rs: ticker record, reference price, chart points
//   3.x  margin.rs: lot sizing, initial margin, execution fee, fx conversion
//   4.x  position.rs: perp position record, pnl, close/liquidate transitions
//   6.x  liquidation.rs: liquidation price and breach check
//   7.x  config.rs: platform config, env presets, TOML loading
//   8.x  engine/: trading, positions, liquidations, sweep entry point
//   9.x  price_feed.rs: oracle trait, mock feed, http feed
//   9.1  sweeper.rs: background liquidation loop
//   9.2  ledger/: versioned store, transactions, retry
//   10.x account.rs: balances, holdings, lot consolidation
//   11.x events.rs: activity records for the audit trail
//   11.1 stats.rs: platform fee totals and sweep heartbeat
//   12.x market.rs: perp pair config, spread pricing
//   13.x api.rs: command/response boundary with error codes

// core trading modules
pub mod account;
pub mod curve;
pub mod engine;
pub mod events;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod position;
pub mod stats;
pub mod ticker;
pub mod types;

// storage and integration modules
pub mod api;
pub mod config;
pub mod ledger;
pub mod price_feed;
pub mod sweeper;

// re exports for convenience
pub use account::{Account, AccountError, Holding};
pub use api::{ApiResponse, EngineCommand, ErrorCode};
pub use config::{ConfigError, Environment, OracleConfig, OracleSource, PlatformConfig};
pub use curve::{BuyQuote, CurveError, CurveParams, CurveState, SellQuote};
pub use engine::*;
pub use events::{Activity, ActivityDetail, ActivityKind};
pub use ledger::{LedgerStore, MemoryLedger, RetryPolicy};
pub use margin::MarginParams;
pub use market::{MarketError, PairConfig};
pub use position::{PerpPosition, PositionError, PositionStatus};
pub use price_feed::{HttpFeedConfig, HttpPriceFeed, MockPriceFeed, OracleError, PriceOracle};
pub use stats::{FeeBucket, FeeStats};
pub use sweeper::{SweepOutcome, SweepReport, Sweeper, SweeperConfig};
pub use ticker::Ticker;
pub use types::*;
