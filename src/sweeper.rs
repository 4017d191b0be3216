//! Background liquidation sweeper.
//!
//! Ticks on a fixed interval and runs [`Engine::sweep_all`], the same
//! operation an operator can trigger by hand. Ticks that fall behind are
//! dropped rather than queued, and a tick that lands while a sweep is still
//! running is skipped by the engine's in-flight flag.

use crate::engine::Engine;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Heartbeats older than this mark the sweeper as stalled.
    pub stale_after_ms: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
            stale_after_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub assets_priced: usize,
    pub assets_skipped: usize,
    pub liquidated: usize,
    pub errors: usize,
    pub finished_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep held the in-flight flag.
    Skipped,
}

pub struct Sweeper {
    engine: Engine,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(engine: Engine, config: SweeperConfig) -> Self {
        Self { engine, config }
    }

    /// Ticks until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(Duration::from_millis(self.config.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut iteration = 0u64;

        info!(interval_ms = self.config.interval_ms, "liquidation sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    iteration += 1;
                    debug!(iteration, "sweep tick");
                    match self.engine.sweep_all().await {
                        Ok(SweepOutcome::Completed(report)) => {
                            debug!(iteration, scanned = report.scanned, liquidated = report.liquidated, "sweep tick done");
                        }
                        Ok(SweepOutcome::Skipped) => {}
                        Err(e) => {
                            // keep ticking; the next sweep retries from scratch
                            error!(iteration, error = %e, "sweep failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(iterations = iteration, "liquidation sweeper stopped");
    }

    /// Spawns [`Sweeper::run`] and returns the handle plus its shutdown switch.
    pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(rx));
        (handle, tx)
    }
}
