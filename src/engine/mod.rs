//! # engine
//!
//! ```text
//!   timer / API ──▶ strategy tick ──┬─ fetch candles (primary + reference)
//!                                   ├─ SMA set → cluster → cross
//!                                   └─ open / close via PositionStore → cache
//!
//!   timer / API ──▶ stop-loss tick ─┬─ fetch fast candles + reference SMA
//!                                   └─ breach → conditional close
//! ```
//!
//! Each tick kind owns a [`guard::TickGuard`]; the two never block each other.

use serde::Serialize;
use thiserror::Error;

use crate::feed::FeedError;
use crate::models::Interval;
use crate::state::SharedState;
use crate::store::StoreError;

pub mod cluster;
pub mod cross;
pub mod guard;
pub mod indicators;
pub mod stop_loss;
pub mod strategy;
pub mod timer;

#[cfg(test)]
pub(crate) mod testkit;

pub use stop_loss::run_stop_loss_tick;
pub use strategy::run_strategy_tick;

// ─── Outcome ──────────────────────────────────────────────────────────────────

/// What a tick changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickAction {
    /// Evaluated, nothing to do — cache refreshed only
    None,
    Opened,
    Closed,
    /// Tried to close, but the other scheduler had already closed it
    CloseRaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickOutcome {
    /// Same scheduler already running — this invocation did nothing
    Skipped,
    /// Stop-loss only: no open position to watch
    NoPosition,
    Completed { action: TickAction },
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Anything that aborts a tick.  Persisted state and the previous snapshot
/// are left exactly as they were.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Warm-up / thin history — expected, logged as a warning.
    #[error("insufficient history on {interval}: need {needed}, got {got}")]
    InsufficientHistory {
        interval: Interval,
        needed:   usize,
        got:      usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The task running a detached tick panicked or was shut down.
    #[error("tick task ended early: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

impl TickError {
    /// Log at the level the failure deserves.
    pub fn log(&self, tick: &'static str) {
        match self {
            TickError::InsufficientHistory { .. } => {
                tracing::warn!(tick, error = %self, "Tick aborted — waiting for more history");
            }
            TickError::Feed(_) => {
                tracing::error!(tick, error = %self, "Tick aborted — candle fetch failed");
            }
            TickError::Store(_) => {
                tracing::error!(tick, error = %self, "Tick aborted — position store failed");
            }
            TickError::Aborted(_) => {
                tracing::error!(tick, error = %self, "Tick task did not finish");
            }
        }
    }
}

// ─── Detached runs ────────────────────────────────────────────────────────────

/// Strategy tick on its own task.  Dropping the returned future (a client
/// hanging up, a request timeout) leaves the tick running to completion, so
/// a store write is never split from the in-memory update that follows it.
pub async fn strategy_tick_detached(state: &SharedState) -> Result<TickOutcome, TickError> {
    let state = state.clone();
    tokio::spawn(async move { run_strategy_tick(&state).await }).await?
}

/// Stop-loss counterpart of [`strategy_tick_detached`].
pub async fn stop_loss_tick_detached(state: &SharedState) -> Result<TickOutcome, TickError> {
    let state = state.clone();
    tokio::spawn(async move { run_stop_loss_tick(&state).await }).await?
}
