//! # store — Position Store
//!
//! One storage interface, two implementations picked at startup:
//!
//! | Impl            | When            | Identifiers     |
//! |-----------------|-----------------|-----------------|
//! | `MemoryStore`   | `DRY_RUN=true`  | `dry-run-<n>`   |
//! | `PgStore`       | durable mode    | UUID v4         |
//!
//! The close is the only write both schedulers can race on, so it is a
//! compare-and-set keyed on `(id, status = OPEN)`: exactly one caller gets
//! [`CloseOutcome::Closed`], everyone else gets [`CloseOutcome::AlreadyClosed`].

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ExitReason, Position, PositionDraft};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("position store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt position record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Result of a conditional close.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// This caller won the CAS; carries the closed record.
    Closed(Position),
    /// Position was not OPEN any more (other scheduler won) or is unknown.
    AlreadyClosed,
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Short label for logs / health output.
    fn kind(&self) -> &'static str;

    /// Unconditional insert of a new OPEN position.  Returns the stored record.
    async fn open_position(&self, draft: PositionDraft) -> Result<Position, StoreError>;

    /// Conditional update: only applies while the position is still OPEN.
    async fn close_position(
        &self,
        id:         &str,
        exit_price: f64,
        reason:     ExitReason,
    ) -> Result<CloseOutcome, StoreError>;

    /// Newest OPEN position for `symbol`, used once at startup.
    async fn restore_latest_open(&self, symbol: &str) -> Result<Option<Position>, StoreError>;

    /// Position history, newest first.
    async fn list_positions(&self, symbol: &str, limit: usize) -> Result<Vec<Position>, StoreError>;

    /// Every CLOSED position for `symbol` (PnL aggregation).
    async fn closed_positions(&self, symbol: &str) -> Result<Vec<Position>, StoreError>;
}
