//! # store::memory
//!
//! Dry-run store: positions live only in process memory.  A single mutex
//! makes "check OPEN, then close" one atomic step, same guarantee the SQL
//! `UPDATE … WHERE status = 'OPEN'` gives the durable store.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use super::{CloseOutcome, PositionStore, StoreError};
use crate::models::{ExitReason, Position, PositionDraft, PositionStatus};

/// Prefix that marks identifiers which were never persisted.
pub const DRY_RUN_ID_PREFIX: &str = "dry-run-";

#[derive(Debug, Default)]
pub struct MemoryStore {
    positions: Mutex<Vec<Position>>,
    next_id:   AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn open_position(&self, draft: PositionDraft) -> Result<Position, StoreError> {
        let seq      = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let position = Position::from_draft(format!("{DRY_RUN_ID_PREFIX}{seq}"), draft, Utc::now());

        self.positions.lock().await.push(position.clone());

        info!(
            id            = %position.id,
            position_type = position.position_type.as_str(),
            entry_price   = position.entry_price,
            "🧪 [DRY RUN] Position held in memory only"
        );
        Ok(position)
    }

    async fn close_position(
        &self,
        id:         &str,
        exit_price: f64,
        reason:     ExitReason,
    ) -> Result<CloseOutcome, StoreError> {
        let mut positions = self.positions.lock().await;

        match positions.iter_mut().find(|p| p.id == id && p.status == PositionStatus::Open) {
            Some(position) => {
                position.apply_close(exit_price, reason, Utc::now());
                Ok(CloseOutcome::Closed(position.clone()))
            }
            None => Ok(CloseOutcome::AlreadyClosed),
        }
    }

    async fn restore_latest_open(&self, symbol: &str) -> Result<Option<Position>, StoreError> {
        let positions = self.positions.lock().await;
        Ok(positions
            .iter()
            .filter(|p| p.symbol == symbol && p.is_open())
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn list_positions(&self, symbol: &str, limit: usize) -> Result<Vec<Position>, StoreError> {
        let positions = self.positions.lock().await;
        Ok(positions
            .iter()
            .rev()
            .filter(|p| p.symbol == symbol)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn closed_positions(&self, symbol: &str) -> Result<Vec<Position>, StoreError> {
        let positions = self.positions.lock().await;
        Ok(positions
            .iter()
            .filter(|p| p.symbol == symbol && !p.is_open())
            .cloned()
            .collect())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
