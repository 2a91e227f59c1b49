//! # state
//!
//! `AppState` — the single context both schedulers and every API handler
//! share.  All mutable runtime state lives here; nothing is a global.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::cache::StateCache;
use crate::config::Config;
use crate::engine::guard::TickGuard;
use crate::events::WsEvent;
use crate::feed::CandleSource;
use crate::models::Position;
use crate::store::PositionStore;

pub struct AppState {
    pub config: Arc<Config>,

    // ── Collaborators ─────────────────────────────────────────────────────────
    pub candles: Arc<dyn CandleSource>,
    pub store:   Arc<dyn PositionStore>,

    // ── Position ──────────────────────────────────────────────────────────────
    /// In-memory view of the OPEN position.
    /// None = flat → strategy tick may open
    /// Some = open → strategy watches for the opposite cross, stop-loss for a breach
    pub open_position: RwLock<Option<Position>>,

    // ── Snapshot ──────────────────────────────────────────────────────────────
    pub cache: StateCache,

    // ── Re-entrancy guards (one per scheduler) ────────────────────────────────
    pub strategy_guard:  Arc<TickGuard>,
    pub stop_loss_guard: Arc<TickGuard>,

    // ── Monitor / WebSocket ───────────────────────────────────────────────────
    pub broadcast_tx: broadcast::Sender<String>,

    // ── Metrics ───────────────────────────────────────────────────────────────
    pub strategy_ticks:  AtomicU64,
    pub stop_loss_ticks: AtomicU64,
    pub skipped_ticks:   AtomicU64,
    pub started_at:      DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config:  Config,
        candles: Arc<dyn CandleSource>,
        store:   Arc<dyn PositionStore>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);

        Self {
            config:          Arc::new(config),
            candles,
            store,
            open_position:   RwLock::new(None),
            cache:           StateCache::new(),
            strategy_guard:  Arc::new(TickGuard::new()),
            stop_loss_guard: Arc::new(TickGuard::new()),
            broadcast_tx,
            strategy_ticks:  AtomicU64::new(0),
            stop_loss_ticks: AtomicU64::new(0),
            skipped_ticks:   AtomicU64::new(0),
            started_at:      Utc::now(),
        }
    }

    /// Broadcast to WebSocket clients.  No listeners is not an error.
    pub fn broadcast(&self, event: &WsEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }

    pub async fn open_position(&self) -> Option<Position> {
        self.open_position.read().await.clone()
    }

    pub async fn set_open_position(&self, position: Option<Position>) {
        *self.open_position.write().await = position;
    }

    /// Forget the in-memory position, but only if it is still `id` — a newer
    /// position opened in the meantime must survive a late close.
    pub async fn clear_open_position_if(&self, id: &str) {
        let mut guard = self.open_position.write().await;
        if guard.as_ref().is_some_and(|p| p.id == id) {
            *guard = None;
        }
    }

    /// Recover the OPEN position after a restart.  Nothing open is normal.
    pub async fn restore(&self) -> Result<Option<Position>, crate::store::StoreError> {
        let restored = self.store.restore_latest_open(&self.config.symbol).await?;
        self.set_open_position(restored.clone()).await;
        Ok(restored)
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::engine::cluster::ClusterResult;
    use crate::feed::scripted::ScriptedCandleSource;
    use crate::models::{PositionDraft, PositionType};
    use crate::store::MemoryStore;

    fn draft() -> PositionDraft {
        PositionDraft {
            symbol: "BTCUSDT".into(),
            position_type: PositionType::Long,
            entry_price: 100.0,
            entry_time: Utc::now(),
            entry_indicators: BTreeMap::new(),
            cluster_info_at_entry: ClusterResult::unclustered(),
            reference_indicator_at_entry: None,
        }
    }

    #[tokio::test]
    async fn test_restore_recovers_open_position() {
        let store = Arc::new(MemoryStore::new());
        let opened = store.open_position(draft()).await.unwrap();

        let state = AppState::new(Config::default(), Arc::new(ScriptedCandleSource::new()), store);
        let restored = state.restore().await.unwrap();

        assert_eq!(restored.as_ref().map(|p| p.id.as_str()), Some(opened.id.as_str()));
        assert_eq!(state.open_position().await, Some(opened));
    }

    #[tokio::test]
    async fn test_restore_with_nothing_open() {
        let state = AppState::new(
            Config::default(),
            Arc::new(ScriptedCandleSource::new()),
            Arc::new(MemoryStore::new()),
        );
        assert_eq!(state.restore().await.unwrap(), None);
        assert_eq!(state.open_position().await, None);
    }

    #[tokio::test]
    async fn test_clear_only_matching_id() {
        let store = Arc::new(MemoryStore::new());
        let p = store.open_position(draft()).await.unwrap();
        let state = AppState::new(Config::default(), Arc::new(ScriptedCandleSource::new()), store);

        state.set_open_position(Some(p.clone())).await;
        state.clear_open_position_if("someone-else").await;
        assert!(state.open_position().await.is_some());

        state.clear_open_position_if(&p.id).await;
        assert!(state.open_position().await.is_none());
    }
}
