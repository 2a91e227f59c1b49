//! # cache
//!
//! Last computed market picture, served read-through to the API.
//!
//! - `strategy` is replaced wholesale by every successful strategy tick
//! - `stop_loss` is written only by the stop-loss tick
//!
//! Both start empty at process start and are never removed.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::engine::cluster::ClusterResult;
use crate::engine::cross::CrossSignal;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySnapshot {
    pub price:                 f64,
    /// open time of the candle `price` comes from
    pub candle_time:           DateTime<Utc>,
    pub indicators:            BTreeMap<u32, f64>,
    pub reference_indicator:   Option<f64>,
    pub reference_candle_time: Option<DateTime<Utc>>,
    pub cluster:               ClusterResult,
    pub cross:                 CrossSignal,
    pub computed_at:           DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StopLossStatus {
    pub last_tick_at: Option<DateTime<Utc>>,
    pub triggered:    bool,
    pub last_price:   Option<f64>,
    pub reference:    Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheView {
    pub strategy:  Option<StrategySnapshot>,
    pub stop_loss: StopLossStatus,
}

#[derive(Debug, Default)]
pub struct StateCache {
    strategy:  RwLock<Option<StrategySnapshot>>,
    stop_loss: RwLock<StopLossStatus>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn strategy(&self) -> Option<StrategySnapshot> {
        self.strategy.read().await.clone()
    }

    pub async fn stop_loss(&self) -> StopLossStatus {
        self.stop_loss.read().await.clone()
    }

    pub async fn view(&self) -> CacheView {
        CacheView {
            strategy:  self.strategy().await,
            stop_loss: self.stop_loss().await,
        }
    }

    pub async fn store_strategy(&self, snapshot: StrategySnapshot) {
        *self.strategy.write().await = Some(snapshot);
    }

    pub async fn store_stop_loss(&self, status: StopLossStatus) {
        *self.stop_loss.write().await = status;
    }

    /// Age of the strategy snapshot; `None` before the first tick.
    pub async fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.strategy
            .read()
            .await
            .as_ref()
            .map(|s| (now - s.computed_at).to_std().unwrap_or(Duration::ZERO))
    }

    /// Empty or older than `max_age`.
    pub async fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.age(now).await {
            Some(age) => age > max_age,
            None => true,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
