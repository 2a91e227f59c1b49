//! # routes::status

use std::sync::atomic::Ordering;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::state::SharedState;

/// GET /api/health
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let cfg = &state.config;
    let now = Utc::now();
    let age = state.cache.age(now).await;

    Json(json!({
        "ok":                  true,
        "symbol":              cfg.symbol,
        "dry_run":             cfg.dry_run,
        "store":               state.store.kind(),
        "strategy_interval":   cfg.strategy_interval,
        "reference_interval":  cfg.reference_interval(),
        "stop_loss_interval":  cfg.stop_loss_interval,
        "ma_periods":          cfg.ma_periods,
        "cache_age_secs":      age.map(|a| a.as_secs_f64()),
        "cache_stale":         age.map_or(true, |a| a > cfg.cache_stale_after),
        "strategy_running":    state.strategy_guard.is_running(),
        "stop_loss_running":   state.stop_loss_guard.is_running(),
        "has_position":        state.open_position.read().await.is_some(),
        "strategy_ticks":      state.strategy_ticks.load(Ordering::Relaxed),
        "stop_loss_ticks":     state.stop_loss_ticks.load(Ordering::Relaxed),
        "skipped_ticks":       state.skipped_ticks.load(Ordering::Relaxed),
        "uptime_secs":         (now - state.started_at).num_seconds(),
    }))
}
