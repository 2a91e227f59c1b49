//! # routes::market
//!
//! GET /api/market — price, indicators, cluster and cross from the cache.
//!
//! Read-through: when the snapshot is older than `CACHE_STALE_SECS` (or there
//! is none yet) one strategy tick runs first, through the strategy guard.  If
//! that tick fails or is skipped the last snapshot is served and flagged
//! stale; only "no snapshot at all" is an error.

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::{strategy_tick_detached, TickOutcome};
use crate::error::AppError;
use crate::state::SharedState;

pub async fn get_market(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    let max_age = state.config.cache_stale_after;
    let mut refreshed = false;

    if state.cache.is_stale(max_age, Utc::now()).await {
        debug!("Market cache stale — running strategy tick");
        match strategy_tick_detached(&state).await {
            Ok(TickOutcome::Completed { .. }) => refreshed = true,
            Ok(_) => {}
            Err(e) => {
                e.log("strategy");
                if state.cache.strategy().await.is_none() {
                    return Err(e.into());
                }
            }
        }
    }

    let view = state.cache.view().await;
    let Some(snapshot) = view.strategy else {
        return Err(AppError::Unavailable("no market snapshot yet — strategy tick in progress".into()));
    };

    let now = Utc::now();
    let age = (now - snapshot.computed_at).to_std().unwrap_or_default();

    Ok(Json(json!({
        "ok":        true,
        "symbol":    state.config.symbol,
        "refreshed": refreshed,
        "stale":     age > max_age,
        "age_secs":  age.as_secs_f64(),
        "snapshot":  snapshot,
        "stop_loss": view.stop_loss,
    })))
}
