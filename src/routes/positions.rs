//! # routes::positions
//!
//! Current position, trade history and aggregate PnL.  Pure reads.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::TradeStats;
use crate::state::SharedState;

const DEFAULT_TRADES: usize = 50;
const MAX_TRADES: usize = 500;

/// GET /api/position — the OPEN position, `null` when flat.
pub async fn get_position(State(state): State<SharedState>) -> Json<Value> {
    let position = state.open_position().await;
    let price = state.cache.strategy().await.map(|s| s.price);
    let unrealised = position
        .as_ref()
        .zip(price)
        .map(|(p, price)| p.unrealised_pnl(price));

    Json(json!({
        "ok":             true,
        "position":       position,
        "mark_price":     price,
        "unrealised_pnl": unrealised,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<usize>,
}

/// GET /api/trades?limit=N — newest first.
pub async fn get_trades(
    State(state): State<SharedState>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = match query.limit {
        Some(0) => return Err(AppError::BadRequest("limit must be > 0".into())),
        Some(n) => n.min(MAX_TRADES),
        None => DEFAULT_TRADES,
    };

    let trades = state.store.list_positions(&state.config.symbol, limit).await?;

    Ok(Json(json!({
        "ok":     true,
        "count":  trades.len(),
        "trades": trades,
    })))
}

/// GET /api/pnl
pub async fn get_pnl(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    let closed = state.store.closed_positions(&state.config.symbol).await?;
    let stats = TradeStats::from_positions(&closed);

    Ok(Json(json!({
        "ok":     true,
        "symbol": state.config.symbol,
        "stats":  stats,
    })))
}
