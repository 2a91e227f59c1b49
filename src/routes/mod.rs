//! # routes
//!
//! | Method   | Path                  | Handler                         |
//! |----------|-----------------------|---------------------------------|
//! | GET      | `/api/health`         | [`status::health`]              |
//! | GET      | `/api/market`         | [`market::get_market`]          |
//! | GET      | `/api/position`       | [`positions::get_position`]     |
//! | GET      | `/api/trades`         | [`positions::get_trades`]       |
//! | GET      | `/api/pnl`            | [`positions::get_pnl`]          |
//! | POST     | `/api/tick/strategy`  | [`control::tick_strategy`]      |
//! | POST     | `/api/tick/stop-loss` | [`control::tick_stop_loss`]     |
//! | GET (WS) | `/ws/monitor`         | [`monitor::ws_monitor`]         |
//!
//! Read-only over the cache and the store, except the tick triggers, which go
//! through the same guards as the timers.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::SharedState;

pub mod control;
pub mod market;
pub mod monitor;
pub mod positions;
pub mod status;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Status / market ───────────────────────────────────────────────────
        .route("/api/health",         get(status::health))
        .route("/api/market",         get(market::get_market))
        // ── Positions ─────────────────────────────────────────────────────────
        .route("/api/position",       get(positions::get_position))
        .route("/api/trades",         get(positions::get_trades))
        .route("/api/pnl",            get(positions::get_pnl))
        // ── Manual ticks ──────────────────────────────────────────────────────
        .route("/api/tick/strategy",  post(control::tick_strategy))
        .route("/api/tick/stop-loss", post(control::tick_stop_loss))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/ws/monitor",         get(monitor::ws_monitor))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
