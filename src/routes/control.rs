//! # routes::control
//!
//! Manual tick triggers.  Same guards as the timers: a trigger that lands
//! while its scheduler is running reports `SKIPPED` and does nothing.
//! Ticks run detached, so a client that hangs up mid-tick does not cut it
//! short.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::engine::{stop_loss_tick_detached, strategy_tick_detached};
use crate::error::AppError;
use crate::state::SharedState;

/// POST /api/tick/strategy
pub async fn tick_strategy(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    info!("👆 Manual strategy tick");
    let outcome = strategy_tick_detached(&state).await.inspect_err(|e| e.log("strategy"))?;
    Ok(Json(json!({ "ok": true, "outcome": outcome })))
}

/// POST /api/tick/stop-loss
pub async fn tick_stop_loss(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    info!("👆 Manual stop-loss tick");
    let outcome = stop_loss_tick_detached(&state).await.inspect_err(|e| e.log("stop_loss"))?;
    Ok(Json(json!({ "ok": true, "outcome": outcome })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::{Method, StatusCode};
    use tokio::sync::Semaphore;

    use crate::engine::testkit::{golden_closes, test_state, wait_for};
    use crate::engine::{run_strategy_tick, TickAction, TickOutcome};
    use crate::models::Interval;
    use crate::routes::{router, test_support::call};

    #[tokio::test]
    async fn test_manual_strategy_tick_reports_outcome() {
        let (state, source) = test_state();
        source.set_closes(Interval::M15, &golden_closes());

        let (status, body) = call(router(state), Method::POST, "/api/tick/strategy").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["status"], "COMPLETED");
        assert_eq!(body["outcome"]["action"], "OPENED");
    }

    #[tokio::test]
    async fn test_manual_stop_loss_tick_when_flat() {
        let (state, _) = test_state();
        let (_, body) = call(router(state), Method::POST, "/api/tick/stop-loss").await;
        assert_eq!(body["outcome"]["status"], "NO_POSITION");
    }

    #[tokio::test]
    async fn test_manual_tick_shares_the_timer_guard() {
        let (state, source) = test_state();
        source.set_closes(Interval::M15, &golden_closes());
        let gate = Arc::new(Semaphore::new(0));
        source.set_gate(Some(gate.clone()));

        let app = router(state.clone());
        let running = tokio::spawn(call(app.clone(), Method::POST, "/api/tick/strategy"));
        wait_for(|| state.strategy_guard.is_running()).await;

        let (_, body) = call(app, Method::POST, "/api/tick/strategy").await;
        assert_eq!(body["outcome"]["status"], "SKIPPED");

        gate.add_permits(10);
        let (_, body) = running.await.unwrap();
        assert_eq!(body["outcome"]["action"], "OPENED");
    }

    #[tokio::test]
    async fn test_failed_tick_is_an_error_response() {
        let (state, source) = test_state();
        source.set_closes(Interval::M15, &[100.0; 10]);

        let (status, body) = call(router(state), Method::POST, "/api/tick/strategy").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_request_still_finishes_the_tick() {
        let (state, source) = test_state();
        source.set_closes(Interval::M15, &golden_closes());

        // Holding a reader parks the tick after the store write, before the
        // in-memory position is published.
        let reader = state.open_position.read().await;
        let request = call(router(state.clone()), Method::POST, "/api/tick/strategy");
        let timed_out = tokio::time::timeout(Duration::from_millis(50), request).await;
        assert!(timed_out.is_err());
        drop(reader);

        wait_for(|| !state.strategy_guard.is_running()).await;
        let open = state.open_position().await.expect("tick published its position");

        let outcome = run_strategy_tick(&state).await.unwrap();
        assert_eq!(outcome, TickOutcome::Completed { action: TickAction::None });

        let records = state.store.list_positions("BTCUSDT", 10).await.unwrap();
        let still_open: Vec<_> = records.iter().filter(|p| p.is_open()).collect();
        assert_eq!(still_open.len(), 1);
        assert_eq!(still_open[0].id, open.id);
    }
}
