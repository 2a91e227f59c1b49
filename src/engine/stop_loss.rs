//! # engine::stop_loss
//!
//! **Stop-loss watchdog** — faster cadence than the strategy, own guard.
//!
//! The reference SMA is recomputed here from freshly fetched candles rather
//! than read from the strategy snapshot: the two schedules drift.
//!
//! | Side  | Breach                  | Exit reason               |
//! |-------|-------------------------|---------------------------|
//! | LONG  | fast close < reference  | `STOP_LOSS_BELOW_SMA<P>`  |
//! | SHORT | fast close > reference  | `STOP_LOSS_ABOVE_SMA<P>`  |

use std::sync::atomic::Ordering;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::indicators::latest_sma;
use super::{TickAction, TickError, TickOutcome};
use crate::cache::StopLossStatus;
use crate::events::{ClosedBy, WsEvent};
use crate::models::candle::closes;
use crate::models::{ExitReason, Position, PositionType};
use crate::state::SharedState;
use crate::store::CloseOutcome;

/// Fast-interval candles fetched per tick; only the last close is used.
const FAST_CANDLES: usize = 5;

/// One guarded stop-loss check of the open position.
pub async fn run_stop_loss_tick(state: &SharedState) -> Result<TickOutcome, TickError> {
    let Some(_permit) = state.stop_loss_guard.try_acquire() else {
        state.skipped_ticks.fetch_add(1, Ordering::Relaxed);
        debug!("⏭️  Stop-loss tick skipped — previous tick still running");
        return Ok(TickOutcome::Skipped);
    };

    let Some(position) = state.open_position().await else {
        return Ok(TickOutcome::NoPosition);
    };

    let action = check(state, &position).await?;
    state.stop_loss_ticks.fetch_add(1, Ordering::Relaxed);
    Ok(TickOutcome::Completed { action })
}

/// Breach reason for `position` at `price`, if any.
pub fn breach(position_type: PositionType, price: f64, reference: f64, period: u32) -> Option<ExitReason> {
    match position_type {
        PositionType::Long if price < reference => Some(ExitReason::StopLossBelow { period }),
        PositionType::Short if price > reference => Some(ExitReason::StopLossAbove { period }),
        _ => None,
    }
}

async fn check(state: &SharedState, position: &Position) -> Result<TickAction, TickError> {
    let cfg = &state.config;

    // ── Fast price ────────────────────────────────────────────────────────────
    let fast = state
        .candles
        .fetch(&cfg.symbol, cfg.stop_loss_interval, FAST_CANDLES)
        .await?;
    let Some(price) = fast.last().map(|c| c.close) else {
        return Err(TickError::InsufficientHistory {
            interval: cfg.stop_loss_interval,
            needed:   1,
            got:      0,
        });
    };

    // ── Reference SMA ─────────────────────────────────────────────────────────
    let interval = cfg.reference_interval();
    let period = cfg.reference_period;
    let candles = state
        .candles
        .fetch(&cfg.symbol, interval, cfg.candle_limit.max(period as usize))
        .await?;
    let Some(reference) = latest_sma(&closes(&candles), period as usize) else {
        return Err(TickError::InsufficientHistory {
            interval,
            needed: period as usize,
            got:    candles.len(),
        });
    };

    // ── Breach ────────────────────────────────────────────────────────────────
    let reason = breach(position.position_type, price, reference, period);
    let action = match reason {
        None => {
            debug!(id = %position.id, price, reference, "Stop-loss holding");
            TickAction::None
        }
        Some(reason) => {
            warn!(
                id = %position.id,
                side = position.position_type.as_str(),
                price,
                reference,
                "🛑 Stop-loss breach — {reason}"
            );
            match state.store.close_position(&position.id, price, reason).await? {
                CloseOutcome::Closed(closed) => {
                    info!(
                        id = %closed.id,
                        pnl = closed.profit_loss.unwrap_or_default(),
                        "🛑 Position closed by stop-loss"
                    );
                    state.clear_open_position_if(&closed.id).await;
                    state.broadcast(&WsEvent::PositionClosed {
                        position:  Box::new(closed),
                        closed_by: ClosedBy::StopLoss,
                    });
                    TickAction::Closed
                }
                CloseOutcome::AlreadyClosed => {
                    info!(id = %position.id, "Position already closed by the strategy — nothing to do");
                    state.clear_open_position_if(&position.id).await;
                    TickAction::CloseRaced
                }
            }
        }
    };

    let status = StopLossStatus {
        last_tick_at: Some(Utc::now()),
        triggered:    reason.is_some(),
        last_price:   Some(price),
        reference:    Some(reference),
    };
    state.cache.store_stop_loss(status.clone()).await;
    state.broadcast(&WsEvent::StopLossTick { status });

    Ok(action)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tokio::sync::Semaphore;

    use super::*;
    use crate::config::Config;
    use crate::engine::cluster::ClusterResult;
    use crate::engine::run_strategy_tick;
    use crate::engine::testkit::{death_closes, state_with, test_config, test_state, wait_for};
    use crate::models::{Interval, PositionDraft, PositionStatus};

    async fn open(state: &SharedState, position_type: PositionType, entry_price: f64) -> Position {
        let position = state
            .store
            .open_position(PositionDraft {
                symbol: state.config.symbol.clone(),
                position_type,
                entry_price,
                entry_time: Utc::now(),
                entry_indicators: BTreeMap::new(),
                cluster_info_at_entry: ClusterResult::unclustered(),
                reference_indicator_at_entry: None,
            })
            .await
            .unwrap();
        state.set_open_position(Some(position.clone())).await;
        position
    }

    #[test]
    fn test_breach_rule() {
        assert_eq!(breach(PositionType::Long, 95.0, 98.0, 200), Some(ExitReason::StopLossBelow { period: 200 }));
        assert_eq!(breach(PositionType::Long, 99.0, 98.0, 200), None);
        assert_eq!(breach(PositionType::Long, 98.0, 98.0, 200), None);
        assert_eq!(breach(PositionType::Short, 99.0, 98.0, 200), Some(ExitReason::StopLossAbove { period: 200 }));
        assert_eq!(breach(PositionType::Short, 97.0, 98.0, 200), None);
    }

    #[tokio::test]
    async fn test_long_below_reference_is_closed() {
        let (state, source) = test_state();
        let long = open(&state, PositionType::Long, 100.0).await;
        source.set_closes(Interval::M1, &[99.0, 97.0, 95.0]);
        source.set_closes(Interval::M15, &[98.0; 200]);

        let outcome = run_stop_loss_tick(&state).await.unwrap();
        assert_eq!(outcome, TickOutcome::Completed { action: TickAction::Closed });
        assert_eq!(state.open_position().await, None);

        let closed = &state.store.list_positions("BTCUSDT", 1).await.unwrap()[0];
        assert_eq!(closed.id, long.id);
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.exit_reason.map(|r| r.to_string()).as_deref(), Some("STOP_LOSS_BELOW_SMA200"));
        assert_eq!(closed.profit_loss, Some(-5.0));

        let status = state.cache.stop_loss().await;
        assert!(status.triggered);
        assert_eq!(status.last_price, Some(95.0));
        assert_eq!(status.reference, Some(98.0));
        assert_eq!(state.cache.strategy().await, None);
    }

    #[tokio::test]
    async fn test_short_above_reference_is_closed() {
        let (state, source) = test_state();
        open(&state, PositionType::Short, 100.0).await;
        source.set_closes(Interval::M1, &[101.0]);
        source.set_closes(Interval::M15, &[98.0; 200]);

        let outcome = run_stop_loss_tick(&state).await.unwrap();
        assert_eq!(outcome, TickOutcome::Completed { action: TickAction::Closed });

        let closed = &state.store.list_positions("BTCUSDT", 1).await.unwrap()[0];
        assert_eq!(closed.exit_reason, Some(ExitReason::StopLossAbove { period: 200 }));
        assert_eq!(closed.profit_loss, Some(-1.0));
    }

    #[tokio::test]
    async fn test_no_breach_records_check_only() {
        let (state, source) = test_state();
        open(&state, PositionType::Long, 100.0).await;
        source.set_closes(Interval::M1, &[99.5]);
        source.set_closes(Interval::M15, &[98.0; 200]);

        let outcome = run_stop_loss_tick(&state).await.unwrap();
        assert_eq!(outcome, TickOutcome::Completed { action: TickAction::None });
        assert!(state.open_position().await.is_some());

        let status = state.cache.stop_loss().await;
        assert!(!status.triggered);
        assert!(status.last_tick_at.is_some());
    }

    #[tokio::test]
    async fn test_flat_is_a_no_op() {
        let (state, source) = test_state();
        let outcome = run_stop_loss_tick(&state).await.unwrap();
        assert_eq!(outcome, TickOutcome::NoPosition);
        assert_eq!(source.calls(), 0);
        assert_eq!(state.cache.stop_loss().await, StopLossStatus::default());
    }

    #[tokio::test]
    async fn test_thin_reference_history_aborts() {
        let (state, source) = test_state();
        open(&state, PositionType::Long, 100.0).await;
        source.set_closes(Interval::M1, &[50.0]);
        source.set_closes(Interval::M15, &[98.0; 100]);

        let err = run_stop_loss_tick(&state).await.unwrap_err();
        assert!(matches!(err, TickError::InsufficientHistory { needed: 200, got: 100, .. }));
        assert!(state.open_position().await.is_some());
        assert!(!state.stop_loss_guard.is_running());
    }

    #[tokio::test]
    async fn test_second_invocation_while_running_is_skipped() {
        let (state, source) = test_state();
        open(&state, PositionType::Long, 100.0).await;
        source.set_closes(Interval::M1, &[95.0]);
        source.set_closes(Interval::M15, &[98.0; 200]);
        let gate = Arc::new(Semaphore::new(0));
        source.set_gate(Some(gate.clone()));

        let first = tokio::spawn({
            let state = state.clone();
            async move { run_stop_loss_tick(&state).await }
        });
        wait_for(|| source.calls() == 1).await;

        assert_eq!(run_stop_loss_tick(&state).await.unwrap(), TickOutcome::Skipped);
        // the strategy guard is independent
        assert!(!state.strategy_guard.is_running());

        gate.add_permits(10);
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, TickOutcome::Completed { action: TickAction::Closed });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_strategy_and_stop_loss_close_once() {
        for _ in 0..20 {
            // narrow band: the strategy may close on the cross but never re-open
            let (state, source) = state_with(Config {
                cluster_threshold_pct: 0.01,
                ..test_config()
            });
            open(&state, PositionType::Long, 101.0).await;

            // opposite cross for the strategy, breach for the stop-loss
            source.set_closes(Interval::M15, &death_closes());
            source.set_closes(Interval::M1, &[95.0]);

            let (a, b) = tokio::join!(
                tokio::spawn({
                    let state = state.clone();
                    async move { run_strategy_tick(&state).await }
                }),
                tokio::spawn({
                    let state = state.clone();
                    async move { run_stop_loss_tick(&state).await }
                }),
            );
            let outcomes = [a.unwrap().unwrap(), b.unwrap().unwrap()];
            let closes = outcomes
                .iter()
                .filter(|o| **o == TickOutcome::Completed { action: TickAction::Closed })
                .count();
            assert_eq!(closes, 1, "{outcomes:?}");

            let history = state.store.list_positions("BTCUSDT", 10).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].status, PositionStatus::Closed);
            assert_eq!(state.store.restore_latest_open("BTCUSDT").await.unwrap(), None);
            assert_eq!(state.open_position().await, None);
        }
    }
}
