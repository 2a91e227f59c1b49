//! # engine::strategy
//!
//! **Strategy tick** — the only place positions are opened.
//!
//! ```text
//! try_acquire ─▶ fetch primary (+ reference) ─▶ SMA set ─▶ cluster ─▶ cross
//!                                                                      │
//!      ┌───────────────────────────────────────────────────────────────┘
//!      ▼
//!   flat + clustered + GOLDEN/DEATH ─▶ open LONG/SHORT
//!   open + opposite cross           ─▶ close OPPOSITE_CROSSOVER
//!   else                            ─▶ nothing
//!      │
//!      ▼
//!   snapshot → StateCache, permit dropped
//! ```
//!
//! Any error before the decision leaves the position, the store and the
//! previous snapshot untouched.

use std::sync::atomic::Ordering;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::cluster::detect_cluster;
use super::cross::{detect_cross_series, CrossSignal};
use super::indicators::{latest_sma, IndicatorSet};
use super::{TickAction, TickError, TickOutcome};
use crate::cache::StrategySnapshot;
use crate::events::{ClosedBy, WsEvent};
use crate::models::candle::closes;
use crate::models::{Candle, ExitReason, PositionDraft, PositionType};
use crate::state::SharedState;
use crate::store::CloseOutcome;

/// One guarded strategy evaluation.
pub async fn run_strategy_tick(state: &SharedState) -> Result<TickOutcome, TickError> {
    let Some(_permit) = state.strategy_guard.try_acquire() else {
        state.skipped_ticks.fetch_add(1, Ordering::Relaxed);
        debug!("⏭️  Strategy tick skipped — previous tick still running");
        return Ok(TickOutcome::Skipped);
    };

    let action = evaluate(state).await?;
    state.strategy_ticks.fetch_add(1, Ordering::Relaxed);
    Ok(TickOutcome::Completed { action })
}

// ─── Evaluation ───────────────────────────────────────────────────────────────

async fn evaluate(state: &SharedState) -> Result<TickAction, TickError> {
    let cfg = &state.config;

    // ── 1. Primary candles ────────────────────────────────────────────────────
    let candles = state
        .candles
        .fetch(&cfg.symbol, cfg.strategy_interval, cfg.candle_limit)
        .await?;
    if candles.len() < cfg.min_history {
        return Err(TickError::InsufficientHistory {
            interval: cfg.strategy_interval,
            needed:   cfg.min_history,
            got:      candles.len(),
        });
    }
    let Some(last) = candles.last() else {
        return Err(TickError::InsufficientHistory {
            interval: cfg.strategy_interval,
            needed:   cfg.min_history.max(1),
            got:      0,
        });
    };
    let price = last.close;
    let candle_time = last.open_time;

    // ── 2. Indicator set ──────────────────────────────────────────────────────
    let primary_closes = closes(&candles);
    let indicators = IndicatorSet::compute(&primary_closes, &cfg.ma_periods);
    let max_period = cfg.ma_periods.iter().copied().max().unwrap_or(0) as usize;
    if !indicators.has_points(1) {
        return Err(TickError::InsufficientHistory {
            interval: cfg.strategy_interval,
            needed:   max_period,
            got:      candles.len(),
        });
    }

    // ── 3. Reference indicator ────────────────────────────────────────────────
    let (reference_indicator, reference_candle_time) =
        reference_indicator(state, &candles, &primary_closes).await?;

    // ── 4. Cluster ────────────────────────────────────────────────────────────
    let cluster = detect_cluster(&indicators.latest_values(), price, cfg.cluster_threshold_pct);

    // ── 5. Cross ──────────────────────────────────────────────────────────────
    let cross = detect_cross_series(
        indicators.series(cfg.fast_period),
        indicators.series(cfg.slow_period),
    )
    .ok_or(TickError::InsufficientHistory {
        interval: cfg.strategy_interval,
        needed:   cfg.slow_period as usize + 1,
        got:      candles.len(),
    })?;

    debug!(
        price,
        clustered = cluster.clustered,
        gap = cluster.gap,
        ?cross,
        reference = ?reference_indicator,
        "Strategy evaluated"
    );

    // ── 6. Decision ───────────────────────────────────────────────────────────
    let open = state.open_position().await;
    let action = match (&open, cross) {
        (None, CrossSignal::Golden | CrossSignal::Death) if cluster.clustered => {
            let position_type = if cross == CrossSignal::Golden {
                PositionType::Long
            } else {
                PositionType::Short
            };
            let draft = PositionDraft {
                symbol: cfg.symbol.clone(),
                position_type,
                entry_price: price,
                entry_time: Utc::now(),
                entry_indicators: indicators.latest(),
                cluster_info_at_entry: cluster,
                reference_indicator_at_entry: reference_indicator,
            };

            let position = state.store.open_position(draft).await?;
            info!(
                id = %position.id,
                side = %position.position_type.as_str(),
                price,
                gap_pct = cluster.gap_percent,
                "{} {} opened on {:?} cross",
                if position_type == PositionType::Long { "🟢" } else { "🔴" },
                position_type.as_str(),
                cross
            );
            state.set_open_position(Some(position.clone())).await;
            state.broadcast(&WsEvent::PositionOpened { position: Box::new(position) });
            TickAction::Opened
        }

        (Some(pos), CrossSignal::Death) if pos.position_type == PositionType::Long => {
            close_on_cross(state, &pos.id, price).await?
        }
        (Some(pos), CrossSignal::Golden) if pos.position_type == PositionType::Short => {
            close_on_cross(state, &pos.id, price).await?
        }

        _ => TickAction::None,
    };

    // ── 7. Snapshot ───────────────────────────────────────────────────────────
    let snapshot = StrategySnapshot {
        price,
        candle_time,
        indicators: indicators.latest(),
        reference_indicator,
        reference_candle_time,
        cluster,
        cross,
        computed_at: Utc::now(),
    };
    state.cache.store_strategy(snapshot.clone()).await;
    state.broadcast(&WsEvent::StrategyTick { snapshot: Box::new(snapshot) });

    Ok(action)
}

async fn close_on_cross(state: &SharedState, id: &str, price: f64) -> Result<TickAction, TickError> {
    match state.store.close_position(id, price, ExitReason::OppositeCrossover).await? {
        CloseOutcome::Closed(position) => {
            info!(
                id = %position.id,
                exit = price,
                pnl = position.profit_loss.unwrap_or_default(),
                "🔁 Position closed on opposite crossover"
            );
            state.clear_open_position_if(&position.id).await;
            state.broadcast(&WsEvent::PositionClosed {
                position:  Box::new(position),
                closed_by: ClosedBy::Strategy,
            });
            Ok(TickAction::Closed)
        }
        CloseOutcome::AlreadyClosed => {
            info!(id, "Position already closed by the stop-loss — nothing to do");
            state.clear_open_position_if(id).await;
            Ok(TickAction::CloseRaced)
        }
    }
}

/// SMA(`reference_period`) on the reference interval, or on the primary
/// candles when no reference interval is configured.  Too little history
/// makes it unavailable, not an error.
async fn reference_indicator(
    state:          &SharedState,
    primary:        &[Candle],
    primary_closes: &[f64],
) -> Result<(Option<f64>, Option<DateTime<Utc>>), TickError> {
    let cfg = &state.config;
    let period = cfg.reference_period as usize;

    let Some(interval) = cfg.reference_interval else {
        let time = primary.last().map(|c| c.open_time);
        return Ok((latest_sma(primary_closes, period), time));
    };

    let candles = state
        .candles
        .fetch(&cfg.symbol, interval, cfg.candle_limit.max(period))
        .await?;
    let value = latest_sma(&closes(&candles), period);
    if value.is_none() {
        warn!(%interval, got = candles.len(), needed = period, "Reference SMA unavailable — too few candles");
    }

    let reference_time = candles.last().map(|c| c.open_time);
    if let (Some(r), Some(p)) = (candles.last(), primary.last()) {
        let skew = p.open_time - r.close_time;
        let allowed = Duration::from_std(interval.duration()).unwrap_or(Duration::zero());
        if skew > allowed {
            warn!(
                primary = %p.open_time,
                reference = %r.open_time,
                %interval,
                "Reference candles lag the primary interval"
            );
        }
    }

    Ok((value, reference_time))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
