//! # engine::timer
//!
//! The two periodic drivers.  Each fire spawns the tick as its own task, so
//! a slow tick never holds up the timer; the next fire simply finds the
//! guard taken and is skipped.
//!
//! - strategy: one tick at startup, then on every boundary of its period
//!   (60 s ⇒ on the minute).  Starting exactly on a boundary fires once.
//! - stop-loss: first tick after a short start delay, then every period

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{run_stop_loss_tick, run_strategy_tick};
use crate::state::SharedState;

/// Time from `now` to the next multiple of `period` since the Unix epoch.
/// Zero when `now` sits exactly on a boundary.
pub fn delay_until_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return Duration::ZERO;
    }
    let rem = now.timestamp_millis().rem_euclid(period_ms);
    if rem == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - rem) as u64)
    }
}

/// The first boundary fire covers startup when it is immediate.
fn needs_startup_tick(delay_to_boundary: Duration) -> bool {
    !delay_to_boundary.is_zero()
}

pub fn spawn_strategy_timer(state: SharedState) -> JoinHandle<()> {
    let period = state.config.strategy_tick;

    tokio::spawn(async move {
        info!(every = ?period, "⏱️  Strategy scheduler started");

        let delay = delay_until_boundary(Utc::now(), period);
        if needs_startup_tick(delay) {
            spawn_strategy_tick(&state);
        }

        let mut ticker = interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            spawn_strategy_tick(&state);
        }
    })
}

pub fn spawn_stop_loss_timer(state: SharedState) -> JoinHandle<()> {
    let period = state.config.stop_loss_tick;
    let delay = state.config.stop_loss_start_delay;

    tokio::spawn(async move {
        info!(every = ?period, ?delay, "⏱️  Stop-loss scheduler started");

        let mut ticker = interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            spawn_stop_loss_tick(&state);
        }
    })
}

fn spawn_strategy_tick(state: &SharedState) {
    let state = state.clone();
    tokio::spawn(async move {
        match run_strategy_tick(&state).await {
            Ok(outcome) => debug!(?outcome, "Strategy tick done"),
            Err(e) => e.log("strategy"),
        }
    });
}

fn spawn_stop_loss_tick(state: &SharedState) {
    let state = state.clone();
    tokio::spawn(async move {
        match run_stop_loss_tick(&state).await {
            Ok(outcome) => debug!(?outcome, "Stop-loss tick done"),
            Err(e) => e.log("stop_loss"),
        }
    });
}

// ─── Tests ────────────────────────────────────────────────────────────────────
