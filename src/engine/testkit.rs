//! Shared fixtures for scheduler and route tests.

use std::sync::Arc;

use crate::config::Config;
use crate::feed::scripted::ScriptedCandleSource;
use crate::models::Interval;
use crate::state::{AppState, SharedState};
use crate::store::MemoryStore;

/// 201 closes where SMA50 crosses above SMA200 on the last bar, all four
/// SMAs within 0.04 of each other, last close 101.
pub fn golden_closes() -> Vec<f64> {
    let mut closes = vec![100.0; 150];
    closes.extend(std::iter::repeat(99.99).take(50));
    closes.push(101.0);
    closes
}

/// Mirror of [`golden_closes`]: SMA50 crosses below SMA200, last close 99.
pub fn death_closes() -> Vec<f64> {
    let mut closes = vec![100.0; 150];
    closes.extend(std::iter::repeat(100.01).take(50));
    closes.push(99.0);
    closes
}

/// Defaults with the reference MA taken from the strategy interval, so a
/// single scripted series drives the whole tick.
pub fn test_config() -> Config {
    Config {
        strategy_interval:  Interval::M15,
        reference_interval: None,
        stop_loss_interval: Interval::M1,
        ..Config::default()
    }
}

pub fn state_with(config: Config) -> (SharedState, Arc<ScriptedCandleSource>) {
    let source = Arc::new(ScriptedCandleSource::new());
    let state = Arc::new(AppState::new(config, source.clone(), Arc::new(MemoryStore::new())));
    (state, source)
}

pub fn test_state() -> (SharedState, Arc<ScriptedCandleSource>) {
    state_with(test_config())
}

/// Spin until `cond` holds; the scripted gate parks a tick mid-fetch.
pub async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
