//! # feed — Candle Sources
//!
//! The engine only sees the [`CandleSource`] trait; the transport behind it
//! (REST polling today) is swappable.
//!
//! Contract: return the most recent `limit` candles ordered by `open_time`
//! ascending, or fail.  No retries in here — a failed fetch aborts the
//! current tick and the next scheduled tick tries again.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Candle, Interval};

pub mod rest;

pub use rest::RestCandleSource;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Upstream unreachable or timed out.
    #[error("candle feed unreachable: {0}")]
    Transport(String),

    /// Upstream answered with a non-success HTTP status.
    #[error("candle feed HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be turned into candles.
    #[error("malformed candle payload: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch(
        &self,
        symbol:   &str,
        interval: Interval,
        limit:    usize,
    ) -> Result<Vec<Candle>, FeedError>;
}

// ─── Test double ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod scripted {
    //! In-memory [`CandleSource`] whose series can be swapped between ticks.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, TimeZone, Utc};
    use tokio::sync::Semaphore;

    use super::*;

    #[derive(Default)]
    pub struct ScriptedCandleSource {
        series:  Mutex<HashMap<Interval, Vec<Candle>>>,
        failing: Mutex<bool>,
        calls:   AtomicUsize,
        /// When set, every fetch waits for a permit before answering.
        gate:    Mutex<Option<Arc<Semaphore>>>,
    }

    impl ScriptedCandleSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_closes(&self, interval: Interval, closes: &[f64]) {
            self.series
                .lock()
                .unwrap()
                .insert(interval, candles_from_closes(interval, closes));
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        pub fn set_gate(&self, gate: Option<Arc<Semaphore>>) {
            *self.gate.lock().unwrap() = gate;
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CandleSource for ScriptedCandleSource {
        async fn fetch(
            &self,
            _symbol:  &str,
            interval: Interval,
            limit:    usize,
        ) -> Result<Vec<Candle>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                let permit = gate.acquire().await.map_err(|e| FeedError::Transport(e.to_string()))?;
                permit.forget();
            }

            if *self.failing.lock().unwrap() {
                return Err(FeedError::Transport("scripted outage".into()));
            }

            let series = self.series.lock().unwrap();
            let candles = series.get(&interval).cloned().unwrap_or_default();
            let skip = candles.len().saturating_sub(limit);
            Ok(candles.into_iter().skip(skip).collect())
        }
    }

    pub fn candles_from_closes(interval: Interval, closes: &[f64]) -> Vec<Candle> {
        let step = Duration::from_std(interval.duration()).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open_time = start + step * i as i32;
                Candle {
                    open_time,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                    close_time: open_time + step - Duration::milliseconds(1),
                }
            })
            .collect()
    }
}
