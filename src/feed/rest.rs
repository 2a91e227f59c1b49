//! # feed::rest
//!
//! REST polling source for Binance-compatible `/api/v3/klines` endpoints.
//!
//! ## Row format
//! ```json
//! [[1499040000000, "0.0163", "0.8000", "0.0157", "0.0157", "148976.1", 1499644799999, ...], ...]
//! ```
//! open time / close time are epoch-ms, prices and volume are decimal strings.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, error};

use super::{CandleSource, FeedError};
use crate::models::{Candle, Interval};

/// Upper bound the exchange accepts for one klines request.
pub const MAX_KLINES_LIMIT: usize = 1000;

pub struct RestCandleSource {
    client:   reqwest::Client,
    base_url: String,
    timeout:  Duration,
}

impl RestCandleSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl CandleSource for RestCandleSource {
    async fn fetch(
        &self,
        symbol:   &str,
        interval: Interval,
        limit:    usize,
    ) -> Result<Vec<Candle>, FeedError> {
        let url   = format!("{}/api/v3/klines", self.base_url);
        let limit = limit.clamp(1, MAX_KLINES_LIMIT);

        debug!(symbol, %interval, limit, "Fetching candles");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol",   symbol.to_string()),
                ("interval", interval.to_string()),
                ("limit",    limit.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, symbol, %interval, "Candle feed unreachable");
                FeedError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body   = response.text().await.unwrap_or_default();
            error!(http_status = status, body = %body, "Candle feed returned HTTP error");
            return Err(FeedError::Status { status, body });
        }

        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;

        parse_klines(&rows)
    }
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// Turn raw kline rows into candles sorted by `open_time`.
pub fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>, FeedError> {
    let mut candles = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_row(row).ok_or_else(|| FeedError::Decode(format!("bad kline row #{i}"))))
        .collect::<Result<Vec<_>, _>>()?;

    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

fn parse_row(row: &[Value]) -> Option<Candle> {
    if row.len() < 7 {
        return None;
    }

    Some(Candle {
        open_time:  millis(&row[0])?,
        open:       number(&row[1])?,
        high:       number(&row[2])?,
        low:        number(&row[3])?,
        close:      number(&row[4])?,
        volume:     number(&row[5])?,
        close_time: millis(&row[6])?,
    })
}

/// Prices arrive as strings; some mirrors send bare numbers.
fn number(v: &Value) -> Option<f64> {
    let parsed: Option<f64> = match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.filter(|x| x.is_finite())
}

fn millis(v: &Value) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(v.as_i64()?).single()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
