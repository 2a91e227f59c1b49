//! # models::candle
//!
//! [`Candle`] — one OHLCV bar as delivered by the upstream feed — and
//! [`Interval`], the typed timeframe a series is sampled at.
//!
//! Candles are immutable once fetched.  A series is always ordered by
//! `open_time` ascending and the **last** element is the "current" bar.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Candle ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time:  DateTime<Utc>,
    pub open:       f64,
    pub high:       f64,
    pub low:        f64,
    pub close:      f64,
    pub volume:     f64,
    pub close_time: DateTime<Utc>,
}

/// Closing prices of a series, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

// ─── Interval ─────────────────────────────────────────────────────────────────

/// Candle timeframe.  Rendered with the exchange notation (`"15m"`, `"1h"`)
/// both in config and in the feed's query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
}

impl Interval {
    pub const ALL: [Interval; 12] = [
        Interval::M1,
        Interval::M3,
        Interval::M5,
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H2,
        Interval::H4,
        Interval::H6,
        Interval::H8,
        Interval::H12,
        Interval::D1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::M1  => "1m",
            Interval::M3  => "3m",
            Interval::M5  => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1  => "1h",
            Interval::H2  => "2h",
            Interval::H4  => "4h",
            Interval::H6  => "6h",
            Interval::H8  => "8h",
            Interval::H12 => "12h",
            Interval::D1  => "1d",
        }
    }

    pub fn duration(self) -> Duration {
        let minutes: u64 = match self {
            Interval::M1  => 1,
            Interval::M3  => 3,
            Interval::M5  => 5,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1  => 60,
            Interval::H2  => 120,
            Interval::H4  => 240,
            Interval::H6  => 360,
            Interval::H8  => 480,
            Interval::H12 => 720,
            Interval::D1  => 1440,
        };
        Duration::from_secs(minutes * 60)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown candle interval '{0}'")]
pub struct UnknownInterval(pub String);

impl FromStr for Interval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| UnknownInterval(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = UnknownInterval;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
