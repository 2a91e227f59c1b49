//! # config — read configuration from environment variables
//!
//! Every value has a default so `cargo run` works against the public feed in
//! dry-run mode with an empty `.env`.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, ensure, Context};

use crate::feed::rest::MAX_KLINES_LIMIT;
use crate::models::Interval;

#[derive(Debug, Clone)]
pub struct Config {
    /// Traded symbol, e.g. `"BTCUSDT"`
    pub symbol:                String,
    /// Interval the MA set, cluster and cross are computed on
    pub strategy_interval:     Interval,
    /// Slower interval for the reference MA; `None` = use `strategy_interval`
    pub reference_interval:    Option<Interval>,
    /// Fast interval the stop-loss watchdog compares against the reference MA
    pub stop_loss_interval:    Interval,
    /// All MA periods that make up the cluster
    pub ma_periods:            Vec<u32>,
    pub fast_period:           u32,
    pub slow_period:           u32,
    pub reference_period:      u32,
    /// Band width as % of price
    pub cluster_threshold_pct: f64,
    /// Minimum candles a fetch must return before a tick may decide anything
    pub min_history:           usize,
    /// Candles requested per fetch
    pub candle_limit:          usize,
    pub strategy_tick:         Duration,
    pub stop_loss_tick:        Duration,
    pub stop_loss_start_delay: Duration,
    /// Cache older than this makes the market query run a tick first
    pub cache_stale_after:     Duration,
    pub fetch_timeout:         Duration,
    pub feed_base_url:         String,
    /// Simulate trades in memory only
    pub dry_run:               bool,
    pub database_url:          Option<String>,
    pub bind_addr:             SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol:                "BTCUSDT".to_string(),
            strategy_interval:     Interval::M15,
            reference_interval:    Some(Interval::H1),
            stop_loss_interval:    Interval::M1,
            ma_periods:            vec![20, 50, 100, 200],
            fast_period:           50,
            slow_period:           200,
            reference_period:      200,
            cluster_threshold_pct: 0.5,
            min_history:           200,
            candle_limit:          300,
            strategy_tick:         Duration::from_secs(60),
            stop_loss_tick:        Duration::from_secs(30),
            stop_loss_start_delay: Duration::from_secs(5),
            cache_stale_after:     Duration::from_secs(70),
            fetch_timeout:         Duration::from_secs(10),
            feed_base_url:         "https://api.binance.com".to_string(),
            dry_run:               true,
            database_url:          None,
            bind_addr:             SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value lookup (env in production, a map in tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let d = Config::default();
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let reference_interval = match get("REFERENCE_INTERVAL") {
            // explicitly empty disables the slower timeframe
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.parse().context("REFERENCE_INTERVAL")?),
            None => d.reference_interval,
        };

        let config = Self {
            symbol:                var("SYMBOL").unwrap_or(d.symbol).to_uppercase(),
            strategy_interval:     parse_or(var("STRATEGY_INTERVAL"), "STRATEGY_INTERVAL", d.strategy_interval)?,
            reference_interval,
            stop_loss_interval:    parse_or(var("STOP_LOSS_INTERVAL"), "STOP_LOSS_INTERVAL", d.stop_loss_interval)?,
            ma_periods:            match var("MA_PERIODS") {
                Some(raw) => parse_periods(&raw)?,
                None => d.ma_periods,
            },
            fast_period:           parse_or(var("FAST_PERIOD"), "FAST_PERIOD", d.fast_period)?,
            slow_period:           parse_or(var("SLOW_PERIOD"), "SLOW_PERIOD", d.slow_period)?,
            reference_period:      parse_or(var("REFERENCE_PERIOD"), "REFERENCE_PERIOD", d.reference_period)?,
            cluster_threshold_pct: parse_or(var("CLUSTER_THRESHOLD_PCT"), "CLUSTER_THRESHOLD_PCT", d.cluster_threshold_pct)?,
            min_history:           parse_or(var("MIN_HISTORY"), "MIN_HISTORY", d.min_history)?,
            candle_limit:          parse_or(var("CANDLE_LIMIT"), "CANDLE_LIMIT", d.candle_limit)?,
            strategy_tick:         secs_or(var("STRATEGY_TICK_SECS"), "STRATEGY_TICK_SECS", d.strategy_tick)?,
            stop_loss_tick:        secs_or(var("STOP_LOSS_TICK_SECS"), "STOP_LOSS_TICK_SECS", d.stop_loss_tick)?,
            stop_loss_start_delay: secs_or(var("STOP_LOSS_START_DELAY_SECS"), "STOP_LOSS_START_DELAY_SECS", d.stop_loss_start_delay)?,
            cache_stale_after:     secs_or(var("CACHE_STALE_SECS"), "CACHE_STALE_SECS", d.cache_stale_after)?,
            fetch_timeout:         secs_or(var("FETCH_TIMEOUT_SECS"), "FETCH_TIMEOUT_SECS", d.fetch_timeout)?,
            feed_base_url:         var("FEED_BASE_URL").unwrap_or(d.feed_base_url),
            dry_run:               match var("DRY_RUN") {
                Some(v) => parse_bool(&v).context("DRY_RUN")?,
                None => d.dry_run,
            },
            database_url:          var("DATABASE_URL"),
            bind_addr:             parse_or(var("BIND_ADDR"), "BIND_ADDR", d.bind_addr)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.ma_periods.is_empty(), "MA_PERIODS must list at least one period");
        ensure!(
            self.ma_periods.iter().all(|&p| p > 0),
            "MA_PERIODS must all be > 0"
        );
        ensure!(
            self.fast_period > 0 && self.slow_period > 0 && self.reference_period > 0,
            "FAST_PERIOD, SLOW_PERIOD and REFERENCE_PERIOD must be > 0"
        );
        ensure!(
            self.fast_period < self.slow_period,
            "FAST_PERIOD ({}) must be below SLOW_PERIOD ({})",
            self.fast_period,
            self.slow_period
        );
        ensure!(
            self.ma_periods.contains(&self.fast_period) && self.ma_periods.contains(&self.slow_period),
            "FAST_PERIOD and SLOW_PERIOD must be part of MA_PERIODS {:?}",
            self.ma_periods
        );
        ensure!(
            self.candle_limit >= self.min_history,
            "CANDLE_LIMIT ({}) must be >= MIN_HISTORY ({})",
            self.candle_limit,
            self.min_history
        );
        // A crossover needs a previous point on the slowest SMA too.
        let longest = self.ma_periods.iter().copied().max().unwrap_or(0) as usize;
        ensure!(
            self.candle_limit > longest,
            "CANDLE_LIMIT ({}) must exceed the longest MA period ({longest})",
            self.candle_limit
        );
        ensure!(
            self.candle_limit >= self.reference_period as usize,
            "CANDLE_LIMIT ({}) must be >= REFERENCE_PERIOD ({})",
            self.candle_limit,
            self.reference_period
        );
        ensure!(
            self.candle_limit <= MAX_KLINES_LIMIT,
            "CANDLE_LIMIT ({}) must be <= {MAX_KLINES_LIMIT}, the most one kline request returns",
            self.candle_limit
        );
        ensure!(
            self.cluster_threshold_pct.is_finite() && self.cluster_threshold_pct >= 0.0,
            "CLUSTER_THRESHOLD_PCT must be a non-negative number"
        );
        ensure!(
            !self.strategy_tick.is_zero() && !self.stop_loss_tick.is_zero(),
            "tick periods must be > 0 seconds"
        );
        ensure!(!self.fetch_timeout.is_zero(), "FETCH_TIMEOUT_SECS must be > 0");
        Ok(())
    }

    /// Interval the reference MA is computed on.
    pub fn reference_interval(&self) -> Interval {
        self.reference_interval.unwrap_or(self.strategy_interval)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.parse().with_context(|| format!("{key} has invalid value '{v}'")),
        None => Ok(default),
    }
}

fn secs_or(raw: Option<String>, key: &str, default: Duration) -> anyhow::Result<Duration> {
    match raw {
        Some(_) => parse_or::<u64>(raw, key, 0).map(Duration::from_secs),
        None => Ok(default),
    }
}

fn parse_periods(raw: &str) -> anyhow::Result<Vec<u32>> {
    let mut periods = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().with_context(|| format!("MA_PERIODS entry '{s}' is not a number")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    periods.sort_unstable();
    periods.dedup();
    Ok(periods)
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on"  => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected true/false, got '{other}'"),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
