//! # models::position
//!
//! The single tracked **position** and everything recorded about it.
//!
//! `PositionDraft` = what the strategy tick decides to open
//! `Position`      = the stored record (OPEN until a close wins the CAS)
//! `TradeStats`    = aggregate over closed positions for the PnL query

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::cluster::ClusterResult;

/// Every position is exactly one unit.
pub const POSITION_QUANTITY: f64 = 1.0;

// ─── Enums ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionStatus::Open   => "OPEN",
            PositionStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN"   => Some(PositionStatus::Open),
            "CLOSED" => Some(PositionStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionType::Long  => "LONG",
            PositionType::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LONG"  => Some(PositionType::Long),
            "SHORT" => Some(PositionType::Short),
            _ => None,
        }
    }

    /// Realised PnL of one close for this side.
    pub fn profit_loss(self, entry_price: f64, exit_price: f64, quantity: f64) -> f64 {
        match self {
            PositionType::Long  => (exit_price - entry_price) * quantity,
            PositionType::Short => (entry_price - exit_price) * quantity,
        }
    }
}

// ─── ExitReason ───────────────────────────────────────────────────────────────

/// Why a position was closed.  Stop-loss reasons carry the reference period
/// so PnL can be attributed per exit path later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    OppositeCrossover,
    StopLossBelow { period: u32 },
    StopLossAbove { period: u32 },
}

impl ExitReason {
    pub fn is_stop_loss(self) -> bool {
        !matches!(self, ExitReason::OppositeCrossover)
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s == "OPPOSITE_CROSSOVER" {
            return Some(ExitReason::OppositeCrossover);
        }
        if let Some(p) = s.strip_prefix("STOP_LOSS_BELOW_SMA") {
            return p.parse().ok().map(|period| ExitReason::StopLossBelow { period });
        }
        if let Some(p) = s.strip_prefix("STOP_LOSS_ABOVE_SMA") {
            return p.parse().ok().map(|period| ExitReason::StopLossAbove { period });
        }
        None
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::OppositeCrossover         => f.write_str("OPPOSITE_CROSSOVER"),
            ExitReason::StopLossBelow { period }  => write!(f, "STOP_LOSS_BELOW_SMA{period}"),
            ExitReason::StopLossAbove { period }  => write!(f, "STOP_LOSS_ABOVE_SMA{period}"),
        }
    }
}

impl Serialize for ExitReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExitReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ExitReason::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown exit reason '{raw}'")))
    }
}

// ─── PositionDraft ────────────────────────────────────────────────────────────

/// Everything the strategy tick knows at entry time.  The store turns it into
/// a [`Position`] and assigns the identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDraft {
    pub symbol:                       String,
    pub position_type:                PositionType,
    pub entry_price:                  f64,
    pub entry_time:                   DateTime<Utc>,
    pub entry_indicators:             BTreeMap<u32, f64>,
    pub cluster_info_at_entry:        ClusterResult,
    pub reference_indicator_at_entry: Option<f64>,
}

// ─── Position ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id:                           String,
    pub symbol:                       String,
    pub status:                       PositionStatus,
    pub position_type:                PositionType,
    pub quantity:                     f64,
    pub entry_price:                  f64,
    pub entry_time:                   DateTime<Utc>,
    pub entry_indicators:             BTreeMap<u32, f64>,
    pub cluster_info_at_entry:        ClusterResult,
    pub reference_indicator_at_entry: Option<f64>,
    // ── filled in by the winning close ───────────────────────────────────────
    pub exit_price:                   Option<f64>,
    pub exit_time:                    Option<DateTime<Utc>>,
    pub exit_reason:                  Option<ExitReason>,
    pub profit_loss:                  Option<f64>,
    pub created_at:                   DateTime<Utc>,
    pub updated_at:                   DateTime<Utc>,
}

impl Position {
    pub fn from_draft(id: String, draft: PositionDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol:                       draft.symbol,
            status:                       PositionStatus::Open,
            position_type:                draft.position_type,
            quantity:                     POSITION_QUANTITY,
            entry_price:                  draft.entry_price,
            entry_time:                   draft.entry_time,
            entry_indicators:             draft.entry_indicators,
            cluster_info_at_entry:        draft.cluster_info_at_entry,
            reference_indicator_at_entry: draft.reference_indicator_at_entry,
            exit_price:                   None,
            exit_time:                    None,
            exit_reason:                  None,
            profit_loss:                  None,
            created_at:                   now,
            updated_at:                   now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Apply a close in place.  Callers must have checked `is_open()` under the
    /// same lock / statement that makes the transition atomic.
    pub fn apply_close(&mut self, exit_price: f64, reason: ExitReason, now: DateTime<Utc>) {
        self.status      = PositionStatus::Closed;
        self.exit_price  = Some(exit_price);
        self.exit_time   = Some(now);
        self.exit_reason = Some(reason);
        self.profit_loss = Some(
            self.position_type
                .profit_loss(self.entry_price, exit_price, self.quantity),
        );
        self.updated_at  = now;
    }

    /// Mark-to-market PnL against `price` while still open.
    pub fn unrealised_pnl(&self, price: f64) -> f64 {
        self.position_type.profit_loss(self.entry_price, price, self.quantity)
    }
}

// ─── TradeStats ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeStats {
    pub closed_trades:   usize,
    pub wins:            usize,
    pub losses:          usize,
    pub win_rate_pct:    f64,
    pub total_pnl:       f64,
    pub average_pnl:     f64,
    pub best_trade:      Option<f64>,
    pub worst_trade:     Option<f64>,
    pub stop_loss_exits: usize,
    pub crossover_exits: usize,
}

impl TradeStats {
    /// Aggregate over the CLOSED positions in `positions`; open ones are ignored.
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Self {
        let mut stats = TradeStats::default();

        for p in positions {
            let (Some(pnl), PositionStatus::Closed) = (p.profit_loss, p.status) else {
                continue;
            };

            stats.closed_trades += 1;
            stats.total_pnl     += pnl;
            if pnl > 0.0 {
                stats.wins += 1;
            } else if pnl < 0.0 {
                stats.losses += 1;
            }
            stats.best_trade  = Some(stats.best_trade.map_or(pnl, |b| b.max(pnl)));
            stats.worst_trade = Some(stats.worst_trade.map_or(pnl, |w| w.min(pnl)));

            match p.exit_reason {
                Some(r) if r.is_stop_loss() => stats.stop_loss_exits += 1,
                Some(_)                     => stats.crossover_exits += 1,
                None => {}
            }
        }

        if stats.closed_trades > 0 {
            let n = stats.closed_trades as f64;
            stats.average_pnl  = stats.total_pnl / n;
            stats.win_rate_pct = stats.wins as f64 / n * 100.0;
        }

        stats
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(position_type: PositionType, entry_price: f64) -> PositionDraft {
        PositionDraft {
            symbol: "BTCUSDT".into(),
            position_type,
            entry_price,
            entry_time: Utc::now(),
            entry_indicators: BTreeMap::from([(50, entry_price), (200, entry_price)]),
            cluster_info_at_entry: ClusterResult::unclustered(),
            reference_indicator_at_entry: None,
        }
    }

    #[test]
    fn test_pnl_sign_convention() {
        assert_eq!(PositionType::Long.profit_loss(100.0, 95.0, 1.0), -5.0);
        assert_eq!(PositionType::Short.profit_loss(100.0, 95.0, 1.0), 5.0);
    }

    #[test]
    fn test_apply_close_fills_exit_fields() {
        let now = Utc::now();
        let mut p = Position::from_draft("p1".into(), draft(PositionType::Short, 200.0), now);
        assert!(p.is_open());

        p.apply_close(210.0, ExitReason::StopLossAbove { period: 200 }, now);

        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.profit_loss, Some(-10.0));
        assert_eq!(p.exit_reason, Some(ExitReason::StopLossAbove { period: 200 }));
    }

    #[test]
    fn test_exit_reason_text_roundtrip() {
        let reasons = [
            ExitReason::OppositeCrossover,
            ExitReason::StopLossBelow { period: 200 },
            ExitReason::StopLossAbove { period: 100 },
        ];
        for r in reasons {
            assert_eq!(ExitReason::parse(&r.to_string()), Some(r));
        }
        assert_eq!(
            serde_json::to_string(&ExitReason::StopLossBelow { period: 200 }).unwrap(),
            "\"STOP_LOSS_BELOW_SMA200\""
        );
        assert_eq!(ExitReason::parse("TP"), None);
    }

    #[test]
    fn test_trade_stats_ignores_open_positions() {
        let now = Utc::now();
        let mut win = Position::from_draft("a".into(), draft(PositionType::Long, 100.0), now);
        win.apply_close(110.0, ExitReason::OppositeCrossover, now);
        let mut loss = Position::from_draft("b".into(), draft(PositionType::Long, 100.0), now);
        loss.apply_close(96.0, ExitReason::StopLossBelow { period: 200 }, now);
        let open = Position::from_draft("c".into(), draft(PositionType::Short, 100.0), now);

        let stats = TradeStats::from_positions([&win, &loss, &open]);

        assert_eq!(stats.closed_trades, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.total_pnl, 6.0);
        assert_eq!(stats.average_pnl, 3.0);
        assert_eq!(stats.win_rate_pct, 50.0);
        assert_eq!(stats.best_trade, Some(10.0));
        assert_eq!(stats.worst_trade, Some(-4.0));
        assert_eq!(stats.stop_loss_exits, 1);
        assert_eq!(stats.crossover_exits, 1);
    }

    #[test]
    fn test_trade_stats_empty() {
        let stats = TradeStats::from_positions(std::iter::empty());
        assert_eq!(stats, TradeStats::default());
    }
}
