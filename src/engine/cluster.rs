//! # engine::cluster
//!
//! **Cluster Detector** — are the moving averages bunched together?
//!
//! ```text
//!   price × threshold%        ← allowed band (scales with price, not with MA size)
//!   ┌───────────────┐
//!   │ SMA20 ─┐      │
//!   │ SMA50  ├ gap  │         gap = max − min over the set
//!   │ SMA100 │      │         clustered ⇔ gap ≤ band
//!   │ SMA200─┘      │
//!   └───────────────┘
//! ```
//!
//! Fails closed: any missing value or an unusable price means "not clustered".

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub clustered:        bool,
    pub gap:              f64,
    pub gap_percent:      f64,
    pub threshold_amount: f64,
}

impl ClusterResult {
    pub fn unclustered() -> Self {
        Self {
            clustered:        false,
            gap:              0.0,
            gap_percent:      0.0,
            threshold_amount: 0.0,
        }
    }
}

/// Evaluate clustering of `values` (one per configured period, same
/// timestamp) against `price × threshold_pct / 100`.
pub fn detect_cluster(values: &[Option<f64>], price: f64, threshold_pct: f64) -> ClusterResult {
    if values.is_empty() || !price.is_finite() || price <= 0.0 {
        debug!(price, count = values.len(), "cluster check skipped: no usable input");
        return ClusterResult::unclustered();
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        match v {
            Some(v) if v.is_finite() => {
                min = min.min(*v);
                max = max.max(*v);
            }
            _ => {
                debug!("cluster check skipped: indicator unavailable");
                return ClusterResult::unclustered();
            }
        }
    }

    let gap              = max - min;
    let threshold_amount = price * threshold_pct / 100.0;

    ClusterResult {
        clustered:   gap <= threshold_amount,
        gap,
        gap_percent: gap / price * 100.0,
        threshold_amount,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
