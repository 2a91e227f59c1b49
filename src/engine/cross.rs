//! # engine::cross
//!
//! **Cross Detector** — classifies a fast/slow crossover between the previous
//! and the current bar.  Strict inequalities on both sides of the transition,
//! so a flat touch never fires.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossSignal {
    /// fast was below slow, now above
    #[serde(rename = "GOLDEN")]
    Golden,
    /// fast was above slow, now below
    #[serde(rename = "DEATH")]
    Death,
    #[serde(rename = "NONE")]
    Neutral,
}

pub fn detect_cross(prev_fast: f64, prev_slow: f64, curr_fast: f64, curr_slow: f64) -> CrossSignal {
    if prev_fast < prev_slow && curr_fast > curr_slow {
        CrossSignal::Golden
    } else if prev_fast > prev_slow && curr_fast < curr_slow {
        CrossSignal::Death
    } else {
        CrossSignal::Neutral
    }
}

/// Cross over the last two points of each series.  `None` when either
/// series has fewer than two points; the caller skips the tick.
pub fn detect_cross_series(fast: &[f64], slow: &[f64]) -> Option<CrossSignal> {
    let [.., prev_fast, curr_fast] = fast else { return None };
    let [.., prev_slow, curr_slow] = slow else { return None };
    Some(detect_cross(*prev_fast, *prev_slow, *curr_fast, *curr_slow))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
