//! # engine::indicators
//!
//! Simple moving averages over a closing-price series.  Pure functions of
//! history: every tick recomputes the full set from the fetched candles,
//! nothing is patched incrementally.

use std::collections::BTreeMap;

/// SMA series aligned to the tail of `closes`.
///
/// Output length is `closes.len() - period + 1`; the last element is the
/// average of the most recent `period` closes.  Returns an empty series when
/// there is not enough data (or `period == 0`) — callers treat that as
/// "indicator unavailable", not as an error.
pub fn sma(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let n = period as f64;
    closes
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / n)
        .collect()
}

/// Most recent SMA value, if defined.
pub fn latest_sma(closes: &[f64], period: usize) -> Option<f64> {
    sma(closes, period).last().copied()
}

// ─── IndicatorSet ─────────────────────────────────────────────────────────────

/// SMA series for every configured period, computed over one closing-price
/// sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    series: BTreeMap<u32, Vec<f64>>,
}

impl IndicatorSet {
    pub fn compute(closes: &[f64], periods: &[u32]) -> Self {
        let series = periods
            .iter()
            .map(|&p| (p, sma(closes, p as usize)))
            .collect();
        Self { series }
    }

    pub fn series(&self, period: u32) -> &[f64] {
        self.series.get(&period).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `true` once every period has at least `points` values.
    pub fn has_points(&self, points: usize) -> bool {
        !self.series.is_empty() && self.series.values().all(|s| s.len() >= points)
    }

    /// Latest value per period; periods without data are left out.
    pub fn latest(&self) -> BTreeMap<u32, f64> {
        self.series
            .iter()
            .filter_map(|(&p, s)| s.last().map(|&v| (p, v)))
            .collect()
    }

    /// Latest value per configured period, `None` where unavailable.
    pub fn latest_values(&self) -> Vec<Option<f64>> {
        self.series.values().map(|s| s.last().copied()).collect()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sma_shorter_than_period_is_empty() {
        for len in 0..20 {
            let closes: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
            assert!(sma(&closes, 20).is_empty(), "len {len} must not yield an average");
        }
        assert!(sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_sma_aligned_to_tail() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&closes, 3);
        assert_eq!(out.len(), 3);
        assert!(approx(out[0], 2.0));
        assert!(approx(out[1], 3.0));
        assert!(approx(out[2], 4.0));
    }

    #[test]
    fn test_sma_200_flat_then_step() {
        let mut closes = vec![100.0; 199];
        closes.push(101.0);

        let out = sma(&closes, 200);
        assert_eq!(out.len(), 1);
        assert!(approx(out[0], 100.005));
        assert!(approx(latest_sma(&closes, 200).unwrap(), 100.005));
    }

    #[test]
    fn test_indicator_set_tails() {
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        let set = IndicatorSet::compute(&closes, &[2, 5]);

        let [.., prev, curr] = set.series(2) else { panic!("too short") };
        assert!(approx(*curr, 9.5));
        assert!(approx(*prev, 8.5));
        assert!(approx(set.latest()[&5], 8.0));
        assert!(set.has_points(2));
        assert!(!set.has_points(7));
        assert_eq!(set.latest().len(), 2);
    }

    #[test]
    fn test_indicator_set_missing_period() {
        let set = IndicatorSet::compute(&[1.0, 2.0, 3.0], &[2, 50]);
        assert!(set.series(50).is_empty());
        assert_eq!(set.latest_values(), vec![Some(2.5), None]);
        assert!(!set.latest().contains_key(&50));
    }
}
