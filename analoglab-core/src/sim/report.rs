//! Regime-bucketed performance report.
//!
//! While a position is open, each step's P&L contribution is attributed to
//! the {trend x vol} bucket active on that step. Buckets that stay
//! persistently unprofitable are flagged as "bad regimes" for external
//! persistence and future exclusion; the simulator itself never acts on the
//! list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::risk::{TrendBucket, VolBucket};

/// Per-bucket in-position performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeBucketStats {
    pub trend: TrendBucket,
    pub vol: VolBucket,
    /// In-position steps attributed to this bucket.
    pub steps: usize,
    /// Sum of per-step net return contributions.
    pub total_return: f64,
    pub mean_step_return: f64,
}

/// Full report plus the derived bad-regime annotations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegimeReport {
    pub buckets: Vec<RegimeBucketStats>,
    /// Bucket labels ("trend=down,vol=high") with enough sample and negative
    /// total return; written back through the settings store by callers.
    pub bad_regimes: Vec<String>,
}

/// Accumulator used by the engine during a run.
#[derive(Debug, Default)]
pub struct RegimeAttribution {
    cells: HashMap<(TrendBucket, VolBucket), (usize, f64)>,
}

impl RegimeAttribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trend: TrendBucket, vol: VolBucket, step_return: f64) {
        let cell = self.cells.entry((trend, vol)).or_insert((0, 0.0));
        cell.0 += 1;
        cell.1 += step_return;
    }

    /// Build the report. `min_steps` is the sample floor below which a
    /// losing bucket is not flagged.
    pub fn finalize(self, min_steps: usize) -> RegimeReport {
        let mut buckets: Vec<RegimeBucketStats> = self
            .cells
            .into_iter()
            .map(|((trend, vol), (steps, total))| RegimeBucketStats {
                trend,
                vol,
                steps,
                total_return: total,
                mean_step_return: if steps > 0 { total / steps as f64 } else { 0.0 },
            })
            .collect();
        // Deterministic order: worst total first.
        buckets.sort_by(|a, b| {
            a.total_return
                .partial_cmp(&b.total_return)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let bad_regimes = buckets
            .iter()
            .filter(|b| b.steps >= min_steps && b.total_return < 0.0)
            .map(|b| format!("trend={},vol={}", b.trend, b.vol))
            .collect();

        RegimeReport {
            buckets,
            bad_regimes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_attribution_is_empty_report() {
        let report = RegimeAttribution::new().finalize(10);
        assert!(report.buckets.is_empty());
        assert!(report.bad_regimes.is_empty());
    }

    #[test]
    fn losing_bucket_flagged_above_sample_floor() {
        let mut attr = RegimeAttribution::new();
        for _ in 0..25 {
            attr.record(TrendBucket::Down, VolBucket::High, -0.01);
        }
        for _ in 0..25 {
            attr.record(TrendBucket::Up, VolBucket::Low, 0.01);
        }
        let report = attr.finalize(20);
        assert_eq!(report.bad_regimes, vec!["trend=down,vol=high".to_string()]);
        assert_eq!(report.buckets.len(), 2);
        // Worst bucket first.
        assert_eq!(report.buckets[0].trend, TrendBucket::Down);
        assert!((report.buckets[0].mean_step_return + 0.01).abs() < 1e-12);
    }

    #[test]
    fn thin_losing_bucket_not_flagged() {
        let mut attr = RegimeAttribution::new();
        for _ in 0..5 {
            attr.record(TrendBucket::Side, VolBucket::Normal, -0.02);
        }
        let report = attr.finalize(20);
        assert!(report.bad_regimes.is_empty());
        assert_eq!(report.buckets[0].steps, 5);
    }
}
