//! Risk model — volatility targeting, drawdown taper, regime exposure grid.
//!
//! Target exposure each step is the product of three multipliers:
//! `leverage(realized vol) x drawdown_multiplier(current dd) x regime
//! multiplier(trend/vol bucket)`. Each factor is a pure function so the
//! engine stays a thin sequential loop.

use serde::{Deserialize, Serialize};

/// Volatility-target leverage parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    /// Annualized volatility target (e.g. 0.40 = 40%).
    pub vol_target: f64,
    pub min_leverage: f64,
    pub max_leverage: f64,
    /// Lookback (steps) for realized volatility.
    pub vol_lookback: usize,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            vol_target: 0.40,
            min_leverage: 0.25,
            max_leverage: 2.0,
            vol_lookback: 30,
        }
    }
}

/// Drawdown taper parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownParams {
    /// Drawdown below which exposure is unscaled.
    pub soft_threshold: f64,
    /// Drawdown at or above which exposure is zero (kill switch).
    pub hard_threshold: f64,
    /// Power of the taper curve between soft and hard.
    pub taper_power: f64,
    /// Multiplier floor reached just before the hard threshold.
    pub floor: f64,
}

impl Default for DrawdownParams {
    fn default() -> Self {
        Self {
            soft_threshold: 0.10,
            hard_threshold: 0.30,
            taper_power: 1.5,
            floor: 0.20,
        }
    }
}

/// Annualized standard deviation of per-step log returns.
///
/// Returns None with fewer than 2 observations; the engine falls back to the
/// volatility target itself (leverage 1.0) in that case.
pub fn realized_annualized_vol(log_returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if log_returns.len() < 2 {
        return None;
    }
    let n = log_returns.len() as f64;
    let mean = log_returns.iter().sum::<f64>() / n;
    let var = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt() * periods_per_year.sqrt())
}

/// Volatility-targeted leverage: `clamp(vol_target / realized, min, max)`.
///
/// A realized vol at or below 1e-8 is treated as unmeasurable and yields
/// max leverage (the clamp bound), which the engine flags as a warning.
pub fn vol_target_leverage(realized_vol: f64, params: &RiskParams) -> f64 {
    let raw = if realized_vol > 1e-8 {
        params.vol_target / realized_vol
    } else {
        params.max_leverage
    };
    raw.clamp(params.min_leverage, params.max_leverage)
}

/// Drawdown multiplier: 1.0 below soft, 0.0 at/above hard, power taper from
/// 1.0 down to `floor` in between.
pub fn drawdown_multiplier(drawdown: f64, params: &DrawdownParams) -> f64 {
    if drawdown >= params.hard_threshold {
        return 0.0;
    }
    if drawdown < params.soft_threshold {
        return 1.0;
    }
    let span = params.hard_threshold - params.soft_threshold;
    if span <= 0.0 {
        return 0.0;
    }
    let t = (drawdown - params.soft_threshold) / span;
    let decay = (1.0 - t).powf(params.taper_power);
    params.floor + (1.0 - params.floor) * decay
}

// ─── Regime exposure grid ────────────────────────────────────────────

/// Trend bucket for the exposure grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendBucket {
    Up,
    Side,
    Down,
}

impl std::fmt::Display for TrendBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Side => f.write_str("side"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Volatility bucket for the exposure grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolBucket {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for VolBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Normal => f.write_str("normal"),
            Self::High => f.write_str("high"),
        }
    }
}

/// Explicit multiplier for one (trend, vol) cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairOverride {
    pub trend: TrendBucket,
    pub vol: VolBucket,
    pub multiplier: f64,
}

/// Row default: applies to every vol bucket of one trend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendDefault {
    pub trend: TrendBucket,
    pub multiplier: f64,
}

/// Column default: applies to every trend of one vol bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolDefault {
    pub vol: VolBucket,
    pub multiplier: f64,
}

/// {trend x volatility} exposure multiplier grid.
///
/// Lookup precedence: explicit pair override, then trend row default, then
/// vol column default, then 1.0. Disabled grid always yields 1.0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeExposureGrid {
    pub enabled: bool,
    #[serde(default)]
    pub pair_overrides: Vec<PairOverride>,
    #[serde(default)]
    pub trend_defaults: Vec<TrendDefault>,
    #[serde(default)]
    pub vol_defaults: Vec<VolDefault>,
}

impl RegimeExposureGrid {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn lookup(&self, trend: TrendBucket, vol: VolBucket) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        if let Some(o) = self
            .pair_overrides
            .iter()
            .find(|o| o.trend == trend && o.vol == vol)
        {
            return o.multiplier;
        }
        if let Some(d) = self.trend_defaults.iter().find(|d| d.trend == trend) {
            return d.multiplier;
        }
        if let Some(d) = self.vol_defaults.iter().find(|d| d.vol == vol) {
            return d.multiplier;
        }
        1.0
    }
}

/// Bucket classification thresholds used by the engine per step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketParams {
    /// Moving-average period for the trend bucket.
    pub trend_period: usize,
    /// Fractional band around the MA treated as sideways.
    pub trend_band: f64,
    /// Annualized vol below this is `Low`.
    pub vol_low: f64,
    /// Annualized vol above this is `High`.
    pub vol_high: f64,
}

impl Default for BucketParams {
    fn default() -> Self {
        Self {
            trend_period: 50,
            trend_band: 0.005,
            vol_low: 0.35,
            vol_high: 0.90,
        }
    }
}

/// Classify trend from the close relative to its trailing mean.
///
/// With fewer than `trend_period` closes the bucket is `Side`.
pub fn classify_trend(closes: &[f64], params: &BucketParams) -> TrendBucket {
    if closes.len() < params.trend_period || params.trend_period == 0 {
        return TrendBucket::Side;
    }
    let window = &closes[closes.len() - params.trend_period..];
    let ma = window.iter().sum::<f64>() / window.len() as f64;
    let close = closes[closes.len() - 1];
    if close > ma * (1.0 + params.trend_band) {
        TrendBucket::Up
    } else if close < ma * (1.0 - params.trend_band) {
        TrendBucket::Down
    } else {
        TrendBucket::Side
    }
}

/// Classify annualized volatility into low/normal/high.
pub fn classify_vol(annualized_vol: f64, params: &BucketParams) -> VolBucket {
    if annualized_vol < params.vol_low {
        VolBucket::Low
    } else if annualized_vol > params.vol_high {
        VolBucket::High
    } else {
        VolBucket::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Volatility targeting ──

    #[test]
    fn realized_vol_of_constant_returns_is_zero() {
        let r = vec![0.001; 30];
        let v = realized_annualized_vol(&r, 365.0).unwrap();
        assert!(v.abs() < 1e-12);
    }

    #[test]
    fn realized_vol_needs_two_points() {
        assert!(realized_annualized_vol(&[0.01], 365.0).is_none());
        assert!(realized_annualized_vol(&[], 365.0).is_none());
    }

    #[test]
    fn leverage_hits_target_ratio() {
        let p = RiskParams {
            vol_target: 0.40,
            min_leverage: 0.1,
            max_leverage: 3.0,
            vol_lookback: 30,
        };
        assert!((vol_target_leverage(0.80, &p) - 0.5).abs() < 1e-12);
        assert!((vol_target_leverage(0.20, &p) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn leverage_clamped_both_sides() {
        let p = RiskParams::default();
        assert_eq!(vol_target_leverage(10.0, &p), p.min_leverage);
        assert_eq!(vol_target_leverage(0.0001, &p), p.max_leverage);
    }

    #[test]
    fn zero_vol_falls_back_to_max() {
        let p = RiskParams::default();
        assert_eq!(vol_target_leverage(0.0, &p), p.max_leverage);
    }

    // ── Drawdown taper ──

    #[test]
    fn below_soft_is_full_exposure() {
        let p = DrawdownParams::default();
        assert_eq!(drawdown_multiplier(0.0, &p), 1.0);
        assert_eq!(drawdown_multiplier(0.09, &p), 1.0);
    }

    #[test]
    fn at_hard_is_zero() {
        let p = DrawdownParams::default();
        assert_eq!(drawdown_multiplier(0.30, &p), 0.0);
        assert_eq!(drawdown_multiplier(0.50, &p), 0.0);
    }

    #[test]
    fn taper_is_monotone_decreasing() {
        let p = DrawdownParams::default();
        let mut prev = 1.0;
        for i in 0..20 {
            let dd = 0.10 + (0.20 * i as f64 / 20.0);
            let m = drawdown_multiplier(dd, &p);
            assert!(m <= prev + 1e-12, "taper not monotone at dd={dd}");
            assert!(m >= p.floor - 1e-12);
            prev = m;
        }
    }

    #[test]
    fn taper_approaches_floor_near_hard() {
        let p = DrawdownParams::default();
        let m = drawdown_multiplier(0.2999, &p);
        assert!((m - p.floor).abs() < 0.01, "got {m}");
    }

    // ── Regime grid ──

    #[test]
    fn disabled_grid_is_identity() {
        let g = RegimeExposureGrid::disabled();
        assert_eq!(g.lookup(TrendBucket::Down, VolBucket::High), 1.0);
    }

    #[test]
    fn pair_override_beats_defaults() {
        let g = RegimeExposureGrid {
            enabled: true,
            pair_overrides: vec![PairOverride {
                trend: TrendBucket::Down,
                vol: VolBucket::High,
                multiplier: 0.0,
            }],
            trend_defaults: vec![TrendDefault {
                trend: TrendBucket::Down,
                multiplier: 0.5,
            }],
            vol_defaults: vec![VolDefault {
                vol: VolBucket::High,
                multiplier: 0.7,
            }],
        };
        assert_eq!(g.lookup(TrendBucket::Down, VolBucket::High), 0.0);
        assert_eq!(g.lookup(TrendBucket::Down, VolBucket::Low), 0.5);
        assert_eq!(g.lookup(TrendBucket::Up, VolBucket::High), 0.7);
        assert_eq!(g.lookup(TrendBucket::Up, VolBucket::Normal), 1.0);
    }

    // ── Bucket classification ──

    #[test]
    fn trend_buckets_from_ma() {
        let params = BucketParams {
            trend_period: 3,
            trend_band: 0.01,
            ..Default::default()
        };
        assert_eq!(
            classify_trend(&[100.0, 100.0, 105.0], &params),
            TrendBucket::Up
        );
        assert_eq!(
            classify_trend(&[100.0, 100.0, 95.0], &params),
            TrendBucket::Down
        );
        assert_eq!(
            classify_trend(&[100.0, 100.0, 100.1], &params),
            TrendBucket::Side
        );
    }

    #[test]
    fn short_history_is_sideways() {
        let params = BucketParams::default();
        assert_eq!(classify_trend(&[100.0, 101.0], &params), TrendBucket::Side);
    }

    #[test]
    fn vol_buckets() {
        let params = BucketParams::default();
        assert_eq!(classify_vol(0.10, &params), VolBucket::Low);
        assert_eq!(classify_vol(0.50, &params), VolBucket::Normal);
        assert_eq!(classify_vol(1.50, &params), VolBucket::High);
    }
}
