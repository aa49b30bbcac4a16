//! Divergence scorer — how well a synthetic forecast tracked a replay path.
//!
//! Both paths are converted to percent returns from a shared base price,
//! truncated to the forecast horizon, and compared on six metrics. The
//! composite score is `100 - sum(weight * min(penalty, 100))` with
//! tier-specific weights: STRUCTURE judges long-horizon trend fidelity
//! (RMSE + increment correlation dominate), TIMING judges short-horizon
//! endpoint accuracy (terminal delta + directional agreement dominate).
//!
//! Degenerate inputs (fewer than 2 points, non-positive base price) return a
//! zero-sample "perfect" result instead of failing; callers must check
//! `sample_points` before trusting the score.

use serde::{Deserialize, Serialize};

/// Which aspect of the forecast is being graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastTier {
    Structure,
    Timing,
}

/// How the input paths are encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// Paths are price levels; returns are computed against `base_price`.
    #[default]
    Price,
    /// Paths are cumulative fractional returns relative to `base_price`.
    Return,
}

/// Letter grade derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            Self::A
        } else if score >= 70.0 {
            Self::B
        } else if score >= 55.0 {
            Self::C
        } else if score >= 40.0 {
            Self::D
        } else {
            Self::F
        }
    }
}

/// Qualitative flags raised from fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DivergenceFlag {
    PerfectMatch,
    HighDivergence,
    LowCorr,
    TermDrift,
    DirMismatch,
}

/// Full divergence result for one forecast/replay pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivergenceMetrics {
    /// Root mean squared error, percent points.
    pub rmse: f64,
    /// Mean absolute percentage error (epsilon-floored denominator).
    pub mape: f64,
    /// Largest pointwise deviation, percent points.
    pub max_abs_dev: f64,
    /// |forecast end - replay end|, percent points.
    pub terminal_delta: f64,
    /// Fraction of steps whose increment signs disagree.
    pub dir_mismatch_rate: f64,
    /// Pearson correlation of per-step increments.
    pub increment_corr: f64,
    pub score: f64,
    pub grade: Grade,
    pub flags: Vec<DivergenceFlag>,
    /// Points actually compared; 0 marks a degenerate result.
    pub sample_points: usize,
}

impl DivergenceMetrics {
    /// The zero-sample result used for degenerate inputs.
    fn degenerate() -> Self {
        Self {
            rmse: 0.0,
            mape: 0.0,
            max_abs_dev: 0.0,
            terminal_delta: 0.0,
            dir_mismatch_rate: 0.0,
            increment_corr: 1.0,
            score: 100.0,
            grade: Grade::A,
            flags: Vec::new(),
            sample_points: 0,
        }
    }
}

// Flag thresholds (percent points except the mismatch rate).
const PERFECT_RMSE: f64 = 0.05;
const PERFECT_TERMINAL: f64 = 0.05;
const HIGH_DIVERGENCE_SCORE: f64 = 40.0;
const LOW_CORR: f64 = 0.2;
const TERM_DRIFT: f64 = 5.0;
const DIR_MISMATCH_RATE: f64 = 0.5;

// MAPE denominator floor, percent points.
const MAPE_EPS: f64 = 0.5;

/// Score a synthetic forecast path against its replay path.
///
/// Paths are truncated to `horizon_days + 1` points and to the shorter of
/// the two; `tier` selects the penalty weighting.
pub fn calculate_divergence(
    synthetic: &[f64],
    replay: &[f64],
    base_price: f64,
    horizon_days: u32,
    tier: ForecastTier,
    mode: PathMode,
) -> DivergenceMetrics {
    let n = synthetic
        .len()
        .min(replay.len())
        .min(horizon_days as usize + 1);
    if n < 2 || base_price <= 0.0 {
        return DivergenceMetrics::degenerate();
    }

    let syn = to_pct_returns(&synthetic[..n], base_price, mode);
    let rep = to_pct_returns(&replay[..n], base_price, mode);

    let mut sq_sum = 0.0;
    let mut ape_sum = 0.0;
    let mut max_abs_dev = 0.0_f64;
    for i in 0..n {
        let dev = syn[i] - rep[i];
        sq_sum += dev * dev;
        ape_sum += dev.abs() / rep[i].abs().max(MAPE_EPS);
        max_abs_dev = max_abs_dev.max(dev.abs());
    }
    let rmse = (sq_sum / n as f64).sqrt();
    let mape = ape_sum / n as f64 * 100.0;
    let terminal_delta = (syn[n - 1] - rep[n - 1]).abs();

    let syn_inc = increments(&syn);
    let rep_inc = increments(&rep);
    let mismatches = syn_inc
        .iter()
        .zip(&rep_inc)
        .filter(|(s, r)| (**s >= 0.0) != (**r >= 0.0))
        .count();
    let dir_mismatch_rate = mismatches as f64 / syn_inc.len() as f64;

    // Identical paths have zero-variance increment pairs; by convention the
    // correlation of a path with itself is 1.
    let increment_corr = if rmse < 1e-9 {
        1.0
    } else {
        pearson(&syn_inc, &rep_inc).unwrap_or(0.0)
    };

    let penalties = Penalties {
        rmse: rmse * 10.0,
        mape,
        max_abs_dev: max_abs_dev * 5.0,
        terminal: terminal_delta * 10.0,
        direction: dir_mismatch_rate * 100.0,
        corr: (1.0 - increment_corr) * 50.0,
    };
    let score = (100.0 - penalties.weighted_sum(tier)).clamp(0.0, 100.0);

    let mut flags = Vec::new();
    if rmse < PERFECT_RMSE && terminal_delta < PERFECT_TERMINAL {
        // Short-circuits every other flag.
        flags.push(DivergenceFlag::PerfectMatch);
    } else {
        if score < HIGH_DIVERGENCE_SCORE {
            flags.push(DivergenceFlag::HighDivergence);
        }
        if increment_corr < LOW_CORR {
            flags.push(DivergenceFlag::LowCorr);
        }
        if terminal_delta > TERM_DRIFT {
            flags.push(DivergenceFlag::TermDrift);
        }
        if dir_mismatch_rate > DIR_MISMATCH_RATE {
            flags.push(DivergenceFlag::DirMismatch);
        }
    }

    DivergenceMetrics {
        rmse,
        mape,
        max_abs_dev,
        terminal_delta,
        dir_mismatch_rate,
        increment_corr,
        score,
        grade: Grade::from_score(score),
        flags,
        sample_points: n,
    }
}

struct Penalties {
    rmse: f64,
    mape: f64,
    max_abs_dev: f64,
    terminal: f64,
    direction: f64,
    corr: f64,
}

impl Penalties {
    fn weighted_sum(&self, tier: ForecastTier) -> f64 {
        // (rmse, corr, mape, max_dev, terminal, direction)
        let w = match tier {
            ForecastTier::Structure => [0.30, 0.30, 0.10, 0.10, 0.10, 0.10],
            ForecastTier::Timing => [0.15, 0.10, 0.05, 0.10, 0.30, 0.30],
        };
        w[0] * self.rmse.min(100.0)
            + w[1] * self.corr.min(100.0)
            + w[2] * self.mape.min(100.0)
            + w[3] * self.max_abs_dev.min(100.0)
            + w[4] * self.terminal.min(100.0)
            + w[5] * self.direction.min(100.0)
    }
}

fn to_pct_returns(path: &[f64], base_price: f64, mode: PathMode) -> Vec<f64> {
    match mode {
        PathMode::Price => path
            .iter()
            .map(|p| (p / base_price - 1.0) * 100.0)
            .collect(),
        PathMode::Return => path.iter().map(|r| r * 100.0).collect(),
    }
}

fn increments(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Pearson correlation; None when either side has (near-)zero variance.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a < 1e-18 || var_b < 1e-18 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}
