//! Confidence engine — evidence quality, bucket calibration, reliability.
//!
//! Three stages compose multiplicatively into one number in [0, 1]:
//! 1. `evidence_confidence`: sample size, dispersion, and consensus of the
//!    analog set, squashed through a temperature-scaled logistic so the raw
//!    weighted sum never saturates at 0/1.
//! 2. `blend_with_bucket`: Beta(2,2)-Binomial posterior of the empirical
//!    bucket win rate, pulled in with weight n/(n+k) so sparse buckets defer
//!    to the evidence score.
//! 3. `reliability_modifier`: a five-shelf step function. Deliberately
//!    non-smooth so small reliability noise cannot oscillate confidence.

use serde::{Deserialize, Serialize};

/// Tuning constants for the evidence score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceParams {
    /// Sample-size saturation constant: nScore = 1 - e^(-n/n0).
    pub n0: f64,
    /// Dispersion decay constant: dispScore = e^(-d/d0).
    pub d0: f64,
    pub weight_n: f64,
    pub weight_dispersion: f64,
    pub weight_consensus: f64,
    /// Logistic temperature; smaller is steeper.
    pub temperature: f64,
}

impl Default for ConfidenceParams {
    fn default() -> Self {
        Self {
            n0: 20.0,
            d0: 0.08,
            weight_n: 0.40,
            weight_dispersion: 0.30,
            weight_consensus: 0.30,
            temperature: 0.18,
        }
    }
}

/// Empirical win/loss tallies for one calibration bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BucketStats {
    pub n: u32,
    pub wins: u32,
}

pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Raw evidence quality from the matched analog set.
///
/// `effective_n` is the (possibly weighted) match count, `dispersion` the
/// spread of forward returns, `consensus` the fraction agreeing with the
/// median direction. Only above-majority consensus contributes.
pub fn evidence_confidence(
    effective_n: f64,
    dispersion: f64,
    consensus: f64,
    params: &ConfidenceParams,
) -> f64 {
    let n_score = 1.0 - (-effective_n.max(0.0) / params.n0).exp();
    let disp_score = (-dispersion.max(0.0) / params.d0).exp();
    let cons_score = clamp01((consensus - 0.5) / 0.5);

    let raw = params.weight_n * n_score
        + params.weight_dispersion * disp_score
        + params.weight_consensus * cons_score;

    logistic(raw, 0.5, params.temperature)
}

/// Blend raw evidence with the bucket's posterior win rate.
///
/// Posterior mean uses a Beta(2, 2) prior: (wins + 2) / (n + 4). The blend
/// weight n/(n+k) moves from the evidence (empty bucket) toward the observed
/// hit rate as the bucket fills.
pub fn blend_with_bucket(evidence: f64, bucket: &BucketStats, k_blend: f64) -> f64 {
    let n = f64::from(bucket.n);
    let posterior = (f64::from(bucket.wins) + 2.0) / (n + 4.0);
    let w = n / (n + k_blend.max(1e-9));
    clamp01(w * posterior + (1.0 - w) * evidence)
}

/// Five-shelf reliability modifier.
///
/// 1.00 / 0.85 / 0.65 / 0.45 / 0.25 at thresholds 0.85 / 0.70 / 0.55 / 0.40.
pub fn reliability_modifier(reliability: f64) -> f64 {
    if reliability >= 0.85 {
        1.00
    } else if reliability >= 0.70 {
        0.85
    } else if reliability >= 0.55 {
        0.65
    } else if reliability >= 0.40 {
        0.45
    } else {
        0.25
    }
}

/// Multiplicative composition: poor reliability caps confidence regardless
/// of how strong the calibrated evidence looks.
pub fn final_confidence(calibrated_evidence: f64, reliability: f64) -> f64 {
    clamp01(calibrated_evidence * reliability_modifier(reliability))
}

fn logistic(x: f64, center: f64, temperature: f64) -> f64 {
    1.0 / (1.0 + (-(x - center) / temperature).exp())
}
