//! Signal builder — matches + baseline drift into one directional signal.
//!
//! The builder queries the pattern matcher at the as-of cutoff, filters and
//! de-duplicates the analog set, compares the matched median forward return
//! against the asset's own drift, and folds the regime guard chain over the
//! candidate action. Every internal failure degrades to a NEUTRAL signal
//! with an `ERROR(...)` reason; this component never raises to its caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Signal, SignalAction};
use crate::matcher::{MatchCandidate, MatchQuery, MatcherError, PatternMatcher, SimilarityMode};
use crate::store::{PriceStore, StoreError};

use super::baseline::baseline_drift;
use super::regime::{apply_guards, detect_regime};

/// Thresholds controlling one signal query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParams {
    pub timeframe: String,
    pub window_len: usize,
    pub top_k: usize,
    pub min_similarity: f64,
    pub min_matches: usize,
    pub horizon_days: u32,
    /// Minimum days between kept analog end timestamps.
    pub min_gap_days: i64,
    /// Band for absolute mode (raw mu).
    pub neutral_band: f64,
    pub similarity_mode: SimilarityMode,
    /// Compare excess over baseline drift instead of raw mu.
    pub use_relative: bool,
    /// Band for relative mode (excess).
    pub relative_band: f64,
    /// Rolling window for the baseline; 0 = full history.
    pub baseline_lookback_days: usize,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            timeframe: "1d".into(),
            window_len: 30,
            top_k: 8,
            min_similarity: 0.75,
            min_matches: 4,
            horizon_days: 14,
            min_gap_days: 5,
            neutral_band: 0.01,
            similarity_mode: SimilarityMode::default(),
            use_relative: true,
            relative_band: 0.01,
            baseline_lookback_days: 0,
        }
    }
}

/// Internal failures; converted to NEUTRAL in `build` and never surfaced.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Matcher(#[from] MatcherError),

    #[error("empty price history for {0}")]
    EmptyHistory(String),
}

pub struct SignalBuilder {
    matcher: Arc<dyn PatternMatcher>,
    store: Arc<dyn PriceStore>,
    params: SignalParams,
}

impl SignalBuilder {
    pub fn new(
        matcher: Arc<dyn PatternMatcher>,
        store: Arc<dyn PriceStore>,
        params: SignalParams,
    ) -> Self {
        Self {
            matcher,
            store,
            params,
        }
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    /// Build one signal. `as_of = None` means the end of available history.
    ///
    /// Never fails: internal errors come back as NEUTRAL signals carrying
    /// `ERROR(<message>)` so a mid-simulation matcher hiccup cannot abort a
    /// run.
    pub fn build(&self, symbol: &str, as_of: Option<DateTime<Utc>>) -> Signal {
        match self.try_build(symbol, as_of) {
            Ok(signal) => signal,
            Err(e) => Signal::neutral(
                as_of.unwrap_or_else(Utc::now),
                format!("ERROR({e})"),
            ),
        }
    }

    fn try_build(&self, symbol: &str, as_of: Option<DateTime<Utc>>) -> Result<Signal, BuildError> {
        let p = &self.params;
        let series = self.store.series_with_quality(symbol, &p.timeframe)?;
        if series.is_empty() {
            return Err(BuildError::EmptyHistory(symbol.to_string()));
        }
        let as_of = as_of.unwrap_or_else(|| series.last_ts());

        let history = series.up_to(as_of);
        if history.len() < p.window_len {
            let mut s = Signal::neutral(
                as_of,
                format!("INSUFFICIENT_HISTORY({}<{})", history.len(), p.window_len),
            );
            s.regime_meta = detect_regime(history);
            return Ok(s);
        }

        let response = self.matcher.find_matches(&MatchQuery {
            symbol: symbol.to_string(),
            timeframe: p.timeframe.clone(),
            window_len: p.window_len,
            top_k: p.top_k,
            forward_horizon_days: p.horizon_days,
            as_of,
            similarity_mode: p.similarity_mode,
            include_series_used: false,
        })?;

        let kept = filter_candidates(
            &response.matches,
            as_of,
            p.min_similarity,
            p.min_gap_days,
            p.top_k,
        );
        if kept.len() < p.min_matches {
            let mut s = Signal::neutral(
                as_of,
                format!("INSUFFICIENT_MATCHES({}<{})", kept.len(), p.min_matches),
            );
            s.match_count = kept.len();
            s.regime_meta = detect_regime(history);
            return Ok(s);
        }

        let mu = response.forward_stats.ret.p50;
        let baseline = baseline_drift(history, p.horizon_days, p.baseline_lookback_days);
        let excess = mu - baseline;
        let (signal_value, band) = if p.use_relative {
            (excess, p.relative_band)
        } else {
            (mu, p.neutral_band)
        };

        let raw_action = if signal_value > band {
            SignalAction::Long
        } else if signal_value < -band {
            SignalAction::Short
        } else {
            SignalAction::Neutral
        };

        let meta = detect_regime(history);
        let outcome = apply_guards(raw_action, &meta);

        let coverage = kept.len() as f64 / p.top_k.max(1) as f64;
        let confidence = (coverage * response.stability_score).clamp(0.0, 1.0);

        let reason = match outcome.blocked_reason {
            Some(blocked) => blocked,
            None => format!(
                "value={signal_value:.4} band={band:.4} matches={}",
                kept.len()
            ),
        };

        Ok(Signal {
            action: outcome.action,
            confidence,
            mu,
            baseline,
            excess,
            p10: response.forward_stats.ret.p10,
            p90: response.forward_stats.ret.p90,
            dd95: response.forward_stats.max_drawdown.p90,
            match_count: kept.len(),
            regime: outcome.regime,
            regime_meta: meta,
            as_of,
            reason,
        })
    }
}

/// As-of cutoff, similarity floor, greedy time-gap de-duplication, top-K cap.
///
/// The cutoff is re-enforced here even though the matcher contract already
/// requires it: an analog ending past `as_of` is impossible evidence and is
/// dropped regardless of what the matcher returned. Remaining candidates are
/// ranked by score; a candidate is dropped when its end timestamp lands
/// within `min_gap_days` of an already-kept analog, so one historical
/// episode cannot dominate the set via overlapping windows.
fn filter_candidates(
    matches: &[MatchCandidate],
    as_of: DateTime<Utc>,
    min_similarity: f64,
    min_gap_days: i64,
    top_k: usize,
) -> Vec<MatchCandidate> {
    let mut ranked: Vec<MatchCandidate> = matches
        .iter()
        .filter(|m| m.end_ts <= as_of && m.score >= min_similarity)
        .copied()
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let gap = Duration::days(min_gap_days);
    let mut kept: Vec<MatchCandidate> = Vec::new();
    for cand in ranked {
        if kept.len() >= top_k {
            break;
        }
        let clashes = kept
            .iter()
            .any(|k| (cand.end_ts - k.end_ts).abs() < gap);
        if !clashes {
            kept.push(cand);
        }
    }
    kept
}
