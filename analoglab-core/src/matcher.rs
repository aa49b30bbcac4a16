//! Pattern matcher interface — the external analog-search collaborator.
//!
//! The matcher is a black box: given a price window and an as-of cutoff it
//! returns the top-K most similar historical windows plus percentile
//! statistics of what happened after them. Implementations must be
//! deterministic for identical inputs and must never consult data past
//! `as_of`; everything downstream (signal building, walk-forward separation)
//! depends on that contract rather than on physically hidden history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How window similarity is measured by the matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMode {
    /// Pearson correlation of normalized returns.
    #[default]
    Correlation,
    /// Inverse euclidean distance on z-scored closes.
    Euclidean,
}

/// One query to the matcher, bounded to data at or before `as_of`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchQuery {
    pub symbol: String,
    pub timeframe: String,
    pub window_len: usize,
    pub top_k: usize,
    pub forward_horizon_days: u32,
    pub as_of: DateTime<Utc>,
    pub similarity_mode: SimilarityMode,
    pub include_series_used: bool,
}

/// One historical analog window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// Similarity in [0, 1]; higher is closer.
    pub score: f64,
}

/// Forward-return percentiles across the matched set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReturnPercentiles {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

/// Forward max-drawdown percentiles across the matched set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DrawdownPercentiles {
    pub p50: f64,
    pub p90: f64,
}

/// Aggregated forward statistics for the matched set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ForwardStats {
    pub ret: ReturnPercentiles,
    pub max_drawdown: DrawdownPercentiles,
}

/// Full matcher response for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub matches: Vec<MatchCandidate>,
    pub forward_stats: ForwardStats,
    /// Matcher-side estimate of how stable the analog set is, in [0, 1].
    pub stability_score: f64,
    /// Number of historical points the matcher consulted, when requested.
    pub series_used: Option<usize>,
}

/// Errors surfaced by matcher implementations.
///
/// The signal builder converts every variant into a NEUTRAL signal with an
/// `ERROR(...)` reason; these never cross further component boundaries.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("matcher lookup failed: {0}")]
    Lookup(String),

    #[error("window of {window_len} exceeds available history ({available})")]
    WindowTooLong { window_len: usize, available: usize },

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
}

/// The analog-search collaborator.
pub trait PatternMatcher: Send + Sync {
    fn find_matches(&self, query: &MatchQuery) -> Result<MatchResponse, MatcherError>;
}

/// A matcher that replays one canned response regardless of query.
///
/// Useful for dry runs and as a deterministic test double; the response's
/// candidate list is still filtered to `start_ts <= as_of` so the as-of
/// contract holds even with a careless fixture.
#[derive(Debug, Clone)]
pub struct FixedMatcher {
    response: MatchResponse,
}

impl FixedMatcher {
    pub fn new(response: MatchResponse) -> Self {
        Self { response }
    }
}

impl PatternMatcher for FixedMatcher {
    fn find_matches(&self, query: &MatchQuery) -> Result<MatchResponse, MatcherError> {
        let mut response = self.response.clone();
        response.matches.retain(|m| m.end_ts <= query.as_of);
        response.matches.truncate(query.top_k);
        Ok(response)
    }
}
