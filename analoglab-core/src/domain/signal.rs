//! Signal — the immutable directional output of one builder query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::regime::{RegimeLabel, RegimeMeta};

/// Directional action for one (symbol, as_of, horizon) query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Long,
    Short,
    #[default]
    Neutral,
}

impl SignalAction {
    /// +1 for long, -1 for short, 0 for neutral.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
            Self::Neutral => 0.0,
        }
    }
}

/// One directional signal, immutable once built.
///
/// `reason` is a human-readable audit string: either the decision summary,
/// `INSUFFICIENT_MATCHES(n<m)`, a `BLOCKED_BY_<REGIME>` overlay note, or
/// `ERROR(<message>)` when the builder degraded on an internal failure.
/// Callers must check `match_count` before trusting a degenerate signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    /// Coverage x stability, clamped to [0, 1].
    pub confidence: f64,
    /// Median forward return of the matched analog set.
    pub mu: f64,
    /// Baseline drift of the asset over the same horizon.
    pub baseline: f64,
    /// mu - baseline: the analog-specific edge.
    pub excess: f64,
    pub p10: f64,
    pub p90: f64,
    /// 95th-percentile forward drawdown proxy (p90 of max drawdown).
    pub dd95: f64,
    pub match_count: usize,
    pub regime: RegimeLabel,
    pub regime_meta: RegimeMeta,
    pub as_of: DateTime<Utc>,
    pub reason: String,
}

impl Signal {
    /// A flat signal carrying only a reason; used for every degraded path.
    pub fn neutral(as_of: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            action: SignalAction::Neutral,
            confidence: 0.0,
            mu: 0.0,
            baseline: 0.0,
            excess: 0.0,
            p10: 0.0,
            p90: 0.0,
            dd95: 0.0,
            match_count: 0,
            regime: RegimeLabel::None,
            regime_meta: RegimeMeta::default(),
            as_of,
            reason: reason.into(),
        }
    }

    pub fn is_directional(&self) -> bool {
        self.action != SignalAction::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn neutral_is_flagless() {
        let as_of = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let s = Signal::neutral(as_of, "ERROR(matcher down)");
        assert_eq!(s.action, SignalAction::Neutral);
        assert!(!s.is_directional());
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.match_count, 0);
        assert!(s.reason.contains("ERROR"));
    }

    #[test]
    fn action_signs() {
        assert_eq!(SignalAction::Long.sign(), 1.0);
        assert_eq!(SignalAction::Short.sign(), -1.0);
        assert_eq!(SignalAction::Neutral.sign(), 0.0);
    }

    #[test]
    fn action_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&SignalAction::Long).unwrap(),
            "\"LONG\""
        );
    }
}
