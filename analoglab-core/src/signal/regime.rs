//! Regime detection and the guard chain that gates directional signals.
//!
//! Detection is a pure function of the closes up to the as-of instant:
//! moving-average trend (200-period SMA plus a short rising/falling lag) and
//! rolling-peak drawdowns over 90 and 120 periods. The guards are an ordered
//! list of pure rules folded over the candidate action; the first applicable
//! rule wins and later rules never re-enable a blocked signal.

use crate::domain::{PricePoint, RegimeLabel, RegimeMeta, SignalAction};

// ─── Detection constants ────────────────────────────────────────────────────

const SMA_PERIOD: usize = 200;
/// Bars between the two SMA samples used for the rising/falling test.
const SMA_SLOPE_LAG: usize = 10;
const CRASH_PEAK_PERIOD: usize = 90;
const CRASH_DD_THRESHOLD: f64 = 0.20;
const DD_DIAG_PERIOD: usize = 120;
const BUBBLE_EXT_RATIO: f64 = 2.6;

// ─── Detection ──────────────────────────────────────────────────────────────

/// Derive regime facts from the closes ending at the as-of bar.
///
/// With fewer than `SMA_PERIOD + SMA_SLOPE_LAG` bars the trend flags stay
/// false and only the drawdown diagnostics are populated; short history
/// degrades to "no regime" rather than guessing.
pub fn detect_regime(points: &[PricePoint]) -> RegimeMeta {
    let mut meta = RegimeMeta::default();
    let Some(last) = points.last() else {
        return meta;
    };
    let close = last.close;

    meta.dd120 = drawdown_from_peak(points, DD_DIAG_PERIOD);
    meta.crash_transition =
        drawdown_from_peak(points, CRASH_PEAK_PERIOD) >= CRASH_DD_THRESHOLD;

    if points.len() >= SMA_PERIOD + SMA_SLOPE_LAG {
        let sma_now = sma_ending_at(points, points.len(), SMA_PERIOD);
        let sma_then = sma_ending_at(points, points.len() - SMA_SLOPE_LAG, SMA_PERIOD);
        meta.over_ext = if sma_now > 0.0 { close / sma_now } else { 0.0 };
        meta.structural_bull = close > sma_now && sma_now > sma_then;
        meta.structural_bear = close < sma_now && sma_now < sma_then;
        meta.bubble = meta.over_ext >= BUBBLE_EXT_RATIO;
    }
    meta
}

/// Mean close of the `period` bars ending just before index `end`.
fn sma_ending_at(points: &[PricePoint], end: usize, period: usize) -> f64 {
    let start = end - period;
    points[start..end].iter().map(|p| p.close).sum::<f64>() / period as f64
}

/// Drawdown of the last close from the rolling peak over the trailing window.
fn drawdown_from_peak(points: &[PricePoint], period: usize) -> f64 {
    let Some(last) = points.last() else {
        return 0.0;
    };
    let start = points.len().saturating_sub(period);
    let peak = points[start..]
        .iter()
        .map(|p| p.close)
        .fold(f64::MIN, f64::max);
    if peak <= 0.0 {
        return 0.0;
    }
    ((peak - last.close) / peak).max(0.0)
}

// ─── Guard chain ────────────────────────────────────────────────────────────

/// One regime rule: when `applies`, block the listed actions.
struct Guard {
    label: RegimeLabel,
    applies: fn(&RegimeMeta) -> bool,
    blocks: &'static [SignalAction],
}

/// Fixed priority order. Structural-bull outranks bubble so a short blocked
/// in a healthy uptrend is labeled by the trend, not the overextension.
const GUARDS: &[Guard] = &[
    Guard {
        label: RegimeLabel::StructuralBull,
        applies: |m| m.structural_bull,
        blocks: &[SignalAction::Short],
    },
    Guard {
        label: RegimeLabel::Bubble,
        applies: |m| m.bubble,
        blocks: &[SignalAction::Long, SignalAction::Short],
    },
    Guard {
        label: RegimeLabel::CrashTransition,
        applies: |m| m.crash_transition,
        blocks: &[SignalAction::Long],
    },
    Guard {
        label: RegimeLabel::StructuralBear,
        applies: |m| m.structural_bear,
        blocks: &[SignalAction::Long],
    },
];

/// Result of folding the guard chain over a candidate action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub action: SignalAction,
    pub regime: RegimeLabel,
    /// `BLOCKED_BY_<REGIME>` when a guard neutralized the action.
    pub blocked_reason: Option<String>,
}

/// Apply the guard chain to a candidate action.
///
/// The returned regime is the first guard whose condition holds, whether or
/// not it blocked anything, so callers always see the detected state.
pub fn apply_guards(action: SignalAction, meta: &RegimeMeta) -> GuardOutcome {
    let mut out = GuardOutcome {
        action,
        regime: RegimeLabel::None,
        blocked_reason: None,
    };
    for guard in GUARDS {
        if !(guard.applies)(meta) {
            continue;
        }
        if out.regime == RegimeLabel::None {
            out.regime = guard.label;
        }
        if out.action != SignalAction::Neutral && guard.blocks.contains(&out.action) {
            out.action = SignalAction::Neutral;
            out.blocked_reason = Some(format!("BLOCKED_BY_{}", guard.label));
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(closes: &[f64]) -> Vec<PricePoint> {
        let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint {
                ts: start + Duration::days(i as i64),
                close: c,
                high: c * 1.01,
                low: c * 0.99,
                quality: 1.0,
            })
            .collect()
    }

    fn trending(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn short_history_has_no_trend_flags() {
        let meta = detect_regime(&series(&trending(100.0, 0.1, 50)));
        assert!(!meta.structural_bull && !meta.structural_bear && !meta.bubble);
    }

    #[test]
    fn rising_series_is_structural_bull() {
        let meta = detect_regime(&series(&trending(100.0, 0.5, 260)));
        assert!(meta.structural_bull);
        assert!(!meta.structural_bear);
        assert!(!meta.crash_transition);
    }

    #[test]
    fn falling_series_is_structural_bear() {
        let meta = detect_regime(&series(&trending(400.0, -0.5, 260)));
        assert!(meta.structural_bear);
        assert!(!meta.structural_bull);
    }

    #[test]
    fn crash_transition_from_rolling_peak() {
        let mut closes = trending(100.0, 0.0, 250);
        // 25% collapse inside the 90-period peak window.
        for (i, c) in closes.iter_mut().rev().take(10).enumerate() {
            *c = 100.0 - 2.5 * (10 - i) as f64;
        }
        let meta = detect_regime(&series(&closes));
        assert!(meta.crash_transition);
        assert!(meta.dd120 >= 0.20);
    }

    #[test]
    fn bubble_from_overextension() {
        let mut closes = trending(100.0, 0.0, 260);
        *closes.last_mut().unwrap() = 300.0; // 3x the flat SMA
        let meta = detect_regime(&series(&closes));
        assert!(meta.bubble);
        assert!(meta.over_ext > 2.6);
    }

    #[test]
    fn bull_blocks_short_only() {
        let meta = RegimeMeta {
            structural_bull: true,
            ..Default::default()
        };
        let short = apply_guards(SignalAction::Short, &meta);
        assert_eq!(short.action, SignalAction::Neutral);
        assert_eq!(short.regime, RegimeLabel::StructuralBull);
        assert_eq!(
            short.blocked_reason.as_deref(),
            Some("BLOCKED_BY_STRUCTURAL_BULL")
        );

        let long = apply_guards(SignalAction::Long, &meta);
        assert_eq!(long.action, SignalAction::Long);
        assert!(long.blocked_reason.is_none());
    }

    #[test]
    fn bear_blocks_long() {
        let meta = RegimeMeta {
            structural_bear: true,
            ..Default::default()
        };
        let out = apply_guards(SignalAction::Long, &meta);
        assert_eq!(out.action, SignalAction::Neutral);
        assert_eq!(out.regime, RegimeLabel::StructuralBear);
    }

    #[test]
    fn bubble_blocks_both_sides() {
        let meta = RegimeMeta {
            bubble: true,
            ..Default::default()
        };
        assert_eq!(
            apply_guards(SignalAction::Long, &meta).action,
            SignalAction::Neutral
        );
        assert_eq!(
            apply_guards(SignalAction::Short, &meta).action,
            SignalAction::Neutral
        );
    }

    #[test]
    fn first_applicable_rule_wins() {
        // Bull and bubble both hold: bull is checked first but does not block
        // LONG, so bubble then blocks it. The reported regime stays the first
        // applicable label.
        let meta = RegimeMeta {
            structural_bull: true,
            bubble: true,
            ..Default::default()
        };
        let out = apply_guards(SignalAction::Long, &meta);
        assert_eq!(out.action, SignalAction::Neutral);
        assert_eq!(out.regime, RegimeLabel::StructuralBull);
        assert_eq!(out.blocked_reason.as_deref(), Some("BLOCKED_BY_BUBBLE"));
    }

    #[test]
    fn neutral_passes_untouched() {
        let meta = RegimeMeta {
            structural_bear: true,
            ..Default::default()
        };
        let out = apply_guards(SignalAction::Neutral, &meta);
        assert_eq!(out.action, SignalAction::Neutral);
        assert!(out.blocked_reason.is_none());
        assert_eq!(out.regime, RegimeLabel::StructuralBear);
    }
}
