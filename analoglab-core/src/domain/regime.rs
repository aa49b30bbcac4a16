//! Regime metadata — qualitative market state derived from the price series.

use serde::{Deserialize, Serialize};

/// Which regime guard (if any) gated a signal.
///
/// Serialized SCREAMING_SNAKE_CASE so downstream JSON consumers see the same
/// labels the reason strings carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeLabel {
    #[default]
    None,
    StructuralBull,
    StructuralBear,
    CrashTransition,
    Bubble,
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::StructuralBull => "STRUCTURAL_BULL",
            Self::StructuralBear => "STRUCTURAL_BEAR",
            Self::CrashTransition => "CRASH_TRANSITION",
            Self::Bubble => "BUBBLE",
        };
        f.write_str(s)
    }
}

/// Regime facts at a single as-of instant, derived purely from prices.
///
/// `dd120` and `over_ext` are carried as continuous diagnostics alongside the
/// boolean flags so downstream reports can bucket on severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeMeta {
    /// Price below a falling 200-period moving average.
    pub structural_bear: bool,
    /// Price above a rising 200-period moving average.
    pub structural_bull: bool,
    /// Drawdown >= 20% from the 90-period rolling peak.
    pub crash_transition: bool,
    /// Drawdown from the 120-period rolling peak (fraction, >= 0).
    pub dd120: f64,
    /// Price >= 2.6x the 200-period moving average.
    pub bubble: bool,
    /// Price / SMA200 ratio (overextension diagnostic).
    pub over_ext: f64,
}
