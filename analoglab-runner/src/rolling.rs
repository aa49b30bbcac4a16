//! Rolling walk-forward validation — sequential train/test folds plus a
//! five-gate verdict.
//!
//! Folds slide by `step_years`: train `[start, start+train_years)`, test
//! `[train_end, train_end+test_years)`, while the test window still fits
//! before `end_year`. Each fold backtests the test window only; the pattern
//! matcher may consult all history up to each in-window as-of, so train/test
//! separation rests on the as-of cutoff, never on physically hiding data.
//!
//! Folds are pure functions of (prices, config) and share no mutable state,
//! so they fan out across the rayon pool. Cancellation is cooperative and
//! checked at fold boundaries only; completed folds stay reportable.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use analoglab_core::settings::SymbolSettings;
use analoglab_core::signal::SignalSource;
use analoglab_core::sim::{BacktestSimulator, SimConfig};
use analoglab_core::store::PriceStore;

use crate::cancel::CancelToken;

// ─── Configuration ───────────────────────────────────────────────────

/// One rolling validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingConfig {
    pub symbol: String,
    pub timeframe: String,
    pub start_year: i32,
    pub end_year: i32,
    pub train_years: i32,
    pub test_years: i32,
    pub step_years: i32,
    pub periods_per_year: f64,
}

impl RollingConfig {
    pub fn new(symbol: impl Into<String>, start_year: i32, end_year: i32) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: "1d".into(),
            start_year,
            end_year,
            train_years: 3,
            test_years: 1,
            step_years: 1,
            periods_per_year: 365.0,
        }
    }

    /// Stable identifier for artifacts: blake3 of the serialized config.
    pub fn run_id(&self) -> String {
        let json = serde_json::to_string(self).expect("RollingConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// Pass/fail thresholds, immutable per run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GateCriteria {
    /// Per-fold pass: sharpe at or above this...
    pub fold_min_sharpe: f64,
    /// ...and max drawdown at or below this.
    pub fold_max_dd: f64,
    pub min_mean_sharpe: f64,
    pub min_worst_sharpe: f64,
    pub max_mean_dd: f64,
    pub min_pass_rate: f64,
    /// Minimum mean/std Sharpe stability; an unbounded stability (zero
    /// dispersion, positive mean) always passes.
    pub min_stability: f64,
}

impl Default for GateCriteria {
    fn default() -> Self {
        Self {
            fold_min_sharpe: 0.5,
            fold_max_dd: 0.35,
            min_mean_sharpe: 0.8,
            min_worst_sharpe: 0.0,
            max_mean_dd: 0.25,
            min_pass_rate: 0.6,
            min_stability: 1.0,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Date ranges of one fold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FoldSpec {
    pub fold_index: usize,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    /// Exclusive end of the test window.
    pub test_end: DateTime<Utc>,
}

/// Out-of-sample outcome of one fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_index: usize,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
    pub sharpe: f64,
    pub max_dd: f64,
    pub trades: usize,
    pub win_rate: f64,
    pub cagr: f64,
    pub final_equity: f64,
    pub passed: bool,
}

impl FoldResult {
    /// A fold whose simulation failed: recorded, never propagated.
    fn failed(spec: &FoldSpec) -> Self {
        Self {
            fold_index: spec.fold_index,
            train_start: spec.train_start,
            train_end: spec.train_end,
            test_start: spec.test_start,
            test_end: spec.test_end,
            sharpe: 0.0,
            max_dd: 1.0,
            trades: 0,
            win_rate: 0.0,
            cagr: 0.0,
            final_equity: 0.0,
            passed: false,
        }
    }
}

/// Aggregates over all completed folds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingSummary {
    pub mean_sharpe: f64,
    pub std_sharpe: f64,
    /// mean/std Sharpe; None when std is zero with a positive mean
    /// (unbounded stability).
    pub stability: Option<f64>,
    pub worst_sharpe: f64,
    pub best_sharpe: f64,
    pub mean_dd: f64,
    pub worst_dd: f64,
    pub pass_rate: f64,
    pub total_trades: usize,
    pub mean_trades: f64,
}

impl RollingSummary {
    pub fn from_folds(folds: &[FoldResult]) -> Self {
        let n = folds.len() as f64;
        if folds.is_empty() {
            return Self {
                mean_sharpe: 0.0,
                std_sharpe: 0.0,
                stability: Some(0.0),
                worst_sharpe: 0.0,
                best_sharpe: 0.0,
                mean_dd: 1.0,
                worst_dd: 1.0,
                pass_rate: 0.0,
                total_trades: 0,
                mean_trades: 0.0,
            };
        }

        let sharpes: Vec<f64> = folds.iter().map(|f| f.sharpe).collect();
        let mean_sharpe = sharpes.iter().sum::<f64>() / n;
        let var = sharpes
            .iter()
            .map(|s| (s - mean_sharpe).powi(2))
            .sum::<f64>()
            / n;
        let std_sharpe = var.sqrt();
        let stability = if std_sharpe < 1e-12 {
            if mean_sharpe > 0.0 {
                None
            } else {
                Some(0.0)
            }
        } else {
            Some(mean_sharpe / std_sharpe)
        };

        let total_trades: usize = folds.iter().map(|f| f.trades).sum();
        Self {
            mean_sharpe,
            std_sharpe,
            stability,
            worst_sharpe: sharpes.iter().copied().fold(f64::INFINITY, f64::min),
            best_sharpe: sharpes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean_dd: folds.iter().map(|f| f.max_dd).sum::<f64>() / n,
            worst_dd: folds.iter().map(|f| f.max_dd).fold(0.0, f64::max),
            pass_rate: folds.iter().filter(|f| f.passed).count() as f64 / n,
            total_trades,
            mean_trades: total_trades as f64 / n,
        }
    }
}

/// Verdict from the number of aggregate gates passed: 5 approved,
/// 4 marginal, 3 needs-work, otherwise rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    Marginal,
    NeedsWork,
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::Marginal => "marginal",
            Self::NeedsWork => "needs-work",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Everything one rolling validation produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingResult {
    pub run_id: String,
    pub config: RollingConfig,
    pub folds: Vec<FoldResult>,
    pub summary: RollingSummary,
    pub gates_passed: usize,
    pub verdict: Verdict,
    /// Always lists the failed checks with actual-vs-threshold values.
    pub message: String,
    /// True when cancellation skipped some folds; completed folds are
    /// still aggregated above.
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum RollingError {
    #[error(
        "no folds fit: years {start_year}..{end_year} cannot hold train {train_years}y + test {test_years}y"
    )]
    NoFolds {
        start_year: i32,
        end_year: i32,
        train_years: i32,
        test_years: i32,
    },

    #[error("invalid rolling config: {0}")]
    Config(String),
}

// ─── Fold generation ─────────────────────────────────────────────────

fn year_start(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
}

/// Sequential fold specs: train start slides by `step_years` while the test
/// window still ends at or before `end_year`.
pub fn generate_folds(config: &RollingConfig) -> Result<Vec<FoldSpec>, RollingError> {
    if config.train_years <= 0 || config.test_years <= 0 || config.step_years <= 0 {
        return Err(RollingError::Config(format!(
            "train/test/step years must be positive, got {}/{}/{}",
            config.train_years, config.test_years, config.step_years
        )));
    }

    let mut folds = Vec::new();
    let mut k = 0;
    loop {
        let train_start = config.start_year + k * config.step_years;
        let train_end = train_start + config.train_years;
        let test_end = train_end + config.test_years;
        if test_end > config.end_year {
            break;
        }
        folds.push(FoldSpec {
            fold_index: folds.len(),
            train_start: year_start(train_start),
            train_end: year_start(train_end),
            test_start: year_start(train_end),
            test_end: year_start(test_end),
        });
        k += 1;
    }

    if folds.is_empty() {
        return Err(RollingError::NoFolds {
            start_year: config.start_year,
            end_year: config.end_year,
            train_years: config.train_years,
            test_years: config.test_years,
        });
    }
    Ok(folds)
}

// ─── Gate evaluation ─────────────────────────────────────────────────

/// Count passing gates and describe the failures.
pub fn evaluate_gates(summary: &RollingSummary, gates: &GateCriteria) -> (usize, Verdict, String) {
    let mut failed: Vec<String> = Vec::new();

    if summary.mean_sharpe < gates.min_mean_sharpe {
        failed.push(format!(
            "mean_sharpe {:.2} < {:.2}",
            summary.mean_sharpe, gates.min_mean_sharpe
        ));
    }
    if summary.worst_sharpe < gates.min_worst_sharpe {
        failed.push(format!(
            "worst_sharpe {:.2} < {:.2}",
            summary.worst_sharpe, gates.min_worst_sharpe
        ));
    }
    if summary.mean_dd > gates.max_mean_dd {
        failed.push(format!(
            "mean_dd {:.2} > {:.2}",
            summary.mean_dd, gates.max_mean_dd
        ));
    }
    if summary.pass_rate < gates.min_pass_rate {
        failed.push(format!(
            "pass_rate {:.2} < {:.2}",
            summary.pass_rate, gates.min_pass_rate
        ));
    }
    // Unbounded stability (zero dispersion, positive mean) always passes.
    if let Some(stability) = summary.stability {
        if stability < gates.min_stability {
            failed.push(format!(
                "stability {:.2} < {:.2}",
                stability, gates.min_stability
            ));
        }
    }

    let passed = 5 - failed.len();
    let verdict = match passed {
        5 => Verdict::Approved,
        4 => Verdict::Marginal,
        3 => Verdict::NeedsWork,
        _ => Verdict::Rejected,
    };
    let message = if failed.is_empty() {
        "all gates passed (5/5)".to_string()
    } else {
        format!("failed: {}", failed.join("; "))
    };
    (passed, verdict, message)
}

// ─── Validator ───────────────────────────────────────────────────────

/// Builds a fresh signal source per fold so parallel folds never share one.
pub type SignalSourceFactory = Box<dyn Fn() -> Box<dyn SignalSource> + Send + Sync>;

pub struct RollingValidator {
    store: Arc<dyn PriceStore>,
    settings: SymbolSettings,
    signal_factory: SignalSourceFactory,
}

impl RollingValidator {
    pub fn new(
        store: Arc<dyn PriceStore>,
        settings: SymbolSettings,
        signal_factory: SignalSourceFactory,
    ) -> Self {
        Self {
            store,
            settings,
            signal_factory,
        }
    }

    /// Run every fold's backtest over its test window and aggregate.
    ///
    /// A fold whose simulation errors is recorded as a failed fold and the
    /// run continues. Cancellation is honored between folds; the partial
    /// result is aggregated from whatever completed.
    pub fn run_rolling_validation(
        &self,
        config: &RollingConfig,
        gates: &GateCriteria,
        cancel: Option<&CancelToken>,
    ) -> Result<RollingResult, RollingError> {
        let specs = generate_folds(config)?;
        let run_id = config.run_id();
        info!(run_id = %run_id, folds = specs.len(), symbol = %config.symbol, "rolling validation start");

        let outcomes: Vec<Option<FoldResult>> = specs
            .par_iter()
            .map(|spec| {
                if cancel.is_some_and(|c| c.is_cancelled()) {
                    return None;
                }
                Some(self.run_fold(config, gates, spec))
            })
            .collect();

        let cancelled = outcomes.iter().any(|o| o.is_none());
        let mut folds: Vec<FoldResult> = outcomes.into_iter().flatten().collect();
        folds.sort_by_key(|f| f.fold_index);

        let summary = RollingSummary::from_folds(&folds);
        let (gates_passed, verdict, message) = evaluate_gates(&summary, gates);
        info!(run_id = %run_id, %verdict, gates_passed, "rolling validation done");

        Ok(RollingResult {
            run_id,
            config: config.clone(),
            folds,
            summary,
            gates_passed,
            verdict,
            message,
            cancelled,
        })
    }

    fn run_fold(&self, config: &RollingConfig, gates: &GateCriteria, spec: &FoldSpec) -> FoldResult {
        let sim = BacktestSimulator::new(self.store.clone(), self.settings.clone());
        let sim_config = SimConfig {
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
            start: Some(spec.test_start),
            // The test window is half-open; the engine's end bound is
            // inclusive, so step back one bar.
            end: Some(spec.test_end - Duration::days(1)),
            periods_per_year: config.periods_per_year,
        };
        let mut signals = (self.signal_factory)();

        match sim.run(&sim_config, signals.as_mut()) {
            Ok(result) => {
                let s = &result.stats;
                let passed = s.sharpe >= gates.fold_min_sharpe && s.max_drawdown <= gates.fold_max_dd;
                debug!(
                    fold = spec.fold_index,
                    sharpe = s.sharpe,
                    max_dd = s.max_drawdown,
                    trades = s.trade_count,
                    passed,
                    "fold complete"
                );
                FoldResult {
                    fold_index: spec.fold_index,
                    train_start: spec.train_start,
                    train_end: spec.train_end,
                    test_start: spec.test_start,
                    test_end: spec.test_end,
                    sharpe: s.sharpe,
                    max_dd: s.max_drawdown,
                    trades: s.trade_count,
                    win_rate: s.win_rate,
                    cagr: s.cagr,
                    final_equity: s.final_equity,
                    passed,
                }
            }
            Err(e) => {
                warn!(fold = spec.fold_index, error = %e, "fold failed, recording degenerate result");
                FoldResult::failed(spec)
            }
        }
    }
}
