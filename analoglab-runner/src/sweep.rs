//! Parameter sweep over the signal knobs that matter most in practice:
//! momentum band, similarity floor, and the minimum analog count.
//!
//! Every grid point backtests the same fixed window with everything else
//! pinned, so differences in the scoreboard are attributable to the three
//! swept knobs alone. Combos run on the rayon pool; cancellation is checked
//! at combo boundaries.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use analoglab_core::settings::SymbolSettings;
use analoglab_core::signal::{SignalParams, SignalSource};
use analoglab_core::sim::{BacktestSimulator, SimConfig};
use analoglab_core::store::PriceStore;

use crate::cancel::CancelToken;

// ─── Grid and criteria ───────────────────────────────────────────────

/// Candidate values for each swept knob. The sweep runs the full cartesian
/// product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepGrid {
    /// Relative-band widths (excess-return threshold vs baseline drift).
    pub momentum_candidates: Vec<f64>,
    /// Similarity floors for analog admission.
    pub similarity_candidates: Vec<f64>,
    /// Minimum surviving analogs before a directional call is allowed.
    pub min_matches_candidates: Vec<usize>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            momentum_candidates: vec![0.005, 0.01, 0.02, 0.03],
            similarity_candidates: vec![0.70, 0.75, 0.80, 0.85],
            min_matches_candidates: vec![3, 4, 5],
        }
    }
}

impl SweepGrid {
    pub fn total_configs(&self) -> usize {
        self.momentum_candidates.len()
            * self.similarity_candidates.len()
            * self.min_matches_candidates.len()
    }
}

/// Minimum bar a combo must clear to be considered usable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepCriteria {
    pub min_trades: usize,
    pub min_sharpe: f64,
    pub max_dd: f64,
}

impl Default for SweepCriteria {
    fn default() -> Self {
        Self {
            min_trades: 5,
            min_sharpe: 0.5,
            max_dd: 0.30,
        }
    }
}

// ─── Results ─────────────────────────────────────────────────────────

/// Outcome of one grid point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub momentum: f64,
    pub min_similarity: f64,
    pub min_matches: usize,
    pub sharpe: f64,
    pub max_dd: f64,
    pub trades: usize,
    pub win_rate: f64,
    pub final_equity: f64,
    /// sharpe − 0.5·max_dd + 0.01·min(trades, 20): risk-adjusted with a
    /// small, capped bonus for producing enough trades to trust.
    pub score: f64,
    pub passes: bool,
}

impl SweepResult {
    fn score_of(sharpe: f64, max_dd: f64, trades: usize) -> f64 {
        sharpe - 0.5 * max_dd + 0.01 * trades.min(20) as f64
    }
}

/// Average outcome at one momentum value across all other knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumSurfacePoint {
    pub momentum: f64,
    pub avg_trades: f64,
    pub avg_sharpe: f64,
}

/// Full sweep output: scoreboard plus the momentum surface for eyeballing
/// where the trade-count cliff sits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSweepSummary {
    /// blake3 of (window, base params, grid); stable across re-runs.
    pub run_id: String,
    pub total_configs: usize,
    /// All completed combos, best score first.
    pub results: Vec<SweepResult>,
    /// Best passing combo, or the overall best when nothing passes.
    pub best: Option<SweepResult>,
    pub momentum_surface: Vec<MomentumSurfacePoint>,
    pub sweet_spot: String,
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("empty sweep grid: every candidate list needs at least one value")]
    EmptyGrid,
}

// ─── Sweeper ─────────────────────────────────────────────────────────

/// Builds a signal source for one combo's parameters. Each parallel combo
/// gets its own source.
pub type ParamSignalFactory = Box<dyn Fn(&SignalParams) -> Box<dyn SignalSource> + Send + Sync>;

pub struct ParameterSweeper {
    store: Arc<dyn PriceStore>,
    settings: SymbolSettings,
    signal_factory: ParamSignalFactory,
}

impl ParameterSweeper {
    pub fn new(
        store: Arc<dyn PriceStore>,
        settings: SymbolSettings,
        signal_factory: ParamSignalFactory,
    ) -> Self {
        Self {
            store,
            settings,
            signal_factory,
        }
    }

    /// Backtest every grid point over the same window and rank by score.
    ///
    /// A combo whose simulation errors is recorded with degenerate numbers
    /// and the sweep continues.
    pub fn run_sweep(
        &self,
        sim_config: &SimConfig,
        base_params: &SignalParams,
        grid: &SweepGrid,
        criteria: &SweepCriteria,
        cancel: Option<&CancelToken>,
    ) -> Result<SignalSweepSummary, SweepError> {
        let combos = expand_grid(grid)?;
        let run_id = sweep_run_id(sim_config, base_params, grid);
        info!(
            run_id = %run_id,
            symbol = %sim_config.symbol,
            total = combos.len(),
            "parameter sweep start"
        );

        let outcomes: Vec<Option<SweepResult>> = combos
            .par_iter()
            .map(|&(momentum, similarity, min_matches)| {
                if cancel.is_some_and(|c| c.is_cancelled()) {
                    return None;
                }
                Some(self.run_combo(sim_config, base_params, criteria, momentum, similarity, min_matches))
            })
            .collect();

        let cancelled = outcomes.iter().any(|o| o.is_none());
        let mut results: Vec<SweepResult> = outcomes.into_iter().flatten().collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        let best = results
            .iter()
            .find(|r| r.passes)
            .or_else(|| results.first())
            .cloned();
        let momentum_surface = momentum_surface(&grid.momentum_candidates, &results);
        let sweet_spot = describe_sweet_spot(best.as_ref());
        info!(combos = results.len(), cancelled, "parameter sweep done");

        Ok(SignalSweepSummary {
            run_id,
            total_configs: grid.total_configs(),
            results,
            best,
            momentum_surface,
            sweet_spot,
            cancelled,
        })
    }

    fn run_combo(
        &self,
        sim_config: &SimConfig,
        base_params: &SignalParams,
        criteria: &SweepCriteria,
        momentum: f64,
        similarity: f64,
        min_matches: usize,
    ) -> SweepResult {
        let mut params = base_params.clone();
        params.relative_band = momentum;
        params.min_similarity = similarity;
        params.min_matches = min_matches;

        let sim = BacktestSimulator::new(self.store.clone(), self.settings.clone());
        let mut signals = (self.signal_factory)(&params);

        match sim.run(sim_config, signals.as_mut()) {
            Ok(result) => {
                let s = &result.stats;
                let passes = s.trade_count >= criteria.min_trades
                    && s.sharpe >= criteria.min_sharpe
                    && s.max_drawdown <= criteria.max_dd;
                debug!(
                    momentum,
                    similarity,
                    min_matches,
                    sharpe = s.sharpe,
                    trades = s.trade_count,
                    passes,
                    "combo complete"
                );
                SweepResult {
                    momentum,
                    min_similarity: similarity,
                    min_matches,
                    sharpe: s.sharpe,
                    max_dd: s.max_drawdown,
                    trades: s.trade_count,
                    win_rate: s.win_rate,
                    final_equity: s.final_equity,
                    score: SweepResult::score_of(s.sharpe, s.max_drawdown, s.trade_count),
                    passes,
                }
            }
            Err(e) => {
                warn!(momentum, similarity, min_matches, error = %e, "combo failed");
                SweepResult {
                    momentum,
                    min_similarity: similarity,
                    min_matches,
                    sharpe: 0.0,
                    max_dd: 1.0,
                    trades: 0,
                    win_rate: 0.0,
                    final_equity: 0.0,
                    score: SweepResult::score_of(0.0, 1.0, 0),
                    passes: false,
                }
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Stable identifier for artifacts: blake3 of the serialized sweep inputs.
fn sweep_run_id(sim_config: &SimConfig, base_params: &SignalParams, grid: &SweepGrid) -> String {
    let json = serde_json::to_string(&(sim_config, base_params, grid))
        .expect("sweep input serialization failed");
    blake3::hash(json.as_bytes()).to_hex().to_string()
}

fn expand_grid(grid: &SweepGrid) -> Result<Vec<(f64, f64, usize)>, SweepError> {
    if grid.total_configs() == 0 {
        return Err(SweepError::EmptyGrid);
    }
    let mut combos = Vec::with_capacity(grid.total_configs());
    for &momentum in &grid.momentum_candidates {
        for &similarity in &grid.similarity_candidates {
            for &min_matches in &grid.min_matches_candidates {
                combos.push((momentum, similarity, min_matches));
            }
        }
    }
    Ok(combos)
}

fn momentum_surface(candidates: &[f64], results: &[SweepResult]) -> Vec<MomentumSurfacePoint> {
    candidates
        .iter()
        .map(|&momentum| {
            let rows: Vec<&SweepResult> = results
                .iter()
                .filter(|r| r.momentum == momentum)
                .collect();
            let n = rows.len().max(1) as f64;
            MomentumSurfacePoint {
                momentum,
                avg_trades: rows.iter().map(|r| r.trades as f64).sum::<f64>() / n,
                avg_sharpe: rows.iter().map(|r| r.sharpe).sum::<f64>() / n,
            }
        })
        .collect()
}

fn describe_sweet_spot(best: Option<&SweepResult>) -> String {
    let Some(best) = best else {
        return "no combos completed".to_string();
    };
    let placement = format!(
        "momentum {:.3}, similarity {:.2}, min_matches {}: sharpe {:.2}, max_dd {:.2}, {} trades",
        best.momentum, best.min_similarity, best.min_matches, best.sharpe, best.max_dd, best.trades
    );
    if best.passes {
        placement
    } else {
        format!("no combo met the criteria; nearest miss at {placement}")
    }
}
