//! Run statistics — pure functions over the equity curve and trade list.
//!
//! Drawdowns are reported as positive fractions (0.15 = 15% off peak) so
//! gate comparisons read `max_dd <= threshold`.

use serde::{Deserialize, Serialize};

use super::lifecycle::Side;

/// One closed round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,
    pub entry_index: usize,
    pub exit_index: usize,
    /// Exposure at entry (leverage multiple).
    pub size: f64,
    /// Equity multiple over the trade before costs, minus one.
    pub gross_return: f64,
    /// Total cost fraction paid over the trade (entry+exit+resizes).
    pub cost_paid: f64,
    /// Equity multiple after costs, minus one.
    pub net_return: f64,
    /// Why the position closed (EXIT, FLIP, FORCE_EXIT_MAXHOLD, END_OF_DATA).
    pub exit_kind: String,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_return > 0.0
    }

    pub fn hold_steps(&self) -> usize {
        self.exit_index.saturating_sub(self.entry_index)
    }
}

/// Aggregate statistics of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub final_equity: f64,
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub avg_trade_return: f64,
    pub trade_count: usize,
}

impl RunStats {
    pub fn compute(equity_curve: &[f64], trades: &[TradeRecord], periods_per_year: f64) -> Self {
        Self {
            final_equity: equity_curve.last().copied().unwrap_or(1.0),
            total_return: total_return(equity_curve),
            cagr: cagr(equity_curve, periods_per_year),
            sharpe: sharpe_ratio(equity_curve, periods_per_year),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(trades),
            avg_trade_return: avg_trade_return(trades),
            trade_count: trades.len(),
        }
    }

    /// The degenerate stats recorded when a run fails mid-simulation:
    /// zero trades, full drawdown.
    pub fn failed() -> Self {
        Self {
            final_equity: 0.0,
            total_return: -1.0,
            cagr: 0.0,
            sharpe: 0.0,
            max_drawdown: 1.0,
            win_rate: 0.0,
            avg_trade_return: 0.0,
            trade_count: 0,
        }
    }
}

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let initial = equity_curve[0];
    if initial <= 0.0 {
        return 0.0;
    }
    (equity_curve[equity_curve.len() - 1] - initial) / initial
}

/// Compound annual growth rate. Returns 0.0 for degenerate curves.
pub fn cagr(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    if equity_curve.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let initial = equity_curve[0];
    let final_eq = equity_curve[equity_curve.len() - 1];
    if initial <= 0.0 || final_eq <= 0.0 {
        return 0.0;
    }
    let years = (equity_curve.len() - 1) as f64 / periods_per_year;
    if years <= 0.0 {
        return 0.0;
    }
    (final_eq / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio of per-step returns (zero risk-free rate).
/// Returns 0.0 when variance is zero or fewer than 3 points exist.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = step_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean(&returns);
    let sd = std_dev(&returns);
    if sd < 1e-15 {
        return 0.0;
    }
    (mean / sd) * periods_per_year.sqrt()
}

/// Maximum drawdown as a positive fraction of the running peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (peak - eq) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Fraction of trades with positive net return.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Mean net return per trade.
pub fn avg_trade_return(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.net_return).sum::<f64>() / trades.len() as f64
}

/// Per-step simple returns of an equity curve.
pub fn step_returns(equity_curve: &[f64]) -> Vec<f64> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
