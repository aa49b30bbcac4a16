//! Export — JSON and CSV artifact generation for runs, folds, and sweeps.
//!
//! Three surfaces:
//! - **JSON**: full round-trip serialization of a backtest or rolling result
//! - **CSV**: trade tape, equity curve, fold table, and sweep scoreboard
//!   for external analysis tools
//! - **Artifact bundle**: one directory per run with the manifest plus CSVs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use analoglab_core::sim::{BacktestResult, TradeRecord};

use crate::rolling::{FoldResult, RollingResult};
use crate::sweep::SweepResult;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")
}

/// Serialize a `RollingResult` (folds, summary, verdict) to pretty JSON.
pub fn export_rolling_json(result: &RollingResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize RollingResult to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a trade list as CSV.
///
/// Columns: side, entry_index, exit_index, size, hold_steps, gross_return,
/// cost_paid, net_return, exit_kind
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "side",
        "entry_index",
        "exit_index",
        "size",
        "hold_steps",
        "gross_return",
        "cost_paid",
        "net_return",
        "exit_kind",
    ])?;

    for t in trades {
        wtr.write_record([
            &format!("{:?}", t.side),
            &t.entry_index.to_string(),
            &t.exit_index.to_string(),
            &format!("{:.4}", t.size),
            &t.hold_steps().to_string(),
            &format!("{:.6}", t.gross_return),
            &format!("{:.6}", t.cost_paid),
            &format!("{:.6}", t.net_return),
            &t.exit_kind,
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export an equity curve as CSV with step_index and equity columns.
pub fn export_equity_csv(equity_curve: &[f64]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["step_index", "equity"])?;
    for (i, eq) in equity_curve.iter().enumerate() {
        wtr.write_record([&i.to_string(), &format!("{:.6}", eq)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export rolling-validation folds as CSV, one row per fold.
pub fn export_folds_csv(folds: &[FoldResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "fold_index",
        "train_start",
        "train_end",
        "test_start",
        "test_end",
        "sharpe",
        "max_dd",
        "trades",
        "win_rate",
        "cagr",
        "final_equity",
        "passed",
    ])?;
    for f in folds {
        wtr.write_record([
            &f.fold_index.to_string(),
            &f.train_start.to_rfc3339(),
            &f.train_end.to_rfc3339(),
            &f.test_start.to_rfc3339(),
            &f.test_end.to_rfc3339(),
            &format!("{:.4}", f.sharpe),
            &format!("{:.4}", f.max_dd),
            &f.trades.to_string(),
            &format!("{:.4}", f.win_rate),
            &format!("{:.4}", f.cagr),
            &format!("{:.6}", f.final_equity),
            &f.passed.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a sweep scoreboard as CSV, one row per combo (caller's order).
pub fn export_sweep_csv(results: &[SweepResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "momentum",
        "min_similarity",
        "min_matches",
        "sharpe",
        "max_dd",
        "trades",
        "win_rate",
        "final_equity",
        "score",
        "passes",
    ])?;
    for r in results {
        wtr.write_record([
            &format!("{:.4}", r.momentum),
            &format!("{:.4}", r.min_similarity),
            &r.min_matches.to_string(),
            &format!("{:.4}", r.sharpe),
            &format!("{:.4}", r.max_dd),
            &r.trades.to_string(),
            &format!("{:.4}", r.win_rate),
            &format!("{:.6}", r.final_equity),
            &format!("{:.4}", r.score),
            &r.passes.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `{symbol}_{timestamp}/` under `output_dir` containing:
/// - `manifest.json` — the full `BacktestResult`
/// - `trades.csv` — the trade tape
/// - `equity.csv` — step-by-step equity curve
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        result.symbol,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_json(result)?)?;
    std::fs::write(run_dir.join("trades.csv"), export_trades_csv(&result.trades)?)?;
    std::fs::write(
        run_dir.join("equity.csv"),
        export_equity_csv(&result.equity_curve)?,
    )?;

    Ok(run_dir)
}

/// Save a rolling validation run: manifest plus the fold table.
///
/// The directory is named after the run id so re-runs of the same config
/// land in the same place.
pub fn save_rolling_artifacts(result: &RollingResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(format!("rolling_{}", &result.run_id[..16]));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_rolling_json(result)?)?;
    std::fs::write(run_dir.join("folds.csv"), export_folds_csv(&result.folds)?)?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}
