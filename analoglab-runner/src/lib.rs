//! AnalogLab Runner — validation and tuning on top of `analoglab-core`.
//!
//! This crate builds on `analoglab-core` to provide:
//! - Rolling walk-forward validation with a five-gate verdict
//! - Parameter sweeps over the momentum / similarity / min-matches grid
//! - Cooperative cancellation for long runs
//! - JSON and CSV artifact export

pub mod cancel;
pub mod export;
pub mod rolling;
pub mod sweep;

pub use cancel::CancelToken;
pub use export::{
    export_equity_csv, export_folds_csv, export_json, export_rolling_json, export_sweep_csv,
    export_trades_csv, import_json, load_artifacts, save_artifacts, save_rolling_artifacts,
};
pub use rolling::{
    evaluate_gates, generate_folds, FoldResult, FoldSpec, GateCriteria, RollingConfig,
    RollingError, RollingResult, RollingSummary, RollingValidator, SignalSourceFactory, Verdict,
};
pub use sweep::{
    MomentumSurfacePoint, ParamSignalFactory, ParameterSweeper, SignalSweepSummary, SweepCriteria,
    SweepError, SweepGrid, SweepResult,
};
