//! Backtest simulation: cost model, risk scaling, position lifecycle,
//! the sequential engine, and run statistics.

pub mod cost;
pub mod engine;
pub mod lifecycle;
pub mod report;
pub mod risk;
pub mod stats;

pub use cost::CostParams;
pub use engine::{BacktestResult, BacktestSimulator, SimConfig, SimError};
pub use lifecycle::{
    decide, LifecycleParams, PositionState, Side, StepObservation, Transition,
};
pub use report::{RegimeAttribution, RegimeBucketStats, RegimeReport};
pub use risk::{
    classify_trend, classify_vol, drawdown_multiplier, realized_annualized_vol,
    vol_target_leverage, BucketParams, DrawdownParams, PairOverride, RegimeExposureGrid,
    RiskParams, TrendBucket, TrendDefault, VolBucket, VolDefault,
};
pub use stats::{RunStats, TradeRecord};
