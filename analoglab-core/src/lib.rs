//! AnalogLab Core — signal construction, confidence calibration, divergence
//! scoring, and the backtest simulator.
//!
//! This crate contains the quantitative heart of the analog-signal system:
//! - Domain types (price series, signals, regime metadata)
//! - Pattern-matcher and price-store interfaces to the external collaborators
//! - Signal builder: analogs + baseline drift + regime guard chain
//! - Confidence engine: evidence, bucket calibration, reliability modifier
//! - Divergence scorer with tier-weighted grading
//! - Sequential backtest engine: costs, vol targeting, drawdown taper,
//!   regime exposure grid, explicit position lifecycle state machine
//!
//! Walk-forward validation and parameter sweeps live in `analoglab-runner`,
//! which fans simulations out across threads; everything here is explicitly
//! constructed and dependency-injected so concurrent runs share no state.

pub mod confidence;
pub mod divergence;
pub mod domain;
pub mod matcher;
pub mod settings;
pub mod signal;
pub mod sim;
pub mod store;
