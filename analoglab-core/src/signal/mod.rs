//! Signal construction: baseline drift, regime guards, and the builder
//! that turns matcher output into directional signals.

pub mod baseline;
pub mod builder;
pub mod regime;
pub mod source;

pub use baseline::baseline_drift;
pub use builder::{SignalBuilder, SignalParams};
pub use regime::{apply_guards, detect_regime, GuardOutcome};
pub use source::{BuilderSignalSource, ScriptedSignals, SignalSource};
