//! Signal source — the seam between the builder and the simulator.
//!
//! The simulator consumes signals one as-of instant at a time and blocks on
//! each lookup before advancing, since the next query's cutoff depends on
//! the current step. Abstracting the source lets folds run against the real
//! builder while tests drive the simulator with scripted streams.

use chrono::{DateTime, Utc};

use crate::domain::Signal;

use super::builder::SignalBuilder;

/// Per-step signal lookup for a simulation clock.
pub trait SignalSource: Send {
    fn signal(&mut self, symbol: &str, as_of: DateTime<Utc>) -> Signal;
}

/// The production source: one builder query per simulation step.
pub struct BuilderSignalSource {
    builder: SignalBuilder,
}

impl BuilderSignalSource {
    pub fn new(builder: SignalBuilder) -> Self {
        Self { builder }
    }
}

impl SignalSource for BuilderSignalSource {
    fn signal(&mut self, symbol: &str, as_of: DateTime<Utc>) -> Signal {
        self.builder.build(symbol, Some(as_of))
    }
}

/// A pre-scripted signal stream, consumed in order.
///
/// Each call pops the next entry; once the script runs out every further
/// step sees a NEUTRAL signal, which lets short scripts drive long windows.
pub struct ScriptedSignals {
    script: std::collections::VecDeque<Signal>,
}

impl ScriptedSignals {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            script: signals.into(),
        }
    }
}

impl SignalSource for ScriptedSignals {
    fn signal(&mut self, _symbol: &str, as_of: DateTime<Utc>) -> Signal {
        match self.script.pop_front() {
            Some(mut s) => {
                s.as_of = as_of;
                s
            }
            None => Signal::neutral(as_of, "SCRIPT_EXHAUSTED"),
        }
    }
}
