//! Position lifecycle — an explicit per-instrument state machine.
//!
//! State is a tagged union `{Flat | Long | Short}` plus a cooldown timer
//! owned by the engine; `decide()` is a pure function of (state,
//! observation), so no mutable state escapes a simulation run and parallel
//! fold execution stays trivially safe.
//!
//! Transition precedence per step (highest first):
//! FORCE_EXIT_MAXHOLD -> EXIT -> FLIP -> ENTER -> RESIZE -> NONE.

use serde::{Deserialize, Serialize};

use crate::domain::SignalAction;

/// Open-position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// The side a directional signal asks for, None for neutral.
    pub fn from_action(action: SignalAction) -> Option<Self> {
        match action {
            SignalAction::Long => Some(Self::Long),
            SignalAction::Short => Some(Self::Short),
            SignalAction::Neutral => None,
        }
    }
}

/// Simulation-scoped position state. Reset per run; never shared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Long { entry_index: usize, size: f64 },
    Short { entry_index: usize, size: f64 },
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Flat)
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Self::Flat => None,
            Self::Long { .. } => Some(Side::Long),
            Self::Short { .. } => Some(Side::Short),
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            Self::Flat => 0.0,
            Self::Long { size, .. } | Self::Short { size, .. } => *size,
        }
    }

    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Self::Flat => None,
            Self::Long { entry_index, .. } | Self::Short { entry_index, .. } => Some(*entry_index),
        }
    }

    /// Signed exposure: positive long, negative short.
    pub fn signed_exposure(&self) -> f64 {
        self.side().map_or(0.0, |s| s.sign()) * self.size()
    }
}

/// Lifecycle thresholds, immutable per run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleParams {
    /// Steps a position must be held before EXIT/FLIP (kill switch excepted).
    pub min_hold: usize,
    /// Steps after which an exit is forced.
    pub max_hold: usize,
    /// Steps after an exit or flip during which no ENTER/FLIP may occur.
    pub cooldown_steps: usize,
    pub enter_threshold: f64,
    pub exit_threshold: f64,
    pub flip_threshold: f64,
    /// Minimum relative exposure change that triggers a RESIZE.
    pub resize_fraction: f64,
}

impl Default for LifecycleParams {
    fn default() -> Self {
        Self {
            min_hold: 3,
            max_hold: 45,
            cooldown_steps: 2,
            enter_threshold: 0.35,
            exit_threshold: 0.20,
            flip_threshold: 0.55,
            resize_fraction: 0.15,
        }
    }
}

/// Everything `decide()` may look at for one step.
#[derive(Debug, Clone, Copy)]
pub struct StepObservation {
    pub action: SignalAction,
    pub confidence: f64,
    /// Unsigned target exposure after risk scaling; 0.0 means the risk model
    /// forbids holding anything (hard-drawdown kill switch included).
    pub target_exposure: f64,
    pub in_cooldown: bool,
    pub hold_steps: usize,
    /// Confidence penalty applied to flips: 2 x round-trip cost fraction.
    pub flip_penalty: f64,
}

/// The action the engine must take this step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Transition {
    Enter { side: Side, size: f64 },
    Exit,
    Flip { side: Side, size: f64 },
    Resize { size: f64 },
    ForceExitMaxHold,
    None,
}

/// Pure transition decision. See module docs for the precedence order.
pub fn decide(state: &PositionState, obs: &StepObservation, params: &LifecycleParams) -> Transition {
    let desired = Side::from_action(obs.action);

    if state.is_open() {
        // 1. Forced exit on max hold.
        if obs.hold_steps >= params.max_hold {
            return Transition::ForceExitMaxHold;
        }

        // 2. Exit. The risk kill switch (target exposure 0) bypasses min
        //    hold; ordinary exits respect it.
        if obs.target_exposure <= 0.0 {
            return Transition::Exit;
        }
        if obs.hold_steps >= params.min_hold
            && (desired.is_none() || obs.confidence < params.exit_threshold)
        {
            return Transition::Exit;
        }

        // 3. Flip: opposite side wanted, out of cooldown, past min hold,
        //    and confidence still clears the bar after paying the penalty.
        if let Some(want) = desired {
            if Some(want) != state.side()
                && !obs.in_cooldown
                && obs.hold_steps >= params.min_hold
                && obs.confidence - obs.flip_penalty >= params.flip_threshold
            {
                return Transition::Flip {
                    side: want,
                    size: obs.target_exposure,
                };
            }

            // 5. Resize in place when the desired side is unchanged and the
            //    exposure gap is material.
            if Some(want) == state.side() {
                let current = state.size();
                if current > 0.0 {
                    let delta = (obs.target_exposure - current).abs() / current;
                    if delta >= params.resize_fraction {
                        return Transition::Resize {
                            size: obs.target_exposure,
                        };
                    }
                }
            }
        }
        return Transition::None;
    }

    // 4. Enter from flat.
    if let Some(want) = desired {
        if !obs.in_cooldown
            && obs.confidence >= params.enter_threshold
            && obs.target_exposure > 0.0
        {
            return Transition::Enter {
                side: want,
                size: obs.target_exposure,
            };
        }
    }
    Transition::None
}

/// Apply a transition, producing the next state.
pub fn apply(state: &PositionState, transition: &Transition, step: usize) -> PositionState {
    match *transition {
        Transition::None => *state,
        Transition::Exit | Transition::ForceExitMaxHold => PositionState::Flat,
        Transition::Enter { side, size } | Transition::Flip { side, size } => match side {
            Side::Long => PositionState::Long {
                entry_index: step,
                size,
            },
            Side::Short => PositionState::Short {
                entry_index: step,
                size,
            },
        },
        Transition::Resize { size } => match *state {
            PositionState::Long { entry_index, .. } => PositionState::Long { entry_index, size },
            PositionState::Short { entry_index, .. } => PositionState::Short { entry_index, size },
            PositionState::Flat => PositionState::Flat,
        },
    }
}
