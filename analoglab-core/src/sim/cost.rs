//! Transaction cost model — fee, slippage, and spread in basis points.
//!
//! One side of a trade pays `fee + slippage + spread` bps on the traded
//! notional; a round trip is twice that. ENTER and EXIT each charge half a
//! round trip, FLIP charges one combined full round trip (modeled as a
//! simultaneous exit+entry), RESIZE charges half a round trip on the
//! exposure delta only.

use serde::{Deserialize, Serialize};

/// Per-side cost components, in basis points of traded notional.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    pub fee_bps: f64,
    pub slippage_bps: f64,
    pub spread_bps: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            fee_bps: 8.0,
            slippage_bps: 5.0,
            spread_bps: 2.0,
        }
    }
}

impl CostParams {
    pub fn new(fee_bps: f64, slippage_bps: f64, spread_bps: f64) -> Self {
        Self {
            fee_bps,
            slippage_bps,
            spread_bps,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// One side of a trade as a fraction of traded notional.
    pub fn per_side_fraction(&self) -> f64 {
        (self.fee_bps + self.slippage_bps + self.spread_bps) / 10_000.0
    }

    /// Full round trip: 2 x (fee + slippage + spread).
    pub fn round_trip_fraction(&self) -> f64 {
        2.0 * self.per_side_fraction()
    }

    /// Equity fraction deducted for entering or exiting at `size` exposure.
    pub fn half_turn_cost(&self, size: f64) -> f64 {
        size.abs() * self.per_side_fraction()
    }

    /// Equity fraction deducted for a flip from `old_size` to `new_size`.
    ///
    /// One combined round-trip charge on the average exposure; see DESIGN.md
    /// for the accounting convention.
    pub fn flip_cost(&self, old_size: f64, new_size: f64) -> f64 {
        let traded = (old_size.abs() + new_size.abs()) / 2.0;
        traded * self.round_trip_fraction()
    }

    /// Equity fraction deducted for resizing in place.
    pub fn resize_cost(&self, old_size: f64, new_size: f64) -> f64 {
        (new_size - old_size).abs() * self.per_side_fraction()
    }
}
