//! Baseline drift — the asset's own expected return over the horizon.
//!
//! Subtracting this from the analog-set `mu` isolates signal-specific edge;
//! raw `mu` inherits the asset's long-run drift and overstates direction.

use crate::domain::{PricePoint, PriceSeries};

/// Mean log return per bar times `horizon_days`, expressed as a simple
/// fractional return so it is comparable to the matcher's forward returns.
///
/// `lookback_days = 0` means full history. Fewer than 2 usable bars yields
/// a 0.0 baseline; the builder still runs in absolute terms.
pub fn baseline_drift(points: &[PricePoint], horizon_days: u32, lookback_days: usize) -> f64 {
    let window = if lookback_days > 0 && points.len() > lookback_days {
        &points[points.len() - lookback_days..]
    } else {
        points
    };
    let rets = PriceSeries::log_returns(window);
    if rets.is_empty() {
        return 0.0;
    }
    let mean = rets.iter().sum::<f64>() / rets.len() as f64;
    (mean * horizon_days as f64).exp_m1()
}
