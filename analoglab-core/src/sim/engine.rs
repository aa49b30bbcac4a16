//! Backtest engine — walks a signal stream through one price window.
//!
//! The run is a strictly sequential loop: step N's decisions depend on step
//! N-1's realized position state, so nothing inside a run is parallel. Each
//! step applies open-position P&L, re-derives the risk-scaled target
//! exposure, asks the signal source for the as-of signal, and feeds the
//! lifecycle state machine. Costs are deducted on every transition.
//!
//! Config problems fail fast with `SimError`; a numeric failure mid-run
//! (non-finite equity) degrades to a zero-trade result with `max_drawdown =
//! 1.0` instead of propagating, so one broken fold cannot abort a rolling
//! validation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PricePoint, PriceSeries};
use crate::settings::SymbolSettings;
use crate::signal::SignalSource;
use crate::store::{PriceStore, StoreError};

use super::lifecycle::{apply, decide, PositionState, Side, StepObservation, Transition};
use super::report::{RegimeAttribution, RegimeReport};
use super::risk::{
    classify_trend, classify_vol, drawdown_multiplier, realized_annualized_vol,
    vol_target_leverage,
};
use super::stats::{RunStats, TradeRecord};

/// In-position steps a bucket needs before it can be flagged unprofitable.
const BAD_REGIME_MIN_STEPS: usize = 20;

/// One simulation run over a fixed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub symbol: String,
    pub timeframe: String,
    /// Inclusive window start; None = series start.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive window end; None = series end.
    pub end: Option<DateTime<Utc>>,
    pub periods_per_year: f64,
}

impl SimConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: "1d".into(),
            start: None,
            end: None,
            periods_per_year: 365.0,
        }
    }
}

/// Fail-fast errors raised before the step loop starts.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid simulation config: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything one run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub equity_curve: Vec<f64>,
    pub trades: Vec<TradeRecord>,
    pub stats: RunStats,
    pub regime_report: RegimeReport,
    pub warnings: Vec<String>,
}

impl BacktestResult {
    /// The degenerate result recorded for a mid-run failure.
    fn degenerate(symbol: &str, warning: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            equity_curve: Vec::new(),
            trades: Vec::new(),
            stats: RunStats::failed(),
            regime_report: RegimeReport::default(),
            warnings: vec![warning],
        }
    }
}

/// A round trip still open during the loop.
struct OpenTrade {
    side: Side,
    entry_index: usize,
    size: f64,
    gross_mult: f64,
    net_mult: f64,
    cost_paid: f64,
}

impl OpenTrade {
    fn open(side: Side, entry_index: usize, size: f64, entry_cost: f64) -> Self {
        Self {
            side,
            entry_index,
            size,
            gross_mult: 1.0,
            net_mult: 1.0 - entry_cost,
            cost_paid: entry_cost,
        }
    }

    fn accrue(&mut self, step_return: f64) {
        self.gross_mult *= 1.0 + step_return;
        self.net_mult *= 1.0 + step_return;
    }

    fn charge(&mut self, cost: f64) {
        self.net_mult *= 1.0 - cost;
        self.cost_paid += cost;
    }

    fn close(mut self, exit_index: usize, exit_cost: f64, exit_kind: &str) -> TradeRecord {
        self.charge(exit_cost);
        TradeRecord {
            side: self.side,
            entry_index: self.entry_index,
            exit_index,
            size: self.size,
            gross_return: self.gross_mult - 1.0,
            cost_paid: self.cost_paid,
            net_return: self.net_mult - 1.0,
            exit_kind: exit_kind.to_string(),
        }
    }
}

pub struct BacktestSimulator {
    store: Arc<dyn PriceStore>,
    settings: SymbolSettings,
}

impl BacktestSimulator {
    pub fn new(store: Arc<dyn PriceStore>, settings: SymbolSettings) -> Self {
        Self { store, settings }
    }

    /// Run one simulation. The signal source is queried once per step with
    /// the step's timestamp as the as-of cutoff; the call blocks before the
    /// loop advances since the next cutoff depends on this step.
    pub fn run(
        &self,
        config: &SimConfig,
        signals: &mut dyn SignalSource,
    ) -> Result<BacktestResult, SimError> {
        if config.periods_per_year <= 0.0 {
            return Err(SimError::Config(format!(
                "periods_per_year must be positive, got {}",
                config.periods_per_year
            )));
        }
        if let (Some(start), Some(end)) = (config.start, config.end) {
            if end <= start {
                return Err(SimError::Config(format!(
                    "window end {end} not after start {start}"
                )));
            }
        }

        let series = self
            .store
            .series_with_quality(&config.symbol, &config.timeframe)?;
        let window = restrict(&series, config.start, config.end);
        if window.len() < 2 {
            return Err(SimError::Config(format!(
                "window holds {} points, need at least 2",
                window.len()
            )));
        }

        Ok(self.step_loop(config, signals, window))
    }

    fn step_loop(
        &self,
        config: &SimConfig,
        signals: &mut dyn SignalSource,
        window: &[PricePoint],
    ) -> BacktestResult {
        let s = &self.settings;
        let closes: Vec<f64> = window.iter().map(|p| p.close).collect();
        let log_rets: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();

        let mut equity = 1.0_f64;
        let mut peak = equity;
        let mut equity_curve = vec![equity];
        let mut state = PositionState::Flat;
        let mut open_trade: Option<OpenTrade> = None;
        let mut trades: Vec<TradeRecord> = Vec::new();
        let mut cooldown_until = 0usize;
        let mut attribution = RegimeAttribution::new();
        let mut warnings: Vec<String> = Vec::new();

        let mut leverage_sum = 0.0;
        let mut leverage_steps = 0usize;
        let mut low_vol_flagged = false;

        for i in 1..window.len() {
            let step_return = closes[i] / closes[i - 1] - 1.0;

            // Realized vol over the trailing lookback; log_rets[j] covers the
            // step ending at j+1, so the slice below never looks past i.
            let lb_start = i.saturating_sub(s.risk.vol_lookback);
            let realized = realized_annualized_vol(&log_rets[lb_start..i], config.periods_per_year);
            let trend = classify_trend(&closes[..=i], &s.buckets);
            let vol_bucket = classify_vol(
                realized.unwrap_or((s.buckets.vol_low + s.buckets.vol_high) / 2.0),
                &s.buckets,
            );

            // P&L while the position is open, attributed to this step's
            // regime bucket.
            if let Some(trade) = open_trade.as_mut() {
                let gross = state.signed_exposure() * step_return;
                equity *= 1.0 + gross;
                trade.accrue(gross);
                attribution.record(trend, vol_bucket, gross);
            }

            if !equity.is_finite() {
                return BacktestResult::degenerate(
                    &config.symbol,
                    format!("NON_FINITE_EQUITY(step={i})"),
                );
            }
            if equity <= 0.0 {
                equity = 0.0;
                equity_curve.push(equity);
                if let Some(trade) = open_trade.take() {
                    trades.push(trade.close(i, 0.0, "EQUITY_WIPED"));
                }
                warnings.push(format!("EQUITY_WIPED(step={i})"));
                break;
            }

            peak = peak.max(equity);
            let drawdown = (peak - equity) / peak;

            let leverage = match realized {
                Some(v) => vol_target_leverage(v, &s.risk),
                None => 1.0,
            };
            if let Some(v) = realized {
                if v > 0.0 && v < 0.01 && !low_vol_flagged {
                    warnings.push(format!("LOW_VOL_ESTIMATE(step={i},vol={v:.6})"));
                    low_vol_flagged = true;
                }
            }
            let target_exposure = leverage
                * drawdown_multiplier(drawdown, &s.drawdown)
                * s.regime_grid.lookup(trend, vol_bucket);

            let signal = signals.signal(&config.symbol, window[i].ts);
            let obs = StepObservation {
                action: signal.action,
                confidence: signal.confidence,
                target_exposure,
                in_cooldown: i <= cooldown_until,
                hold_steps: state.entry_index().map_or(0, |e| i - e),
                flip_penalty: 2.0 * s.cost.round_trip_fraction(),
            };
            let transition = decide(&state, &obs, &s.lifecycle);

            match transition {
                Transition::Enter { side, size } => {
                    let cost = s.cost.half_turn_cost(size);
                    equity *= 1.0 - cost;
                    open_trade = Some(OpenTrade::open(side, i, size, cost));
                }
                Transition::Exit | Transition::ForceExitMaxHold => {
                    let cost = s.cost.half_turn_cost(state.size());
                    equity *= 1.0 - cost;
                    if let Some(trade) = open_trade.take() {
                        let kind = if transition == Transition::ForceExitMaxHold {
                            "FORCE_EXIT_MAXHOLD"
                        } else {
                            "EXIT"
                        };
                        trades.push(trade.close(i, cost, kind));
                    }
                    cooldown_until = i + s.lifecycle.cooldown_steps;
                }
                Transition::Flip { side, size } => {
                    // One combined round-trip charge, booked on the closing
                    // trade.
                    let cost = s.cost.flip_cost(state.size(), size);
                    equity *= 1.0 - cost;
                    if let Some(trade) = open_trade.take() {
                        trades.push(trade.close(i, cost, "FLIP"));
                    }
                    open_trade = Some(OpenTrade::open(side, i, size, 0.0));
                    cooldown_until = i + s.lifecycle.cooldown_steps;
                }
                Transition::Resize { size } => {
                    let cost = s.cost.resize_cost(state.size(), size);
                    equity *= 1.0 - cost;
                    if let Some(trade) = open_trade.as_mut() {
                        trade.charge(cost);
                    }
                }
                Transition::None => {}
            }

            state = apply(&state, &transition, i);
            if state.is_open() {
                leverage_sum += state.size();
                leverage_steps += 1;
            }
            equity_curve.push(equity);
        }

        // Anything still open is closed at the last bar.
        if let Some(trade) = open_trade.take() {
            let cost = s.cost.half_turn_cost(state.size());
            equity *= 1.0 - cost;
            trades.push(trade.close(window.len() - 1, cost, "END_OF_DATA"));
            if let Some(last) = equity_curve.last_mut() {
                *last = equity;
            }
        }

        if leverage_steps > 0 {
            let avg = leverage_sum / leverage_steps as f64;
            if avg > 0.9 * s.risk.max_leverage {
                warnings.push(format!("HIGH_AVG_LEVERAGE(avg={avg:.2})"));
            }
        }

        let stats = RunStats::compute(&equity_curve, &trades, config.periods_per_year);
        BacktestResult {
            symbol: config.symbol.clone(),
            equity_curve,
            trades,
            stats,
            regime_report: attribution.finalize(BAD_REGIME_MIN_STEPS),
            warnings,
        }
    }
}

/// Slice the series to the inclusive [start, end] window.
fn restrict<'a>(
    series: &'a PriceSeries,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> &'a [PricePoint] {
    let points = series.points();
    let lo = match start {
        Some(t) => points.partition_point(|p| p.ts < t),
        None => 0,
    };
    let hi = match end {
        Some(t) => points.partition_point(|p| p.ts <= t),
        None => points.len(),
    };
    &points[lo.min(hi)..hi]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PricePoint, Signal, SignalAction};
    use crate::settings::SymbolSettings;
    use crate::signal::ScriptedSignals;
    use crate::sim::cost::CostParams;
    use crate::sim::risk::RiskParams;
    use crate::store::InMemoryPriceStore;
    use chrono::{Duration, TimeZone};

    fn ts(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn store_with(closes: &[f64]) -> Arc<InMemoryPriceStore> {
        let points: Vec<PricePoint> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint {
                ts: ts(i as i64),
                close: c,
                high: c * 1.02,
                low: c * 0.98,
                quality: 1.0,
            })
            .collect();
        let store = InMemoryPriceStore::new();
        store.insert(PriceSeries::new("BTC", "1d", points).unwrap());
        Arc::new(store)
    }

    /// Settings that pin exposure to exactly 1.0: unit leverage bounds,
    /// drawdown taper effectively off, grid disabled, zero costs.
    fn unit_settings() -> SymbolSettings {
        let mut s = SymbolSettings::default();
        s.cost = CostParams::frictionless();
        s.risk = RiskParams {
            vol_target: 0.4,
            min_leverage: 1.0,
            max_leverage: 1.0,
            vol_lookback: 30,
        };
        s.drawdown.soft_threshold = 0.95;
        s.drawdown.hard_threshold = 0.99;
        s
    }

    fn scripted(actions: &[(SignalAction, f64)]) -> ScriptedSignals {
        ScriptedSignals::new(
            actions
                .iter()
                .map(|&(action, confidence)| {
                    let mut sig = Signal::neutral(ts(0), "scripted");
                    sig.action = action;
                    sig.confidence = confidence;
                    sig
                })
                .collect(),
        )
    }

    #[test]
    fn frictionless_enter_exit_yields_exactly_one_plus_r() {
        // Enter at step 1 (close 100), exit at step 4 (close 103).
        let store = store_with(&[100.0, 100.0, 102.0, 105.0, 103.0, 103.0, 103.0]);
        let sim = BacktestSimulator::new(store, unit_settings());
        let mut signals = scripted(&[
            (SignalAction::Long, 0.9),
            (SignalAction::Long, 0.9),
            (SignalAction::Long, 0.9),
            (SignalAction::Neutral, 0.0),
        ]);
        let result = sim.run(&SimConfig::new("BTC"), &mut signals).unwrap();

        let r = 103.0 / 100.0 - 1.0;
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_kind, "EXIT");
        assert_eq!(trade.entry_index, 1);
        assert_eq!(trade.exit_index, 4);
        assert!((trade.gross_return - r).abs() < 1e-12);
        assert!((trade.net_return - r).abs() < 1e-12);
        assert!((result.stats.final_equity - (1.0 + r)).abs() < 1e-12);
    }

    #[test]
    fn costs_deducted_on_both_sides() {
        let store = store_with(&[100.0, 100.0, 102.0, 105.0, 103.0, 103.0, 103.0]);
        let mut settings = unit_settings();
        settings.cost = CostParams::new(10.0, 0.0, 0.0); // 10 bps per side
        let sim = BacktestSimulator::new(store, settings);
        let mut signals = scripted(&[
            (SignalAction::Long, 0.9),
            (SignalAction::Long, 0.9),
            (SignalAction::Long, 0.9),
            (SignalAction::Neutral, 0.0),
        ]);
        let result = sim.run(&SimConfig::new("BTC"), &mut signals).unwrap();

        let c = 0.001;
        let expected = (1.0 - c) * (103.0 / 100.0) * (1.0 - c);
        assert!((result.stats.final_equity - expected).abs() < 1e-12);
        let trade = &result.trades[0];
        assert!((trade.cost_paid - 2.0 * c).abs() < 1e-12);
        assert!(trade.net_return < trade.gross_return);
    }

    #[test]
    fn max_hold_forces_exit() {
        let closes = vec![100.0; 20];
        let store = store_with(&closes);
        let mut settings = unit_settings();
        settings.lifecycle.max_hold = 5;
        let sim = BacktestSimulator::new(store, settings);
        // Permanently confident long signal.
        let mut signals = scripted(&vec![(SignalAction::Long, 0.9); 19]);
        let result = sim.run(&SimConfig::new("BTC"), &mut signals).unwrap();

        assert!(!result.trades.is_empty());
        assert_eq!(result.trades[0].exit_kind, "FORCE_EXIT_MAXHOLD");
        assert_eq!(result.trades[0].hold_steps(), 5);
    }

    #[test]
    fn hard_drawdown_kill_switch_exits_before_min_hold() {
        // Enter at step 1, then the price collapses 15% per bar.
        let closes = vec![100.0, 100.0, 85.0, 72.0, 61.0, 52.0, 52.0, 52.0];
        let store = store_with(&closes);
        let mut settings = unit_settings();
        settings.drawdown.soft_threshold = 0.10;
        settings.drawdown.hard_threshold = 0.20;
        settings.lifecycle.min_hold = 5;
        let sim = BacktestSimulator::new(store, settings);
        let mut signals = scripted(&vec![(SignalAction::Long, 0.9); 7]);
        let result = sim.run(&SimConfig::new("BTC"), &mut signals).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_kind, "EXIT");
        assert!(trade.hold_steps() < 5, "held {}", trade.hold_steps());
        assert!(result.stats.max_drawdown >= 0.20);
    }

    #[test]
    fn open_position_closed_at_end_of_data() {
        let store = store_with(&[100.0, 100.0, 101.0, 102.0, 103.0]);
        let sim = BacktestSimulator::new(store, unit_settings());
        let mut signals = scripted(&vec![(SignalAction::Long, 0.9); 4]);
        let result = sim.run(&SimConfig::new("BTC"), &mut signals).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_kind, "END_OF_DATA");
        assert!((result.stats.final_equity - 1.03).abs() < 1e-12);
    }

    #[test]
    fn cooldown_blocks_immediate_reentry() {
        let closes = vec![100.0; 12];
        let store = store_with(&closes);
        let mut settings = unit_settings();
        settings.lifecycle.min_hold = 1;
        settings.lifecycle.cooldown_steps = 3;
        let sim = BacktestSimulator::new(store, settings);
        // Long, then flat to exit, then long again straight away.
        let mut script = vec![(SignalAction::Long, 0.9), (SignalAction::Neutral, 0.0)];
        script.extend(vec![(SignalAction::Long, 0.9); 9]);
        let mut signals = scripted(&script);
        let result = sim.run(&SimConfig::new("BTC"), &mut signals).unwrap();

        assert!(result.trades.len() >= 2);
        let first = &result.trades[0];
        let second = &result.trades[1];
        assert_eq!(first.exit_index, 2);
        // Re-entry waits out the cooldown after the exit at step 2.
        assert!(second.entry_index > first.exit_index + 3);
    }

    #[test]
    fn window_restriction_by_timestamps() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let store = store_with(&closes);
        let sim = BacktestSimulator::new(store, unit_settings());
        let config = SimConfig {
            start: Some(ts(10)),
            end: Some(ts(20)),
            ..SimConfig::new("BTC")
        };
        let mut signals = scripted(&[]);
        let result = sim.run(&config, &mut signals).unwrap();
        // 11 bars in window: initial point plus 10 steps.
        assert_eq!(result.equity_curve.len(), 11);
        assert_eq!(result.trades.len(), 0);
    }

    #[test]
    fn bad_config_fails_fast() {
        let store = store_with(&[100.0, 101.0]);
        let sim = BacktestSimulator::new(store, unit_settings());
        let mut config = SimConfig::new("BTC");
        config.periods_per_year = 0.0;
        let err = sim.run(&config, &mut scripted(&[])).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));

        let mut config = SimConfig::new("BTC");
        config.start = Some(ts(5));
        config.end = Some(ts(5));
        let err = sim.run(&config, &mut scripted(&[])).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn unknown_symbol_is_store_error() {
        let store = store_with(&[100.0, 101.0, 102.0]);
        let sim = BacktestSimulator::new(store, unit_settings());
        let err = sim
            .run(&SimConfig::new("DOGE"), &mut scripted(&[]))
            .unwrap_err();
        assert!(matches!(err, SimError::Store(_)));
    }

    #[test]
    fn neutral_stream_never_trades() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let store = store_with(&closes);
        let sim = BacktestSimulator::new(store, unit_settings());
        let mut signals = scripted(&[]); // exhausted script = all neutral
        let result = sim.run(&SimConfig::new("BTC"), &mut signals).unwrap();
        assert_eq!(result.trades.len(), 0);
        assert_eq!(result.stats.final_equity, 1.0);
        assert_eq!(result.stats.max_drawdown, 0.0);
    }
}
