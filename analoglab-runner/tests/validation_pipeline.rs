//! End-to-end validation runs: real signal builder, real simulator,
//! deterministic store and matcher.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use analoglab_core::domain::{PricePoint, PriceSeries};
use analoglab_core::matcher::{
    DrawdownPercentiles, FixedMatcher, ForwardStats, MatchCandidate, MatchResponse,
    ReturnPercentiles,
};
use analoglab_core::settings::SymbolSettings;
use analoglab_core::signal::{BuilderSignalSource, SignalBuilder, SignalParams};
use analoglab_core::sim::SimConfig;
use analoglab_core::store::{InMemoryPriceStore, PriceStore};
use analoglab_runner::{
    GateCriteria, ParameterSweeper, RollingConfig, RollingValidator, SweepCriteria, SweepGrid,
    Verdict,
};

fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Ten years of flat daily closes starting 2015-01-01.
fn flat_store() -> Arc<dyn PriceStore> {
    let start = day(2015, 1, 1);
    let points: Vec<PricePoint> = (0..(10 * 365))
        .map(|i| PricePoint {
            ts: start + Duration::days(i),
            close: 100.0,
            high: 101.0,
            low: 99.0,
            quality: 1.0,
        })
        .collect();
    let store = InMemoryPriceStore::new();
    store.insert(PriceSeries::new("BTC", "1d", points).unwrap());
    Arc::new(store)
}

/// Canned analogs ending in early 2015, safely before every test-window
/// as-of, with a permanently bullish median forward return.
fn bullish_matcher() -> Arc<FixedMatcher> {
    let matches: Vec<MatchCandidate> = (0..6)
        .map(|i| MatchCandidate {
            start_ts: day(2015, 1, 1) + Duration::days(i * 10),
            end_ts: day(2015, 2, 1) + Duration::days(i * 10),
            score: 0.9,
        })
        .collect();
    Arc::new(FixedMatcher::new(MatchResponse {
        matches,
        forward_stats: ForwardStats {
            ret: ReturnPercentiles {
                p10: 0.01,
                p50: 0.06,
                p90: 0.11,
            },
            max_drawdown: DrawdownPercentiles { p50: 0.04, p90: 0.09 },
        },
        stability_score: 0.8,
        series_used: None,
    }))
}

#[test]
fn rolling_validation_runs_the_full_pipeline() {
    let store = flat_store();
    let matcher = bullish_matcher();

    let factory_store = store.clone();
    let validator = RollingValidator::new(
        store,
        SymbolSettings::default(),
        Box::new(move || {
            Box::new(BuilderSignalSource::new(SignalBuilder::new(
                matcher.clone(),
                factory_store.clone(),
                SignalParams::default(),
            )))
        }),
    );

    let config = RollingConfig::new("BTC", 2015, 2024);
    let result = validator
        .run_rolling_validation(&config, &GateCriteria::default(), None)
        .unwrap();

    assert_eq!(result.folds.len(), 6);
    assert!(!result.cancelled);
    assert_eq!(result.run_id.len(), 64);

    // A persistently bullish signal on flat prices trades in every fold:
    // enter, ride to max hold, forced exit, cooldown, re-enter.
    for fold in &result.folds {
        assert!(fold.trades > 0, "fold {} never traded", fold.fold_index);
        assert!(fold.final_equity > 0.0);
    }
    // Flat prices mean the only P&L is transaction costs, so no gate set
    // should approve this.
    assert_ne!(result.verdict, Verdict::Approved);
    assert!(result.summary.total_trades > 0);
}

#[test]
fn sweep_ranks_the_grid_over_the_real_builder() {
    let store = flat_store();
    let matcher = bullish_matcher();

    let factory_store = store.clone();
    let sweeper = ParameterSweeper::new(
        store,
        SymbolSettings::default(),
        Box::new(move |params: &SignalParams| {
            Box::new(BuilderSignalSource::new(SignalBuilder::new(
                matcher.clone(),
                factory_store.clone(),
                params.clone(),
            )))
        }),
    );

    let grid = SweepGrid {
        momentum_candidates: vec![0.01, 0.03],
        similarity_candidates: vec![0.75, 0.95],
        min_matches_candidates: vec![4],
    };
    let mut sim_config = SimConfig::new("BTC");
    sim_config.start = Some(day(2020, 1, 1));
    sim_config.end = Some(day(2021, 12, 31));

    let summary = sweeper
        .run_sweep(
            &sim_config,
            &SignalParams::default(),
            &grid,
            &SweepCriteria::default(),
            None,
        )
        .unwrap();

    assert_eq!(summary.total_configs, 4);
    assert_eq!(summary.results.len(), 4);
    assert!(!summary.cancelled);
    assert!(summary.best.is_some());

    // Similarity 0.95 rejects every canned analog (score 0.9), so those
    // combos never trade; the looser floor trades in both momentum settings.
    for r in &summary.results {
        if r.min_similarity > 0.9 {
            assert_eq!(r.trades, 0, "combo {:?} should be starved", r);
        } else {
            assert!(r.trades > 0, "combo {:?} should trade", r);
        }
    }
    assert_eq!(summary.momentum_surface.len(), 2);
}
