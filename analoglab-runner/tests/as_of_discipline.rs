//! As-of discipline at the system boundary.
//!
//! The matcher contract says implementations never consult data past the
//! as-of cutoff, but the builder re-enforces the cutoff itself. These tests
//! drive the builder with a deliberately broken matcher and with a store
//! that later grows future data, and confirm that neither can leak forward
//! information into a signal.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use analoglab_core::domain::{PricePoint, PriceSeries, SignalAction};
use analoglab_core::matcher::{
    DrawdownPercentiles, ForwardStats, MatchCandidate, MatchQuery, MatchResponse, MatcherError,
    PatternMatcher, ReturnPercentiles,
};
use analoglab_core::signal::{SignalBuilder, SignalParams};
use analoglab_core::store::InMemoryPriceStore;

fn ts(day_offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(day_offset)
}

fn flat_points(n: usize) -> Vec<PricePoint> {
    (0..n)
        .map(|i| PricePoint {
            ts: ts(i as i64),
            close: 100.0,
            high: 101.0,
            low: 99.0,
            quality: 1.0,
        })
        .collect()
}

fn candidate(end_day: i64, score: f64) -> MatchCandidate {
    MatchCandidate {
        start_ts: ts(end_day - 30),
        end_ts: ts(end_day),
        score,
    }
}

fn response(matches: Vec<MatchCandidate>, p50: f64) -> MatchResponse {
    MatchResponse {
        matches,
        forward_stats: ForwardStats {
            ret: ReturnPercentiles {
                p10: p50 - 0.05,
                p50,
                p90: p50 + 0.05,
            },
            max_drawdown: DrawdownPercentiles { p50: 0.04, p90: 0.09 },
        },
        stability_score: 1.0,
        series_used: None,
    }
}

/// A matcher that violates its contract: it returns whatever candidate list
/// it was given, future analogs included, ignoring the query's cutoff.
struct ContractBreakingMatcher {
    response: MatchResponse,
}

impl PatternMatcher for ContractBreakingMatcher {
    fn find_matches(&self, _query: &MatchQuery) -> Result<MatchResponse, MatcherError> {
        Ok(self.response.clone())
    }
}

#[test]
fn future_analogs_from_a_broken_matcher_are_never_selected() {
    // Three legitimate analogs plus six impossible ones ending after the
    // cutoff, the impossible ones carrying the best scores. With
    // min_matches = 4 the signal can only go directional if a future analog
    // sneaks through.
    let as_of = ts(299);
    let mut matches: Vec<MatchCandidate> =
        (0..3).map(|i| candidate(50 + i * 10, 0.90)).collect();
    matches.extend((0..6).map(|i| candidate(400 + i * 10, 0.99)));

    let store = InMemoryPriceStore::new();
    store.insert(PriceSeries::new("BTC", "1d", flat_points(300)).unwrap());
    let builder = SignalBuilder::new(
        Arc::new(ContractBreakingMatcher {
            response: response(matches, 0.10),
        }),
        Arc::new(store),
        SignalParams::default(),
    );

    let signal = builder.build("BTC", Some(as_of));
    assert_eq!(signal.action, SignalAction::Neutral);
    assert!(
        signal.reason.contains("INSUFFICIENT_MATCHES(3<4)"),
        "{}",
        signal.reason
    );
    assert_eq!(signal.match_count, 3);
}

#[test]
fn broken_matcher_with_enough_past_analogs_still_counts_only_those() {
    let as_of = ts(299);
    let mut matches: Vec<MatchCandidate> =
        (0..5).map(|i| candidate(50 + i * 10, 0.90)).collect();
    matches.extend((0..10).map(|i| candidate(400 + i * 10, 0.99)));

    let store = InMemoryPriceStore::new();
    store.insert(PriceSeries::new("BTC", "1d", flat_points(300)).unwrap());
    let builder = SignalBuilder::new(
        Arc::new(ContractBreakingMatcher {
            response: response(matches, 0.10),
        }),
        Arc::new(store),
        SignalParams::default(),
    );

    let signal = builder.build("BTC", Some(as_of));
    assert_eq!(signal.action, SignalAction::Long);
    assert_eq!(signal.match_count, 5);
}

#[test]
fn appending_future_prices_does_not_change_an_earlier_signal() {
    let as_of = ts(299);
    let matches: Vec<MatchCandidate> = (0..6).map(|i| candidate(50 + i * 10, 0.9)).collect();

    let build_signal = |n_points: usize| {
        let store = InMemoryPriceStore::new();
        store.insert(PriceSeries::new("BTC", "1d", flat_points(n_points)).unwrap());
        let builder = SignalBuilder::new(
            Arc::new(ContractBreakingMatcher {
                response: response(matches.clone(), 0.06),
            }),
            Arc::new(store),
            SignalParams::default(),
        );
        builder.build("BTC", Some(as_of))
    };

    let before = build_signal(300);
    let after = build_signal(500);

    assert_eq!(before.action, SignalAction::Long);
    // Field-for-field identical via the serialized form.
    assert_eq!(
        serde_json::to_string(&before).unwrap(),
        serde_json::to_string(&after).unwrap()
    );
}
