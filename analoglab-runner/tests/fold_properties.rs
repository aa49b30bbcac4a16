//! Property tests for fold generation.
//!
//! Whatever the year configuration, generated folds must tile the range
//! without overlap or leakage: train precedes test, test windows never
//! precede earlier folds' windows, and nothing extends past the end year.

use chrono::TimeZone;
use proptest::prelude::*;

use analoglab_runner::{generate_folds, RollingConfig};

fn arb_config() -> impl Strategy<Value = RollingConfig> {
    (2000i32..2020, 4i32..15, 1i32..5, 1i32..3, 1i32..4).prop_map(
        |(start_year, span, train, test, step)| {
            let mut config = RollingConfig::new("BTC", start_year, start_year + span);
            config.train_years = train;
            config.test_years = test;
            config.step_years = step;
            config
        },
    )
}

proptest! {
    #[test]
    fn folds_are_ordered_and_bounded(config in arb_config()) {
        let Ok(folds) = generate_folds(&config) else {
            // Too small a range for a single fold is a legitimate outcome.
            return Ok(());
        };
        prop_assert!(!folds.is_empty());

        for (i, f) in folds.iter().enumerate() {
            prop_assert_eq!(f.fold_index, i);
            prop_assert!(f.train_start < f.train_end);
            prop_assert_eq!(f.train_end, f.test_start);
            prop_assert!(f.test_start < f.test_end);
        }

        // The last test window must not run past the end year.
        let end = chrono::Utc
            .with_ymd_and_hms(config.end_year, 1, 1, 0, 0, 0)
            .unwrap();
        prop_assert!(folds.last().unwrap().test_end <= end);

        // Consecutive folds slide forward by exactly step_years.
        for w in folds.windows(2) {
            prop_assert!(w[1].train_start > w[0].train_start);
            prop_assert!(w[1].test_end > w[0].test_end);
        }
    }

    /// Step = test size tiles the out-of-sample range without gaps.
    #[test]
    fn contiguous_steps_tile_the_test_range(
        start_year in 2000i32..2020,
        train in 1i32..5,
        folds_wanted in 2i32..8,
    ) {
        let mut config = RollingConfig::new(
            "BTC",
            start_year,
            start_year + train + folds_wanted,
        );
        config.train_years = train;
        config.test_years = 1;
        config.step_years = 1;

        let folds = generate_folds(&config).unwrap();
        prop_assert_eq!(folds.len(), folds_wanted as usize);
        for w in folds.windows(2) {
            prop_assert_eq!(w[1].test_start, w[0].test_end);
        }
    }
}
