//! Price series — the sole source of truth for window extraction.
//!
//! A `PriceSeries` is an append-only, strictly time-ordered sequence of
//! (timestamp, close, high, low, quality) points for one symbol/timeframe.
//! Every as-of bounded computation in the crate goes through `up_to()` or
//! `window_ending_at()`, which never expose points with `ts > as_of`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single observation for one symbol on one bar.
///
/// `quality` is a [0, 1] data-quality score supplied by the external price
/// store (1.0 = clean). The core never interpolates; low-quality points are
/// carried through as-is and surface in simulator warnings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts: DateTime<Utc>,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub quality: f64,
}

impl PricePoint {
    /// Basic sanity check: finite, positive close, high >= low.
    pub fn is_sane(&self) -> bool {
        self.close.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close > 0.0
            && self.high >= self.low
    }
}

/// Validation errors raised when constructing or appending to a series.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("empty price series for {symbol}/{timeframe}")]
    Empty { symbol: String, timeframe: String },

    #[error("non-monotonic timestamp at index {index}")]
    NonMonotonic { index: usize },

    #[error("insane price point at index {index} (close={close})")]
    InsanePoint { index: usize, close: f64 },
}

/// Ordered price history for one symbol/timeframe.
///
/// Immutable apart from `push()`, which only accepts a point strictly after
/// the current last timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    timeframe: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, validating ordering and point sanity.
    pub fn new(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        points: Vec<PricePoint>,
    ) -> Result<Self, PriceError> {
        let symbol = symbol.into();
        let timeframe = timeframe.into();
        if points.is_empty() {
            return Err(PriceError::Empty { symbol, timeframe });
        }
        for (i, p) in points.iter().enumerate() {
            if !p.is_sane() {
                return Err(PriceError::InsanePoint {
                    index: i,
                    close: p.close,
                });
            }
            if i > 0 && points[i - 1].ts >= p.ts {
                return Err(PriceError::NonMonotonic { index: i });
            }
        }
        Ok(Self {
            symbol,
            timeframe,
            points,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn first_ts(&self) -> DateTime<Utc> {
        self.points[0].ts
    }

    pub fn last_ts(&self) -> DateTime<Utc> {
        self.points[self.points.len() - 1].ts
    }

    /// Append one point. The timestamp must be strictly after the last.
    pub fn push(&mut self, point: PricePoint) -> Result<(), PriceError> {
        if !point.is_sane() {
            return Err(PriceError::InsanePoint {
                index: self.points.len(),
                close: point.close,
            });
        }
        if point.ts <= self.last_ts() {
            return Err(PriceError::NonMonotonic {
                index: self.points.len(),
            });
        }
        self.points.push(point);
        Ok(())
    }

    /// Index of the last point with `ts <= as_of`, if any.
    pub fn index_at_or_before(&self, as_of: DateTime<Utc>) -> Option<usize> {
        match self.points.binary_search_by(|p| p.ts.cmp(&as_of)) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }

    /// All points with `ts <= as_of`. This is the only gateway for as-of
    /// bounded reads; nothing past the cutoff is ever visible through it.
    pub fn up_to(&self, as_of: DateTime<Utc>) -> &[PricePoint] {
        match self.index_at_or_before(as_of) {
            Some(i) => &self.points[..=i],
            None => &[],
        }
    }

    /// The trailing `window_len` points ending at or before `as_of`.
    /// Returns None when fewer than `window_len` points are available.
    pub fn window_ending_at(&self, as_of: DateTime<Utc>, window_len: usize) -> Option<&[PricePoint]> {
        let visible = self.up_to(as_of);
        if window_len == 0 || visible.len() < window_len {
            return None;
        }
        Some(&visible[visible.len() - window_len..])
    }

    /// Sub-series covering `[start, end)` by timestamp. Used by fold slicing;
    /// the result is a self-contained series for the window.
    pub fn slice_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<PriceSeries> {
        let points: Vec<PricePoint> = self
            .points
            .iter()
            .filter(|p| p.ts >= start && p.ts < end)
            .copied()
            .collect();
        if points.is_empty() {
            return None;
        }
        Some(PriceSeries {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            points,
        })
    }

    /// Per-step log returns of the closes, oldest first.
    pub fn log_returns(points: &[PricePoint]) -> Vec<f64> {
        points
            .windows(2)
            .map(|w| (w[1].close / w[0].close).ln())
            .collect()
    }
}
