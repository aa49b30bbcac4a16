//! Price store interface — the external keeper of price history.
//!
//! The store abstracts over whatever persistence backs the price series
//! (the real system reads a database; tests use the in-memory impl). The
//! core treats every returned series as a read-only snapshot.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::domain::PriceSeries;

/// Structured errors for store lookups.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no price series for {symbol}/{timeframe}")]
    NotFound { symbol: String, timeframe: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Read-only access to per-symbol price history with quality flags.
pub trait PriceStore: Send + Sync {
    fn series_with_quality(&self, symbol: &str, timeframe: &str)
        -> Result<PriceSeries, StoreError>;
}

/// Map-backed store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryPriceStore {
    series: RwLock<HashMap<(String, String), PriceSeries>>,
}

impl InMemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, series: PriceSeries) {
        let key = (series.symbol().to_string(), series.timeframe().to_string());
        self.series
            .write()
            .expect("price store lock poisoned")
            .insert(key, series);
    }
}

impl PriceStore for InMemoryPriceStore {
    fn series_with_quality(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> Result<PriceSeries, StoreError> {
        self.series
            .read()
            .expect("price store lock poisoned")
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            })
    }
}
