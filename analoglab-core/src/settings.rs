//! Per-symbol settings — costs, risk, drawdown, regime exposure, lifecycle.
//!
//! Settings are a read-only snapshot per run: the simulator never mutates
//! them mid-simulation. The one documented write-back is `record_bad_regimes`,
//! where a run may persist its persistently-unprofitable regime buckets for
//! future exclusion. Files are TOML; every section defaults so a partial
//! file only overrides what it names.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::{
    BucketParams, CostParams, DrawdownParams, LifecycleParams, RegimeExposureGrid, RiskParams,
};

/// Everything one simulation run needs to know about a symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolSettings {
    pub cost: CostParams,
    pub risk: RiskParams,
    pub drawdown: DrawdownParams,
    pub regime_grid: RegimeExposureGrid,
    pub buckets: BucketParams,
    pub lifecycle: LifecycleParams,
    /// Regime buckets flagged unprofitable by earlier runs, e.g.
    /// `trend=down,vol=high`. Advisory; not read by the simulator itself.
    pub bad_regimes: Vec<String>,
}

impl SymbolSettings {
    /// Parse a TOML settings document.
    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no settings for symbol {0}")]
    UnknownSymbol(String),
}

/// External keeper of per-symbol settings.
///
/// Reads are snapshots; `record_bad_regimes` is the single documented side
/// effect a run may emit, and correctness never depends on it landing.
pub trait SettingsStore: Send + Sync {
    fn settings(&self, symbol: &str) -> Result<SymbolSettings, SettingsError>;

    fn record_bad_regimes(&self, symbol: &str, regimes: &[String]) -> Result<(), SettingsError>;
}

/// Map-backed store with a configurable fallback for unseen symbols.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    by_symbol: RwLock<HashMap<String, SymbolSettings>>,
    default: Option<SymbolSettings>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `default` for any symbol without explicit settings.
    pub fn with_default(default: SymbolSettings) -> Self {
        Self {
            by_symbol: RwLock::new(HashMap::new()),
            default: Some(default),
        }
    }

    pub fn insert(&self, symbol: impl Into<String>, settings: SymbolSettings) {
        self.by_symbol
            .write()
            .expect("settings lock poisoned")
            .insert(symbol.into(), settings);
    }
}

impl SettingsStore for InMemorySettings {
    fn settings(&self, symbol: &str) -> Result<SymbolSettings, SettingsError> {
        let map = self.by_symbol.read().expect("settings lock poisoned");
        map.get(symbol)
            .cloned()
            .or_else(|| self.default.clone())
            .ok_or_else(|| SettingsError::UnknownSymbol(symbol.to_string()))
    }

    fn record_bad_regimes(&self, symbol: &str, regimes: &[String]) -> Result<(), SettingsError> {
        let mut map = self.by_symbol.write().expect("settings lock poisoned");
        let entry = map
            .entry(symbol.to_string())
            .or_insert_with(|| self.default.clone().unwrap_or_default());
        for regime in regimes {
            if !entry.bad_regimes.contains(regime) {
                entry.bad_regimes.push(regime.clone());
            }
        }
        Ok(())
    }
}
