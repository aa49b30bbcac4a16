//! Domain types for AnalogLab.

pub mod price;
pub mod regime;
pub mod signal;

pub use price::{PriceError, PricePoint, PriceSeries};
pub use regime::{RegimeLabel, RegimeMeta};
pub use signal::{Signal, SignalAction};

/// Symbol type alias
pub type Symbol = String;
