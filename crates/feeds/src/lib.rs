//! Market data collection for the crypto alert digest.
//!
//! ## Architecture
//!
//! - `source` - `MarketDataSource` trait pairing fetch with transform
//! - `messari` - Messari REST implementation
//! - `transform` - payload extraction into `AssetMetrics`

pub mod error;
pub mod messari;
pub mod source;
pub mod transform;

pub use error::*;
pub use messari::MessariSource;
pub use source::{MarketDataSource, MockMarketSource};
pub use transform::{messari_block, parse_messari_metrics};
