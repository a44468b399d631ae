//! Storm drain flow velocity and travel time
//!
//! - `hydraulics` - Manning velocity, material roughness, edge normalization
//! - `updater` - batch velocity run over the conveyance tables
//! - `network` - flag traces, travel-time aggregation, path outputs
//! - `storage` - feature store / edit session traits and the SQLite workspace

pub mod config;
pub mod error;
pub mod hydraulics;
pub mod network;
pub mod storage;
pub mod types;
pub mod updater;

pub use config::{ConfigError, FlowConfig};
pub use error::FlowError;
pub use types::{FeatureCategory, FeatureId, SourcePoint};
pub use updater::{BatchReport, BatchUpdater, CategorySummary};
