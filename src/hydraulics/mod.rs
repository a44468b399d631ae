//! Hydraulics - per-edge velocity and travel time
//!
//! # Pipeline
//!
//! ```text
//! RawEdgeRow → ConveyanceEdge::from_row (height/slope defaults)
//!     ↓
//! CoefficientClassifier::classify (material → Manning n)
//!     ↓
//! compute_flow (velocity, travel time)  or  Diagnostic (zeroed outputs)
//! ```

pub mod edge;
pub mod manning;
pub mod material;

pub use edge::{normalize_height, normalize_slope, ChannelEdge, ConveyanceEdge, Diagnostic, Edge, RawEdgeRow};
pub use manning::{compute_flow, FlowEstimate, HydraulicError};
pub use material::{CoefficientClassifier, InvalidMaterial, InvalidReason, MaterialBand, MaterialTable, Roughness};
