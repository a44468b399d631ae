//! Network tracing and path aggregation
//!
//! # Architecture
//!
//! ```text
//! CatchBasin flags → NetworkTracer (SqliteNetworkTracer)
//!     ↓
//! TraceResult (edges per category + connectors)
//!     ↓
//! PathAggregator (TravelTimeIndex lookup) → FlowTime write-back
//!     ↓
//! OutputAssembler (JsonPathAssembler) → tracePath_<id>_dissolved
//! ```

pub mod aggregator;
pub mod orchestrator;
pub mod output;
pub mod sqlite_tracer;
pub mod trace;

pub use aggregator::{PathAggregator, PathSummary, TravelTimeIndex, TravelTimeLookup};
pub use orchestrator::{PointState, SourcePointOutcome, TraceOrchestrator, TraceRunReport};
pub use output::{DissolvedPath, JsonPathAssembler, OutputAssembler, OutputError, TracedEdge};
pub use sqlite_tracer::SqliteNetworkTracer;
pub use trace::{NetworkTracer, TraceDirection, TraceError, TraceResult};
