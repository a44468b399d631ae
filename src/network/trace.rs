//! Trace collaborator interface
//!
//! A tracer walks the drainage network from a flag and reports which edges it
//! reached, partitioned by feature category. How connectivity and flow direction are
//! resolved is up to the tracer.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::types::{FeatureCategory, FeatureId, SourcePoint};

/// Traversal direction relative to the digitized direction of each line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceDirection {
    /// Follow lines from their start node to their end node
    Downstream,
}

impl TraceDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceDirection::Downstream => "TRACE_DOWNSTREAM",
        }
    }
}

/// Edges reached by one trace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceResult {
    /// Reached edges per category. Categories with nothing reached may be absent.
    pub reachable: BTreeMap<FeatureCategory, BTreeSet<FeatureId>>,
    /// Connector lines crossed by the trace. They carry no travel time.
    pub connectors: BTreeSet<FeatureId>,
}

impl TraceResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: FeatureCategory, id: FeatureId) {
        self.reachable.entry(category).or_default().insert(id);
    }

    pub fn edges(&self, category: FeatureCategory) -> Option<&BTreeSet<FeatureId>> {
        self.reachable.get(&category)
    }

    pub fn has_connectors(&self) -> bool {
        !self.connectors.is_empty()
    }

    /// Copy keeping only `categories`; connectors are kept as-is
    pub fn restricted_to(&self, categories: &[FeatureCategory]) -> TraceResult {
        TraceResult {
            reachable: self
                .reachable
                .iter()
                .filter(|(category, _)| categories.contains(*category))
                .map(|(category, ids)| (*category, ids.clone()))
                .collect(),
            connectors: self.connectors.clone(),
        }
    }

    pub fn edge_count(&self) -> usize {
        self.reachable.values().map(BTreeSet::len).sum::<usize>() + self.connectors.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceError {
    /// The flag feature does not exist
    FlagNotFound(FeatureId),
    /// The flag is not placed on a network junction
    NotOnNetwork(FeatureId),
    /// The tracer's backing store failed
    Backend(String),
}

impl From<rusqlite::Error> for TraceError {
    fn from(err: rusqlite::Error) -> Self {
        TraceError::Backend(err.to_string())
    }
}

impl From<crate::storage::StoreError> for TraceError {
    fn from(err: crate::storage::StoreError) -> Self {
        TraceError::Backend(err.to_string())
    }
}

impl std::fmt::Display for TraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceError::FlagNotFound(id) => write!(f, "Flag {} not found", id),
            TraceError::NotOnNetwork(id) => write!(f, "Flag {} is not on a network junction", id),
            TraceError::Backend(e) => write!(f, "Trace backend error: {}", e),
        }
    }
}

impl std::error::Error for TraceError {}

/// Trace collaborator
pub trait NetworkTracer {
    /// Trace the network from `flag` in `direction`
    fn trace(&mut self, flag: &SourcePoint, direction: TraceDirection) -> Result<TraceResult, TraceError>;

    /// Release per-flag artifacts (flag views, trace subsets) created by `trace`
    fn release(&mut self, _flag: &SourcePoint, _result: Option<TraceResult>) -> Result<(), TraceError> {
        Ok(())
    }
}
