//! Path aggregation - total travel time along a traced path

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::trace::TraceResult;
use crate::storage::schema::FLOW_TIME_SECS;
use crate::storage::{EditSession, StoreError};
use crate::types::{FeatureCategory, FeatureId};

/// Travel time of an edge, if known
pub trait TravelTimeLookup {
    fn travel_time(&self, category: FeatureCategory, id: FeatureId) -> Option<f64>;
}

/// In-memory `FlowTime_secs` values keyed by category and edge
#[derive(Debug, Default)]
pub struct TravelTimeIndex {
    times: HashMap<(FeatureCategory, FeatureId), f64>,
}

impl TravelTimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `FlowTime_secs` for every edge of `categories` through an open session
    ///
    /// NULL values are left out of the index.
    pub fn load(session: &mut dyn EditSession, categories: &[FeatureCategory]) -> Result<Self, StoreError> {
        let mut index = Self::new();

        for category in categories {
            let rows = session.read_rows(category.as_str(), &[FLOW_TIME_SECS])?;
            for record in rows {
                if let Some(time) = record.get(0).as_f64() {
                    index.insert(*category, record.id, time);
                }
            }
        }

        log::info!("⏱️  Loaded {} edge travel times", index.len());
        Ok(index)
    }

    pub fn insert(&mut self, category: FeatureCategory, id: FeatureId, time_secs: f64) {
        self.times.insert((category, id), time_secs);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

impl TravelTimeLookup for TravelTimeIndex {
    fn travel_time(&self, category: FeatureCategory, id: FeatureId) -> Option<f64> {
        self.times.get(&(category, id)).copied()
    }
}

/// Aggregate for one traced path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSummary {
    pub total_time_secs: f64,
    /// Categories with at least one reached edge, even if their times sum to zero
    pub contributing: BTreeSet<FeatureCategory>,
}

pub struct PathAggregator;

impl PathAggregator {
    /// Sum travel times over every reached edge
    ///
    /// Missing or non-finite times count as 0. Connector edges carry no time.
    pub fn aggregate(result: &TraceResult, lookup: &dyn TravelTimeLookup) -> PathSummary {
        let mut total_time_secs = 0.0;
        let mut contributing = BTreeSet::new();

        for (category, ids) in &result.reachable {
            if ids.is_empty() {
                continue;
            }

            let category_time: f64 = ids
                .iter()
                .filter_map(|id| lookup.travel_time(*category, *id))
                .filter(|t| t.is_finite())
                .sum();

            log::debug!("{}: {} edges, {:.3}s", category, ids.len(), category_time);

            total_time_secs += category_time;
            contributing.insert(*category);
        }

        PathSummary {
            total_time_secs,
            contributing,
        }
    }
}
