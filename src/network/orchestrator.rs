//! Trace orchestrator
//!
//! Runs one downstream trace per flag and writes the summed travel time back to the
//! flag table. Every flag moves through
//!
//! ```text
//! Init → Traced → Aggregated → (OutputRequested) → Done
//!   ↘ Failed (trace error)
//! ```
//!
//! A trace error only fails its own flag. Write-back and output errors abort the run
//! and roll back every flag's write.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;

use super::aggregator::{PathAggregator, PathSummary, TravelTimeIndex, TravelTimeLookup};
use super::output::{OutputAssembler, TracedEdge};
use super::trace::{NetworkTracer, TraceDirection, TraceResult};
use crate::error::{finish_session, FlowError};
use crate::storage::schema::{CONNECTOR_TABLE, FLAG_FLOW_TIME, FLOW_TIME_SECS};
use crate::storage::{EditOptions, EditSession, FeatureStore, FieldType};
use crate::types::{FeatureCategory, FeatureId, SourcePoint};

/// Processing state of one flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PointState {
    Init,
    Traced,
    Aggregated,
    OutputRequested,
    Done,
    Failed,
}

impl PointState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointState::Init => "init",
            PointState::Traced => "traced",
            PointState::Aggregated => "aggregated",
            PointState::OutputRequested => "output_requested",
            PointState::Done => "done",
            PointState::Failed => "failed",
        }
    }
}

/// Per-flag result in a `TraceRunReport`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourcePointOutcome {
    Done {
        flag_id: FeatureId,
        total_time_secs: f64,
        contributing: BTreeSet<FeatureCategory>,
        /// Dissolved output name, when one was assembled
        output: Option<String>,
    },
    Failed {
        flag_id: FeatureId,
        error: String,
    },
}

impl SourcePointOutcome {
    pub fn flag_id(&self) -> FeatureId {
        match self {
            SourcePointOutcome::Done { flag_id, .. } | SourcePointOutcome::Failed { flag_id, .. } => *flag_id,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SourcePointOutcome::Done { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceRunReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub direction: TraceDirection,
    pub outcomes: Vec<SourcePointOutcome>,
}

impl TraceRunReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    pub fn outcome(&self, flag_id: FeatureId) -> Option<&SourcePointOutcome> {
        self.outcomes.iter().find(|o| o.flag_id() == flag_id)
    }
}

/// State tracker for one flag
struct PointProgress {
    flag_id: FeatureId,
    state: PointState,
}

impl PointProgress {
    fn new(flag_id: FeatureId) -> Self {
        Self {
            flag_id,
            state: PointState::Init,
        }
    }

    fn advance(&mut self, next: PointState) {
        log::debug!(
            "Flag {}: {} -> {}",
            self.flag_id,
            self.state.as_str(),
            next.as_str()
        );
        self.state = next;
    }
}

pub struct TraceOrchestrator {
    flag_table: String,
    categories: Vec<FeatureCategory>,
    direction: TraceDirection,
    options: EditOptions,
}

impl TraceOrchestrator {
    pub fn new(flag_table: impl Into<String>, categories: Vec<FeatureCategory>) -> Self {
        Self {
            flag_table: flag_table.into(),
            categories,
            direction: TraceDirection::Downstream,
            options: EditOptions::default(),
        }
    }

    pub fn with_edit_options(mut self, options: EditOptions) -> Self {
        self.options = options;
        self
    }

    /// Trace every flag, write its total flow time, and optionally assemble its path
    pub fn run<S, T>(
        &self,
        store: &mut S,
        tracer: &mut T,
        mut output: Option<&mut dyn OutputAssembler>,
    ) -> Result<TraceRunReport, FlowError>
    where
        S: FeatureStore + ?Sized,
        T: NetworkTracer + ?Sized,
    {
        let started_at = Utc::now().timestamp();

        store.ensure_fields(&self.flag_table, &[(FLAG_FLOW_TIME, FieldType::Float)])?;

        // Categories never calculated have no times; their edges count as 0
        let mut timed = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            if store.list_fields(category.as_str())?.contains(FLOW_TIME_SECS) {
                timed.push(*category);
            } else {
                log::warn!("⚠️  {} has no {} field; its edges count as 0s", category, FLOW_TIME_SECS);
            }
        }

        let mut session = store.start_editing(self.options)?;
        session.begin_operation()?;

        let outcome = self.trace_all(session.as_mut(), tracer, &mut output, &timed);
        let outcomes = finish_session(session.as_mut(), outcome)?;

        let report = TraceRunReport {
            started_at,
            finished_at: Utc::now().timestamp(),
            direction: self.direction,
            outcomes,
        };

        log::info!(
            "✅ Trace run complete: {} flags traced, {} failed",
            report.completed(),
            report.failed()
        );

        Ok(report)
    }

    fn trace_all<T>(
        &self,
        session: &mut dyn EditSession,
        tracer: &mut T,
        output: &mut Option<&mut dyn OutputAssembler>,
        timed: &[FeatureCategory],
    ) -> Result<Vec<SourcePointOutcome>, FlowError>
    where
        T: NetworkTracer + ?Sized,
    {
        let index = TravelTimeIndex::load(session, timed)?;
        let flags = session.read_rows(&self.flag_table, &[])?;

        log::info!("🚩 Tracing {} flags from {}", flags.len(), self.flag_table);

        let mut outcomes = Vec::with_capacity(flags.len());
        for record in flags {
            let point = SourcePoint::new(record.id);
            outcomes.push(self.process_point(session, tracer, output, &index, point)?);
        }

        Ok(outcomes)
    }

    fn process_point<T>(
        &self,
        session: &mut dyn EditSession,
        tracer: &mut T,
        output: &mut Option<&mut dyn OutputAssembler>,
        index: &TravelTimeIndex,
        mut point: SourcePoint,
    ) -> Result<SourcePointOutcome, FlowError>
    where
        T: NetworkTracer + ?Sized,
    {
        let mut progress = PointProgress::new(point.identifier);

        let result = match tracer.trace(&point, self.direction) {
            Ok(result) => {
                progress.advance(PointState::Traced);
                result
            }
            Err(e) => {
                log::warn!("⚠️  Trace failed for flag {}: {}", point.identifier, e);
                progress.advance(PointState::Failed);
                release(tracer, &point, None);
                return Ok(SourcePointOutcome::Failed {
                    flag_id: point.identifier,
                    error: e.to_string(),
                });
            }
        };

        // Categories outside the run have no loaded times and stay out of the path
        let scoped = result.restricted_to(&self.categories);
        let completed = self.complete_point(session, output, index, &mut point, &scoped, &mut progress);
        release(tracer, &point, Some(result));
        completed
    }

    fn complete_point(
        &self,
        session: &mut dyn EditSession,
        output: &mut Option<&mut dyn OutputAssembler>,
        index: &TravelTimeIndex,
        point: &mut SourcePoint,
        result: &TraceResult,
        progress: &mut PointProgress,
    ) -> Result<SourcePointOutcome, FlowError> {
        let summary = PathAggregator::aggregate(result, index);

        session.update_row(
            &self.flag_table,
            point.identifier,
            &[(FLAG_FLOW_TIME, summary.total_time_secs.into())],
        )?;
        point.total_flow_time_secs = Some(summary.total_time_secs);
        progress.advance(PointState::Aggregated);

        log::info!(
            "📍 Flag {}: {:.3}s across {} categories",
            point.identifier,
            summary.total_time_secs,
            summary.contributing.len()
        );

        let mut assembled = None;
        if let Some(out) = output.as_mut() {
            if !summary.contributing.is_empty() {
                progress.advance(PointState::OutputRequested);
                assembled = Some(assemble_path(&mut **out, point.identifier, result, &summary, index)?);
            }
        }

        progress.advance(PointState::Done);

        Ok(SourcePointOutcome::Done {
            flag_id: point.identifier,
            total_time_secs: summary.total_time_secs,
            contributing: summary.contributing,
            output: assembled,
        })
    }
}

/// Merge the contributing categories and connectors, dissolve, drop the merge
fn assemble_path<O>(
    out: &mut O,
    flag_id: FeatureId,
    result: &TraceResult,
    summary: &PathSummary,
    index: &TravelTimeIndex,
) -> Result<String, FlowError>
where
    O: OutputAssembler + ?Sized,
{
    let mut edges = Vec::new();
    for category in &summary.contributing {
        if let Some(ids) = result.edges(*category) {
            edges.extend(ids.iter().map(|id| TracedEdge {
                layer: category.as_str().to_string(),
                edge_id: *id,
                travel_time_secs: index.travel_time(*category, *id),
            }));
        }
    }
    edges.extend(result.connectors.iter().map(|id| TracedEdge {
        layer: CONNECTOR_TABLE.to_string(),
        edge_id: *id,
        travel_time_secs: None,
    }));

    let merged = format!("tracePath_{}", flag_id);
    let dissolved = format!("{}_dissolved", merged);

    out.merge(&edges, &merged)?;
    out.dissolve(&merged, &dissolved, true)?;
    out.delete(&merged)?;

    Ok(dissolved)
}

fn release<T>(tracer: &mut T, point: &SourcePoint, result: Option<TraceResult>)
where
    T: NetworkTracer + ?Sized,
{
    if let Err(e) = tracer.release(point, result) {
        log::warn!("⚠️  Failed to release trace artifacts for flag {}: {}", point.identifier, e);
    }
}
