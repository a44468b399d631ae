//! Batch velocity updater
//!
//! Calculates `Velocity_fps` and `FlowTime_secs` for every edge of the selected
//! conveyance tables inside one edit session. Either every edge is written or, on the
//! first error, nothing is.

use chrono::Utc;
use serde::Serialize;

use crate::error::{finish_session, FlowError};
use crate::hydraulics::{CoefficientClassifier, ConveyanceEdge, Diagnostic, FlowEstimate, RawEdgeRow};
use crate::storage::schema::{
    DIAMETER_HEIGHT, FLOW_TIME_SECS, MATERIAL, SHAPE_LENGTH, SLOPE, SOFT_BOTTOM, VELOCITY_FPS,
};
use crate::storage::{EditOptions, EditSession, FeatureStore, FieldType, Record};
use crate::types::FeatureCategory;

/// Per-category counts for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: FeatureCategory,
    pub calculated: usize,
    pub zeroed: usize,
}

/// Result of a committed velocity run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub categories: Vec<CategorySummary>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchReport {
    pub fn total_calculated(&self) -> usize {
        self.categories.iter().map(|c| c.calculated).sum()
    }

    pub fn total_zeroed(&self) -> usize {
        self.categories.iter().map(|c| c.zeroed).sum()
    }
}

pub struct BatchUpdater {
    classifier: CoefficientClassifier,
    options: EditOptions,
}

impl BatchUpdater {
    pub fn new(classifier: CoefficientClassifier) -> Self {
        Self {
            classifier,
            options: EditOptions::default(),
        }
    }

    pub fn with_edit_options(mut self, options: EditOptions) -> Self {
        self.options = options;
        self
    }

    /// Calculate and write velocity/flow time for every edge of `categories`
    ///
    /// Output fields are added first, outside the edit session. Any error after the
    /// session opens rolls back every write of this run.
    pub fn run<S>(&self, store: &mut S, categories: &[FeatureCategory]) -> Result<BatchReport, FlowError>
    where
        S: FeatureStore + ?Sized,
    {
        let started_at = Utc::now().timestamp();

        for category in categories {
            store.ensure_fields(
                category.as_str(),
                &[(VELOCITY_FPS, FieldType::Float), (FLOW_TIME_SECS, FieldType::Float)],
            )?;
        }

        let mut session = store.start_editing(self.options)?;
        session.begin_operation()?;

        let outcome = self.update_all(session.as_mut(), categories);
        let (summaries, diagnostics) = finish_session(session.as_mut(), outcome)?;

        let report = BatchReport {
            started_at,
            finished_at: Utc::now().timestamp(),
            categories: summaries,
            diagnostics,
        };

        log::info!(
            "✅ Velocity run complete: {} edges calculated, {} zeroed",
            report.total_calculated(),
            report.total_zeroed()
        );

        Ok(report)
    }

    fn update_all(
        &self,
        session: &mut dyn EditSession,
        categories: &[FeatureCategory],
    ) -> Result<(Vec<CategorySummary>, Vec<Diagnostic>), FlowError> {
        let mut summaries = Vec::with_capacity(categories.len());
        let mut diagnostics = Vec::new();

        for category in categories {
            let summary = self.update_category(session, *category, &mut diagnostics)?;
            log::info!(
                "📊 {}: {} calculated, {} zeroed",
                category,
                summary.calculated,
                summary.zeroed
            );
            summaries.push(summary);
        }

        Ok((summaries, diagnostics))
    }

    fn update_category(
        &self,
        session: &mut dyn EditSession,
        category: FeatureCategory,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<CategorySummary, FlowError> {
        let mut fields = vec![MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_LENGTH];
        if category.has_soft_bottom() {
            fields.push(SOFT_BOTTOM);
        }

        let rows = session.read_rows(category.as_str(), &fields)?;
        let mut summary = CategorySummary {
            category,
            calculated: 0,
            zeroed: 0,
        };

        for record in rows {
            let edge = ConveyanceEdge::from_row(category, raw_edge_row(&record));

            let flow = match edge.calculate(&self.classifier) {
                Ok((flow, roughness)) => {
                    log::debug!(
                        "Path: {} Objectid-{} has a velocity of {:.3} and a flow time of {:.3} (n = {}, {})",
                        category,
                        record.id,
                        flow.velocity_fps,
                        flow.travel_time_secs,
                        roughness.coefficient,
                        roughness.band.as_str()
                    );
                    summary.calculated += 1;
                    flow
                }
                Err(diagnostic) => {
                    log::warn!("{}", diagnostic);
                    diagnostics.push(diagnostic);
                    summary.zeroed += 1;
                    FlowEstimate::zeroed()
                }
            };

            session.update_row(
                category.as_str(),
                record.id,
                &[
                    (VELOCITY_FPS, flow.velocity_fps.into()),
                    (FLOW_TIME_SECS, flow.travel_time_secs.into()),
                ],
            )?;
        }

        Ok(summary)
    }
}

/// Map a record read with `[MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_Length, SOFT_BOTTOM?]`
fn raw_edge_row(record: &Record) -> RawEdgeRow {
    RawEdgeRow {
        identifier: record.id,
        material: record.get(0).as_i64(),
        height: record.get(1).as_f64(),
        slope: record.get(2).as_f64(),
        length: record.get(3).as_f64(),
        soft_bottom: record.get(4).as_text().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FieldValue, SqliteFeatureStore};
    use tempfile::{tempdir, TempDir};

    fn create_test_store() -> (TempDir, SqliteFeatureStore) {
        let dir = tempdir().unwrap();
        let store = SqliteFeatureStore::open(dir.path().join("sdn.db")).unwrap();
        crate::storage::run_schema_migrations(store.connection(), concat!(env!("CARGO_MANIFEST_DIR"), "/sql"))
            .unwrap();

        store
            .connection()
            .execute_batch(
                r#"
                INSERT INTO GravityMain (OBJECTID, MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_Length)
                VALUES (1, 1, 24.0, 0.03, 100.0),
                       (2, 98, 24.0, 0.03, 100.0),
                       (3, NULL, 24.0, 0.03, 100.0),
                       (4, 3, 999.0, -1.0, 100.0);
                INSERT INTO OpenChannel (OBJECTID, MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_Length, SOFT_BOTTOM)
                VALUES (1, 1, 24.0, 0.03, 100.0, 'Y'),
                       (2, 1, 24.0, 0.03, 100.0, 'N');
                "#,
            )
            .unwrap();

        (dir, store)
    }

    fn outputs(store: &SqliteFeatureStore, table: &str, id: i64) -> (Option<f64>, Option<f64>) {
        store
            .connection()
            .query_row(
                &format!("SELECT Velocity_fps, FlowTime_secs FROM {} WHERE OBJECTID = ?1", table),
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
    }

    fn approx(actual: Option<f64>, expected: f64) -> bool {
        actual.map(|v| (v - expected).abs() < 1e-6).unwrap_or(false)
    }

    #[test]
    fn test_run_writes_velocity_and_time() {
        let (_dir, mut store) = create_test_store();
        let updater = BatchUpdater::new(CoefficientClassifier::with_defaults());

        let report = updater
            .run(&mut store, &[FeatureCategory::GravityMain, FeatureCategory::OpenChannel])
            .unwrap();

        let reference = crate::hydraulics::compute_flow(24.0, 0.03, 100.0, 0.012).unwrap();
        let (velocity, time) = outputs(&store, "GravityMain", 1);
        assert!(approx(velocity, reference.velocity_fps));
        assert!(approx(time, reference.travel_time_secs));

        // Height 999 and slope -1 fall back to 24" and 3%
        let (velocity, _) = outputs(&store, "GravityMain", 4);
        assert!(approx(velocity, reference.velocity_fps));

        assert_eq!(report.total_calculated(), 4);
        assert_eq!(report.total_zeroed(), 2);
    }

    #[test]
    fn test_invalid_material_zeroed_with_diagnostic() {
        let (_dir, mut store) = create_test_store();
        let updater = BatchUpdater::new(CoefficientClassifier::with_defaults());

        let report = updater.run(&mut store, &[FeatureCategory::GravityMain]).unwrap();

        assert_eq!(outputs(&store, "GravityMain", 2), (Some(0.0), Some(0.0)));
        assert_eq!(outputs(&store, "GravityMain", 3), (Some(0.0), Some(0.0)));

        let messages: Vec<String> = report.diagnostics.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "Path: GravityMain Objectid-2 has an invalid material value of 98.".to_string(),
                "Path: GravityMain Objectid-3 has an invalid material value of None.".to_string(),
            ]
        );
    }

    #[test]
    fn test_soft_bottom_channel_uses_earthen_coefficient() {
        let (_dir, mut store) = create_test_store();
        let updater = BatchUpdater::new(CoefficientClassifier::with_defaults());

        updater.run(&mut store, &[FeatureCategory::OpenChannel]).unwrap();

        let soft = crate::hydraulics::compute_flow(24.0, 0.03, 100.0, 0.025).unwrap();
        let hard = crate::hydraulics::compute_flow(24.0, 0.03, 100.0, 0.012).unwrap();
        assert!(approx(outputs(&store, "OpenChannel", 1).0, soft.velocity_fps));
        assert!(approx(outputs(&store, "OpenChannel", 2).0, hard.velocity_fps));
    }

    #[test]
    fn test_rerun_is_stable() {
        let (_dir, mut store) = create_test_store();
        let updater = BatchUpdater::new(CoefficientClassifier::with_defaults());

        updater.run(&mut store, &[FeatureCategory::GravityMain]).unwrap();
        let first = outputs(&store, "GravityMain", 1);
        updater.run(&mut store, &[FeatureCategory::GravityMain]).unwrap();

        assert_eq!(outputs(&store, "GravityMain", 1), first);
    }

    #[test]
    fn test_failure_rolls_back_whole_run() {
        let (_dir, mut store) = create_test_store();
        store
            .connection()
            .execute_batch(
                r#"
                ALTER TABLE GravityMain ADD COLUMN Velocity_fps REAL;
                ALTER TABLE GravityMain ADD COLUMN FlowTime_secs REAL;
                CREATE TRIGGER reject_edge_four BEFORE UPDATE ON GravityMain
                WHEN NEW.OBJECTID = 4
                BEGIN
                    SELECT RAISE(ABORT, 'edge 4 is locked');
                END;
                "#,
            )
            .unwrap();

        let updater = BatchUpdater::new(CoefficientClassifier::with_defaults());
        let result = updater.run(&mut store, &[FeatureCategory::GravityMain]);

        assert!(matches!(result, Err(FlowError::Store(_))));
        // Edge 1 was calculated before edge 4 failed, and must not survive
        assert_eq!(outputs(&store, "GravityMain", 1), (None, None));
        assert!(store.connection().is_autocommit());
    }

    #[test]
    fn test_missing_table_fails_before_editing() {
        let dir = tempdir().unwrap();
        let mut store = SqliteFeatureStore::open(dir.path().join("empty.db")).unwrap();
        let updater = BatchUpdater::new(CoefficientClassifier::with_defaults());

        let result = updater.run(&mut store, &[FeatureCategory::Culvert]);
        assert!(matches!(result, Err(FlowError::Store(crate::storage::StoreError::MissingTable(_)))));
    }

    #[test]
    fn test_raw_row_mapping() {
        let record = Record {
            id: 9,
            values: vec![
                FieldValue::Integer(22),
                FieldValue::Real(36.0),
                FieldValue::Null,
                FieldValue::Real(42.5),
            ],
        };

        let raw = raw_edge_row(&record);
        assert_eq!(raw.identifier, 9);
        assert_eq!(raw.material, Some(22));
        assert_eq!(raw.height, Some(36.0));
        assert_eq!(raw.slope, None);
        assert_eq!(raw.length, Some(42.5));
        assert_eq!(raw.soft_bottom, None);
    }
}
