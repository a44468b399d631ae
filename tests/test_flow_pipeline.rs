//! End-to-end: velocity run, then flag traces over the same SQLite workspace

use std::path::PathBuf;

use stormflow::hydraulics::{compute_flow, CoefficientClassifier};
use stormflow::network::{
    DissolvedPath, JsonPathAssembler, OutputAssembler, SourcePointOutcome, SqliteNetworkTracer,
    TraceOrchestrator,
};
use stormflow::storage::{run_schema_migrations, SqliteFeatureStore};
use stormflow::{BatchUpdater, FeatureCategory, FlowError};
use tempfile::{tempdir, TempDir};

fn schema_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sql")
}

/// ```text
/// LL 1: 30 → 10
/// basin 1 @ 10 ─GM 1→ 11 ─PL 1→ 12 ─OC 1 (soft)→ 13 ─CV 1 (material 98)→ 14
/// basin 2 @ 99 (no lines)
/// basin 3 not placed
/// ```
fn create_workspace() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("stormdrain.db");

    let store = SqliteFeatureStore::open(&db_path).unwrap();
    run_schema_migrations(store.connection(), schema_dir()).unwrap();
    store
        .connection()
        .execute_batch(
            r#"
            INSERT INTO GravityMain (OBJECTID, MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_Length, FROM_NODE, TO_NODE)
            VALUES (1, 1, 24.0, 0.03, 100.0, 10, 11);
            INSERT INTO LateralLine (OBJECTID, MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_Length, FROM_NODE, TO_NODE)
            VALUES (1, 2, 8.0, 0.02, 40.0, 30, 10);
            INSERT INTO PseudoLine (OBJECTID, SHAPE_Length, FROM_NODE, TO_NODE)
            VALUES (1, 5.0, 11, 12);
            INSERT INTO OpenChannel (OBJECTID, MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_Length, SOFT_BOTTOM, FROM_NODE, TO_NODE)
            VALUES (1, 1, 24.0, 0.03, 50.0, 'Y', 12, 13);
            INSERT INTO Culvert (OBJECTID, MATERIAL, DIAMETER_HEIGHT, SLOPE, SHAPE_Length, FROM_NODE, TO_NODE)
            VALUES (1, 98, 36.0, 0.01, 20.0, 13, 14);
            INSERT INTO CatchBasin (OBJECTID, NODE_ID) VALUES (1, 10), (2, 99), (3, NULL);
            "#,
        )
        .unwrap();

    (dir, db_path)
}

fn flag_time(store: &SqliteFeatureStore, id: i64) -> Option<f64> {
    store
        .connection()
        .query_row("SELECT FlowTime FROM CatchBasin WHERE OBJECTID = ?1", [id], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_velocity_then_trace() {
    let (dir, db_path) = create_workspace();
    let mut store = SqliteFeatureStore::open(&db_path).unwrap();

    let report = BatchUpdater::new(CoefficientClassifier::with_defaults())
        .run(&mut store, &FeatureCategory::all())
        .unwrap();
    assert_eq!(report.total_calculated(), 3);
    assert_eq!(report.total_zeroed(), 1);
    assert_eq!(
        report.diagnostics[0].to_string(),
        "Path: Culvert Objectid-1 has an invalid material value of 98."
    );

    let mut tracer = SqliteNetworkTracer::open(&db_path, "CatchBasin").unwrap();
    let mut assembler = JsonPathAssembler::create_fresh(dir.path().join("traces")).unwrap();
    let orchestrator = TraceOrchestrator::new("CatchBasin", FeatureCategory::all().to_vec());

    let trace_report = orchestrator
        .run(&mut store, &mut tracer, Some(&mut assembler as &mut dyn OutputAssembler))
        .unwrap();

    let main_time = compute_flow(24.0, 0.03, 100.0, 0.012).unwrap().travel_time_secs;
    let channel_time = compute_flow(24.0, 0.03, 50.0, 0.025).unwrap().travel_time_secs;
    let expected = main_time + channel_time;

    let total = flag_time(&store, 1).unwrap();
    assert!((total - expected).abs() < 1e-9, "got {}, expected {}", total, expected);
    assert_eq!(flag_time(&store, 2), Some(0.0));
    assert_eq!(flag_time(&store, 3), None);

    assert_eq!(trace_report.completed(), 2);
    assert!(matches!(trace_report.outcome(3), Some(SourcePointOutcome::Failed { .. })));

    match trace_report.outcome(1) {
        Some(SourcePointOutcome::Done { contributing, output, .. }) => {
            // The zeroed culvert still contributes; the upstream lateral does not
            assert_eq!(
                contributing.iter().copied().collect::<Vec<_>>(),
                vec![FeatureCategory::GravityMain, FeatureCategory::OpenChannel, FeatureCategory::Culvert]
            );
            assert_eq!(output.as_deref(), Some("tracePath_1_dissolved"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert!(!assembler.output_path("tracePath_1").exists());
    assert!(!assembler.output_path("tracePath_2_dissolved").exists());

    let contents = std::fs::read_to_string(assembler.output_path("tracePath_1_dissolved")).unwrap();
    let dissolved: DissolvedPath = serde_json::from_str(&contents).unwrap();
    assert_eq!(dissolved.edge_count, 4);
    assert!(dissolved.layers.contains("PseudoLine"));
    assert!((dissolved.total_time_secs - expected).abs() < 1e-9);

    let subsets: i64 = tracer
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE name LIKE 'trace_subset_%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(subsets, 0);
}

#[test]
fn test_trace_without_velocity_counts_zero() {
    let (_dir, db_path) = create_workspace();
    let mut store = SqliteFeatureStore::open(&db_path).unwrap();
    let mut tracer = SqliteNetworkTracer::open(&db_path, "CatchBasin").unwrap();

    let report = TraceOrchestrator::new("CatchBasin", FeatureCategory::all().to_vec())
        .run(&mut store, &mut tracer, None)
        .unwrap();

    assert_eq!(report.completed(), 2);
    assert_eq!(flag_time(&store, 1), Some(0.0));
}

#[test]
fn test_missing_flag_table_is_fatal() {
    let (_dir, db_path) = create_workspace();
    let mut store = SqliteFeatureStore::open(&db_path).unwrap();
    let mut tracer = SqliteNetworkTracer::open(&db_path, "Inlet").unwrap();

    let result = TraceOrchestrator::new("Inlet", FeatureCategory::all().to_vec()).run(&mut store, &mut tracer, None);

    assert!(matches!(result, Err(FlowError::Store(_))));
}
