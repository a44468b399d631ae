//! Storm drain workspace schema: field names and the SQL migration loader

use rusqlite::Connection;
use std::fs;
use std::path::Path;

use super::backend::StoreError;

/// Row identifier on every feature table
pub const OBJECT_ID: &str = "OBJECTID";
pub const MATERIAL: &str = "MATERIAL";
pub const DIAMETER_HEIGHT: &str = "DIAMETER_HEIGHT";
pub const SLOPE: &str = "SLOPE";
pub const SHAPE_LENGTH: &str = "SHAPE_Length";
/// Open channels only
pub const SOFT_BOTTOM: &str = "SOFT_BOTTOM";
pub const FROM_NODE: &str = "FROM_NODE";
pub const TO_NODE: &str = "TO_NODE";
/// Junction a flag sits on
pub const NODE_ID: &str = "NODE_ID";

/// Output fields added to conveyance tables by the velocity run
pub const VELOCITY_FPS: &str = "Velocity_fps";
pub const FLOW_TIME_SECS: &str = "FlowTime_secs";
/// Output field added to the flag table by the trace run
pub const FLAG_FLOW_TIME: &str = "FlowTime";

/// Connector lines with no calculated travel time
pub const CONNECTOR_TABLE: &str = "PseudoLine";

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir` in name order (`00_`, `01_`, ...) and
/// executes them. Every file must use `IF NOT EXISTS` so reruns are harmless.
pub fn run_schema_migrations(conn: &Connection, schema_dir: impl AsRef<Path>) -> Result<(), StoreError> {
    let schema_path = schema_dir.as_ref();

    if !schema_path.exists() {
        return Err(StoreError::Database(format!(
            "Schema directory not found: {}",
            schema_path.display()
        )));
    }

    let io_err = |e: std::io::Error| StoreError::Database(format!("{}: {}", schema_path.display(), e));

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_path.display());

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path).map_err(io_err)?;
        conn.execute_batch(&sql_content)?;

        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}
