//! Velocity Binary - Manning velocity and flow time for every conveyance edge
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin velocity
//! ```
//!
//! ## Environment Variables
//!
//! - STORMFLOW_WORKSPACE - SQLite workspace (default: data/stormdrain.db)
//! - STORMFLOW_CATEGORIES - Conveyance tables to calculate (default: all four)
//! - STORMFLOW_MATERIAL_TABLE - JSON material table (default: built-in)
//! - STORMFLOW_SCHEMA_DIR - Apply `.sql` files from this directory first (optional)
//! - RUST_LOG - Logging level (optional, default: info)

use std::sync::Arc;

use stormflow::hydraulics::CoefficientClassifier;
use stormflow::storage::{run_schema_migrations, SqliteFeatureStore};
use stormflow::{BatchUpdater, FlowConfig};

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = FlowConfig::from_env()?;

    log::info!("🚀 Starting velocity calculation");
    log::info!("   Workspace: {}", config.workspace_path.display());
    log::info!(
        "   Categories: {}",
        config.categories.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
    );

    let table = Arc::new(config.load_material_table()?);
    let mut store = SqliteFeatureStore::open(&config.workspace_path)?;

    if let Some(schema_dir) = &config.schema_dir {
        run_schema_migrations(store.connection(), schema_dir)?;
    }

    let updater = BatchUpdater::new(CoefficientClassifier::new(table));
    let report = updater.run(&mut store, &config.categories)?;

    if !report.diagnostics.is_empty() {
        log::warn!("⚠️  {} edges have invalid inputs and were zeroed", report.diagnostics.len());
    }
    log::debug!("Report: {}", serde_json::to_string(&report)?);

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let result = run();
    if let Err(e) = &result {
        log::error!("❌ Velocity run failed: {}", e);
    }

    log::info!("🏁 Script complete");
    result
}
