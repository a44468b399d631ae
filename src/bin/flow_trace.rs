//! Flow Trace Binary - total downstream flow time for every flag
//!
//! Run `velocity` first; edges without a flow time count as 0s.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin flow_trace
//! cargo run --release --bin flow_trace -- --output data/traces
//! ```
//!
//! ## Environment Variables
//!
//! - STORMFLOW_WORKSPACE - SQLite workspace (default: data/stormdrain.db)
//! - STORMFLOW_FLAG_TABLE - Flag point table (default: CatchBasin)
//! - STORMFLOW_CATEGORIES - Conveyance tables to aggregate (default: all four)
//! - STORMFLOW_OUTPUT_DIR - Write dissolved trace paths here (optional, `--output` wins)
//! - STORMFLOW_SCHEMA_DIR - Apply `.sql` files from this directory first (optional)
//! - RUST_LOG - Logging level (optional, default: info)

use std::env;

use stormflow::config::parse_output_from_args;
use stormflow::network::{JsonPathAssembler, OutputAssembler, SqliteNetworkTracer, TraceOrchestrator};
use stormflow::storage::{run_schema_migrations, SqliteFeatureStore};
use stormflow::FlowConfig;

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = FlowConfig::from_env()?;

    let args: Vec<String> = env::args().collect();
    if let Some(dir) = parse_output_from_args(&args) {
        config.output_dir = Some(dir);
    }

    log::info!("🚀 Starting flow trace");
    log::info!("   Workspace: {}", config.workspace_path.display());
    log::info!("   Flags: {}", config.flag_table);
    match &config.output_dir {
        Some(dir) => log::info!("   Output: {}", dir.display()),
        None => log::info!("   Output: disabled"),
    }

    let mut store = SqliteFeatureStore::open(&config.workspace_path)?;
    if let Some(schema_dir) = &config.schema_dir {
        run_schema_migrations(store.connection(), schema_dir)?;
    }

    let mut tracer = SqliteNetworkTracer::open(&config.workspace_path, &config.flag_table)?;
    let mut assembler = match &config.output_dir {
        Some(dir) => Some(JsonPathAssembler::create_fresh_for(dir, &config.workspace_path)?),
        None => None,
    };

    let orchestrator = TraceOrchestrator::new(config.flag_table.clone(), config.categories.clone());
    let report = orchestrator.run(
        &mut store,
        &mut tracer,
        assembler.as_mut().map(|a| a as &mut dyn OutputAssembler),
    )?;

    for outcome in report.outcomes.iter().filter(|o| !o.is_done()) {
        log::warn!("⚠️  Flag {} was not traced", outcome.flag_id());
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
        log::error!("❌ Flow trace failed: {}", e);
    }

    log::info!("🏁 Script complete");
    result
}
