//! Run configuration from environment variables
//!
//! Both binaries call `dotenv::dotenv().ok()` first, so a `.env` file next to the
//! workspace works as well as exported variables.

use std::env;
use std::path::PathBuf;

use crate::hydraulics::MaterialTable;
use crate::types::FeatureCategory;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration shared by the velocity and trace runs
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// SQLite workspace holding the storm drain feature tables
    pub workspace_path: PathBuf,

    /// Output directory for dissolved trace paths. `None` disables output assembly.
    pub output_dir: Option<PathBuf>,

    /// Point table used as trace flags
    pub flag_table: String,

    /// Conveyance categories to calculate and aggregate
    pub categories: Vec<FeatureCategory>,

    /// Optional JSON file replacing the built-in material table
    pub material_table_path: Option<PathBuf>,

    /// Optional directory of `.sql` schema files to apply before running
    pub schema_dir: Option<PathBuf>,
}

impl FlowConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STORMFLOW_WORKSPACE` (default: data/stormdrain.db)
    /// - `STORMFLOW_OUTPUT_DIR` (default: unset, no trace outputs)
    /// - `STORMFLOW_FLAG_TABLE` (default: CatchBasin)
    /// - `STORMFLOW_CATEGORIES` (default: GravityMain,LateralLine,OpenChannel,Culvert)
    /// - `STORMFLOW_MATERIAL_TABLE` (default: built-in table)
    /// - `STORMFLOW_SCHEMA_DIR` (default: unset, no migrations)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let categories = match non_empty("STORMFLOW_CATEGORIES") {
            Some(list) => parse_categories(&list)?,
            None => FeatureCategory::all().to_vec(),
        };

        Ok(Self {
            workspace_path: non_empty("STORMFLOW_WORKSPACE")
                .unwrap_or_else(|| "data/stormdrain.db".to_string())
                .into(),
            output_dir: non_empty("STORMFLOW_OUTPUT_DIR").map(PathBuf::from),
            flag_table: non_empty("STORMFLOW_FLAG_TABLE").unwrap_or_else(|| "CatchBasin".to_string()),
            categories,
            material_table_path: non_empty("STORMFLOW_MATERIAL_TABLE").map(PathBuf::from),
            schema_dir: non_empty("STORMFLOW_SCHEMA_DIR").map(PathBuf::from),
        })
    }

    /// Material table for this run: the configured file, or the built-in defaults
    pub fn load_material_table(&self) -> Result<MaterialTable, ConfigError> {
        match &self.material_table_path {
            Some(path) => MaterialTable::from_json_file(path),
            None => Ok(MaterialTable::default()),
        }
    }

    pub fn output_enabled(&self) -> bool {
        self.output_dir.is_some()
    }
}

fn parse_categories(list: &str) -> Result<Vec<FeatureCategory>, ConfigError> {
    let mut categories = Vec::new();

    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let category = FeatureCategory::from_str(name).ok_or_else(|| {
            ConfigError::InvalidValue(format!("unknown feature category '{}'", name))
        })?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    if categories.is_empty() {
        return Err(ConfigError::InvalidValue(
            "STORMFLOW_CATEGORIES lists no categories".to_string(),
        ));
    }

    Ok(categories)
}

/// Scan command-line arguments for `--output <dir>`
pub fn parse_output_from_args(args: &[String]) -> Option<PathBuf> {
    let idx = args.iter().position(|x| x == "--output")?;
    args.get(idx + 1)
        .filter(|v| !v.starts_with("--"))
        .map(PathBuf::from)
}
