//! Output assembly - merged and dissolved trace paths
//!
//! The JSON assembler keeps edge references only. A merged path is the list of
//! traced edges; dissolving it collapses the list into one path record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::types::FeatureId;

#[derive(Debug)]
pub enum OutputError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// A dissolve or delete named a path that was never merged
    MissingInput(String),
    /// The output directory would hold the workspace and be wiped with it
    WorkspaceInside(PathBuf),
}

impl From<std::io::Error> for OutputError {
    fn from(err: std::io::Error) -> Self {
        OutputError::Io(err)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        OutputError::Serialization(err)
    }
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io(e) => write!(f, "IO error: {}", e),
            OutputError::Serialization(e) => write!(f, "Serialization error: {}", e),
            OutputError::MissingInput(name) => write!(f, "Output {} does not exist", name),
            OutputError::WorkspaceInside(dir) => write!(
                f,
                "Output directory {} contains the workspace; choose a separate directory",
                dir.display()
            ),
        }
    }
}

impl std::error::Error for OutputError {}

/// One edge of a merged path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedEdge {
    /// Source table (a conveyance category or the connector table)
    pub layer: String,
    pub edge_id: FeatureId,
    /// `None` for connector edges
    pub travel_time_secs: Option<f64>,
}

/// Dissolved path record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DissolvedPath {
    pub name: String,
    pub single_part: bool,
    pub layers: BTreeSet<String>,
    pub edge_count: usize,
    pub total_time_secs: f64,
    pub edges: Vec<TracedEdge>,
}

/// Output assembly collaborator
pub trait OutputAssembler {
    /// Merge `edges` into a new output named `output`
    fn merge(&mut self, edges: &[TracedEdge], output: &str) -> Result<(), OutputError>;

    /// Dissolve the merged output `path` into `output`
    fn dissolve(&mut self, path: &str, output: &str, single_part: bool) -> Result<(), OutputError>;

    /// Delete an output
    fn delete(&mut self, path: &str) -> Result<(), OutputError>;
}

/// Writes merged and dissolved paths as JSON files in one output directory
pub struct JsonPathAssembler {
    dir: PathBuf,
}

impl JsonPathAssembler {
    /// Open `dir` as the output workspace, deleting any previous contents
    pub fn create_fresh(dir: impl AsRef<Path>) -> Result<Self, OutputError> {
        let dir = dir.as_ref().to_path_buf();

        if dir.exists() {
            log::info!("🗑️  Removing existing output workspace {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        log::info!("📁 Writing trace paths to: {}", dir.display());
        Ok(Self { dir })
    }

    /// Like `create_fresh`, but refuses a directory that is or contains `workspace`
    pub fn create_fresh_for(dir: impl AsRef<Path>, workspace: impl AsRef<Path>) -> Result<Self, OutputError> {
        let dir = dir.as_ref();

        if dir.exists() && resolve(workspace.as_ref()).starts_with(resolve(dir)) {
            return Err(OutputError::WorkspaceInside(dir.to_path_buf()));
        }

        Self::create_fresh(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the output `name`
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), OutputError> {
        let file = fs::File::create(self.output_path(name))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        Ok(())
    }

    fn read_merged(&self, name: &str) -> Result<Vec<TracedEdge>, OutputError> {
        let path = self.output_path(name);
        if !path.exists() {
            return Err(OutputError::MissingInput(name.to_string()));
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl OutputAssembler for JsonPathAssembler {
    fn merge(&mut self, edges: &[TracedEdge], output: &str) -> Result<(), OutputError> {
        self.write_json(output, &edges)?;
        log::debug!("Merged {} edges into {}", edges.len(), output);
        Ok(())
    }

    fn dissolve(&mut self, path: &str, output: &str, single_part: bool) -> Result<(), OutputError> {
        let mut edges = self.read_merged(path)?;

        // Adjoining duplicates collapse into one segment
        edges.sort_by(|a, b| (a.layer.as_str(), a.edge_id).cmp(&(b.layer.as_str(), b.edge_id)));
        edges.dedup_by(|a, b| a.layer == b.layer && a.edge_id == b.edge_id);

        let dissolved = DissolvedPath {
            name: output.to_string(),
            single_part,
            layers: edges.iter().map(|e| e.layer.clone()).collect(),
            edge_count: edges.len(),
            total_time_secs: edges.iter().filter_map(|e| e.travel_time_secs).sum(),
            edges,
        };

        self.write_json(output, &dissolved)?;
        log::debug!("Dissolved {} into {}", path, output);
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), OutputError> {
        let file = self.output_path(path);
        if !file.exists() {
            return Err(OutputError::MissingInput(path.to_string()));
        }
        fs::remove_file(file)?;
        Ok(())
    }
}

/// Canonical form of `path`, falling back to its canonical parent for files not yet created
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn edge(layer: &str, id: FeatureId, time: Option<f64>) -> TracedEdge {
        TracedEdge {
            layer: layer.to_string(),
            edge_id: id,
            travel_time_secs: time,
        }
    }

    #[test]
    fn test_create_fresh_clears_previous_outputs() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("traces");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.json"), "[]").unwrap();

        let assembler = JsonPathAssembler::create_fresh(&out).unwrap();

        assert!(assembler.dir().exists());
        assert!(!out.join("stale.json").exists());
    }

    #[test]
    fn test_merge_dissolve_delete() {
        let dir = tempdir().unwrap();
        let mut assembler = JsonPathAssembler::create_fresh(dir.path().join("traces")).unwrap();

        let edges = vec![
            edge("GravityMain", 2, Some(3.0)),
            edge("PseudoLine", 1, None),
            edge("GravityMain", 1, Some(1.5)),
            edge("GravityMain", 2, Some(3.0)),
        ];

        assembler.merge(&edges, "tracePath_7").unwrap();
        assembler
            .dissolve("tracePath_7", "tracePath_7_dissolved", true)
            .unwrap();
        assembler.delete("tracePath_7").unwrap();

        assert!(!assembler.output_path("tracePath_7").exists());

        let contents = fs::read_to_string(assembler.output_path("tracePath_7_dissolved")).unwrap();
        let dissolved: DissolvedPath = serde_json::from_str(&contents).unwrap();

        assert_eq!(dissolved.name, "tracePath_7_dissolved");
        assert!(dissolved.single_part);
        assert_eq!(dissolved.edge_count, 3);
        assert_eq!(dissolved.total_time_secs, 4.5);
        assert_eq!(
            dissolved.layers.into_iter().collect::<Vec<_>>(),
            vec!["GravityMain".to_string(), "PseudoLine".to_string()]
        );
        assert_eq!(dissolved.edges[0], edge("GravityMain", 1, Some(1.5)));
    }

    #[test]
    fn test_output_dir_holding_workspace_is_refused() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let workspace = data.join("stormdrain.db");
        let _store = crate::storage::SqliteFeatureStore::open(&workspace).unwrap();

        for output in [data.clone(), dir.path().to_path_buf(), data.join(".")] {
            let result = JsonPathAssembler::create_fresh_for(&output, &workspace);
            assert!(matches!(result, Err(OutputError::WorkspaceInside(_))), "{}", output.display());
        }
        assert!(workspace.exists());

        let assembler = JsonPathAssembler::create_fresh_for(data.join("traces"), &workspace).unwrap();
        assert!(assembler.dir().exists());
        assert!(workspace.exists());
    }

    #[test]
    fn test_dissolve_missing_input() {
        let dir = tempdir().unwrap();
        let mut assembler = JsonPathAssembler::create_fresh(dir.path()).unwrap();

        let result = assembler.dissolve("tracePath_1", "tracePath_1_dissolved", true);
        assert!(matches!(result, Err(OutputError::MissingInput(name)) if name == "tracePath_1"));
        assert!(matches!(assembler.delete("nothing"), Err(OutputError::MissingInput(_))));
    }
}
