//! SQLite network tracer
//!
//! Walks the `FROM_NODE`/`TO_NODE` columns stored on each line table. The
//! connectivity is read as-is; this tracer does not build or repair topology.
//!
//! Every trace leaves a per-flag subset table in the connection's temp schema
//! (`trace_subset_<flag>`), listing the traced edges by layer. `release` drops it.

use rusqlite::{params, Connection, OpenFlags};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use super::trace::{NetworkTracer, TraceDirection, TraceError, TraceResult};
use crate::storage::schema::{CONNECTOR_TABLE, FROM_NODE, NODE_ID, OBJECT_ID, TO_NODE};
use crate::storage::sqlite_store::quote_ident;
use crate::types::{FeatureCategory, FeatureId, SourcePoint};

type NodeId = i64;

/// Line layer an edge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Layer {
    Conveyance(FeatureCategory),
    Connector,
}

impl Layer {
    fn table(&self) -> &'static str {
        match self {
            Layer::Conveyance(category) => category.as_str(),
            Layer::Connector => CONNECTOR_TABLE,
        }
    }

    fn all() -> Vec<Layer> {
        let mut layers: Vec<Layer> = FeatureCategory::all().into_iter().map(Layer::Conveyance).collect();
        layers.push(Layer::Connector);
        layers
    }
}

#[derive(Debug, Clone, Copy)]
struct LineEdge {
    layer: Layer,
    id: FeatureId,
    from_node: NodeId,
    to_node: NodeId,
}

/// Lines leaving each node, loaded once per tracer
#[derive(Debug, Default)]
struct NetworkIndex {
    outgoing: HashMap<NodeId, Vec<LineEdge>>,
}

impl NetworkIndex {
    fn load(conn: &Connection) -> Result<Self, TraceError> {
        let mut index = NetworkIndex::default();
        let mut loaded = 0usize;

        for layer in Layer::all() {
            if !table_exists(conn, layer.table())? {
                log::debug!("Layer {} not in workspace, skipping", layer.table());
                continue;
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT \"{}\", \"{}\", \"{}\" FROM \"{}\" WHERE \"{}\" IS NOT NULL AND \"{}\" IS NOT NULL",
                OBJECT_ID,
                FROM_NODE,
                TO_NODE,
                layer.table(),
                FROM_NODE,
                TO_NODE
            ))?;

            let rows = stmt.query_map([], |row| {
                Ok(LineEdge {
                    layer,
                    id: row.get(0)?,
                    from_node: row.get(1)?,
                    to_node: row.get(2)?,
                })
            })?;

            for edge in rows {
                let edge = edge?;
                index.outgoing.entry(edge.from_node).or_default().push(edge);
                loaded += 1;
            }
        }

        log::info!("🕸️  Loaded network index: {} lines", loaded);
        Ok(index)
    }

    fn next_edges(&self, node: NodeId, direction: TraceDirection) -> &[LineEdge] {
        match direction {
            TraceDirection::Downstream => self.outgoing.get(&node).map(Vec::as_slice).unwrap_or(&[]),
        }
    }
}

pub struct SqliteNetworkTracer {
    conn: Connection,
    flag_table: String,
    index: Option<NetworkIndex>,
}

impl SqliteNetworkTracer {
    /// Open a tracer on its own connection to the workspace
    ///
    /// The workspace must already exist. Only the temp schema is written.
    pub fn open(db_path: impl AsRef<Path>, flag_table: &str) -> Result<Self, TraceError> {
        let conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn, flag_table))
    }

    pub fn from_connection(conn: Connection, flag_table: &str) -> Self {
        Self {
            conn,
            flag_table: flag_table.to_string(),
            index: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn flag_node(&self, flag: &SourcePoint) -> Result<NodeId, TraceError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            quote_ident(NODE_ID)?,
            quote_ident(&self.flag_table)?,
            quote_ident(OBJECT_ID)?
        );

        let node: Option<Option<NodeId>> = match self.conn.query_row(&sql, [flag.identifier], |row| row.get(0)) {
            Ok(node) => Some(node),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match node {
            None => Err(TraceError::FlagNotFound(flag.identifier)),
            Some(None) => Err(TraceError::NotOnNetwork(flag.identifier)),
            Some(Some(node)) => Ok(node),
        }
    }

    fn write_subset(&self, flag: &SourcePoint, result: &TraceResult) -> Result<(), TraceError> {
        let table = subset_table(flag.identifier);
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS temp.\"{0}\";
             CREATE TEMP TABLE \"{0}\" (layer TEXT NOT NULL, OBJECTID INTEGER NOT NULL);",
            table
        ))?;

        let mut stmt = self
            .conn
            .prepare(&format!("INSERT INTO temp.\"{}\" (layer, OBJECTID) VALUES (?1, ?2)", table))?;
        for (category, ids) in &result.reachable {
            for id in ids {
                stmt.execute(params![category.as_str(), id])?;
            }
        }
        for id in &result.connectors {
            stmt.execute(params![CONNECTOR_TABLE, id])?;
        }

        Ok(())
    }
}

impl NetworkTracer for SqliteNetworkTracer {
    fn trace(&mut self, flag: &SourcePoint, direction: TraceDirection) -> Result<TraceResult, TraceError> {
        if self.index.is_none() {
            self.index = Some(NetworkIndex::load(&self.conn)?);
        }

        let start = self.flag_node(flag)?;
        let index = match &self.index {
            Some(index) => index,
            None => return Err(TraceError::Backend("network index not loaded".to_string())),
        };

        let mut result = TraceResult::new();
        let mut visited_nodes: HashSet<NodeId> = HashSet::from([start]);
        let mut queue: VecDeque<NodeId> = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for edge in index.next_edges(node, direction) {
                match edge.layer {
                    Layer::Conveyance(category) => result.insert(category, edge.id),
                    Layer::Connector => {
                        result.connectors.insert(edge.id);
                    }
                }

                if visited_nodes.insert(edge.to_node) {
                    queue.push_back(edge.to_node);
                }
            }
        }

        self.write_subset(flag, &result)?;

        log::debug!(
            "Traced flag {} {}: {} edges",
            flag.identifier,
            direction.as_str(),
            result.edge_count()
        );

        Ok(result)
    }

    fn release(&mut self, flag: &SourcePoint, _result: Option<TraceResult>) -> Result<(), TraceError> {
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS temp.\"{}\"",
            subset_table(flag.identifier)
        ))?;
        Ok(())
    }
}

fn subset_table(flag_id: FeatureId) -> String {
    if flag_id < 0 {
        format!("trace_subset_m{}", flag_id.unsigned_abs())
    } else {
        format!("trace_subset_{}", flag_id)
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, TraceError> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    Ok(stmt.exists([table])?)
}
