//! Feature store interface consumed by the velocity and trace runs
//!
//! Defines the interface for reading and writing feature attribute rows inside an
//! all-or-nothing edit session.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::FeatureId;

#[derive(Debug)]
pub enum StoreError {
    Database(String),
    MissingTable(String),
    MissingField { table: String, field: String },
    MissingRow { table: String, id: FeatureId },
    /// Read or write attempted without an open edit operation
    NoActiveOperation,
    /// An edit operation was begun twice
    OperationInProgress,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::MissingTable(t) => write!(f, "Table not found: {}", t),
            StoreError::MissingField { table, field } => {
                write!(f, "Field {} not found on {}", field, table)
            }
            StoreError::MissingRow { table, id } => write!(f, "No row {} in {}", id, table),
            StoreError::NoActiveOperation => write!(f, "No edit operation in progress"),
            StoreError::OperationInProgress => write!(f, "Edit operation already in progress"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Column types that can be added to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    Integer,
    Text,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Float => "REAL",
            FieldType::Integer => "INTEGER",
            FieldType::Text => "TEXT",
        }
    }
}

/// One attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric value; blank or whitespace text counts as missing
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

static NULL_VALUE: FieldValue = FieldValue::Null;

/// A row read through an edit session, keyed by its feature id
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: FeatureId,
    /// Values in the order of the requested field names
    pub values: Vec<FieldValue>,
}

impl Record {
    pub fn get(&self, idx: usize) -> &FieldValue {
        self.values.get(idx).unwrap_or(&NULL_VALUE)
    }
}

/// Edit session settings
///
/// File workspaces are edited without an undo stack and unversioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditOptions {
    pub undo_stack: bool,
    pub versioned: bool,
}

/// Storage collaborator
///
/// Schema changes take `&mut self`, and an `EditSession` borrows the store, so fields
/// can only be added while no edit session is alive.
pub trait FeatureStore {
    /// Names of all fields on `table`
    fn list_fields(&self, table: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Add a nullable field to `table`
    fn add_field(&mut self, table: &str, field: &str, field_type: FieldType) -> Result<(), StoreError>;

    /// Open an edit session over the whole workspace
    fn start_editing(&mut self, options: EditOptions) -> Result<Box<dyn EditSession + '_>, StoreError>;

    /// Add `fields` to `table` unless already present. Returns the names added.
    fn ensure_fields(
        &mut self,
        table: &str,
        fields: &[(&str, FieldType)],
    ) -> Result<Vec<String>, StoreError> {
        let existing = self.list_fields(table)?;
        let mut added = Vec::new();

        for (field, field_type) in fields {
            if !existing.contains(*field) {
                log::info!("➕ Adding {} to {}...", field, table);
                self.add_field(table, field, *field_type)?;
                added.push(field.to_string());
            }
        }

        Ok(added)
    }
}

/// Transaction scoped to one run
///
/// Reads and writes are only valid between `begin_operation` and `commit`/`rollback`.
/// Dropping a session with an open operation rolls it back.
pub trait EditSession {
    fn begin_operation(&mut self) -> Result<(), StoreError>;

    /// Read every row of `table`, returning the requested fields in order
    fn read_rows(&mut self, table: &str, fields: &[&str]) -> Result<Vec<Record>, StoreError>;

    /// Assign `values` to the row with feature id `id`
    fn update_row(
        &mut self,
        table: &str,
        id: FeatureId,
        values: &[(&str, FieldValue)],
    ) -> Result<(), StoreError>;

    /// Save all edits made since `begin_operation`
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard all edits made since `begin_operation`
    fn rollback(&mut self) -> Result<(), StoreError>;

    fn is_active(&self) -> bool;
}
