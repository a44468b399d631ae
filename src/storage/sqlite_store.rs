//! SQLite feature store
//!
//! One SQLite file is one workspace. An edit session is a single
//! `BEGIN IMMEDIATE` ... `COMMIT` transaction on the workspace connection.

use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::backend::{EditOptions, EditSession, FeatureStore, FieldType, FieldValue, Record, StoreError};
use super::schema::OBJECT_ID;
use crate::types::FeatureId;

pub struct SqliteFeatureStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteFeatureStore {
    /// Open (or create) the workspace at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(format!(
                    "Failed to create workspace directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        log::info!("✅ Opened workspace {}", path.display());

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying connection, for schema migrations and inspection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl FeatureStore for SqliteFeatureStore {
    fn list_fields(&self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        table_fields(&self.conn, table)
    }

    fn add_field(&mut self, table: &str, field: &str, field_type: FieldType) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            return Err(StoreError::OperationInProgress);
        }

        // Validates the table name as a side effect
        table_fields(&self.conn, table)?;

        self.conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table)?,
            quote_ident(field)?,
            field_type.sql_type()
        ))?;

        Ok(())
    }

    fn start_editing(&mut self, options: EditOptions) -> Result<Box<dyn EditSession + '_>, StoreError> {
        if options.versioned {
            log::warn!("⚠️  SQLite workspaces are not versioned; editing {} directly", self.path.display());
        }
        if options.undo_stack {
            log::debug!("Undo stack requested; SQLite sessions keep none");
        }

        Ok(Box::new(SqliteEditSession {
            conn: &mut self.conn,
            active: false,
        }))
    }
}

/// Edit session over a borrowed workspace connection
pub struct SqliteEditSession<'a> {
    conn: &'a mut Connection,
    active: bool,
}

impl SqliteEditSession<'_> {
    fn require_active(&self) -> Result<(), StoreError> {
        if self.active {
            Ok(())
        } else {
            Err(StoreError::NoActiveOperation)
        }
    }
}

impl EditSession for SqliteEditSession<'_> {
    fn begin_operation(&mut self) -> Result<(), StoreError> {
        if self.active {
            return Err(StoreError::OperationInProgress);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.active = true;
        Ok(())
    }

    fn read_rows(&mut self, table: &str, fields: &[&str]) -> Result<Vec<Record>, StoreError> {
        self.require_active()?;

        let existing = table_fields(self.conn, table)?;
        for field in fields {
            if !existing.contains(*field) {
                return Err(StoreError::MissingField {
                    table: table.to_string(),
                    field: field.to_string(),
                });
            }
        }

        let mut columns = vec![quote_ident(OBJECT_ID)?];
        for field in fields {
            columns.push(quote_ident(field)?);
        }

        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            quote_ident(table)?,
            quote_ident(OBJECT_ID)?
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let id: FeatureId = row.get(0)?;
            let mut values = Vec::with_capacity(fields.len());
            for idx in 1..=fields.len() {
                values.push(from_value_ref(row.get_ref(idx)?));
            }
            Ok(Record { id, values })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    fn update_row(
        &mut self,
        table: &str,
        id: FeatureId,
        values: &[(&str, FieldValue)],
    ) -> Result<(), StoreError> {
        self.require_active()?;

        if values.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(values.len());
        for (idx, (field, _)) in values.iter().enumerate() {
            assignments.push(format!("{} = ?{}", quote_ident(field)?, idx + 1));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(table)?,
            assignments.join(", "),
            quote_ident(OBJECT_ID)?,
            values.len() + 1
        );

        let mut params: Vec<Value> = values.iter().map(|(_, v)| to_sql_value(v)).collect();
        params.push(Value::Integer(id));

        let changed = self.conn.execute(&sql, params_from_iter(params))?;
        if changed == 0 {
            return Err(StoreError::MissingRow {
                table: table.to_string(),
                id,
            });
        }

        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.require_active()?;
        self.conn.execute_batch("COMMIT")?;
        self.active = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.require_active()?;
        self.conn.execute_batch("ROLLBACK")?;
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for SqliteEditSession<'_> {
    fn drop(&mut self) {
        if self.active {
            log::warn!("⚠️  Edit session dropped with open operation, rolling back");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::error!("Rollback on drop failed: {}", e);
            }
        }
    }
}

/// Field names of `table`, or `MissingTable`
pub(crate) fn table_fields(conn: &Connection, table: &str) -> Result<BTreeSet<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)?))?;
    let fields = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<BTreeSet<_>, _>>()?;

    if fields.is_empty() {
        return Err(StoreError::MissingTable(table.to_string()));
    }
    Ok(fields)
}

/// Quote a table or field name, accepting only plain identifiers
pub(crate) fn quote_ident(name: &str) -> Result<String, StoreError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(format!("\"{}\"", name))
    } else {
        Err(StoreError::Database(format!("invalid identifier '{}'", name)))
    }
}

fn from_value_ref(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(v) => FieldValue::Integer(v),
        ValueRef::Real(v) => FieldValue::Real(v),
        ValueRef::Text(bytes) => FieldValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => FieldValue::Null,
    }
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(v) => Value::Integer(*v),
        FieldValue::Real(v) => Value::Real(*v),
        FieldValue::Text(s) => Value::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_store() -> (tempfile::TempDir, SqliteFeatureStore) {
        let dir = tempdir().unwrap();
        let store = SqliteFeatureStore::open(dir.path().join("workspace.db")).unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TABLE GravityMain (OBJECTID INTEGER PRIMARY KEY, MATERIAL INTEGER, SLOPE REAL);
                 INSERT INTO GravityMain VALUES (1, 1, 0.02), (2, 98, NULL);",
            )
            .unwrap();
        (dir, store)
    }

    #[test]
    fn test_list_and_add_fields() {
        let (_dir, mut store) = create_test_store();

        let fields = store.list_fields("GravityMain").unwrap();
        assert!(fields.contains("MATERIAL"));
        assert!(!fields.contains("Velocity_fps"));

        store.add_field("GravityMain", "Velocity_fps", FieldType::Float).unwrap();
        assert!(store.list_fields("GravityMain").unwrap().contains("Velocity_fps"));
    }

    #[test]
    fn test_ensure_fields_is_idempotent() {
        let (_dir, mut store) = create_test_store();
        let wanted = [("Velocity_fps", FieldType::Float), ("FlowTime_secs", FieldType::Float)];

        let added = store.ensure_fields("GravityMain", &wanted).unwrap();
        assert_eq!(added, vec!["Velocity_fps".to_string(), "FlowTime_secs".to_string()]);

        let added = store.ensure_fields("GravityMain", &wanted).unwrap();
        assert!(added.is_empty());
    }

    #[test]
    fn test_missing_table() {
        let (_dir, store) = create_test_store();
        assert!(matches!(store.list_fields("Swale"), Err(StoreError::MissingTable(_))));
    }

    #[test]
    fn test_read_requires_operation() {
        let (_dir, mut store) = create_test_store();
        let mut session = store.start_editing(EditOptions::default()).unwrap();

        assert!(matches!(
            session.read_rows("GravityMain", &["MATERIAL"]),
            Err(StoreError::NoActiveOperation)
        ));
    }

    #[test]
    fn test_read_rows_in_field_order() {
        let (_dir, mut store) = create_test_store();
        let mut session = store.start_editing(EditOptions::default()).unwrap();
        session.begin_operation().unwrap();

        let rows = session.read_rows("GravityMain", &["SLOPE", "MATERIAL"]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].values, vec![FieldValue::Real(0.02), FieldValue::Integer(1)]);
        assert_eq!(rows[1].values, vec![FieldValue::Null, FieldValue::Integer(98)]);

        let err = session.read_rows("GravityMain", &["DIAMETER_HEIGHT"]).unwrap_err();
        assert!(matches!(err, StoreError::MissingField { .. }));
    }

    #[test]
    fn test_commit_persists_updates() {
        let (_dir, mut store) = create_test_store();
        {
            let mut session = store.start_editing(EditOptions::default()).unwrap();
            session.begin_operation().unwrap();
            session
                .update_row("GravityMain", 1, &[("SLOPE", FieldValue::Real(0.05))])
                .unwrap();
            session.commit().unwrap();
            assert!(!session.is_active());
        }

        let slope: f64 = store
            .connection()
            .query_row("SELECT SLOPE FROM GravityMain WHERE OBJECTID = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(slope, 0.05);
    }

    #[test]
    fn test_rollback_discards_updates() {
        let (_dir, mut store) = create_test_store();
        {
            let mut session = store.start_editing(EditOptions::default()).unwrap();
            session.begin_operation().unwrap();
            session
                .update_row("GravityMain", 1, &[("SLOPE", FieldValue::Real(0.05))])
                .unwrap();
            session.rollback().unwrap();
        }

        let slope: f64 = store
            .connection()
            .query_row("SELECT SLOPE FROM GravityMain WHERE OBJECTID = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(slope, 0.02);
    }

    #[test]
    fn test_drop_rolls_back_open_operation() {
        let (_dir, mut store) = create_test_store();
        {
            let mut session = store.start_editing(EditOptions::default()).unwrap();
            session.begin_operation().unwrap();
            session
                .update_row("GravityMain", 2, &[("MATERIAL", FieldValue::Integer(5))])
                .unwrap();
        }

        let material: i64 = store
            .connection()
            .query_row("SELECT MATERIAL FROM GravityMain WHERE OBJECTID = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(material, 98);
        assert!(store.connection().is_autocommit());
    }

    #[test]
    fn test_update_missing_row() {
        let (_dir, mut store) = create_test_store();
        let mut session = store.start_editing(EditOptions::default()).unwrap();
        session.begin_operation().unwrap();

        let err = session
            .update_row("GravityMain", 42, &[("SLOPE", FieldValue::Real(0.01))])
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingRow { id: 42, .. }));
    }

    #[test]
    fn test_begin_twice_rejected() {
        let (_dir, mut store) = create_test_store();
        let mut session = store.start_editing(EditOptions::default()).unwrap();
        session.begin_operation().unwrap();

        assert!(matches!(session.begin_operation(), Err(StoreError::OperationInProgress)));
    }

    #[test]
    fn test_quote_ident_rejects_injection() {
        assert_eq!(quote_ident("GravityMain").unwrap(), "\"GravityMain\"");
        assert!(quote_ident("x\"; DROP TABLE t; --").is_err());
        assert!(quote_ident("").is_err());
        assert!(quote_ident("1abc").is_err());
    }
}
