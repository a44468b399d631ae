//! Feature storage
//!
//! - `backend` - store and edit-session traits, field values, `StoreError`
//! - `schema` - field names and the `sql/` migration loader
//! - `sqlite_store` - SQLite workspace implementation

pub mod backend;
pub mod schema;
pub mod sqlite_store;

pub use backend::{EditOptions, EditSession, FeatureStore, FieldType, FieldValue, Record, StoreError};
pub use schema::run_schema_migrations;
pub use sqlite_store::SqliteFeatureStore;
