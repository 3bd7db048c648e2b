//! Warehouse destination.
//!
//! Extracted records are handed to a [`Destination`], which infers the table
//! schema from the records, writes them with the object's write disposition
//! and tracks load history.
//!
//! # Architecture
//!
//! ```text
//!      Vec<Record> + disposition + primary key
//!                     ↓
//! ┌─────────────────────────────────────────┐
//! │       Destination (trait)                │
//! │  - Infer columns, add new ones           │
//! │  - Merge / replace / append              │
//! │  - Record load + schema version          │
//! └─────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────┐
//! │       SQLite dataset                     │
//! │  - One table per object                  │
//! │  - _loads, _schema_versions              │
//! └─────────────────────────────────────────┘
//! ```

mod schema;
mod sqlite;

pub use schema::{infer_columns, normalize_identifier, Column, SqlType};
pub use sqlite::SqliteWarehouse;

use crate::object::WriteDisposition;
use crate::Record;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Load history table.
pub const LOADS_TABLE: &str = "_loads";

/// Schema version table.
pub const SCHEMA_VERSIONS_TABLE: &str = "_schema_versions";

/// Outcome of loading one object's records.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadInfo {
    /// UUIDv7 load identifier, also written to each row's `_load_id`.
    pub load_id: String,
    pub table: String,
    pub disposition: WriteDisposition,
    pub rows_loaded: usize,
    /// Rows dropped because a merge key was missing.
    pub rows_skipped: usize,
    /// Schema version after the load.
    pub schema_version: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Writes extracted records to a warehouse dataset.
pub trait Destination {
    /// Loads `records` into `table`.
    ///
    /// `primary_key` must be set for [`WriteDisposition::Merge`].
    fn load(
        &mut self,
        table: &str,
        records: &[Record],
        disposition: WriteDisposition,
        primary_key: Option<&str>,
    ) -> Result<LoadInfo>;

    /// Completion time of the latest successful load into `table`.
    fn last_successful_load(&self, table: &str) -> Result<Option<DateTime<Utc>>>;

    /// Drops every table in the dataset, including load state.
    /// Returns the dropped table names.
    fn drop_all(&mut self) -> Result<Vec<String>>;
}
