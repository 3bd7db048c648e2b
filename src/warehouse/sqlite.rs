//! SQLite-backed warehouse dataset.

use super::schema::{infer_columns, normalize_identifier, quote_ident, to_sql_value, Column, SqlType};
use super::{Destination, LoadInfo, LOADS_TABLE, SCHEMA_VERSIONS_TABLE};
use crate::object::WriteDisposition;
use crate::Record;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Column stamped on every row with the load that last wrote it.
pub const LOAD_ID_COLUMN: &str = "_load_id";

/// Warehouse dataset stored in a single SQLite database.
///
/// # Schema
/// ```sql
/// CREATE TABLE _loads (
///     load_id TEXT PRIMARY KEY,       -- UUIDv7
///     dataset TEXT NOT NULL,
///     table_name TEXT NOT NULL,
///     disposition TEXT NOT NULL,      -- merge | replace | append
///     rows_loaded INTEGER NOT NULL,
///     rows_skipped INTEGER NOT NULL,
///     schema_version INTEGER NOT NULL,
///     status TEXT NOT NULL,           -- completed
///     started_at TEXT NOT NULL,       -- RFC 3339
///     finished_at TEXT NOT NULL       -- RFC 3339
/// );
///
/// CREATE TABLE _schema_versions (
///     table_name TEXT NOT NULL,
///     version INTEGER NOT NULL,
///     columns_json TEXT NOT NULL,     -- ordered column names
///     created_at TEXT NOT NULL,
///     PRIMARY KEY (table_name, version)
/// );
/// ```
///
/// Object tables are created on first load with one column per inferred
/// record key plus `_load_id`. Merge tables get a unique index on the
/// primary key. Each load runs in one transaction: a failed load leaves
/// neither rows nor a `_loads` entry behind.
pub struct SqliteWarehouse {
    conn: Connection,
    dataset: String,
}

impl SqliteWarehouse {
    /// Creates or opens the dataset database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, dataset: &str) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path).with_context(|| {
            format!("Failed to open warehouse database {}", db_path.display())
        })?;
        Self::with_connection(conn, dataset)
    }

    /// Dataset held in memory, discarded on drop.
    pub fn in_memory(dataset: &str) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory warehouse")?;
        Self::with_connection(conn, dataset)
    }

    fn with_connection(conn: Connection, dataset: &str) -> Result<Self> {
        let warehouse = Self {
            conn,
            dataset: dataset.to_string(),
        };
        warehouse.create_state_tables()?;
        Ok(warehouse)
    }

    fn create_state_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {loads} (
                    load_id        TEXT PRIMARY KEY,
                    dataset        TEXT NOT NULL,
                    table_name     TEXT NOT NULL,
                    disposition    TEXT NOT NULL,
                    rows_loaded    INTEGER NOT NULL,
                    rows_skipped   INTEGER NOT NULL,
                    schema_version INTEGER NOT NULL,
                    status         TEXT NOT NULL,
                    started_at     TEXT NOT NULL,
                    finished_at    TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_loads_table ON {loads}(table_name, status);
                CREATE TABLE IF NOT EXISTS {versions} (
                    table_name   TEXT NOT NULL,
                    version      INTEGER NOT NULL,
                    columns_json TEXT NOT NULL,
                    created_at   TEXT NOT NULL,
                    PRIMARY KEY (table_name, version)
                );",
                loads = LOADS_TABLE,
                versions = SCHEMA_VERSIONS_TABLE,
            ))
            .context("Failed to create load state tables")?;
        Ok(())
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Object tables (everything except load state), sorted by name.
    pub fn tables(&self) -> Result<Vec<String>> {
        Ok(all_tables(&self.conn)?
            .into_iter()
            .filter(|t| !t.starts_with('_'))
            .collect())
    }

    /// Column names of `table` in definition order. Empty if it does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        existing_columns(&self.conn, table)
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("Failed to count rows in {}", table))?;
        Ok(count as u64)
    }

    /// Current schema version of `table`, 0 if it was never loaded.
    pub fn schema_version(&self, table: &str) -> Result<u32> {
        current_version(&self.conn, table)
    }

    /// Direct access for inspection queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Destination for SqliteWarehouse {
    fn load(
        &mut self,
        table: &str,
        records: &[Record],
        disposition: WriteDisposition,
        primary_key: Option<&str>,
    ) -> Result<LoadInfo> {
        let started_at = Utc::now();
        let load_id = Uuid::now_v7().to_string();

        let merge_key = match disposition {
            WriteDisposition::Merge => Some(normalize_identifier(
                primary_key.with_context(|| format!("merge into {} requires a primary key", table))?,
            )),
            _ => None,
        };

        let mut columns = infer_columns(records);
        if let Some(key) = &merge_key {
            if !columns.iter().any(|c| &c.name == key) {
                columns.push(Column {
                    name: key.clone(),
                    sql_type: SqlType::Text,
                });
            }
        }

        let tx = self
            .conn
            .transaction()
            .context("Failed to begin load transaction")?;

        let schema_version = ensure_table(&tx, table, &columns, merge_key.as_deref(), started_at)?;

        if disposition == WriteDisposition::Replace {
            let removed = tx
                .execute(&format!("DELETE FROM {}", quote_ident(table)), [])
                .with_context(|| format!("Failed to truncate {}", table))?;
            debug!(table = %table, removed, "Truncated table for replace load");
        }

        let (rows_loaded, rows_skipped) =
            insert_records(&tx, table, records, merge_key.as_deref(), &load_id)?;

        let finished_at = Utc::now();
        tx.execute(
            &format!(
                "INSERT INTO {} (
                    load_id, dataset, table_name, disposition,
                    rows_loaded, rows_skipped, schema_version, status,
                    started_at, finished_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'completed', ?8, ?9)",
                LOADS_TABLE
            ),
            params![
                load_id,
                self.dataset,
                table,
                disposition.as_str(),
                rows_loaded as i64,
                rows_skipped as i64,
                schema_version,
                started_at.to_rfc3339(),
                finished_at.to_rfc3339(),
            ],
        )
        .context("Failed to record load")?;

        tx.commit()
            .with_context(|| format!("Failed to commit load into {}", table))?;

        if rows_skipped > 0 {
            warn!(
                table = %table,
                rows_skipped,
                "Skipped rows without a merge key"
            );
        }
        info!(
            dataset = %self.dataset,
            table = %table,
            disposition = %disposition,
            rows = rows_loaded,
            schema_version,
            "Load completed"
        );

        Ok(LoadInfo {
            load_id,
            table: table.to_string(),
            disposition,
            rows_loaded,
            rows_skipped,
            schema_version,
            started_at,
            finished_at,
        })
    }

    fn last_successful_load(&self, table: &str) -> Result<Option<DateTime<Utc>>> {
        let finished: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT MAX(finished_at) FROM {} WHERE table_name = ?1 AND status = 'completed'",
                    LOADS_TABLE
                ),
                params![table],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .context("Failed to query load history")?
            .flatten();

        finished
            .map(|ts| {
                DateTime::parse_from_rfc3339(&ts)
                    .map(|dt| dt.with_timezone(&Utc))
                    .with_context(|| format!("Invalid finished_at timestamp: {}", ts))
            })
            .transpose()
    }

    fn drop_all(&mut self) -> Result<Vec<String>> {
        let tables = all_tables(&self.conn)?;

        let tx = self
            .conn
            .transaction()
            .context("Failed to begin drop transaction")?;
        for table in &tables {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
                .with_context(|| format!("Failed to drop {}", table))?;
        }
        tx.commit().context("Failed to commit drop")?;

        self.create_state_tables()?;
        info!(dataset = %self.dataset, tables = tables.len(), "Dropped dataset");
        Ok(tables)
    }
}

fn all_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .context("Failed to prepare table listing")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to list tables")?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tables)
}

fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
        .context("Failed to prepare table_info")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .context("Failed to read table_info")?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

fn current_version(conn: &Connection, table: &str) -> Result<u32> {
    conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(version), 0) FROM {} WHERE table_name = ?1",
            SCHEMA_VERSIONS_TABLE
        ),
        params![table],
        |row| row.get(0),
    )
    .context("Failed to read schema version")
}

/// Creates `table` or adds missing columns. Bumps the schema version whenever
/// the column set grows and returns the version in effect.
fn ensure_table(
    conn: &Connection,
    table: &str,
    columns: &[Column],
    merge_key: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u32> {
    let existing = existing_columns(conn, table)?;
    let mut added = Vec::new();

    if existing.is_empty() {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type.ddl()))
            .collect();
        defs.push(format!("{} TEXT NOT NULL", quote_ident(LOAD_ID_COLUMN)));
        conn.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(table),
            defs.join(", ")
        ))
        .with_context(|| format!("Failed to create table {}", table))?;
        added.extend(columns.iter().map(|c| c.name.clone()));
        debug!(table = %table, columns = columns.len(), "Created table");
    } else {
        for column in columns.iter().filter(|c| !existing.contains(&c.name)) {
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(table),
                quote_ident(&column.name),
                column.sql_type.ddl()
            ))
            .with_context(|| format!("Failed to add column {} to {}", column.name, table))?;
            added.push(column.name.clone());
        }
        if !added.is_empty() {
            info!(table = %table, columns = ?added, "Added columns");
        }
    }

    if let Some(key) = merge_key {
        conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({})",
            quote_ident(&format!("ux_{}_{}", table, key)),
            quote_ident(table),
            quote_ident(key)
        ))
        .with_context(|| format!("Failed to create merge key index on {}", table))?;
    }

    let version = current_version(conn, table)?;
    if added.is_empty() {
        return Ok(version);
    }

    let all_columns = existing_columns(conn, table)?;
    let next = version + 1;
    conn.execute(
        &format!(
            "INSERT INTO {} (table_name, version, columns_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            SCHEMA_VERSIONS_TABLE
        ),
        params![
            table,
            next,
            serde_json::to_string(&all_columns)?,
            now.to_rfc3339()
        ],
    )
    .context("Failed to record schema version")?;
    Ok(next)
}

/// Inserts (or upserts, when `merge_key` is set) each record. Returns
/// `(loaded, skipped)`; records with a null or missing merge key are skipped.
fn insert_records(
    conn: &Connection,
    table: &str,
    records: &[Record],
    merge_key: Option<&str>,
    load_id: &str,
) -> Result<(usize, usize)> {
    let mut loaded = 0;
    let mut skipped = 0;

    for record in records {
        let mut names: Vec<String> = Vec::with_capacity(record.len() + 1);
        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(record.len() + 1);
        for (key, value) in record {
            let name = normalize_identifier(key);
            let sql_value = to_sql_value(value);
            match names.iter().position(|n| n == &name) {
                Some(idx) => values[idx] = sql_value,
                None => {
                    names.push(name);
                    values.push(sql_value);
                }
            }
        }

        if let Some(key) = merge_key {
            let has_key = names
                .iter()
                .position(|n| n == key)
                .map(|idx| values[idx] != rusqlite::types::Value::Null)
                .unwrap_or(false);
            if !has_key {
                skipped += 1;
                continue;
            }
        }

        names.push(LOAD_ID_COLUMN.to_string());
        values.push(rusqlite::types::Value::Text(load_id.to_string()));

        let column_list = names
            .iter()
            .map(|n| quote_ident(n))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=names.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list,
            placeholders
        );
        if let Some(key) = merge_key {
            let updates = names
                .iter()
                .filter(|n| n.as_str() != key)
                .map(|n| format!("{col} = excluded.{col}", col = quote_ident(n)))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(
                " ON CONFLICT({}) DO UPDATE SET {}",
                quote_ident(key),
                updates
            ));
        }

        let mut stmt = conn
            .prepare_cached(&sql)
            .with_context(|| format!("Failed to prepare insert into {}", table))?;
        stmt.execute(params_from_iter(values.iter()))
            .with_context(|| format!("Failed to insert into {}", table))?;
        loaded += 1;
    }

    Ok((loaded, skipped))
}
