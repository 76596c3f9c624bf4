#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io, path::PathBuf};
use thiserror::Error;
use types::{SqlType, Value};

/// A record is a name-to-scalar mapping, decoded ahead of time by whatever
/// produced it (CSV ingestion, an insert statement). The core never parses
/// field values itself.
pub type Record = HashMap<String, Value>;

/// A single typed column in a table schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: SqlType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Schema for one table: an ordered column list plus the single key column.
/// Exactly one column is designated the key; its declared type is the
/// comparison type used by the table's index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub key_column: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, key_column: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            columns,
        }
    }

    pub fn key_type(&self) -> Option<SqlType> {
        self.columns
            .iter()
            .find(|c| c.name == self.key_column)
            .map(|c| c.ty)
    }
}

/// Canonical error type shared across database subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unsupported sql: {0}")]
    UnsupportedSql(String),
    #[error("key not found: column `{0}` missing from row")]
    KeyNotFound(String),
    #[error("page overflow: serialized page exceeds {page_size} bytes ({actual} bytes)")]
    PageOverflow { page_size: usize, actual: usize },
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Per-component physical I/O counters: reads and writes. Every disk manager,
/// buffer pool, and index owns one and exposes `get`/`reset`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoStats {
    pub reads: u64,
    pub writes: u64,
}

impl IoStats {
    pub fn reset(&mut self) {
        self.reads = 0;
        self.writes = 0;
    }

    pub fn record_read(&mut self) {
        self.reads += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    /// Combine two counter snapshots, used to aggregate heap + index I/O at a
    /// statement boundary.
    pub fn add(&self, other: &IoStats) -> IoStats {
        IoStats {
            reads: self.reads + other.reads,
            writes: self.writes + other.writes,
        }
    }
}

/// Runtime configuration for every storage/index component. One `Config` is
/// shared by a process's catalog and propagated to every table it opens.
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory holding `catalog.json`, heap files, and index files.
    #[builder(default = PathBuf::from("./storage"))]
    pub data_dir: PathBuf,
    /// Fixed-size heap page allocation in bytes.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Heap records packed per page.
    #[builder(default = 10)]
    pub records_per_page: usize,
    /// Buffer pool capacity in pages.
    #[builder(default = 50)]
    pub pool_size: usize,
    /// Sequential file: records per block.
    #[builder(default = 20)]
    pub block_size: usize,
    /// Sequential file: overflow/capacity ratio that triggers reorganization.
    #[builder(default = 0.1)]
    pub reorganize_threshold: f64,
    /// ISAM: records per bucket.
    #[builder(default = 20)]
    pub fanout: usize,
    /// ISAM: buckets grouped per L2 entry.
    #[builder(default = 5)]
    pub fanout_l2: usize,
    /// Extendible hash: records per bucket before a split.
    #[builder(default = 20)]
    pub bucket_size: usize,
    /// Extendible hash: initial global depth.
    #[builder(default = 2)]
    pub global_depth: u32,
    /// B+-tree: records per leaf.
    #[builder(default = 20)]
    pub order: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./storage"),
            page_size: 4096,
            records_per_page: 10,
            pool_size: 50,
            block_size: 20,
            reorganize_threshold: 0.1,
            fanout: 20,
            fanout_l2: 5,
            bucket_size: 20,
            global_depth: 2,
            order: 20,
        }
    }
}

/// Key extraction tolerant of column-name variation: try the exact name
/// first, then a normalized match (lowercased, stripped of quotes, spaces,
/// and underscores) against every key in the row. Shared by all four index
/// implementations so their normalization rule cannot drift apart.
pub fn extract_key<'a>(row: &'a Record, key_column: &str) -> DbResult<&'a Value> {
    if let Some(v) = row.get(key_column) {
        return Ok(v);
    }
    let normalized_target = normalize_key(key_column);
    row.iter()
        .find(|(k, _)| normalize_key(k) == normalized_target)
        .map(|(_, v)| v)
        .ok_or_else(|| DbError::KeyNotFound(key_column.to_string()))
}

fn normalize_key(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '"' | '\'' | ' ' | '_'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        extract_key, Column, Config, DbError, DbResult, IoStats, Record, TableSchema,
    };
    pub use types::{SqlType, Value};
}
