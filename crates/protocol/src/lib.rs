//! Request/response shapes the core accepts and returns.
//!
//! The SQL dialect, its regex tokenizer, and the HTTP wire format that would
//! produce these values are out of scope (spec §1, §9): this crate only
//! defines the seven request variants of §6.1 and the response envelope of
//! §6.2 so the core is callable without depending on a parser.

use catalog::IndexType;
use common::{Column, DbError, IoStats, Record};
use serde::{Deserialize, Serialize};
use types::Value;

/// One parsed SQL statement, already decoded into its operands. An external
/// parser (not part of this core) produces these from the regex dialect of
/// spec §6.1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// `CREATE TABLE t(c1, c2, ...) KEY(k)`.
    CreateTable {
        name: String,
        key: String,
        columns: Vec<Column>,
    },
    /// `CREATE TABLE t USING <sequential|isam|ext_hash|bplustree>`. Only
    /// records the chosen index type; no schema or index is allocated until
    /// a schema arrives with a subsequent `LoadCsv`.
    CreateTableUsing { name: String, index_type: IndexType },
    /// `LOAD FROM <path> INTO <table>`. CSV ingestion itself is out of
    /// scope; this variant names the table and source path only.
    LoadCsv { table: String, path: String },
    /// `SELECT * FROM t WHERE "col" = <literal>`.
    SelectEq {
        table: String,
        column: String,
        value: Value,
    },
    /// `SELECT * FROM t WHERE "col" BETWEEN <lo> AND <hi>`.
    SelectRange {
        table: String,
        column: String,
        lo: Value,
        hi: Value,
    },
    /// `INSERT INTO t(c,...) VALUES(v,...)`.
    InsertRow { table: String, values: Record },
    /// `DELETE FROM t WHERE "col" = <literal>`.
    DeleteEq {
        table: String,
        column: String,
        value: Value,
    },
}

impl Request {
    /// The table this request targets, for dispatch and error reporting.
    pub fn table(&self) -> &str {
        match self {
            Request::CreateTable { name, .. } => name,
            Request::CreateTableUsing { name, .. } => name,
            Request::LoadCsv { table, .. } => table,
            Request::SelectEq { table, .. } => table,
            Request::SelectRange { table, .. } => table,
            Request::InsertRow { table, .. } => table,
            Request::DeleteEq { table, .. } => table,
        }
    }
}

/// Aggregated physical I/O across a statement: the sum of every index's own
/// counters plus the heap/buffer-pool counters, reset at statement entry and
/// snapshotted on exit (spec §6.2, §9).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoSummary {
    pub disk_reads: u64,
    pub disk_writes: u64,
}

impl From<IoStats> for IoSummary {
    fn from(s: IoStats) -> Self {
        Self {
            disk_reads: s.reads,
            disk_writes: s.writes,
        }
    }
}

impl IoSummary {
    pub fn add(&self, other: &IoSummary) -> IoSummary {
        IoSummary {
            disk_reads: self.disk_reads + other.disk_reads,
            disk_writes: self.disk_writes + other.disk_writes,
        }
    }

    pub fn add_stats(&self, other: &IoStats) -> IoSummary {
        self.add(&IoSummary::from(*other))
    }
}

/// The response envelope every executed request produces (spec §6.2): reads
/// carry `rows`/`count`, writes carry `ok`, and any failure short-circuits to
/// `error` instead of either. `io` and `execution_time_ms` are always present.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub outcome: Outcome,
    pub io: IoSummary,
    pub execution_time_ms: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Outcome {
    Rows { rows: Vec<Record>, count: usize },
    Ok,
    Error { error: String },
}

impl Response {
    pub fn rows(rows: Vec<Record>, io: IoSummary, execution_time_ms: f64) -> Self {
        let count = rows.len();
        Self {
            outcome: Outcome::Rows { rows, count },
            io,
            execution_time_ms,
        }
    }

    pub fn ok(io: IoSummary, execution_time_ms: f64) -> Self {
        Self {
            outcome: Outcome::Ok,
            io,
            execution_time_ms,
        }
    }

    pub fn error(err: &DbError, io: IoSummary, execution_time_ms: f64) -> Self {
        Self {
            outcome: Outcome::Error {
                error: err.to_string(),
            },
            io,
            execution_time_ms,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error { .. })
    }
}
