//! Process-wide open-table registry (spec §4.6): the single entry point
//! that owns the shared heap, materializes `table::Table`s from
//! `catalog.json` on startup, and dispatches `protocol::Request`s, pairing
//! every response with the heap + index physical I/O spent answering it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use catalog::{Heap, IndexType};
use common::{Column, Config, DbError, DbResult, TableSchema};
use protocol::{IoSummary, Outcome, Request, Response};
use table::Table;
use types::SqlType;

pub struct Engine {
    data_dir: PathBuf,
    config: Config,
    heap: Heap,
    tables: HashMap<String, Table>,
}

impl Engine {
    pub fn open(config: Config) -> DbResult<Self> {
        let data_dir = config.data_dir.clone();
        let mut heap = Heap::open(&data_dir, config.records_per_page, config.pool_size)?;
        let mut tables = HashMap::new();

        for name in heap.list_tables() {
            let meta = heap.get_table_metadata(&name).cloned();
            if let Some(meta) = meta {
                if let Some(schema) = meta.schema {
                    let mut table = Table::new(schema, meta.index_type, &data_dir, &config)?;
                    table.rebuild_indexes(&mut heap)?;
                    tables.insert(name, table);
                }
            }
        }

        Ok(Self {
            data_dir,
            config,
            heap,
            tables,
        })
    }

    fn instantiate(&mut self, name: &str, schema: TableSchema, index_type: IndexType) -> DbResult<()> {
        let mut table = Table::new(schema, index_type, &self.data_dir, &self.config)?;
        table.rebuild_indexes(&mut self.heap)?;
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    fn recorded_index_type(&self, name: &str) -> IndexType {
        self.heap
            .get_table_metadata(name)
            .map(|m| m.index_type)
            .unwrap_or_default()
    }

    /// Registers a fully-typed schema for `name`, using whatever index type
    /// was previously recorded via [`create_table_using`](Self::create_table_using)
    /// (spec's `CreateTableUsing` defers the schema decision but not the
    /// index choice).
    pub fn create_table(&mut self, name: &str, key: &str, columns: Vec<Column>) -> DbResult<()> {
        let schema = TableSchema::new(name, key, columns);
        let index_type = self.recorded_index_type(name);
        self.heap
            .set_table_metadata(name, Some(schema.clone()), Some(index_type))?;
        self.instantiate(name, schema, index_type)
    }

    /// Records the chosen index type for `name` without requiring a schema
    /// yet. If the table already has a schema (e.g. this is changing the
    /// index on an existing table), it is re-instantiated immediately;
    /// otherwise the schema is synthesized later by [`ensure`](Self::ensure).
    pub fn create_table_using(&mut self, name: &str, index_type: IndexType) -> DbResult<()> {
        self.heap.set_table_metadata(name, None, Some(index_type))?;
        let schema = self.heap.get_table_metadata(name).and_then(|m| m.schema.clone());
        if let Some(schema) = schema {
            self.instantiate(name, schema, index_type)?;
        }
        Ok(())
    }

    /// Ad hoc table materialization for writes that arrive without a prior
    /// `CreateTable`: every column not already known is typed `Text`, and
    /// `key_column` is added as a `Text` column if it isn't among them.
    pub fn ensure(&mut self, name: &str, key_column: &str, column_names: &[String]) -> DbResult<&mut Table> {
        if !self.tables.contains_key(name) {
            let existing_schema = self.heap.get_table_metadata(name).and_then(|m| m.schema.clone());
            let index_type = self.recorded_index_type(name);
            let schema = match existing_schema {
                Some(schema) => schema,
                None => {
                    let mut columns: Vec<Column> = column_names
                        .iter()
                        .map(|c| Column::new(c.clone(), SqlType::Text))
                        .collect();
                    if !columns.iter().any(|c| c.name == key_column) {
                        columns.push(Column::new(key_column.to_string(), SqlType::Text));
                    }
                    let schema = TableSchema::new(name, key_column, columns);
                    self.heap
                        .set_table_metadata(name, Some(schema.clone()), Some(index_type))?;
                    schema
                }
            };
            self.instantiate(name, schema, index_type)?;
        }
        Ok(self.tables.get_mut(name).expect("just instantiated"))
    }

    fn table_mut(&mut self, name: &str) -> DbResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    fn current_io(&self, table: Option<&str>) -> IoSummary {
        let disk = self.heap.get_stats().disk;
        let index = table
            .and_then(|name| self.tables.get(name))
            .map(|t| t.io_stats())
            .unwrap_or_default();
        IoSummary::from(disk).add_stats(&index)
    }

    fn execute(&mut self, req: &Request) -> DbResult<Outcome> {
        match req {
            Request::CreateTable { name, key, columns } => {
                self.create_table(name, key, columns.clone())?;
                Ok(Outcome::Ok)
            }
            Request::CreateTableUsing { name, index_type } => {
                self.create_table_using(name, *index_type)?;
                Ok(Outcome::Ok)
            }
            Request::LoadCsv { .. } => Err(DbError::UnsupportedSql(
                "CSV ingestion is an out-of-scope interface; LoadCsv is wire-compatible only".into(),
            )),
            Request::SelectEq { table, column, value } => {
                let t = self.table_mut(table)?;
                let rows = t.select_eq(&mut self.heap, column, value)?;
                let count = rows.len();
                Ok(Outcome::Rows { rows, count })
            }
            Request::SelectRange { table, column, lo, hi } => {
                let t = self.table_mut(table)?;
                let rows = t.select_range(&mut self.heap, column, lo, hi)?;
                let count = rows.len();
                Ok(Outcome::Rows { rows, count })
            }
            Request::InsertRow { table, values } => {
                if !self.tables.contains_key(table) {
                    // A catalog entry with no schema means `CreateTableUsing`
                    // recorded an index type but deferred the schema; per
                    // spec §9 (decided option (b)) a bare insert must not
                    // paper over that with an ad hoc schema.
                    let awaiting_schema = self
                        .heap
                        .get_table_metadata(table)
                        .map(|m| m.schema.is_none())
                        .unwrap_or(false);
                    if awaiting_schema {
                        return Err(DbError::UnknownTable(table.clone()));
                    }
                    let column_names: Vec<String> = values.keys().cloned().collect();
                    let key_column = column_names.first().cloned().unwrap_or_else(|| "id".to_string());
                    self.ensure(table, &key_column, &column_names)?;
                }
                let t = self.table_mut(table)?;
                t.insert(&mut self.heap, values.clone())?;
                Ok(Outcome::Ok)
            }
            Request::DeleteEq { table, column, value } => {
                let t = self.table_mut(table)?;
                if !t.is_key_column(column) {
                    return Err(DbError::UnsupportedSql(format!(
                        "delete by non-key column `{column}` would require a secondary index (out of scope)"
                    )));
                }
                t.delete(value)?;
                Ok(Outcome::Ok)
            }
        }
    }

    /// Runs `req`, resetting the target table's index counters and the
    /// heap's disk counters first so the returned [`IoSummary`] reflects
    /// only this statement's physical I/O (spec §6.2, §9).
    pub fn dispatch(&mut self, req: Request) -> Response {
        let start = Instant::now();
        let table_name = req.table().to_string();
        self.heap.reset_metrics();
        if let Some(t) = self.tables.get_mut(&table_name) {
            t.reset_io_stats();
        }

        let result = self.execute(&req);
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        let io = self.current_io(Some(table_name.as_str()));

        match result {
            Ok(outcome) => Response {
                outcome,
                io,
                execution_time_ms: elapsed,
            },
            Err(err) => Response::error(&err, io, elapsed),
        }
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.heap.list_tables()
    }
}

#[cfg(test)]
mod tests;
