//! Table façade (spec §4.5): binds a schema, the shared heap, and one
//! primary index over the key column. Deletes are index-authoritative —
//! the heap page holding a deleted row is never rewritten, only the index
//! stops returning it — so `Heap::read_all` can still surface stale rows;
//! callers needing ground truth go through the index, not the heap.

use std::path::Path;

use catalog::{Heap, IndexType};
use common::{Config, DbResult, Record, TableSchema};
use index_core::{key_cmp, key_ge, key_le, PrimaryIndex};
use types::Value;

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '"' | '\'' | ' ' | '_'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn make_index(
    index_type: IndexType,
    data_dir: &Path,
    table: &str,
    key_column: &str,
    config: &Config,
) -> DbResult<Box<dyn PrimaryIndex>> {
    Ok(match index_type {
        IndexType::Sequential => Box::new(index_sequential::SequentialIndex::open(
            data_dir,
            table,
            key_column,
            config.block_size,
            config.reorganize_threshold,
        )?),
        IndexType::Isam => Box::new(index_isam::IsamIndex::open(
            data_dir,
            table,
            key_column,
            config.fanout,
            config.fanout_l2,
        )?),
        IndexType::ExtHash => Box::new(index_exthash::ExtHashIndex::open(
            data_dir,
            table,
            key_column,
            config.bucket_size,
            config.global_depth,
        )?),
        IndexType::BPlusTree => Box::new(index_bplustree::BPlusTreeIndex::open(
            data_dir,
            table,
            key_column,
            config.order,
        )?),
    })
}

pub struct Table {
    schema: TableSchema,
    index_type: IndexType,
    index: Box<dyn PrimaryIndex>,
}

impl Table {
    pub fn new(
        schema: TableSchema,
        index_type: IndexType,
        data_dir: &Path,
        config: &Config,
    ) -> DbResult<Self> {
        let index = make_index(index_type, data_dir, &schema.name, &schema.key_column, config)?;
        Ok(Self {
            schema,
            index_type,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        normalize(column) == normalize(&self.schema.key_column)
    }

    /// Tries to restore the index from disk; falls back to a full rebuild
    /// from the heap's current contents on any failure (spec §4.5 — the
    /// index file is a cache of the heap, not its source of truth).
    pub fn rebuild_indexes(&mut self, heap: &mut Heap) -> DbResult<()> {
        match self.index.load() {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(table = %self.schema.name, error = %err, "index load failed, rebuilding from heap");
                let rows = heap.read_all(&self.schema.name)?;
                self.index.build(rows)
            }
        }
    }

    /// Bulk-loads `rows` into the heap, then rebuilds the index from the
    /// heap's full contents (existing rows plus the new ones).
    pub fn load(&mut self, heap: &mut Heap, rows: Vec<Record>) -> DbResult<()> {
        for row in &rows {
            common::extract_key(row, &self.schema.key_column)?;
        }
        heap.load(&self.schema.name, rows)?;
        let all = heap.read_all(&self.schema.name)?;
        self.index.build(all)
    }

    pub fn insert(&mut self, heap: &mut Heap, row: Record) -> DbResult<()> {
        common::extract_key(&row, &self.schema.key_column)?;
        heap.load(&self.schema.name, vec![row.clone()])?;
        self.index.add(&row)
    }

    /// Removes every row whose key column equals `key`. The heap is left
    /// untouched; the index alone is authoritative for subsequent reads.
    pub fn delete(&mut self, key: &Value) -> DbResult<usize> {
        self.index.remove(key)
    }

    pub fn select_eq(&mut self, heap: &mut Heap, column: &str, value: &Value) -> DbResult<Vec<Record>> {
        if self.is_key_column(column) {
            return self.index.search(value);
        }
        let rows = heap.read_all(&self.schema.name)?;
        Ok(rows
            .into_iter()
            .filter(|r| {
                common::extract_key(r, column)
                    .map(|v| v == value)
                    .unwrap_or(false)
            })
            .collect())
    }

    pub fn select_range(
        &mut self,
        heap: &mut Heap,
        column: &str,
        lo: &Value,
        hi: &Value,
    ) -> DbResult<Vec<Record>> {
        if self.is_key_column(column) {
            return self.index.range_search(lo, hi);
        }
        let rows = heap.read_all(&self.schema.name)?;
        let mut out: Vec<Record> = rows
            .into_iter()
            .filter(|r| {
                common::extract_key(r, column)
                    .map(|v| key_ge(v, lo) && key_le(v, hi))
                    .unwrap_or(false)
            })
            .collect();
        out.sort_by(|a, b| {
            let ka = common::extract_key(a, column).expect("filtered above");
            let kb = common::extract_key(b, column).expect("filtered above");
            key_cmp(ka, kb)
        });
        Ok(out)
    }

    pub fn io_stats(&self) -> common::IoStats {
        self.index.io_stats()
    }

    pub fn reset_io_stats(&mut self) {
        self.index.reset_io_stats()
    }
}

#[cfg(test)]
mod tests;
