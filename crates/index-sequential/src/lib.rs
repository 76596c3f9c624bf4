//! Sequential file index (spec §4.4.1): records packed into ascending-key
//! blocks on disk, with a RAM `block_index` of `(first_key, last_key)` pairs
//! for binary-search navigation and a RAM overflow list for out-of-place
//! inserts.

use std::fs::File;
use std::path::PathBuf;

use common::{DbError, DbResult, IoStats, Record};
use index_core::framing::{self, bincode_decode, bincode_encode};
use index_core::{key_cmp, key_eq, key_ge, key_le, sort_rows_by_key, PrimaryIndex};
use types::Value;

const INDEX_TYPE: &str = "sequential";

#[derive(Clone, Debug)]
struct BlockEntry {
    first_key: Value,
    last_key: Value,
    offset: u64,
}

pub struct SequentialIndex {
    key_column: String,
    block_size: usize,
    reorganize_threshold: f64,
    blocks_path: PathBuf,
    overflow_path: PathBuf,
    blocks_file: File,
    overflow_file: File,
    block_index: Vec<BlockEntry>,
    overflow: Vec<Record>,
    io: IoStats,
}

impl SequentialIndex {
    pub fn open(
        data_dir: &std::path::Path,
        table: &str,
        key_column: impl Into<String>,
        block_size: usize,
        reorganize_threshold: f64,
    ) -> DbResult<Self> {
        let blocks_path = index_core::index_file_path(data_dir, table, INDEX_TYPE, "blocks", "dat");
        let overflow_path =
            index_core::index_file_path(data_dir, table, INDEX_TYPE, "overflow", "dat");
        let blocks_file = framing::open_rw(&blocks_path)?;
        let overflow_file = framing::open_rw(&overflow_path)?;
        Ok(Self {
            key_column: key_column.into(),
            block_size: block_size.max(1),
            reorganize_threshold,
            blocks_path,
            overflow_path,
            blocks_file,
            overflow_file,
            block_index: Vec::new(),
            overflow: Vec::new(),
            io: IoStats::default(),
        })
    }

    fn key_of(&self, row: &Record) -> DbResult<Value> {
        Ok(common::extract_key(row, &self.key_column)?.clone())
    }

    /// Binary search for the block whose range contains `k`, or the nearest
    /// block if none does (spec: "the unique block ... or the nearest block
    /// if none strictly contains k").
    fn find_block(&self, k: &Value) -> Option<usize> {
        if self.block_index.is_empty() {
            return None;
        }
        let idx = self
            .block_index
            .partition_point(|b| key_cmp(&b.first_key, k) != std::cmp::Ordering::Greater);
        let candidate = idx.saturating_sub(1).min(self.block_index.len() - 1);
        Some(candidate)
    }

    fn read_block(&mut self, idx: usize) -> DbResult<Vec<Record>> {
        let offset = self.block_index[idx].offset;
        let bytes = framing::read_chunk_at(&mut self.blocks_file, offset)?;
        self.io.record_read();
        bincode_decode(&bytes)
    }

    fn rebuild_from(&mut self, mut rows: Vec<Record>) -> DbResult<()> {
        sort_rows_by_key(&mut rows, &self.key_column)?;
        let blocks: Vec<Vec<Record>> = rows
            .chunks(self.block_size)
            .map(|c| c.to_vec())
            .filter(|b| !b.is_empty())
            .collect();

        let mut payloads = Vec::with_capacity(blocks.len());
        for block in &blocks {
            payloads.push(bincode_encode(block)?);
        }
        let offsets = framing::rewrite_chunks(&mut self.blocks_file, &payloads)?;
        self.io.writes += payloads.len() as u64;

        let block_index: Vec<BlockEntry> = blocks
            .iter()
            .zip(offsets)
            .map(|(block, offset)| BlockEntry {
                first_key: self
                    .key_of(block.first().expect("non-empty"))
                    .expect("already validated"),
                last_key: self
                    .key_of(block.last().expect("non-empty"))
                    .expect("already validated"),
                offset,
            })
            .collect();
        self.block_index = block_index;
        Ok(())
    }

    fn persist_overflow(&mut self) -> DbResult<()> {
        let payload = bincode_encode(&self.overflow)?;
        framing::rewrite_single(&mut self.overflow_file, &payload)?;
        self.io.record_write();
        Ok(())
    }

    fn total_block_capacity(&self) -> usize {
        self.block_index.len() * self.block_size
    }

    /// Spec §9: compares `len(overflow)` against block *capacity*, not
    /// occupancy — preserved for behavioral parity per the spec's explicit
    /// decision to keep this as specified.
    fn should_reorganize(&self) -> bool {
        let capacity = self.total_block_capacity().max(1);
        (self.overflow.len() as f64) / (capacity as f64) > self.reorganize_threshold
    }

    fn all_block_records(&mut self) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        for idx in 0..self.block_index.len() {
            out.extend(self.read_block(idx)?);
        }
        Ok(out)
    }
}

impl PrimaryIndex for SequentialIndex {
    fn build(&mut self, rows: Vec<Record>) -> DbResult<()> {
        self.overflow.clear();
        self.rebuild_from(rows)?;
        self.persist_overflow()?;
        Ok(())
    }

    fn add(&mut self, row: &Record) -> DbResult<()> {
        self.key_of(row)?; // validate key presence before mutating state
        self.overflow.push(row.clone());
        self.persist_overflow()?;
        if self.should_reorganize() {
            tracing::debug!(table_index = INDEX_TYPE, "overflow threshold exceeded, reorganizing");
            let mut all = self.all_block_records()?;
            all.append(&mut self.overflow);
            self.rebuild_from(all)?;
            self.persist_overflow()?;
        }
        Ok(())
    }

    fn search(&mut self, key: &Value) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        if let Some(idx) = self.find_block(key) {
            let block = self.read_block(idx)?;
            out.extend(
                block
                    .into_iter()
                    .filter(|r| self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false)),
            );
        }
        out.extend(
            self.overflow
                .iter()
                .filter(|r| self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false))
                .cloned(),
        );
        Ok(out)
    }

    fn range_search(&mut self, lo: &Value, hi: &Value) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        let start = self
            .block_index
            .partition_point(|b| key_cmp(&b.last_key, lo) == std::cmp::Ordering::Less);
        for idx in start..self.block_index.len() {
            if key_cmp(&self.block_index[idx].first_key, hi) == std::cmp::Ordering::Greater {
                break;
            }
            let block = self.read_block(idx)?;
            for r in block {
                let k = self.key_of(&r)?;
                if key_cmp(&k, hi) == std::cmp::Ordering::Greater {
                    break;
                }
                if key_ge(&k, lo) && key_le(&k, hi) {
                    out.push(r);
                }
            }
        }
        for r in &self.overflow {
            let k = self.key_of(r)?;
            if key_ge(&k, lo) && key_le(&k, hi) {
                out.push(r.clone());
            }
        }
        out.sort_by(|a, b| {
            let ka = self.key_of(a).expect("validated on insert");
            let kb = self.key_of(b).expect("validated on insert");
            key_cmp(&ka, &kb)
        });
        Ok(out)
    }

    fn remove(&mut self, key: &Value) -> DbResult<usize> {
        let before = self.overflow.len();
        self.overflow
            .retain(|r| !self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false));
        let mut removed = before - self.overflow.len();
        self.persist_overflow()?;

        let mut all = self.all_block_records()?;
        let before_blocks = all.len();
        all.retain(|r| !self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false));
        removed += before_blocks - all.len();
        self.rebuild_from(all)?;
        Ok(removed)
    }

    fn save(&mut self) -> DbResult<()> {
        self.persist_overflow()
    }

    fn load(&mut self) -> DbResult<()> {
        if !self.blocks_path.exists() {
            return Err(DbError::FileNotFound(self.blocks_path.display().to_string()));
        }
        let chunks = framing::read_all_chunks(&mut self.blocks_file)?;
        self.io.reads += chunks.len() as u64;
        let mut block_index = Vec::with_capacity(chunks.len());
        for (offset, payload) in chunks {
            let block: Vec<Record> = bincode_decode(&payload)?;
            let first = block
                .first()
                .ok_or_else(|| DbError::CorruptIndex("empty block".into()))?;
            let last = block.last().expect("checked first");
            block_index.push(BlockEntry {
                first_key: self.key_of(first)?,
                last_key: self.key_of(last)?,
                offset,
            });
        }
        self.block_index = block_index;

        self.overflow = match framing::read_single(&mut self.overflow_file)? {
            Some(payload) => {
                self.io.record_read();
                bincode_decode(&payload)?
            }
            None => Vec::new(),
        };
        Ok(())
    }

    fn clear(&mut self) -> DbResult<()> {
        self.block_index.clear();
        self.overflow.clear();
        framing::rewrite_chunks(&mut self.blocks_file, &[])?;
        framing::rewrite_single(&mut self.overflow_file, &bincode_encode(&self.overflow)?)?;
        Ok(())
    }

    fn io_stats(&self) -> IoStats {
        self.io
    }

    fn reset_io_stats(&mut self) {
        self.io.reset();
    }
}

#[cfg(test)]
mod tests;
