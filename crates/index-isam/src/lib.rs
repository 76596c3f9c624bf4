//! ISAM three-level index (spec §4.4.2): buckets on disk in ascending-key
//! order, a two-level RAM navigation structure (`l1`, `l2`), and a per-bucket
//! RAM overflow list persisted as one combined file.
//!
//! Per spec §9's resolution of the ISAM overflow ambiguity (option b):
//! insertions always target the bucket whose static key range covers the
//! key, so `search`/`range_search` only ever probe the bucket(s) located by
//! `find_bucket` — never a scan of every bucket's overflow.

use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};

use common::{DbError, DbResult, IoStats, Record};
use index_core::framing::{self, bincode_decode, bincode_encode};
use index_core::{key_cmp, key_eq, key_ge, key_le, sort_rows_by_key, PrimaryIndex};
use types::Value;

const INDEX_TYPE: &str = "isam";

pub struct IsamIndex {
    key_column: String,
    fanout: usize,
    fanout_l2: usize,
    buckets_path: PathBuf,
    l1_path: PathBuf,
    l2_path: PathBuf,
    overflow_path: PathBuf,
    buckets_file: File,
    l1_file: File,
    l2_file: File,
    overflow_file: File,
    l1: Vec<Value>,
    l2: Vec<Value>,
    bucket_offsets: Vec<u64>,
    overflow: Vec<Vec<Record>>,
    io: IoStats,
}

/// Snapshot used by scenario tests (S2) and `get_structure_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureInfo {
    pub num_buckets: usize,
    pub l1_len: usize,
    pub l2_len: usize,
}

impl IsamIndex {
    pub fn open(
        data_dir: &Path,
        table: &str,
        key_column: impl Into<String>,
        fanout: usize,
        fanout_l2: usize,
    ) -> DbResult<Self> {
        let buckets_path = index_core::index_file_path(data_dir, table, INDEX_TYPE, "buckets", "dat");
        let l1_path = index_core::index_file_path(data_dir, table, INDEX_TYPE, "l1", "idx");
        let l2_path = index_core::index_file_path(data_dir, table, INDEX_TYPE, "l2", "idx");
        let overflow_path =
            index_core::index_file_path(data_dir, table, INDEX_TYPE, "overflow", "dat");
        Ok(Self {
            key_column: key_column.into(),
            fanout: fanout.max(1),
            fanout_l2: fanout_l2.max(1),
            buckets_file: framing::open_rw(&buckets_path)?,
            l1_file: framing::open_rw(&l1_path)?,
            l2_file: framing::open_rw(&l2_path)?,
            overflow_file: framing::open_rw(&overflow_path)?,
            buckets_path,
            l1_path,
            l2_path,
            overflow_path,
            l1: Vec::new(),
            l2: Vec::new(),
            bucket_offsets: Vec::new(),
            overflow: Vec::new(),
            io: IoStats::default(),
        })
    }

    fn key_of(&self, row: &Record) -> DbResult<Value> {
        Ok(common::extract_key(row, &self.key_column)?.clone())
    }

    pub fn get_structure_info(&self) -> StructureInfo {
        StructureInfo {
            num_buckets: self.bucket_offsets.len(),
            l1_len: self.l1.len(),
            l2_len: self.l2.len(),
        }
    }

    /// Locate the bucket whose static key range covers `k`, clamped to
    /// `[0, num_buckets - 1]` (spec §4.4.2 `find_bucket`).
    fn find_bucket(&self, k: &Value) -> Option<usize> {
        let num_buckets = self.l1.len();
        if num_buckets == 0 {
            return None;
        }
        if self.l2.len() >= 2 {
            let l2_slot = self
                .l2
                .partition_point(|v| key_cmp(v, k) != Ordering::Greater)
                .saturating_sub(1);
            let mut group_start = l2_slot * self.fanout_l2;
            let mut group_end = (group_start + self.fanout_l2).min(num_buckets);
            if group_start >= num_buckets {
                group_start = num_buckets - 1;
                group_end = num_buckets;
            }
            let slice = &self.l1[group_start..group_end];
            let offset = slice
                .partition_point(|v| key_cmp(v, k) != Ordering::Greater)
                .saturating_sub(1);
            Some((group_start + offset).min(num_buckets - 1))
        } else {
            let idx = self
                .l1
                .partition_point(|v| key_cmp(v, k) != Ordering::Greater)
                .saturating_sub(1);
            Some(idx.min(num_buckets - 1))
        }
    }

    fn read_bucket(&mut self, idx: usize) -> DbResult<Vec<Record>> {
        let offset = self.bucket_offsets[idx];
        let bytes = framing::read_chunk_at(&mut self.buckets_file, offset)?;
        self.io.record_read();
        bincode_decode(&bytes)
    }

    fn rebuild_from(&mut self, mut rows: Vec<Record>) -> DbResult<()> {
        sort_rows_by_key(&mut rows, &self.key_column)?;
        let buckets: Vec<Vec<Record>> = rows
            .chunks(self.fanout)
            .map(|c| c.to_vec())
            .filter(|b| !b.is_empty())
            .collect();

        let mut payloads = Vec::with_capacity(buckets.len());
        for b in &buckets {
            payloads.push(bincode_encode(b)?);
        }
        self.bucket_offsets = framing::rewrite_chunks(&mut self.buckets_file, &payloads)?;
        self.io.writes += payloads.len() as u64;

        let l1: Vec<Value> = buckets
            .iter()
            .map(|b| self.key_of(b.first().expect("non-empty")))
            .collect::<DbResult<Vec<_>>>()?;
        self.l1 = l1;

        let mut l2 = Vec::new();
        let mut i = 0;
        while i < self.l1.len() {
            l2.push(self.l1[i].clone());
            i += self.fanout_l2;
        }
        if self.l1.len() > 1 && l2.len() <= 1 {
            l2 = vec![
                self.l1.first().expect("non-empty").clone(),
                self.l1.last().expect("non-empty").clone(),
            ];
        }
        self.l2 = l2;
        self.overflow = vec![Vec::new(); buckets.len()];
        self.persist_indexes()?;
        Ok(())
    }

    fn persist_indexes(&mut self) -> DbResult<()> {
        let l1_payload = bincode_encode(&self.l1)?;
        framing::rewrite_single(&mut self.l1_file, &l1_payload)?;
        self.io.record_write();
        let l2_payload = bincode_encode(&self.l2)?;
        framing::rewrite_single(&mut self.l2_file, &l2_payload)?;
        self.io.record_write();
        self.persist_overflow()
    }

    fn persist_overflow(&mut self) -> DbResult<()> {
        let payload = bincode_encode(&self.overflow)?;
        framing::rewrite_single(&mut self.overflow_file, &payload)?;
        self.io.record_write();
        Ok(())
    }

    fn all_bucket_records(&mut self) -> DbResult<Vec<Vec<Record>>> {
        let mut out = Vec::with_capacity(self.bucket_offsets.len());
        for idx in 0..self.bucket_offsets.len() {
            out.push(self.read_bucket(idx)?);
        }
        Ok(out)
    }
}

impl PrimaryIndex for IsamIndex {
    fn build(&mut self, rows: Vec<Record>) -> DbResult<()> {
        self.rebuild_from(rows)
    }

    fn add(&mut self, row: &Record) -> DbResult<()> {
        let key = self.key_of(row)?;
        let idx = match self.find_bucket(&key) {
            Some(idx) => idx,
            None => {
                // Empty index: build a single-bucket structure from this row.
                self.rebuild_from(vec![row.clone()])?;
                return Ok(());
            }
        };
        let bucket = &mut self.overflow[idx];
        let pos = bucket.partition_point(|r| {
            self.key_of(r)
                .map(|k| key_cmp(&k, &key) != Ordering::Greater)
                .unwrap_or(true)
        });
        bucket.insert(pos, row.clone());
        self.persist_overflow()
    }

    fn search(&mut self, key: &Value) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        if let Some(idx) = self.find_bucket(key) {
            let bucket = self.read_bucket(idx)?;
            out.extend(
                bucket
                    .into_iter()
                    .filter(|r| self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false)),
            );
            out.extend(
                self.overflow[idx]
                    .iter()
                    .filter(|r| self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false))
                    .cloned(),
            );
        }
        Ok(out)
    }

    fn range_search(&mut self, lo: &Value, hi: &Value) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        let start = match self.find_bucket(lo) {
            Some(idx) => idx,
            None => return Ok(out),
        };
        for idx in start..self.l1.len() {
            if key_cmp(&self.l1[idx], hi) == Ordering::Greater {
                break;
            }
            let bucket = self.read_bucket(idx)?;
            for r in bucket {
                let k = self.key_of(&r)?;
                if key_cmp(&k, hi) == Ordering::Greater {
                    break;
                }
                if key_ge(&k, lo) && key_le(&k, hi) {
                    out.push(r);
                }
            }
            for r in &self.overflow[idx] {
                let k = self.key_of(r)?;
                if key_ge(&k, lo) && key_le(&k, hi) {
                    out.push(r.clone());
                }
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
        let idx = match self.find_bucket(key) {
            Some(idx) => idx,
            None => return Ok(0),
        };
        let before = self.overflow[idx].len();
        self.overflow[idx]
            .retain(|r| !self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false));
        let mut removed = before - self.overflow[idx].len();
        self.persist_overflow()?;

        let mut buckets = self.all_bucket_records()?;
        let before_bucket = buckets[idx].len();
        buckets[idx]
            .retain(|r| !self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false));
        removed += before_bucket - buckets[idx].len();

        let mut payloads = Vec::with_capacity(buckets.len());
        for b in &buckets {
            payloads.push(bincode_encode(b)?);
        }
        self.bucket_offsets = framing::rewrite_chunks(&mut self.buckets_file, &payloads)?;
        self.io.writes += payloads.len() as u64;
        Ok(removed)
    }

    fn save(&mut self) -> DbResult<()> {
        self.persist_indexes()
    }

    fn load(&mut self) -> DbResult<()> {
        if !self.buckets_path.exists() || !self.l1_path.exists() {
            return Err(DbError::FileNotFound(self.buckets_path.display().to_string()));
        }
        let chunks = framing::read_all_chunks(&mut self.buckets_file)?;
        self.io.reads += chunks.len() as u64;
        self.bucket_offsets = chunks.iter().map(|(o, _)| *o).collect();

        let l1_bytes = framing::read_single(&mut self.l1_file)?
            .ok_or_else(|| DbError::CorruptIndex("missing l1 index".into()))?;
        self.io.record_read();
        self.l1 = bincode_decode(&l1_bytes)?;

        let l2_bytes = framing::read_single(&mut self.l2_file)?
            .ok_or_else(|| DbError::CorruptIndex("missing l2 index".into()))?;
        self.io.record_read();
        self.l2 = bincode_decode(&l2_bytes)?;

        self.overflow = match framing::read_single(&mut self.overflow_file)? {
            Some(bytes) => {
                self.io.record_read();
                bincode_decode(&bytes)?
            }
            None => vec![Vec::new(); self.bucket_offsets.len()],
        };
        Ok(())
    }

    fn clear(&mut self) -> DbResult<()> {
        self.l1.clear();
        self.l2.clear();
        self.bucket_offsets.clear();
        self.overflow.clear();
        framing::rewrite_chunks(&mut self.buckets_file, &[])?;
        self.persist_indexes()
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
