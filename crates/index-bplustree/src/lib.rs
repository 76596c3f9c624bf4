//! B+-tree index with on-disk leaves (spec §4.4.4). The root is a
//! simplified separator-key list over the leaves (no recursive internal
//! node hierarchy) — `height` is therefore always 1 (single leaf) or 2.
//!
//! Deleting a key that empties its leaf does not drop the leaf's slot:
//! the slot is kept with an unreachable key-range sentinel so `num_leaves`
//! and the on-disk position of every other leaf stay stable across deletes.

use std::cmp::Ordering;
use std::fs::File;
use std::path::PathBuf;

use common::{DbError, DbResult, IoStats, Record};
use index_core::framing::{self, bincode_decode, bincode_encode};
use index_core::{key_cmp, key_eq, key_ge, key_le, sort_rows_by_key, PrimaryIndex};
use types::Value;

const INDEX_TYPE: &str = "bplustree";

#[derive(Clone, Debug)]
struct LeafSlot {
    /// `None` marks a sentinel slot: a leaf that was fully emptied by
    /// deletes and is no longer reachable by key, but still occupies a
    /// position in the file so sibling offsets don't need renumbering.
    range: Option<(Value, Value)>,
    offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructureInfo {
    pub num_leaves: usize,
    pub height: u32,
}

pub struct BPlusTreeIndex {
    key_column: String,
    order: usize,
    leaves_path: PathBuf,
    overflow_path: PathBuf,
    leaves_file: File,
    overflow_file: File,
    leaf_index: Vec<LeafSlot>,
    overflow: Vec<Record>,
    io: IoStats,
}

impl BPlusTreeIndex {
    pub fn open(
        data_dir: &std::path::Path,
        table: &str,
        key_column: impl Into<String>,
        order: usize,
    ) -> DbResult<Self> {
        let leaves_path = index_core::index_file_path(data_dir, table, INDEX_TYPE, "leaves", "dat");
        let overflow_path =
            index_core::index_file_path(data_dir, table, INDEX_TYPE, "overflow", "dat");
        let leaves_file = framing::open_rw(&leaves_path)?;
        let overflow_file = framing::open_rw(&overflow_path)?;
        Ok(Self {
            key_column: key_column.into(),
            order: order.max(1),
            leaves_path,
            overflow_path,
            leaves_file,
            overflow_file,
            leaf_index: Vec::new(),
            overflow: Vec::new(),
            io: IoStats::default(),
        })
    }

    pub fn get_structure_info(&self) -> StructureInfo {
        let num_leaves = self.leaf_index.len();
        StructureInfo {
            num_leaves,
            height: if num_leaves <= 1 { 1 } else { 2 },
        }
    }

    fn key_of(&self, row: &Record) -> DbResult<Value> {
        Ok(common::extract_key(row, &self.key_column)?.clone())
    }

    /// Separator entries for leaves that still hold data, paired with their
    /// slot index in `leaf_index`.
    fn active_slots(&self) -> Vec<(Value, usize)> {
        self.leaf_index
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.range.as_ref().map(|(first, _)| (first.clone(), i)))
            .collect()
    }

    fn find_leaf(&self, k: &Value) -> Option<usize> {
        let active = self.active_slots();
        if active.is_empty() {
            return None;
        }
        let idx = active.partition_point(|(first, _)| key_cmp(first, k) != Ordering::Greater);
        let candidate = idx.saturating_sub(1).min(active.len() - 1);
        Some(active[candidate].1)
    }

    fn read_leaf(&mut self, slot: usize) -> DbResult<Vec<Record>> {
        let offset = self.leaf_index[slot].offset;
        let bytes = framing::read_chunk_at(&mut self.leaves_file, offset)?;
        self.io.record_read();
        bincode_decode(&bytes)
    }

    fn rebuild_from(&mut self, mut rows: Vec<Record>) -> DbResult<()> {
        sort_rows_by_key(&mut rows, &self.key_column)?;
        let leaves: Vec<Vec<Record>> = rows
            .chunks(self.order)
            .map(|c| c.to_vec())
            .filter(|l| !l.is_empty())
            .collect();

        let mut payloads = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            payloads.push(bincode_encode(leaf)?);
        }
        let offsets = framing::rewrite_chunks(&mut self.leaves_file, &payloads)?;
        self.io.writes += payloads.len() as u64;

        let leaf_index: Vec<LeafSlot> = leaves
            .iter()
            .zip(offsets)
            .map(|(leaf, offset)| LeafSlot {
                range: Some((
                    self.key_of(leaf.first().expect("non-empty")).expect("validated"),
                    self.key_of(leaf.last().expect("non-empty")).expect("validated"),
                )),
                offset,
            })
            .collect();
        self.leaf_index = leaf_index;
        Ok(())
    }

    fn persist_overflow(&mut self) -> DbResult<()> {
        let payload = bincode_encode(&self.overflow)?;
        framing::rewrite_single(&mut self.overflow_file, &payload)?;
        self.io.record_write();
        Ok(())
    }
}

impl PrimaryIndex for BPlusTreeIndex {
    fn build(&mut self, rows: Vec<Record>) -> DbResult<()> {
        self.overflow.clear();
        self.rebuild_from(rows)?;
        self.persist_overflow()?;
        Ok(())
    }

    fn add(&mut self, row: &Record) -> DbResult<()> {
        self.key_of(row)?;
        self.overflow.push(row.clone());
        self.persist_overflow()
    }

    fn search(&mut self, key: &Value) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        if let Some(slot) = self.find_leaf(key) {
            let leaf = self.read_leaf(slot)?;
            out.extend(
                leaf.into_iter()
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
        let active = self.active_slots();
        let start = active.partition_point(|(first, _)| key_cmp(first, lo) == Ordering::Less);
        let begin = start.saturating_sub(1);
        for (first, slot) in &active[begin..] {
            if key_cmp(first, hi) == Ordering::Greater {
                break;
            }
            let leaf = self.read_leaf(*slot)?;
            for r in leaf {
                let k = self.key_of(&r)?;
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

        let Some(target_slot) = self.find_leaf(key) else {
            return Ok(removed);
        };

        let chunks = framing::read_all_chunks(&mut self.leaves_file)?;
        self.io.reads += chunks.len() as u64;

        let mut leaves: Vec<Vec<Record>> = Vec::with_capacity(chunks.len());
        for (_, bytes) in &chunks {
            leaves.push(bincode_decode(bytes)?);
        }

        let target = &mut leaves[target_slot];
        let before_leaf = target.len();
        target.retain(|r| !self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false));
        removed += before_leaf - target.len();

        let mut payloads = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            payloads.push(bincode_encode(leaf)?);
        }
        let offsets = framing::rewrite_chunks(&mut self.leaves_file, &payloads)?;
        self.io.writes += payloads.len() as u64;

        let mut leaf_index = Vec::with_capacity(leaves.len());
        for (leaf, offset) in leaves.iter().zip(offsets) {
            let range = match (leaf.first(), leaf.last()) {
                (Some(first), Some(last)) => {
                    Some((self.key_of(first)?, self.key_of(last)?))
                }
                _ => None,
            };
            leaf_index.push(LeafSlot { range, offset });
        }
        self.leaf_index = leaf_index;
        Ok(removed)
    }

    fn save(&mut self) -> DbResult<()> {
        self.persist_overflow()
    }

    fn load(&mut self) -> DbResult<()> {
        if !self.leaves_path.exists() {
            return Err(DbError::FileNotFound(self.leaves_path.display().to_string()));
        }
        let chunks = framing::read_all_chunks(&mut self.leaves_file)?;
        self.io.reads += chunks.len() as u64;
        let mut leaf_index = Vec::with_capacity(chunks.len());
        for (offset, payload) in chunks {
            let leaf: Vec<Record> = bincode_decode(&payload)?;
            let range = match (leaf.first(), leaf.last()) {
                (Some(first), Some(last)) => {
                    Some((self.key_of(first)?, self.key_of(last)?))
                }
                _ => None,
            };
            leaf_index.push(LeafSlot { range, offset });
        }
        self.leaf_index = leaf_index;

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
        self.leaf_index.clear();
        self.overflow.clear();
        framing::rewrite_chunks(&mut self.leaves_file, &[])?;
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
