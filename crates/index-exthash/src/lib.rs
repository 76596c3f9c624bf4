//! Extendible hash index (spec §4.4.3): a directory of `2^global_depth`
//! slots mapping to buckets, each carrying its own `local_depth`. Buckets
//! only split during [`build`](PrimaryIndex::build); [`add`](PrimaryIndex::add)
//! always lands in the RAM overflow list, matching the spec's "splits only
//! happen during build" rule.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use common::{DbError, DbResult, IoStats, Record};
use index_core::framing::{self, bincode_decode, bincode_encode};
use index_core::{key_eq, key_ge, key_le, key_cmp, PrimaryIndex};
use serde::{Deserialize, Serialize};
use types::Value;

const INDEX_TYPE: &str = "ext_hash";

#[derive(Serialize, Deserialize)]
struct Header {
    global_depth: u32,
    directory: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct BucketPayload {
    id: u64,
    local_depth: u32,
    entries: Vec<Record>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructureInfo {
    pub global_depth: u32,
    pub num_buckets: usize,
}

pub struct ExtHashIndex {
    key_column: String,
    bucket_size: usize,
    initial_global_depth: u32,
    buckets_path: PathBuf,
    overflow_path: PathBuf,
    buckets_file: File,
    overflow_file: File,
    global_depth: u32,
    directory: Vec<u64>,
    local_depths: HashMap<u64, u32>,
    bucket_positions: HashMap<u64, u64>,
    next_bucket_id: u64,
    overflow: Vec<Record>,
    io: IoStats,
}

fn hash_key(key: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    match key {
        Value::Int(i) => {
            0u8.hash(&mut hasher);
            i.hash(&mut hasher);
        }
        Value::Float(f) => {
            1u8.hash(&mut hasher);
            f.to_bits().hash(&mut hasher);
        }
        Value::Text(s) => {
            2u8.hash(&mut hasher);
            s.hash(&mut hasher);
        }
    }
    hasher.finish()
}

fn dir_slot(hash: u64, dir_len: usize) -> usize {
    (hash as usize) & (dir_len - 1)
}

const MAX_LOCAL_DEPTH: u32 = 32;

impl ExtHashIndex {
    pub fn open(
        data_dir: &std::path::Path,
        table: &str,
        key_column: impl Into<String>,
        bucket_size: usize,
        initial_global_depth: u32,
    ) -> DbResult<Self> {
        let buckets_path = index_core::index_file_path(data_dir, table, INDEX_TYPE, "buckets", "dat");
        let overflow_path =
            index_core::index_file_path(data_dir, table, INDEX_TYPE, "overflow", "dat");
        let buckets_file = framing::open_rw(&buckets_path)?;
        let overflow_file = framing::open_rw(&overflow_path)?;
        Ok(Self {
            key_column: key_column.into(),
            bucket_size: bucket_size.max(1),
            initial_global_depth: initial_global_depth.max(1),
            buckets_path,
            overflow_path,
            buckets_file,
            overflow_file,
            global_depth: 0,
            directory: Vec::new(),
            local_depths: HashMap::new(),
            bucket_positions: HashMap::new(),
            next_bucket_id: 0,
            overflow: Vec::new(),
            io: IoStats::default(),
        })
    }

    pub fn get_structure_info(&self) -> StructureInfo {
        StructureInfo {
            global_depth: self.global_depth,
            num_buckets: self.local_depths.len(),
        }
    }

    fn key_of(&self, row: &Record) -> DbResult<Value> {
        Ok(common::extract_key(row, &self.key_column)?.clone())
    }

    fn maybe_split(
        &self,
        directory: &mut Vec<u64>,
        local_depths: &mut HashMap<u64, u32>,
        buckets: &mut HashMap<u64, Vec<Record>>,
        next_id: &mut u64,
        start_id: u64,
    ) -> DbResult<()> {
        let mut queue = vec![start_id];
        while let Some(bucket_id) = queue.pop() {
            if buckets[&bucket_id].len() <= self.bucket_size {
                continue;
            }
            let local_depth = local_depths[&bucket_id];
            if local_depth >= MAX_LOCAL_DEPTH {
                // Degenerate case (e.g. many equal keys): accept the oversized
                // bucket rather than splitting forever.
                continue;
            }
            let global_depth = directory.len().trailing_zeros();
            if local_depth == global_depth {
                let old_dir = directory.clone();
                directory.extend(old_dir);
            }
            let new_local_depth = local_depth + 1;
            let new_id = *next_id;
            *next_id += 1;
            local_depths.insert(bucket_id, new_local_depth);
            local_depths.insert(new_id, new_local_depth);
            buckets.insert(new_id, Vec::new());

            let entries = std::mem::take(buckets.get_mut(&bucket_id).unwrap());
            let mut keep = Vec::new();
            let mut moved = Vec::new();
            for entry in entries {
                let k = self.key_of(&entry)?;
                let bit = (hash_key(&k) >> (new_local_depth - 1)) & 1;
                if bit == 0 {
                    keep.push(entry);
                } else {
                    moved.push(entry);
                }
            }
            *buckets.get_mut(&bucket_id).unwrap() = keep;
            *buckets.get_mut(&new_id).unwrap() = moved;

            for (slot_idx, slot_bucket) in directory.iter_mut().enumerate() {
                if *slot_bucket == bucket_id {
                    let bit = (slot_idx as u64 >> (new_local_depth - 1)) & 1;
                    if bit == 1 {
                        *slot_bucket = new_id;
                    }
                }
            }
            queue.push(bucket_id);
            queue.push(new_id);
        }
        Ok(())
    }

    fn persist_structure(
        &mut self,
        directory: Vec<u64>,
        local_depths: HashMap<u64, u32>,
        mut buckets: HashMap<u64, Vec<Record>>,
        next_id: u64,
    ) -> DbResult<()> {
        let global_depth = directory.len().trailing_zeros();
        let header = Header {
            global_depth,
            directory: directory.clone(),
        };

        let mut unique_ids: Vec<u64> = buckets.keys().copied().collect();
        unique_ids.sort_unstable();

        let mut payloads = Vec::with_capacity(unique_ids.len() + 1);
        payloads.push(bincode_encode(&header)?);
        for id in &unique_ids {
            let payload = BucketPayload {
                id: *id,
                local_depth: local_depths[id],
                entries: buckets.remove(id).unwrap_or_default(),
            };
            payloads.push(bincode_encode(&payload)?);
        }

        let offsets = framing::rewrite_chunks(&mut self.buckets_file, &payloads)?;
        self.io.writes += payloads.len() as u64;

        let mut bucket_positions = HashMap::with_capacity(unique_ids.len());
        for (id, offset) in unique_ids.iter().zip(offsets.into_iter().skip(1)) {
            bucket_positions.insert(*id, offset);
        }

        self.global_depth = global_depth;
        self.directory = directory;
        self.local_depths = local_depths;
        self.bucket_positions = bucket_positions;
        self.next_bucket_id = next_id;
        Ok(())
    }

    fn persist_overflow(&mut self) -> DbResult<()> {
        let payload = bincode_encode(&self.overflow)?;
        framing::rewrite_single(&mut self.overflow_file, &payload)?;
        self.io.record_write();
        Ok(())
    }

    fn read_bucket(&mut self, bucket_id: u64) -> DbResult<Vec<Record>> {
        let offset = *self
            .bucket_positions
            .get(&bucket_id)
            .ok_or_else(|| DbError::CorruptIndex(format!("unknown bucket {bucket_id}")))?;
        let bytes = framing::read_chunk_at(&mut self.buckets_file, offset)?;
        self.io.record_read();
        let payload: BucketPayload = bincode_decode(&bytes)?;
        Ok(payload.entries)
    }
}

impl PrimaryIndex for ExtHashIndex {
    fn build(&mut self, rows: Vec<Record>) -> DbResult<()> {
        let global_depth = self.initial_global_depth;
        let num_slots = 1usize << global_depth;
        let directory: Vec<u64> = (0..num_slots as u64).collect();
        let mut local_depths: HashMap<u64, u32> =
            directory.iter().map(|&id| (id, global_depth)).collect();
        let mut buckets: HashMap<u64, Vec<Record>> =
            directory.iter().map(|&id| (id, Vec::new())).collect();
        let mut next_id = num_slots as u64;
        let mut directory = directory;

        for row in rows {
            let key = self.key_of(&row)?;
            let slot = dir_slot(hash_key(&key), directory.len());
            let bucket_id = directory[slot];
            buckets.get_mut(&bucket_id).unwrap().push(row);
            self.maybe_split(&mut directory, &mut local_depths, &mut buckets, &mut next_id, bucket_id)?;
        }

        self.overflow.clear();
        self.persist_structure(directory, local_depths, buckets, next_id)?;
        self.persist_overflow()?;
        Ok(())
    }

    fn add(&mut self, row: &Record) -> DbResult<()> {
        self.key_of(row)?;
        if self.directory.is_empty() {
            return self.build(vec![row.clone()]);
        }
        self.overflow.push(row.clone());
        self.persist_overflow()
    }

    fn search(&mut self, key: &Value) -> DbResult<Vec<Record>> {
        let mut out = Vec::new();
        if !self.directory.is_empty() {
            let slot = dir_slot(hash_key(key), self.directory.len());
            let bucket_id = self.directory[slot];
            let bucket = self.read_bucket(bucket_id)?;
            out.extend(
                bucket
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
        let mut unique_ids: Vec<u64> = self.directory.iter().copied().collect::<std::collections::HashSet<_>>().into_iter().collect();
        unique_ids.sort_unstable();
        for id in unique_ids {
            let bucket = self.read_bucket(id)?;
            for r in bucket {
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

        if self.directory.is_empty() {
            return Ok(removed);
        }

        let chunks = framing::read_all_chunks(&mut self.buckets_file)?;
        self.io.reads += chunks.len() as u64;
        let mut iter = chunks.into_iter();
        let (_, header_bytes) = iter.next().ok_or_else(|| DbError::CorruptIndex("missing header".into()))?;
        let header: Header = bincode_decode(&header_bytes)?;

        let slot = dir_slot(hash_key(key), header.directory.len());
        let target_bucket = header.directory[slot];

        let mut local_depths = HashMap::new();
        let mut buckets = HashMap::new();
        for (_, bytes) in iter {
            let payload: BucketPayload = bincode_decode(&bytes)?;
            local_depths.insert(payload.id, payload.local_depth);
            if payload.id == target_bucket {
                let before_bucket = payload.entries.len();
                let mut entries = payload.entries;
                entries.retain(|r| !self.key_of(r).map(|k| key_eq(&k, key)).unwrap_or(false));
                removed += before_bucket - entries.len();
                buckets.insert(payload.id, entries);
            } else {
                buckets.insert(payload.id, payload.entries);
            }
        }

        let next_id = self.next_bucket_id;
        self.persist_structure(header.directory, local_depths, buckets, next_id)?;
        Ok(removed)
    }

    fn save(&mut self) -> DbResult<()> {
        self.persist_overflow()
    }

    fn load(&mut self) -> DbResult<()> {
        if !self.buckets_path.exists() {
            return Err(DbError::FileNotFound(self.buckets_path.display().to_string()));
        }
        let chunks = framing::read_all_chunks(&mut self.buckets_file)?;
        self.io.reads += chunks.len() as u64;
        let mut iter = chunks.into_iter();
        let (_, header_bytes) = iter
            .next()
            .ok_or_else(|| DbError::CorruptIndex("missing header".into()))?;
        let header: Header = bincode_decode(&header_bytes)?;

        let mut local_depths = HashMap::new();
        let mut bucket_positions = HashMap::new();
        let mut max_id = 0u64;
        for (offset, bytes) in iter {
            let payload: BucketPayload = bincode_decode(&bytes)?;
            max_id = max_id.max(payload.id + 1);
            local_depths.insert(payload.id, payload.local_depth);
            bucket_positions.insert(payload.id, offset);
        }

        self.global_depth = header.global_depth;
        self.directory = header.directory;
        self.local_depths = local_depths;
        self.bucket_positions = bucket_positions;
        self.next_bucket_id = max_id;

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
        self.global_depth = 0;
        self.directory.clear();
        self.local_depths.clear();
        self.bucket_positions.clear();
        self.next_bucket_id = 0;
        self.overflow.clear();
        framing::rewrite_chunks(&mut self.buckets_file, &[])?;
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
