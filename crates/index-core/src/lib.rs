//! Shared contract and on-disk plumbing for the four primary index
//! implementations (spec §4.4).
//!
//! Nothing in this crate is index-specific: the length-framed chunk format,
//! deterministic file naming, and key comparison rules are common to
//! `index-sequential`, `index-isam`, `index-exthash`, and `index-bplustree`
//! so their behavior (and bugs) cannot drift apart.

pub mod framing;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use common::{DbResult, IoStats, Record};
use types::Value;

/// Operations every primary index exposes (spec §4.4). `build` replaces the
/// index wholesale; `add` is an incremental, non-reorganizing insert; both
/// are infallible to omit per-index (a sequence of `add` calls can stand in
/// for a missing bulk `build`), but the shared trait always provides both so
/// callers never need to introspect capability.
pub trait PrimaryIndex {
    /// Discard current state and construct the index from `rows`.
    fn build(&mut self, rows: Vec<Record>) -> DbResult<()>;

    /// Insert a single record without global reorganization.
    fn add(&mut self, row: &Record) -> DbResult<()>;

    /// All records whose key equals `key`, order unspecified unless noted.
    fn search(&mut self, key: &Value) -> DbResult<Vec<Record>>;

    /// All records whose key is in `[lo, hi]`, ascending by key.
    fn range_search(&mut self, lo: &Value, hi: &Value) -> DbResult<Vec<Record>>;

    /// Physically remove every record whose key equals `key`, returning the
    /// count removed. Subsequent `search`/`range_search` never re-encounter
    /// them, even after a fresh `load`.
    fn remove(&mut self, key: &Value) -> DbResult<usize>;

    /// Persist the RAM portion and on-disk file pointers.
    fn save(&mut self) -> DbResult<()>;

    /// Restore from the on-disk form written by `save`. Fails with
    /// `FileNotFound`/`CorruptIndex` if the files are missing or unreadable;
    /// callers fall back to `build` from the heap on failure (spec §4.5).
    fn load(&mut self) -> DbResult<()>;

    /// Discard all on-disk and in-RAM state for this index.
    fn clear(&mut self) -> DbResult<()>;

    fn io_stats(&self) -> IoStats;
    fn reset_io_stats(&mut self);
}

/// Deterministic index file path: `<data_dir>/<table>_<index_type>_<role>.<ext>`
/// (spec §4.5, §6.3). The same inputs always resolve to the same path so a
/// table's indexes are recovered on restart without a separate pointer file.
pub fn index_file_path(
    data_dir: &Path,
    table: &str,
    index_type: &str,
    role: &str,
    ext: &str,
) -> PathBuf {
    data_dir.join(format!("{table}_{index_type}_{role}.{ext}"))
}

/// Type-tolerant key ordering shared by every index's sort/search logic.
/// Keys that can't be compared (a stray type mismatch from dynamically typed
/// CSV-derived data) sort as equal, which the stable sorts used throughout
/// this crate family resolve by insertion order — matching spec §4.4's tie
/// rule for `range_search`.
pub fn key_cmp(a: &Value, b: &Value) -> Ordering {
    a.cmp_same_type(b).unwrap_or(Ordering::Equal)
}

pub fn key_eq(a: &Value, b: &Value) -> bool {
    a.eq_same_type(b).unwrap_or(false)
}

pub fn key_le(a: &Value, b: &Value) -> bool {
    key_cmp(a, b) != Ordering::Greater
}

pub fn key_ge(a: &Value, b: &Value) -> bool {
    key_cmp(a, b) != Ordering::Less
}

/// Sorts `rows` ascending by the value of `key_column`, tolerant of missing
/// exact-name matches via `common::extract_key`'s normalization. Used by
/// every index's `build` to establish the on-disk ascending-key invariant.
pub fn sort_rows_by_key(rows: &mut [Record], key_column: &str) -> DbResult<()> {
    // Extract once per row up front so a `KeyNotFound` surfaces before any
    // partial sort work, and so the sort comparator itself cannot fail.
    let mut keyed: Vec<(Value, Record)> = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let key = common::extract_key(row, key_column)?.clone();
        keyed.push((key, row.clone()));
    }
    keyed.sort_by(|(a, _), (b, _)| key_cmp(a, b));
    for (slot, (_, row)) in rows.iter_mut().zip(keyed.into_iter()) {
        *slot = row.1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(k: i64) -> Record {
        let mut r = HashMap::new();
        r.insert("id".to_string(), Value::Int(k));
        r
    }

    #[test]
    fn sort_rows_by_key_orders_ascending() {
        let mut rows = vec![row(3), row(1), row(2)];
        sort_rows_by_key(&mut rows, "id").unwrap();
        let keys: Vec<i64> = rows
            .iter()
            .map(|r| match r.get("id").unwrap() {
                Value::Int(i) => *i,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn key_cmp_matches_int_ordering() {
        assert_eq!(key_cmp(&Value::Int(1), &Value::Int(2)), Ordering::Less);
        assert!(key_le(&Value::Int(1), &Value::Int(1)));
        assert!(key_ge(&Value::Int(2), &Value::Int(1)));
    }

    #[test]
    fn index_file_path_is_deterministic() {
        let p = index_file_path(Path::new("/data"), "orders", "isam", "buckets", "dat");
        assert_eq!(p, PathBuf::from("/data/orders_isam_buckets.dat"));
    }
}
