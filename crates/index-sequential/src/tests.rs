use super::*;
use index_core::PrimaryIndex;
use std::collections::HashMap;
use tempfile::tempdir;

fn row(k: i64) -> Record {
    let mut r = HashMap::new();
    r.insert("id".to_string(), Value::Int(k));
    r
}

fn open_index(dir: &std::path::Path, block_size: usize) -> SequentialIndex {
    SequentialIndex::open(dir, "t", "id", block_size, 0.1).unwrap()
}

#[test]
fn s1_sequential_round_trip() {
    let dir = tempdir().unwrap();
    let mut idx = open_index(dir.path(), 10);

    let mut keys: Vec<i64> = (1..=100).collect();
    keys.reverse();
    let rows: Vec<Record> = keys.into_iter().map(row).collect();
    idx.build(rows).unwrap();

    let hits = idx.search(&Value::Int(50)).unwrap();
    assert_eq!(hits.len(), 1);

    let range = idx.range_search(&Value::Int(40), &Value::Int(60)).unwrap();
    assert_eq!(range.len(), 21);
    let keys: Vec<i64> = range
        .iter()
        .map(|r| match r["id"] {
            Value::Int(i) => i,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(keys, (40..=60).collect::<Vec<_>>());

    let removed = idx.remove(&Value::Int(50)).unwrap();
    assert_eq!(removed, 1);
    assert!(idx.search(&Value::Int(50)).unwrap().is_empty());
    assert_eq!(
        idx.range_search(&Value::Int(40), &Value::Int(60))
            .unwrap()
            .len(),
        20
    );
}

#[test]
fn add_lands_in_overflow_and_is_searchable() {
    let dir = tempdir().unwrap();
    let mut idx = open_index(dir.path(), 10);
    idx.build((1..=20).map(row).collect()).unwrap();
    idx.reset_io_stats();

    idx.add(&row(15)).unwrap();
    let hits = idx.search(&Value::Int(15)).unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn reorganize_triggers_past_threshold() {
    let dir = tempdir().unwrap();
    let mut idx = open_index(dir.path(), 10);
    idx.build((1..=10).map(row).collect()).unwrap();
    // capacity = 10, threshold 0.1 -> adding 2 rows (20%) must reorganize.
    idx.add(&row(100)).unwrap();
    idx.add(&row(101)).unwrap();
    assert!(idx.overflow.is_empty(), "overflow should flush on reorganize");
    assert!(idx.block_index.len() >= 1);
    assert_eq!(idx.search(&Value::Int(100)).unwrap().len(), 1);
}

#[test]
fn search_missing_key_returns_empty() {
    let dir = tempdir().unwrap();
    let mut idx = open_index(dir.path(), 10);
    idx.build((1..=5).map(row).collect()).unwrap();
    assert!(idx.search(&Value::Int(999)).unwrap().is_empty());
}

#[test]
fn overflow_only_search_counts_zero_reads() {
    let dir = tempdir().unwrap();
    let mut idx = open_index(dir.path(), 10);
    idx.build(Vec::new()).unwrap();
    idx.add(&row(1)).unwrap();
    idx.reset_io_stats();
    idx.search(&Value::Int(1)).unwrap();
    assert_eq!(idx.io_stats().reads, 0);
}

#[test]
fn p3_delete_is_physical_after_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    {
        let mut idx = open_index(&path, 10);
        idx.build((1..=50).map(row).collect()).unwrap();
        idx.remove(&Value::Int(25)).unwrap();
    }
    let mut reopened = open_index(&path, 10);
    reopened.load().unwrap();
    assert!(reopened.search(&Value::Int(25)).unwrap().is_empty());
    assert_eq!(reopened.search(&Value::Int(24)).unwrap().len(), 1);
}

#[test]
fn p6_reload_preserves_all_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    {
        let mut idx = open_index(&path, 7);
        idx.build((1..=30).map(row).collect()).unwrap();
        idx.save().unwrap();
    }
    let mut reopened = open_index(&path, 7);
    reopened.load().unwrap();
    for k in 1..=30 {
        assert_eq!(reopened.search(&Value::Int(k)).unwrap().len(), 1, "key {k}");
    }
}
