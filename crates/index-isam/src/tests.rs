use super::*;
use index_core::PrimaryIndex;
use std::collections::HashMap;
use tempfile::tempdir;

fn row(k: i64) -> Record {
    let mut r = HashMap::new();
    r.insert("id".to_string(), Value::Int(k));
    r
}

fn row_f(k: f64) -> Record {
    let mut r = HashMap::new();
    r.insert("id".to_string(), Value::Float(k));
    r
}

fn open_index(dir: &std::path::Path, fanout: usize, fanout_l2: usize) -> IsamIndex {
    IsamIndex::open(dir, "t", "id", fanout, fanout_l2).unwrap()
}

#[test]
fn s2_isam_two_level_navigation() {
    let dir = tempdir().unwrap();
    let mut idx = open_index(dir.path(), 4, 2);
    idx.build((1..=20).map(row).collect()).unwrap();

    let info = idx.get_structure_info();
    assert_eq!(info.num_buckets, 5);
    assert_eq!(info.l2_len, 3);

    idx.reset_io_stats();
    let hits = idx.search(&Value::Int(13)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(idx.io_stats().reads, 1);

    let range = idx.range_search(&Value::Int(5), &Value::Int(10)).unwrap();
    let keys: Vec<i64> = range
        .iter()
        .map(|r| match r["id"] {
            Value::Int(i) => i,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(keys, vec![5, 6, 7, 8, 9, 10]);

    idx.add(&row_f(5.5)).unwrap();
    let all = idx.range_search(&Value::Int(1), &Value::Int(20)).unwrap();
    assert_eq!(all.len(), 21);
}

#[test]
fn single_level_when_l2_collapses() {
    let dir = tempdir().unwrap();
    // fanout_l2 bigger than bucket count: l2 should expand to [first, last].
    let mut idx = open_index(dir.path(), 4, 10);
    idx.build((1..=20).map(row).collect()).unwrap();
    let info = idx.get_structure_info();
    assert_eq!(info.num_buckets, 5);
    assert_eq!(info.l2_len, 2);
    assert_eq!(idx.search(&Value::Int(20)).unwrap().len(), 1);
    assert_eq!(idx.search(&Value::Int(1)).unwrap().len(), 1);
}

#[test]
fn p3_delete_is_physical_after_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    {
        let mut idx = open_index(&path, 4, 2);
        idx.build((1..=20).map(row).collect()).unwrap();
        let removed = idx.remove(&Value::Int(13)).unwrap();
        assert_eq!(removed, 1);
        idx.save().unwrap();
    }
    let mut reopened = open_index(&path, 4, 2);
    reopened.load().unwrap();
    assert!(reopened.search(&Value::Int(13)).unwrap().is_empty());
    assert_eq!(reopened.search(&Value::Int(14)).unwrap().len(), 1);
}

#[test]
fn p6_reload_preserves_structure_and_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    {
        let mut idx = open_index(&path, 4, 2);
        idx.build((1..=20).map(row).collect()).unwrap();
        idx.save().unwrap();
    }
    let mut reopened = open_index(&path, 4, 2);
    reopened.load().unwrap();
    assert_eq!(reopened.get_structure_info().num_buckets, 5);
    for k in 1..=20 {
        assert_eq!(reopened.search(&Value::Int(k)).unwrap().len(), 1, "key {k}");
    }
}

#[test]
fn search_missing_key_returns_empty() {
    let dir = tempdir().unwrap();
    let mut idx = open_index(dir.path(), 4, 2);
    idx.build((1..=20).map(row).collect()).unwrap();
    assert!(idx.search(&Value::Int(999)).unwrap().is_empty());
}
