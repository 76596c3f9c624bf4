use super::*;
use catalog::Heap;
use common::Column;
use std::collections::HashMap;
use tempfile::tempdir;
use types::SqlType;

fn schema() -> TableSchema {
    TableSchema::new(
        "orders",
        "id",
        vec![
            Column::new("id", SqlType::Int),
            Column::new("amount", SqlType::Int),
        ],
    )
}

fn row(id: i64, amount: i64) -> Record {
    let mut r = HashMap::new();
    r.insert("id".to_string(), Value::Int(id));
    r.insert("amount".to_string(), Value::Int(amount));
    r
}

fn open(dir: &Path, index_type: IndexType) -> (Heap, Table) {
    let config = Config::default();
    let heap = Heap::open(dir, config.records_per_page, config.pool_size).unwrap();
    let table = Table::new(schema(), index_type, dir, &config).unwrap();
    (heap, table)
}

#[test]
fn load_then_select_eq_and_range_by_key() {
    let dir = tempdir().unwrap();
    let (mut heap, mut table) = open(dir.path(), IndexType::Sequential);
    let rows: Vec<Record> = (1..=10).map(|i| row(i, i * 10)).collect();
    table.load(&mut heap, rows).unwrap();

    let hit = table.select_eq(&mut heap, "id", &Value::Int(5)).unwrap();
    assert_eq!(hit.len(), 1);

    let range = table
        .select_range(&mut heap, "id", &Value::Int(3), &Value::Int(6))
        .unwrap();
    assert_eq!(range.len(), 4);
}

#[test]
fn select_eq_on_non_key_column_scans_heap() {
    let dir = tempdir().unwrap();
    let (mut heap, mut table) = open(dir.path(), IndexType::Sequential);
    let rows: Vec<Record> = (1..=5).map(|i| row(i, 100)).collect();
    table.load(&mut heap, rows).unwrap();

    let hits = table.select_eq(&mut heap, "amount", &Value::Int(100)).unwrap();
    assert_eq!(hits.len(), 5);
}

#[test]
fn insert_then_delete_removes_from_index_reads() {
    let dir = tempdir().unwrap();
    let (mut heap, mut table) = open(dir.path(), IndexType::Isam);
    let rows: Vec<Record> = (1..=20).map(|i| row(i, i)).collect();
    table.load(&mut heap, rows).unwrap();

    table.insert(&mut heap, row(21, 21)).unwrap();
    assert_eq!(table.select_eq(&mut heap, "id", &Value::Int(21)).unwrap().len(), 1);

    let removed = table.delete(&Value::Int(10)).unwrap();
    assert_eq!(removed, 1);
    assert!(table.select_eq(&mut heap, "id", &Value::Int(10)).unwrap().is_empty());
}

#[test]
fn rebuild_indexes_recovers_from_a_missing_index_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    {
        let (mut heap, mut table) = open(&path, IndexType::BPlusTree);
        let rows: Vec<Record> = (1..=10).map(|i| row(i, i)).collect();
        table.load(&mut heap, rows).unwrap();
    }
    // Drop the persisted leaf file: a fresh Table's first load() now fails
    // and rebuild_indexes must fall back to scanning the heap instead.
    let leaves_path = index_core::index_file_path(&path, "orders", "bplustree", "leaves", "dat");
    std::fs::remove_file(&leaves_path).unwrap();

    let config = Config::default();
    let mut heap = Heap::open(&path, config.records_per_page, config.pool_size).unwrap();
    let mut table = Table::new(schema(), IndexType::BPlusTree, &path, &config).unwrap();
    table.rebuild_indexes(&mut heap).unwrap();
    assert_eq!(table.select_eq(&mut heap, "id", &Value::Int(7)).unwrap().len(), 1);
}
