use super::*;
use storage::DiskManager;
use tempfile::tempdir;
use types::Value;

fn record(key: i64) -> common::Record {
    let mut r = common::Record::new();
    r.insert("id".into(), Value::Int(key));
    r
}

fn pool(dir: &std::path::Path, size: usize) -> BufferPool {
    BufferPool::new(DiskManager::new(dir).unwrap(), size)
}

#[test]
fn miss_then_hit() {
    let dir = tempdir().unwrap();
    let mut bp = pool(dir.path(), 3);

    bp.put_page("t", Page::with_records(0, vec![record(1)]), true)
        .unwrap();
    bp.reset_stats();

    bp.get_page("t", 0).unwrap();
    assert_eq!(bp.stats().hits, 1);
    assert_eq!(bp.stats().misses, 0);
}

#[test]
fn s5_lru_eviction_scenario() {
    // records_per_page=5, pool_size=3: load 5 pages, read pages 0..4 sequentially.
    let dir = tempdir().unwrap();
    let mut bp = pool(dir.path(), 3);

    for i in 0..5u64 {
        bp.put_page("t", Page::with_records(i, vec![record(i as i64)]), true)
            .unwrap();
    }
    bp.reset_stats();

    for i in 0..5u64 {
        bp.get_page("t", i).unwrap();
    }
    let stats = bp.stats();
    assert_eq!(stats.misses, 5);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.pages_resident, 3);

    bp.get_page("t", 0).unwrap();
    assert_eq!(bp.stats().misses, 6);
}

#[test]
fn eviction_writes_back_dirty_page() {
    let dir = tempdir().unwrap();
    let mut bp = pool(dir.path(), 1);

    bp.put_page("t", Page::with_records(0, vec![record(1)]), false)
        .unwrap();
    // Second page evicts the first; since it was dirty it must be flushed.
    bp.put_page("t", Page::with_records(1, vec![record(2)]), false)
        .unwrap();

    let on_disk = bp.disk_manager().read_page("t", 0).unwrap().unwrap();
    assert_eq!(on_disk.records[0].get("id"), Some(&Value::Int(1)));
}

#[test]
fn flush_all_clears_dirty_set_without_evicting() {
    let dir = tempdir().unwrap();
    let mut bp = pool(dir.path(), 5);

    bp.put_page("t", Page::with_records(0, vec![record(1)]), false)
        .unwrap();
    bp.flush_all().unwrap();

    assert_eq!(bp.stats().pages_resident, 1);
    let on_disk = bp.disk_manager().read_page("t", 0).unwrap().unwrap();
    assert_eq!(on_disk.records.len(), 1);
}

#[test]
fn clear_table_evicts_and_flushes() {
    let dir = tempdir().unwrap();
    let mut bp = pool(dir.path(), 5);

    bp.put_page("t", Page::with_records(0, vec![record(1)]), false)
        .unwrap();
    bp.clear_table("t").unwrap();

    assert_eq!(bp.stats().pages_resident, 0);
    assert!(bp.disk_manager().read_page("t", 0).unwrap().is_some());
}
