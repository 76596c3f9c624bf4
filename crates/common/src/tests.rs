use super::*;
use std::io;

#[test]
fn config_defaults_match_spec() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.records_per_page, 10);
    assert_eq!(cfg.pool_size, 50);
    assert_eq!(cfg.block_size, 20);
    assert_eq!(cfg.fanout, 20);
    assert_eq!(cfg.fanout_l2, 5);
    assert_eq!(cfg.bucket_size, 20);
    assert_eq!(cfg.global_depth, 2);
    assert_eq!(cfg.order, 20);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("corruption".into());
    assert!(format!("{err}").contains("storage"));
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

#[test]
fn io_stats_add_and_reset() {
    let mut a = IoStats { reads: 3, writes: 1 };
    let b = IoStats { reads: 2, writes: 5 };
    let sum = a.add(&b);
    assert_eq!(sum, IoStats { reads: 5, writes: 6 });
    a.reset();
    assert_eq!(a, IoStats::default());
}

#[test]
fn extract_key_exact_match() {
    let mut row = Record::new();
    row.insert("id".into(), Value::Int(7));
    assert_eq!(extract_key(&row, "id").unwrap(), &Value::Int(7));
}

#[test]
fn extract_key_normalized_match() {
    let mut row = Record::new();
    row.insert("Restaurant ID".into(), Value::Int(42));
    assert_eq!(extract_key(&row, "restaurant_id").unwrap(), &Value::Int(42));
    assert_eq!(extract_key(&row, "\"Restaurant_ID\"").unwrap(), &Value::Int(42));
}

#[test]
fn extract_key_missing_fails() {
    let row = Record::new();
    assert!(matches!(extract_key(&row, "id"), Err(DbError::KeyNotFound(_))));
}
