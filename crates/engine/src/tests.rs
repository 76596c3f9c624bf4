use super::*;
use catalog::IndexType;
use common::{Column, Record};
use std::collections::HashMap;
use tempfile::tempdir;
use types::{SqlType, Value};

fn config(dir: &std::path::Path) -> Config {
    Config::builder().data_dir(dir.to_path_buf()).build()
}

fn row(id: i64, amount: i64) -> Record {
    let mut r = HashMap::new();
    r.insert("id".to_string(), Value::Int(id));
    r.insert("amount".to_string(), Value::Int(amount));
    r
}

#[test]
fn create_table_insert_select_round_trip() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config(dir.path())).unwrap();

    engine
        .create_table(
            "orders",
            "id",
            vec![Column::new("id", SqlType::Int), Column::new("amount", SqlType::Int)],
        )
        .unwrap();

    for i in 1..=5 {
        let resp = engine.dispatch(Request::InsertRow {
            table: "orders".into(),
            values: row(i, i * 10),
        });
        assert!(!resp.is_error());
    }

    let resp = engine.dispatch(Request::SelectEq {
        table: "orders".into(),
        column: "id".into(),
        value: Value::Int(3),
    });
    match resp.outcome {
        Outcome::Rows { count, .. } => assert_eq!(count, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn select_on_unknown_table_errors() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config(dir.path())).unwrap();
    let resp = engine.dispatch(Request::SelectEq {
        table: "ghost".into(),
        column: "id".into(),
        value: Value::Int(1),
    });
    assert!(resp.is_error());
}

#[test]
fn delete_eq_removes_row_and_reports_io() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config(dir.path())).unwrap();
    engine
        .create_table("orders", "id", vec![Column::new("id", SqlType::Int)])
        .unwrap();
    for i in 1..=10 {
        engine.dispatch(Request::InsertRow {
            table: "orders".into(),
            values: row(i, i),
        });
    }

    let resp = engine.dispatch(Request::DeleteEq {
        table: "orders".into(),
        column: "id".into(),
        value: Value::Int(5),
    });
    assert!(!resp.is_error());

    let resp = engine.dispatch(Request::SelectEq {
        table: "orders".into(),
        column: "id".into(),
        value: Value::Int(5),
    });
    match resp.outcome {
        Outcome::Rows { count, .. } => assert_eq!(count, 0),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn delete_eq_on_non_key_column_is_rejected() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config(dir.path())).unwrap();
    engine
        .create_table(
            "orders",
            "id",
            vec![Column::new("id", SqlType::Int), Column::new("amount", SqlType::Int)],
        )
        .unwrap();
    engine.dispatch(Request::InsertRow {
        table: "orders".into(),
        values: row(1, 100),
    });

    let resp = engine.dispatch(Request::DeleteEq {
        table: "orders".into(),
        column: "amount".into(),
        value: Value::Int(100),
    });
    assert!(resp.is_error());
}

#[test]
fn create_table_using_defers_schema_and_rejects_bare_insert() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config(dir.path())).unwrap();
    engine
        .create_table_using("events", IndexType::BPlusTree)
        .unwrap();
    assert!(!engine.tables.contains_key("events"));

    // No schema yet: a bare insert must not synthesize one, per spec §9.
    let resp = engine.dispatch(Request::InsertRow {
        table: "events".into(),
        values: row(1, 1),
    });
    assert!(resp.is_error());
    assert!(!engine.tables.contains_key("events"));

    // Once a schema arrives, the recorded index type is honored.
    engine
        .create_table(
            "events",
            "id",
            vec![Column::new("id", SqlType::Int), Column::new("amount", SqlType::Int)],
        )
        .unwrap();
    let resp = engine.dispatch(Request::InsertRow {
        table: "events".into(),
        values: row(1, 1),
    });
    assert!(!resp.is_error());
    let table = engine.tables.get("events").unwrap();
    assert_eq!(table.index_type(), IndexType::BPlusTree);
}

#[test]
fn insert_into_wholly_unknown_table_synthesizes_text_schema() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config(dir.path())).unwrap();
    // No CreateTable/CreateTableUsing at all: ad hoc ensure() applies.
    let resp = engine.dispatch(Request::InsertRow {
        table: "events".into(),
        values: row(1, 1),
    });
    assert!(!resp.is_error());
    assert!(engine.tables.contains_key("events"));
}

#[test]
fn load_csv_is_interface_only() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(config(dir.path())).unwrap();
    engine
        .create_table("orders", "id", vec![Column::new("id", SqlType::Int)])
        .unwrap();
    let resp = engine.dispatch(Request::LoadCsv {
        table: "orders".into(),
        path: "/tmp/orders.csv".into(),
    });
    assert!(resp.is_error());
}

#[test]
fn reopen_recovers_tables_from_catalog() {
    let dir = tempdir().unwrap();
    let path = dir.path().to_path_buf();
    {
        let mut engine = Engine::open(config(&path)).unwrap();
        engine
            .create_table("orders", "id", vec![Column::new("id", SqlType::Int)])
            .unwrap();
        for i in 1..=5 {
            engine.dispatch(Request::InsertRow {
                table: "orders".into(),
                values: row(i, i),
            });
        }
    }
    let mut engine = Engine::open(config(&path)).unwrap();
    let resp = engine.dispatch(Request::SelectEq {
        table: "orders".into(),
        column: "id".into(),
        value: Value::Int(3),
    });
    match resp.outcome {
        Outcome::Rows { count, .. } => assert_eq!(count, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
