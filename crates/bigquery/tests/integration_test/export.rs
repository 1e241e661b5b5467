//! Tests for run_export: row streaming, dry runs, and failure handling.

use std::str::FromStr;
use std::sync::atomic::Ordering;

use bigdecimal::BigDecimal;

use bq2csv_bigquery::{run_export, BigQueryError, Column, ExecutionRecord};
use bq2csv_core::{CellValue, ColumnKind};

use crate::support::{config, ClosedPipe, MemoryWarehouse};

fn people() -> MemoryWarehouse {
    MemoryWarehouse::with_rows(
        vec![
            Column::new("id", ColumnKind::Integer),
            Column::new("name", ColumnKind::String),
        ],
        vec![
            vec![CellValue::Integer(1), CellValue::Text("alice".into())],
            vec![CellValue::Integer(2), CellValue::Text("bob".into())],
            vec![CellValue::Integer(3), CellValue::Text("charlie".into())],
        ],
    )
}

fn dec(s: &str) -> CellValue {
    CellValue::Decimal(BigDecimal::from_str(s).unwrap())
}

#[tokio::test]
async fn test_rows_are_written_in_cursor_order() {
    let mut record = ExecutionRecord::new("SELECT id, name FROM people".into());
    let mut out = Vec::new();

    run_export(people(), &config(",", false), &mut record, &mut out)
        .await
        .unwrap();

    assert_eq!(String::from_utf8(out).unwrap(), "1,alice\n2,bob\n3,charlie\n");
    assert_eq!(record.rows_written(), 3);
    assert!(record.error().is_none());

    let stats = record.stats();
    assert_eq!(stats.total_rows, 3);
    assert!(stats.first_row.is_some());
    assert!(stats.all_rows.unwrap() >= stats.first_row.unwrap());
}

#[tokio::test]
async fn test_empty_result_writes_nothing() {
    let warehouse = MemoryWarehouse::with_rows(vec![Column::new("x", ColumnKind::Integer)], vec![]);
    let mut record = ExecutionRecord::new("SELECT 1 LIMIT 0".into());
    let mut out = Vec::new();

    run_export(warehouse, &config(",", false), &mut record, &mut out)
        .await
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(record.rows_written(), 0);
    assert!(record.stats().all_rows.is_some());
}

#[tokio::test]
async fn test_cursor_error_keeps_rows_already_written() {
    for k in 0..3 {
        let mut warehouse = people();
        warehouse.fail_after = Some(k);
        let mut record = ExecutionRecord::new("SELECT id, name FROM people".into());
        let mut out = Vec::new();

        let result = run_export(warehouse, &config(",", false), &mut record, &mut out).await;

        assert!(result.is_err());
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), k, "after {} rows", k);
        assert_eq!(record.rows_written(), k as u64);
        assert!(matches!(record.error(), Some(BigQueryError::Cursor(_))));
        assert!(record.stats().all_rows.is_none());
    }
}

#[tokio::test]
async fn test_rejected_query_fails_without_output() {
    let mut warehouse = people();
    warehouse.reject = Some("Syntax error: Unexpected identifier \"SELEC\"".into());
    let mut record = ExecutionRecord::new("SELEC 1".into());
    let mut out = Vec::new();

    let result = run_export(warehouse, &config(",", false), &mut record, &mut out).await;

    assert!(result.is_err());
    assert!(out.is_empty());
    assert!(record.error().unwrap().to_string().contains("SELEC"));
}

#[tokio::test]
async fn test_dry_run_writes_zero_bytes() {
    let mut warehouse = people();
    warehouse.bytes_processed = Some(2048);
    let calls = warehouse.calls.clone();
    let mut record = ExecutionRecord::new("SELECT id, name FROM people".into());
    let mut out = Vec::new();

    run_export(warehouse, &config(",", true), &mut record, &mut out)
        .await
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(record.rows_written(), 0);
    let stats = record.stats();
    assert!(stats.query_end.unwrap() >= stats.query_start.unwrap());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("dry_run SELECT id, name FROM people my-project.sales"));
}

#[tokio::test]
async fn test_failed_dry_run_writes_zero_bytes() {
    let mut warehouse = people();
    warehouse.reject = Some("Table sales.missing was not found".into());
    let mut record = ExecutionRecord::new("SELECT * FROM missing".into());
    let mut out = Vec::new();

    let result = run_export(warehouse, &config(",", true), &mut record, &mut out).await;

    assert!(result.is_err());
    assert!(out.is_empty());
    assert_eq!(record.rows_written(), 0);
    assert!(matches!(record.error(), Some(BigQueryError::DryRun(_))));
}

#[tokio::test]
async fn test_fields_are_quoted_for_the_chosen_delimiter() {
    let warehouse = MemoryWarehouse::with_rows(
        vec![
            Column::new("a", ColumnKind::String),
            Column::new("b", ColumnKind::String),
            Column::new("c", ColumnKind::String),
        ],
        vec![vec![
            CellValue::Text("x|y".into()),
            CellValue::Text("say \"hi\"".into()),
            CellValue::Text("a,b".into()),
        ]],
    );
    let mut record = ExecutionRecord::new("SELECT a, b, c".into());
    let mut out = Vec::new();

    run_export(warehouse, &config("|", false), &mut record, &mut out)
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "\"x|y\"|\"say \"\"hi\"\"\"|a,b\n"
    );
}

#[tokio::test]
async fn test_cells_are_rendered_by_column_kind() {
    let warehouse = MemoryWarehouse::with_rows(
        vec![
            Column::new("n", ColumnKind::Numeric),
            Column::new("b", ColumnKind::BigNumeric),
            Column::new("z", ColumnKind::Numeric),
            Column::new("i", ColumnKind::Integer),
            Column::new("f", ColumnKind::Float),
            Column::new("ok", ColumnKind::Boolean),
            Column::new("missing", ColumnKind::String),
            Column::new("d", ColumnKind::Other("DATE".into())),
        ],
        vec![vec![
            dec("5.000"),
            dec("3.1400"),
            dec("0.000"),
            CellValue::Integer(-42),
            CellValue::Float(0.25),
            CellValue::Boolean(false),
            CellValue::Null,
            CellValue::Other("2024-02-29".into()),
        ]],
    );
    let mut record = ExecutionRecord::new("SELECT ...".into());
    let mut out = Vec::new();

    run_export(warehouse, &config(",", false), &mut record, &mut out)
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "5,3.14,0,-42,0.25,false,,2024-02-29\n"
    );
}

#[tokio::test]
async fn test_output_failure_is_an_execution_error() {
    let mut record = ExecutionRecord::new("SELECT id, name FROM people".into());

    let result = run_export(people(), &config(",", false), &mut record, ClosedPipe).await;

    assert!(result.is_err());
    assert!(matches!(record.error(), Some(BigQueryError::Output(_))));
}

#[tokio::test]
async fn test_failed_flush_keeps_the_accepted_row_count() {
    let mut record = ExecutionRecord::new("SELECT id, name FROM people".into());

    let result = run_export(people(), &config(",", false), &mut record, ClosedPipe).await;

    // All three small rows fit the writer's buffer; the broken stream only
    // shows at the final flush, after every row was counted.
    assert!(result.is_err());
    assert_eq!(record.rows_written(), 3);
    assert!(record.stats().all_rows.is_some());
    assert!(record.error().unwrap().to_string().starts_with("Failed writing to the output"));
}

#[tokio::test]
async fn test_warehouse_is_released_on_every_path() {
    let ok = people();
    let ok_dropped = ok.dropped.clone();
    let mut record = ExecutionRecord::new("SELECT 1".into());
    run_export(ok, &config(",", false), &mut record, Vec::new())
        .await
        .unwrap();
    assert!(ok_dropped.load(Ordering::SeqCst));

    let mut failing = people();
    failing.reject = Some("Access Denied".into());
    let failing_dropped = failing.dropped.clone();
    let mut record = ExecutionRecord::new("SELECT 1".into());
    assert!(run_export(failing, &config(",", false), &mut record, Vec::new())
        .await
        .is_err());
    assert!(failing_dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cache_and_dataset_reach_the_warehouse() {
    let warehouse = people();
    let calls = warehouse.calls.clone();
    let config = bq2csv_bigquery::ExportConfig::new("proj-a", "ds_b", ",", Some("EU"), true, false)
        .unwrap();
    let mut record = ExecutionRecord::new("SELECT 1".into());

    run_export(warehouse, &config, &mut record, Vec::new())
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(*calls, vec!["query SELECT 1 proj-a.ds_b cache=false".to_string()]);
}
