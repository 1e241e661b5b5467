//! Orchestration of one export: dry run or query, row streaming, statistics.

use std::io::Write;

use tracing::{debug, info};

use bq2csv_core::{render_row, ColumnKind};

use crate::config::ExportConfig;
use crate::output::CsvSink;
use crate::record::ExecutionRecord;
use crate::warehouse::{QueryOptions, Warehouse};

/// Returned when the execution record holds an error after the run.
#[derive(Debug, thiserror::Error)]
#[error("One or more queries failed")]
pub struct ExportFailed;

/// Run the script held by `record` against `warehouse`, writing rows to `out`.
///
/// The warehouse is dropped once execution finishes, before statistics are
/// logged, on every path. Rows already written stay written if a later row
/// fails; the output is flushed either way.
pub async fn run_export<W, O>(
    warehouse: W,
    config: &ExportConfig,
    record: &mut ExecutionRecord,
    out: O,
) -> Result<(), ExportFailed>
where
    W: Warehouse,
    O: Write,
{
    let options = config.query_options();
    let mut sink = CsvSink::new(out, config.delimiter);

    if config.dry_run {
        dry_run(&warehouse, &options, record).await;
    } else {
        stream_rows(&warehouse, &options, &mut sink, record).await;
    }

    drop(warehouse);
    debug!("BigQuery client released");

    if let Err(e) = sink.flush() {
        record.fail(e);
    }

    if config.dry_run {
        record.log_dry_run_stats();
    } else {
        record.log_query_stats();
    }

    if record.is_failed() {
        return Err(ExportFailed);
    }
    Ok(())
}

/// Plan the query without running it. Produces no rows.
pub async fn dry_run<W>(warehouse: &W, options: &QueryOptions, record: &mut ExecutionRecord)
where
    W: Warehouse + ?Sized,
{
    info!("Submitting query for dry run");
    record.mark_submitted();

    match warehouse.dry_run(record.sql(), options).await {
        Ok(status) => {
            record.mark_ready();
            record.set_bytes_processed(status.total_bytes_processed);
        }
        Err(e) => record.fail(e),
    }
}

/// Execute the query and write every row, in cursor order, through `sink`.
///
/// The first cursor or write error ends the loop and is kept in `record`.
pub async fn stream_rows<W, O>(
    warehouse: &W,
    options: &QueryOptions,
    sink: &mut CsvSink<O>,
    record: &mut ExecutionRecord,
) where
    W: Warehouse + ?Sized,
    O: Write,
{
    info!("Submitting query");
    record.mark_submitted();
    let cursor = warehouse.query(record.sql(), options).await;
    record.mark_ready();

    let mut cursor = match cursor {
        Ok(cursor) => cursor,
        Err(e) => {
            record.fail(e);
            return;
        }
    };
    record.set_job_details(cursor.job_id(), cursor.cache_hit());

    let kinds: Vec<ColumnKind> = cursor.columns().iter().map(|c| c.kind.clone()).collect();
    debug!(columns = kinds.len(), "Cursor ready");

    loop {
        match cursor.next_row().await {
            Ok(Some(row)) => {
                record.row_received();
                let fields = render_row(&kinds, &row);
                if let Err(e) = sink.write_record(&fields) {
                    record.fail(e);
                    return;
                }
                record.row_written();
            }
            Ok(None) => {
                record.mark_exhausted();
                record.set_job_details(cursor.job_id(), cursor.cache_hit());
                return;
            }
            Err(e) => {
                record.fail(e);
                return;
            }
        }
    }
}
