//! In-memory warehouse used by the export tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use bq2csv_bigquery::{
    BigQueryError, Column, DryRunStatus, ExportConfig, QueryOptions, RowCursor, Warehouse,
};
use bq2csv_core::CellValue;

#[derive(Default)]
pub struct MemoryWarehouse {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
    /// Cursor fails after yielding this many rows.
    pub fail_after: Option<usize>,
    /// Reject the script at submission with this message.
    pub reject: Option<String>,
    pub bytes_processed: Option<u64>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub dropped: Arc<AtomicBool>,
}

impl MemoryWarehouse {
    pub fn with_rows(columns: Vec<Column>, rows: Vec<Vec<CellValue>>) -> Self {
        let mut warehouse = Self::default();
        warehouse.columns = columns;
        warehouse.rows = rows;
        warehouse
    }

    fn log_call(&self, call: &str, sql: &str, options: &QueryOptions) {
        self.calls.lock().unwrap().push(format!(
            "{} {} {}.{} cache={}",
            call, sql, options.project, options.dataset, options.use_cache
        ));
    }
}

impl Drop for MemoryWarehouse {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn dry_run(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<DryRunStatus, BigQueryError> {
        self.log_call("dry_run", sql, options);
        if let Some(msg) = &self.reject {
            return Err(BigQueryError::DryRun(msg.clone()));
        }
        Ok(DryRunStatus {
            total_bytes_processed: self.bytes_processed,
        })
    }

    async fn query(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<Box<dyn RowCursor>, BigQueryError> {
        self.log_call("query", sql, options);
        if let Some(msg) = &self.reject {
            return Err(BigQueryError::Query(msg.clone()));
        }
        Ok(Box::new(MemoryCursor {
            columns: self.columns.clone(),
            rows: self.rows.clone().into(),
            fail_after: self.fail_after,
            yielded: 0,
        }))
    }
}

pub struct MemoryCursor {
    columns: Vec<Column>,
    rows: VecDeque<Vec<CellValue>>,
    fail_after: Option<usize>,
    yielded: usize,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn job_id(&self) -> Option<&str> {
        Some("job_memory_1")
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, BigQueryError> {
        if self.fail_after == Some(self.yielded) {
            return Err(BigQueryError::Cursor("connection reset while paging".into()));
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.yielded += 1;
        }
        Ok(row)
    }
}

/// Writer whose every write fails.
pub struct ClosedPipe;

impl io::Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
    }
}

pub fn config(delimiter: &str, dry_run: bool) -> ExportConfig {
    ExportConfig::new("my-project", "sales", delimiter, None, false, dry_run).unwrap()
}
