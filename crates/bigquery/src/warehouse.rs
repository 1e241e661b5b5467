//! The seam between the exporter and the warehouse service.
//!
//! [`Warehouse`] is the single "run query, get row iterator" capability the
//! exporter needs. [`crate::client::BigQueryClient`] implements it against
//! Google BigQuery; tests implement it in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bq2csv_core::{CellValue, ColumnKind};

use crate::client::BigQueryError;

/// Job configuration applied to the submitted script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub project: String,
    pub dataset: String,
    /// Processing location (e.g. `EU`, `asia-southeast1`). `None` lets the service decide.
    pub location: Option<String>,
    pub use_cache: bool,
}

/// A result column as declared by the query schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// `REPEATED` mode: the cell holds an array.
    pub repeated: bool,
    /// Sub-fields of a `RECORD` column.
    pub fields: Vec<Column>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            repeated: false,
            fields: Vec::new(),
        }
    }
}

/// Outcome of a successful dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunStatus {
    /// Bytes the query would process, as estimated by the planner.
    pub total_bytes_processed: Option<u64>,
}

/// A sequential, server-paginated cursor over typed result rows.
#[async_trait]
pub trait RowCursor: Send {
    /// Columns of the result set, in row order.
    fn columns(&self) -> &[Column];

    /// Identifier of the job producing the rows, when the service reports one.
    fn job_id(&self) -> Option<&str> {
        None
    }

    /// Whether the result came from the query cache, when reported.
    fn cache_hit(&self) -> Option<bool> {
        None
    }

    /// Next row in service order, `Ok(None)` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, BigQueryError>;
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Validate and plan `sql` without executing it.
    async fn dry_run(&self, sql: &str, options: &QueryOptions)
        -> Result<DryRunStatus, BigQueryError>;

    /// Execute `sql` and return a cursor over its rows.
    async fn query(&self, sql: &str, options: &QueryOptions)
        -> Result<Box<dyn RowCursor>, BigQueryError>;
}
