pub mod client;
pub mod config;
pub mod convert;
pub mod execute;
pub mod input;
pub mod logging;
pub mod output;
pub mod record;
pub mod warehouse;

pub use client::{BigQueryClient, BigQueryCursor, BigQueryError};
pub use config::{BigQuerySettings, ExportConfig};
pub use execute::{run_export, ExportFailed};
pub use output::CsvSink;
pub use record::{ExecutionRecord, QueryStats};
pub use warehouse::{Column, DryRunStatus, QueryOptions, RowCursor, Warehouse};
