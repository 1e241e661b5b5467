//! Lifecycle record of one query execution.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::client::BigQueryError;

/// Tracks one invocation: the script, its terminal error, phase timestamps
/// and the number of rows written.
///
/// The error slot is write-once. Timestamps are clamped so that each phase is
/// never earlier than the one before it.
#[derive(Debug)]
pub struct ExecutionRecord {
    sql: String,
    error: Option<BigQueryError>,
    query_start: Option<DateTime<Utc>>,
    query_end: Option<DateTime<Utc>>,
    first_row: Option<DateTime<Utc>>,
    all_rows: Option<DateTime<Utc>>,
    rows_written: u64,
    job_id: Option<String>,
    cache_hit: Option<bool>,
    bytes_processed: Option<u64>,
}

/// Derived timings for the statistics summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    pub query_start: Option<DateTime<Utc>>,
    pub query_end: Option<DateTime<Utc>>,
    pub execution_ms: Option<i64>,
    pub first_row: Option<DateTime<Utc>>,
    pub all_rows: Option<DateTime<Utc>>,
    pub return_ms: Option<i64>,
    pub total_rows: u64,
}

impl ExecutionRecord {
    pub fn new(sql: String) -> Self {
        Self {
            sql,
            error: None,
            query_start: None,
            query_end: None,
            first_row: None,
            all_rows: None,
            rows_written: 0,
            job_id: None,
            cache_hit: None,
            bytes_processed: None,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Record a failure. Only the first failure is kept.
    pub fn fail(&mut self, err: BigQueryError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn error(&self) -> Option<&BigQueryError> {
        self.error.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Records accepted by the CSV writer. The writer buffers, so when the
    /// final flush fails some of these never reached the output stream; the
    /// run is then failed with an output error.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn mark_submitted(&mut self) {
        self.query_start = Some(Utc::now());
    }

    /// Query complete (dry run) or cursor ready (real run).
    pub fn mark_ready(&mut self) {
        self.query_end = Some(not_before(self.query_start));
    }

    /// Called for every row received; only the first one is timestamped.
    pub fn row_received(&mut self) {
        if self.first_row.is_none() {
            self.first_row = Some(not_before(self.query_end));
        }
    }

    pub fn row_written(&mut self) {
        self.rows_written += 1;
    }

    pub fn mark_exhausted(&mut self) {
        self.all_rows = Some(not_before(self.first_row.or(self.query_end)));
    }

    pub fn set_job_details(&mut self, job_id: Option<&str>, cache_hit: Option<bool>) {
        self.job_id = job_id.map(str::to_string);
        self.cache_hit = cache_hit;
    }

    pub fn set_bytes_processed(&mut self, bytes: Option<u64>) {
        self.bytes_processed = bytes;
    }

    pub fn stats(&self) -> QueryStats {
        QueryStats {
            query_start: self.query_start,
            query_end: self.query_end,
            execution_ms: elapsed_ms(self.query_start, self.query_end),
            first_row: self.first_row,
            all_rows: self.all_rows,
            return_ms: elapsed_ms(self.query_end, self.all_rows),
            total_rows: self.rows_written,
        }
    }

    /// Log the statistics of a real run, or only the error if it failed.
    pub fn log_query_stats(&self) {
        info!("Query execution");
        if let Some(err) = &self.error {
            error!(error = %err, rows_written = self.rows_written, "Query execution failed");
            return;
        }

        let stats = self.stats();
        info!(
            start = %fmt_ts(stats.query_start),
            end = %fmt_ts(stats.query_end),
            execution_ms = stats.execution_ms.unwrap_or(0),
            "Query executed"
        );
        if let Some(job_id) = &self.job_id {
            info!(job_id = %job_id, cache_hit = ?self.cache_hit, "Job details");
        }
        info!(
            first_row = %fmt_ts(stats.first_row),
            all_rows = %fmt_ts(stats.all_rows),
            return_ms = stats.return_ms.unwrap_or(0),
            "Rows returned"
        );
        info!(total_rows = stats.total_rows, "Total rows returned");
    }

    /// Log the statistics of a dry run, or only the error if it failed.
    pub fn log_dry_run_stats(&self) {
        info!("Query dry run");
        if let Some(err) = &self.error {
            error!(error = %err, "Query dry run failed");
            return;
        }

        let stats = self.stats();
        info!(
            start = %fmt_ts(stats.query_start),
            end = %fmt_ts(stats.query_end),
            execution_ms = stats.execution_ms.unwrap_or(0),
            "Query validated"
        );
        if let Some(bytes) = self.bytes_processed {
            info!(bytes_processed = bytes, "Estimated bytes processed");
        }
    }
}

fn not_before(prev: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match prev {
        Some(p) if p > now => p,
        _ => now,
    }
}

fn elapsed_ms(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<i64> {
    Some((to? - from?).num_milliseconds())
}

fn fmt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "n/a".to_string())
}
