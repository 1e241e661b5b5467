//! Google BigQuery query execution client.
//!
//! Provides [`BigQueryClient`], the [`Warehouse`] implementation backed by
//! `gcp-bigquery-client`, and [`BigQueryCursor`], which walks a job's result
//! pages one row at a time.

use std::collections::VecDeque;

use async_trait::async_trait;
use gcp_bigquery_client::model::dataset_reference::DatasetReference;
use gcp_bigquery_client::model::error_proto::ErrorProto;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::get_query_results_response::GetQueryResultsResponse;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::QueryResponse;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_row::TableRow;
use gcp_bigquery_client::model::table_schema::TableSchema;
use tracing::{debug, info};

use bq2csv_core::{CellValue, ColumnKind};

use crate::config::BigQuerySettings;
use crate::convert::decode_row;
use crate::warehouse::{Column, DryRunStatus, QueryOptions, RowCursor, Warehouse};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to BigQuery or writing its results.
#[derive(Debug, thiserror::Error)]
pub enum BigQueryError {
    /// The client could not be built (credentials, key file, token source).
    #[error("Failed establishing a BigQuery client connection: {0}")]
    Connection(String),

    /// The service rejected or failed the query.
    #[error("Query failed: {0}")]
    Query(String),

    /// The service rejected the query during planning.
    #[error("Dry run failed: {0}")]
    DryRun(String),

    /// Fetching a further page of results failed.
    #[error("Failed reading query results: {0}")]
    Cursor(String),

    /// The service response could not be interpreted.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// A row could not be written to the output stream.
    #[error("Failed writing to the output: {0}")]
    Output(String),
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for executing queries against BigQuery within one project.
///
/// Dropping the client releases its HTTP connection pool and token cache.
pub struct BigQueryClient {
    settings: BigQuerySettings,
    client: gcp_bigquery_client::Client,
}

impl BigQueryClient {
    /// Authenticate and build a client.
    ///
    /// Uses the service-account key in `settings.credentials_path` when set,
    /// application default credentials otherwise.
    pub async fn connect(settings: BigQuerySettings) -> Result<Self, BigQueryError> {
        let client = match &settings.credentials_path {
            Some(path) => {
                debug!(path = %path, "Using service account key file");
                gcp_bigquery_client::Client::from_service_account_key_file(path).await
            }
            None => {
                debug!("Using application default credentials");
                gcp_bigquery_client::Client::from_application_default_credentials().await
            }
        }
        .map_err(|e| BigQueryError::Connection(e.to_string()))?;

        info!(page_size = settings.page_size, "BigQuery client initialised");

        Ok(Self { settings, client })
    }

    fn build_request(&self, sql: &str, options: &QueryOptions, dry_run: bool) -> QueryRequest {
        let mut request = QueryRequest::new(sql);
        request.default_dataset = Some(DatasetReference {
            dataset_id: options.dataset.clone(),
            project_id: options.project.clone(),
        });
        request.location = options.location.clone();
        request.use_query_cache = Some(options.use_cache);
        request.dry_run = Some(dry_run);
        if !dry_run {
            request.max_results = Some(self.page_size());
        }
        request
    }

    fn page_size(&self) -> i32 {
        i32::try_from(self.settings.page_size).unwrap_or(i32::MAX)
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn dry_run(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<DryRunStatus, BigQueryError> {
        let request = self.build_request(sql, options, true);

        let response = self
            .client
            .job()
            .query(&options.project, request)
            .await
            .map_err(|e| BigQueryError::DryRun(e.to_string()))?;

        dry_run_status(&response)
    }

    async fn query(
        &self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<Box<dyn RowCursor>, BigQueryError> {
        let request = self.build_request(sql, options, false);

        let response = self
            .client
            .job()
            .query(&options.project, request)
            .await
            .map_err(|e| BigQueryError::Query(e.to_string()))?;

        let total_rows = response.total_rows.clone();
        let handle = job_handle(&response);
        // Reported errors take precedence over a missing job reference.
        let pages = ResultPages::from_response(response)?;
        let (job_id, job_location) = handle?;

        let mut cursor = BigQueryCursor {
            client: self.client.clone(),
            project: options.project.clone(),
            location: job_location.or_else(|| options.location.clone()),
            job_id,
            page_size: self.page_size(),
            pages,
        };

        info!(job_id = %cursor.job_id, total_rows = ?total_rows, "Query job accepted");

        // Long-poll until the job finishes so the schema and first page are known.
        while !cursor.pages.job_complete {
            cursor.fetch_page().await.map_err(|e| match e {
                BigQueryError::Cursor(msg) => BigQueryError::Query(msg),
                other => other,
            })?;
        }

        Ok(Box::new(cursor))
    }
}

/// Interpret a dry-run response.
fn dry_run_status(response: &QueryResponse) -> Result<DryRunStatus, BigQueryError> {
    if let Some(errors) = reported_errors(response.errors.as_deref()) {
        return Err(BigQueryError::DryRun(errors));
    }

    Ok(DryRunStatus {
        total_bytes_processed: parse_count(response.total_bytes_processed.as_deref()),
    })
}

/// Job id and location of an accepted query.
fn job_handle(response: &QueryResponse) -> Result<(String, Option<String>), BigQueryError> {
    let job_ref = response
        .job_reference
        .as_ref()
        .ok_or_else(|| BigQueryError::Decode("No job reference returned".into()))?;
    let job_id = job_ref
        .job_id
        .clone()
        .ok_or_else(|| BigQueryError::Decode("No job ID returned".into()))?;

    Ok((job_id, job_ref.location.clone()))
}

/// Joins the messages of REST `errors`, `None` when there are none.
fn reported_errors(errors: Option<&[ErrorProto]>) -> Option<String> {
    let errors = errors.filter(|errs| !errs.is_empty())?;
    let messages: Vec<String> = errors
        .iter()
        .map(|e| match (&e.reason, &e.message) {
            (Some(reason), Some(message)) => format!("{}: {}", reason, message),
            (None, Some(message)) => message.clone(),
            (Some(reason), None) => reason.clone(),
            (None, None) => "unknown error".to_string(),
        })
        .collect();
    Some(messages.join("; "))
}

// ---------------------------------------------------------------------------
// Result pages
// ---------------------------------------------------------------------------

/// Rows buffered from the pages of one query job, plus what is needed to
/// request the next page.
#[derive(Debug, Default)]
struct ResultPages {
    columns: Vec<Column>,
    buffered: VecDeque<TableRow>,
    page_token: Option<String>,
    cache_hit: Option<bool>,
    job_complete: bool,
}

impl ResultPages {
    /// State after the initial `jobs.query` call.
    fn from_response(response: QueryResponse) -> Result<Self, BigQueryError> {
        if let Some(errors) = reported_errors(response.errors.as_deref()) {
            return Err(BigQueryError::Query(errors));
        }

        Ok(Self {
            columns: columns_from_schema(response.schema.as_ref()),
            buffered: response.rows.unwrap_or_default().into(),
            page_token: response.page_token,
            cache_hit: response.cache_hit,
            job_complete: response.job_complete.unwrap_or(false),
        })
    }

    /// Take in a `getQueryResults` page (or the status of an unfinished job).
    fn absorb_page(&mut self, page: GetQueryResultsResponse) -> Result<usize, BigQueryError> {
        if let Some(errors) = reported_errors(page.errors.as_deref()) {
            return Err(BigQueryError::Cursor(errors));
        }

        self.job_complete = page.job_complete.unwrap_or(false);
        if !self.job_complete {
            return Ok(0);
        }

        if self.columns.is_empty() {
            self.columns = columns_from_schema(page.schema.as_ref());
        }
        if page.cache_hit.is_some() {
            self.cache_hit = page.cache_hit;
        }
        self.page_token = page.page_token;
        let rows = page.rows.unwrap_or_default();
        let fetched = rows.len();
        self.buffered.extend(rows);
        Ok(fetched)
    }

    /// Whether another page must be requested before the next row is known.
    fn needs_fetch(&self) -> bool {
        self.buffered.is_empty() && (!self.job_complete || self.page_token.is_some())
    }

    /// Next buffered row, decoded against the schema.
    fn pop_row(&mut self) -> Option<Vec<CellValue>> {
        let row = self.buffered.pop_front()?;
        let cells: Vec<_> = row
            .columns
            .unwrap_or_default()
            .into_iter()
            .map(|cell| cell.value)
            .collect();
        Some(decode_row(&self.columns, &cells))
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Sequential cursor over the pages of a completed query job.
pub struct BigQueryCursor {
    client: gcp_bigquery_client::Client,
    project: String,
    location: Option<String>,
    job_id: String,
    page_size: i32,
    pages: ResultPages,
}

impl BigQueryCursor {
    /// Fetch the next page of results (or poll an unfinished job).
    async fn fetch_page(&mut self) -> Result<(), BigQueryError> {
        let params = GetQueryResultsParameters {
            location: self.location.clone(),
            max_results: Some(self.page_size),
            page_token: self.pages.page_token.clone(),
            ..Default::default()
        };

        let page = self
            .client
            .job()
            .get_query_results(&self.project, &self.job_id, params)
            .await
            .map_err(|e| BigQueryError::Cursor(e.to_string()))?;

        let fetched = self.pages.absorb_page(page)?;
        if self.pages.job_complete {
            debug!(
                job_id = %self.job_id,
                rows = fetched,
                more = self.pages.page_token.is_some(),
                "Fetched result page"
            );
        } else {
            debug!(job_id = %self.job_id, "Job still running");
        }
        Ok(())
    }
}

#[async_trait]
impl RowCursor for BigQueryCursor {
    fn columns(&self) -> &[Column] {
        &self.pages.columns
    }

    fn job_id(&self) -> Option<&str> {
        Some(&self.job_id)
    }

    fn cache_hit(&self) -> Option<bool> {
        self.pages.cache_hit
    }

    async fn next_row(&mut self) -> Result<Option<Vec<CellValue>>, BigQueryError> {
        while self.pages.needs_fetch() {
            self.fetch_page().await?;
        }
        Ok(self.pages.pop_row())
    }
}

// ---------------------------------------------------------------------------
// Schema helpers
// ---------------------------------------------------------------------------

fn columns_from_schema(schema: Option<&TableSchema>) -> Vec<Column> {
    schema
        .and_then(|s| s.fields.as_ref())
        .map(|fields| fields.iter().map(column_from_field).collect())
        .unwrap_or_default()
}

fn column_from_field(field: &TableFieldSchema) -> Column {
    // FieldType serialises to its REST name ("NUMERIC", "BIGNUMERIC", ...).
    let type_name = serde_json::to_value(&field.r#type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", field.r#type));

    Column {
        name: field.name.clone(),
        kind: ColumnKind::from_type_name(&type_name),
        repeated: field.mode.as_deref() == Some("REPEATED"),
        fields: field
            .fields
            .as_ref()
            .map(|sub| sub.iter().map(column_from_field).collect())
            .unwrap_or_default(),
    }
}

/// REST counters are int64 values encoded as strings.
fn parse_count(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.parse().ok())
}
