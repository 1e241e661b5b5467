use serde::{Deserialize, Serialize};

use bq2csv_core::config::{active_profile, profiled_env_opt, profiled_env_u32};
use bq2csv_core::Bq2CsvError;

use crate::warehouse::QueryOptions;

/// Rows requested per result page.
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

/// The REST API takes `maxResults` as an int32.
pub const MAX_PAGE_SIZE: u32 = i32::MAX as u32;

// ── BigQuerySettings ─────────────────────────────────────────────

/// Client settings that come from the environment rather than the command line.
///
/// With `BQ2CSV_PROFILE=PROD`, `PROD_GOOGLE_APPLICATION_CREDENTIALS` is checked
/// before `GOOGLE_APPLICATION_CREDENTIALS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigQuerySettings {
    /// Service account key file. `None` means application default credentials.
    pub credentials_path: Option<String>,
    /// Rows per result page.
    pub page_size: u32,
}

impl Default for BigQuerySettings {
    fn default() -> Self {
        Self {
            credentials_path: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl BigQuerySettings {
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    /// Build settings for a specific named profile.
    pub fn from_env_profiled(profile: &str) -> Self {
        let page_size = match profiled_env_u32(profile, "BQ2CSV_PAGE_SIZE", DEFAULT_PAGE_SIZE) {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };

        Self {
            credentials_path: profiled_env_opt(profile, "GOOGLE_APPLICATION_CREDENTIALS"),
            page_size,
        }
    }
}

// ── ExportConfig ─────────────────────────────────────────────────

/// Validated command-line options for one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub project: String,
    pub dataset: String,
    pub location: Option<String>,
    /// Output field delimiter, always a single byte.
    pub delimiter: u8,
    pub disable_cache: bool,
    pub dry_run: bool,
}

impl ExportConfig {
    /// Validate raw options. Runs before any I/O.
    pub fn new(
        project: &str,
        dataset: &str,
        delimiter: &str,
        location: Option<&str>,
        disable_cache: bool,
        dry_run: bool,
    ) -> Result<Self, Bq2CsvError> {
        if project.trim().is_empty() {
            return Err(Bq2CsvError::Config("project ID (-p) is required".into()));
        }
        if dataset.trim().is_empty() {
            return Err(Bq2CsvError::Config("dataset (-d) is required".into()));
        }

        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            location: location
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            delimiter: parse_delimiter(delimiter)?,
            disable_cache,
            dry_run,
        })
    }

    /// Job configuration for the warehouse.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            location: self.location.clone(),
            use_cache: !self.disable_cache,
        }
    }

    pub fn delimiter_char(&self) -> char {
        self.delimiter as char
    }
}

/// The delimiter must be exactly one single-byte character, and not one the
/// quoting rules reserve (the quote itself and line breaks).
pub fn parse_delimiter(raw: &str) -> Result<u8, Bq2CsvError> {
    match raw.as_bytes() {
        [b'"' | b'\n' | b'\r'] => Err(Bq2CsvError::Config(format!(
            "field delimiter {:?} is reserved by CSV quoting",
            raw
        ))),
        [b] => Ok(*b),
        _ => Err(Bq2CsvError::Config(format!(
            "field delimiter must be exactly one character, got {:?}",
            raw
        ))),
    }
}

// ── Tests ────────────────────────────────────────────────────────
