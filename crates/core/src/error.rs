use thiserror::Error;

/// Failures detected before any query reaches the warehouse.
#[derive(Error, Debug)]
pub enum Bq2CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// stdin is an interactive terminal, so there is no script to read.
    #[error("No SQL found: stdin is a terminal, pipe or redirect a script into it")]
    InputNotFound,

    #[error("No SQL found: stdin was empty")]
    EmptyInput,

    #[error("SQL is not valid UTF-8: {0}")]
    InputEncoding(#[from] std::string::FromUtf8Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
