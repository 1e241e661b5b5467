//! Reading the SQL script from standard input.

use std::io::{self, IsTerminal, Read};

use tracing::debug;

use bq2csv_core::Bq2CsvError;

/// Read the whole script from stdin.
///
/// Fails without reading when stdin is an interactive terminal.
pub fn read_stdin() -> Result<String, Bq2CsvError> {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    read_sql(stdin.lock(), interactive)
}

/// Drain `reader` into a UTF-8 string. The bytes are kept exactly as read.
pub fn read_sql<R: Read>(mut reader: R, interactive: bool) -> Result<String, Bq2CsvError> {
    if interactive {
        return Err(Bq2CsvError::InputNotFound);
    }

    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Err(Bq2CsvError::EmptyInput);
    }

    let sql = String::from_utf8(buf)?;
    debug!(sql = %sql, "Query details");
    Ok(sql)
}
