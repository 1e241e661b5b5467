//! Delimited-text output of result rows.

use std::io::Write;

use crate::client::BigQueryError;

/// CSV writer over the output stream with a configurable field delimiter.
///
/// Fields containing the delimiter, a quote or a line break are quoted and
/// embedded quotes are doubled. No header record is written.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W, delimiter: u8) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_writer(out);
        Self { writer }
    }

    /// Write one record.
    pub fn write_record(&mut self, fields: &[String]) -> Result<(), BigQueryError> {
        self.writer
            .write_record(fields)
            .map_err(|e| BigQueryError::Output(e.to_string()))
    }

    /// Push all buffered bytes to the underlying stream.
    pub fn flush(&mut self) -> Result<(), BigQueryError> {
        self.writer
            .flush()
            .map_err(|e| BigQueryError::Output(e.to_string()))
    }

    /// Flush and hand back the underlying stream.
    #[cfg(test)]
    fn into_inner(self) -> Result<W, BigQueryError> {
        self.writer
            .into_inner()
            .map_err(|e| BigQueryError::Output(e.error().to_string()))
    }
}
