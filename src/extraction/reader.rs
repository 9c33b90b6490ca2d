//! JSON-lines record input

use crate::engine::traits::RecordSource;
use crate::error::{Error, ExtractionError, Result};
use crate::types::TraceRecord;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Reads one [`TraceRecord`] per line
///
/// Blank lines and lines starting with `#` are skipped.
#[derive(Debug)]
pub struct JsonLinesSource<R> {
    reader: R,
    buffer: String,
    file_line: u64,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open a record file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open trace {}: {}", path.display(), e),
            ))
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Wrap a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            file_line: 0,
        }
    }
}

impl<R: BufRead> RecordSource for JsonLinesSource<R> {
    fn next_record(&mut self) -> std::result::Result<Option<TraceRecord>, ExtractionError> {
        loop {
            self.buffer.clear();
            let read = self
                .reader
                .read_line(&mut self.buffer)
                .map_err(|e| ExtractionError::parse(self.file_line + 1, e.to_string()))?;
            if read == 0 {
                return Ok(None);
            }
            self.file_line += 1;

            let text = self.buffer.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            return serde_json::from_str(text)
                .map(Some)
                .map_err(|e| ExtractionError::parse(self.file_line, e.to_string()));
        }
    }
}

/// Write records in the format read by [`JsonLinesSource`]
pub fn write_records<W: Write>(writer: &mut W, records: &[TraceRecord]) -> Result<()> {
    for record in records {
        let line = serde_json::to_string(record).map_err(|e| Error::Serialization(e.to_string()))?;
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}
