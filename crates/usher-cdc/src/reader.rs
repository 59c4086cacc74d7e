//! NDJSON record reader
//!
//! Stands in for a broker consumer: one change envelope per line, read from
//! a file or stdin. Blank lines are skipped.
//!
//! Lines are handed over as raw bytes. Invalid UTF-8 is a malformed record
//! for the normalizer to reject, not a read failure.

use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// One raw record and the line it came from (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub line: u64,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    /// Lossy text view, for logging
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Where records are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    Stdin,
    File(PathBuf),
}

impl RecordSource {
    /// `-` means stdin; anything else is a file path
    pub fn parse(input: &str) -> Self {
        if input == "-" {
            RecordSource::Stdin
        } else {
            RecordSource::File(input.into())
        }
    }
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordSource::Stdin => f.write_str("stdin"),
            RecordSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Line-oriented reader over any async buffered source
pub struct RecordReader<R> {
    reader: R,
    line_no: u64,
    buf: Vec<u8>,
}

impl RecordReader<BufReader<Box<dyn tokio::io::AsyncRead + Send + Unpin>>> {
    /// Open the given source for reading
    pub async fn open(source: &RecordSource) -> std::io::Result<Self> {
        let inner: Box<dyn tokio::io::AsyncRead + Send + Unpin> = match source {
            RecordSource::Stdin => Box::new(tokio::io::stdin()),
            RecordSource::File(path) => Box::new(tokio::fs::File::open(path).await?),
        };
        Ok(Self::new(BufReader::new(inner)))
    }
}

impl<R: AsyncBufRead + Unpin> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: Vec::new(),
        }
    }

    /// Next non-blank record, or `None` at end of input
    pub async fn next_record(&mut self) -> std::io::Result<Option<RawRecord>> {
        loop {
            self.buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            return Ok(Some(RawRecord {
                line: self.line_no,
                bytes: line.to_vec(),
            }));
        }
    }

    /// Number of lines consumed so far, blank ones included
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}
