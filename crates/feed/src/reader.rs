//! JSON-lines feed records and the line reader.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use ledger_core::{LedgerEvent, Market};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// One feed line, tagged by `record`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum FeedRecord {
    /// Market snapshot, applied before any following event
    Market(Market),
    Event(LedgerEvent),
}

/// Reads [`FeedRecord`]s from a line-oriented source.
///
/// Blank lines and lines starting with `#` are skipped.
pub struct FeedReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: BufRead> FeedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    /// Line number of the last line read (1-based).
    pub fn line(&self) -> usize {
        self.line
    }
}

impl FeedReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Iterator for FeedReader<R> {
    type Item = Result<FeedRecord, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.lines.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(FeedError::Io(e))),
            };
            self.line += 1;

            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(serde_json::from_str(trimmed).map_err(|source| FeedError::Parse {
                line: self.line,
                source,
            }));
        }
    }
}
