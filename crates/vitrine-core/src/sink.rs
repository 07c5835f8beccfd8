//! Tabular output of a finished crawl.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::models::Record;

/// A record attribute that can be written as a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Description,
    Price,
    Url,
    Category,
}

impl Column {
    /// Cell text for a record. Missing values are the empty string.
    pub fn cell<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            Column::Description => &record.description,
            Column::Price => record.price.amount().unwrap_or(""),
            Column::Url => &record.url,
            Column::Category => record.category.as_deref().unwrap_or(""),
        }
    }
}

/// One output column: which attribute, under which header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: Column,
    pub header: String,
}

/// Ordered column list for one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(pub Vec<ColumnSpec>);

impl Schema {
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|c| c.header.as_str())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Schema(vec![
            ColumnSpec {
                field: Column::Description,
                header: "Description".into(),
            },
            ColumnSpec {
                field: Column::Price,
                header: "Price".into(),
            },
            ColumnSpec {
                field: Column::Url,
                header: "URL".into(),
            },
        ])
    }
}

/// Persists the final ordered record set.
pub trait ResultSink: Send + Sync {
    /// Write a header row and one row per record. Returns rows written.
    fn write(&self, records: &[Record], schema: &Schema) -> Result<usize, CrawlError>;
}

/// CSV (or other delimiter) file sink.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    delimiter: u8,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to any writer; used by [`ResultSink::write`] with the file.
    pub fn write_to<W: Write>(
        &self,
        writer: W,
        records: &[Record],
        schema: &Schema,
    ) -> Result<usize, CrawlError> {
        if schema.0.is_empty() {
            return Err(CrawlError::Config("Output schema has no columns".into()));
        }

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);

        wtr.write_record(schema.headers())?;
        for record in records {
            wtr.write_record(schema.0.iter().map(|c| c.field.cell(record)))?;
        }
        wtr.flush()
            .map_err(|e| CrawlError::SinkFailure(format!("Flush failed: {e}")))?;

        Ok(records.len())
    }
}

impl ResultSink for CsvSink {
    fn write(&self, records: &[Record], schema: &Schema) -> Result<usize, CrawlError> {
        let file = std::fs::File::create(&self.path).map_err(|e| {
            CrawlError::SinkFailure(format!("Cannot create {}: {e}", self.path.display()))
        })?;
        let written = self.write_to(file, records, schema)?;
        tracing::info!(path = %self.path.display(), rows = written, "Results written");
        Ok(written)
    }
}
