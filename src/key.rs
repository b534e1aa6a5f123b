use crate::config::Encoding;
use crate::error::{ChopError, Result};
use crate::source::{Header, Record};
use std::fmt;
use std::path::Path;

/// Values of the grouping columns for one record, in configured column order.
///
/// With no grouping columns every record carries the empty (universal) key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PartitionKey(Vec<String>);

impl PartitionKey {
    pub fn universal() -> Self {
        Self(Vec::new())
    }

    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn is_universal(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_universal() {
            return f.write_str("(all records)");
        }
        write!(f, "({})", self.0.join(", "))
    }
}

/// Pulls the partition key out of records, given a header.
#[derive(Debug, Clone)]
pub struct KeyExtractor {
    indices: Vec<usize>,
    encoding: Encoding,
}

impl KeyExtractor {
    /// Resolve `columns` against `header`. Fails on the first unknown name.
    pub fn new(header: &Header, columns: &[String], encoding: Encoding) -> Result<Self> {
        let indices = columns
            .iter()
            .map(|column| {
                header
                    .position(column)
                    .ok_or_else(|| ChopError::UnknownColumn {
                        column: column.clone(),
                        available: header.names().to_vec(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { indices, encoding })
    }

    fn is_grouping(&self) -> bool {
        !self.indices.is_empty()
    }

    /// `path` only feeds error messages.
    pub fn extract(&self, record: &Record, path: &Path) -> Result<PartitionKey> {
        if !self.is_grouping() {
            return Ok(PartitionKey::universal());
        }

        let values = self
            .indices
            .iter()
            .map(|&i| {
                let raw = record.fields.get(i).unwrap_or_default();
                self.encoding.decode(raw).ok_or_else(|| ChopError::Decode {
                    path: path.to_path_buf(),
                    line: record.line,
                    what: format!("value of column #{}", i + 1),
                    encoding: self.encoding.name(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PartitionKey(values))
    }
}
