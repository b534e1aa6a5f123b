//! Error types for chopper.
//!
//! `ConfigError` covers everything that can be rejected before a single output
//! file is touched. `ChopError` wraps it and adds the failures that can only
//! surface while records are flowing.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with the resolved configuration or the input locations it names.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one input path is required")]
    NoInputs,

    #[error("an output directory is required")]
    NoOutputDir,

    #[error("--rows and --equal cannot be used together")]
    ConflictingSplitModes,

    #[error("--rows must be greater than zero")]
    ZeroRows,

    #[error("--equal must be greater than zero")]
    ZeroEqual,

    #[error("invalid delimiter '{value}': expected a single byte (or \\t)")]
    InvalidDelimiter { value: String },

    #[error("unsupported encoding '{label}' (supported: utf-8, latin-1)")]
    UnsupportedEncoding { label: String },

    #[error("input path not found: {}", .path.display())]
    InputNotFound { path: PathBuf },

    #[error("no {} files found in directory '{}'", describe_extension(.extension), .dir.display())]
    NoMatchingFiles {
        dir: PathBuf,
        extension: Option<String>,
    },

    #[error(
        "output file '{}' is one of the inputs; pick another output directory or prefix",
        .path.display()
    )]
    OutputIsInput { path: PathBuf },

    #[error("failed to scan input directory '{}': {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

fn describe_extension(extension: &Option<String>) -> String {
    match extension {
        Some(ext) => format!(".{ext}"),
        None => "input".to_string(),
    }
}

/// Errors raised while chopping.
#[derive(Debug, Error)]
pub enum ChopError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "header of '{}' does not match the first input: expected [{}], found [{}]",
        .path.display(),
        .expected.join(", "),
        .found.join(", ")
    )]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("unknown column '{column}' (available: {})", .available.join(", "))]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },

    #[error(
        "malformed record in '{}' at line {line}: expected {expected} fields, found {found}",
        .path.display()
    )]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("'{}' line {line}: {what} is not valid {encoding}", .path.display())]
    Decode {
        path: PathBuf,
        line: u64,
        what: String,
        encoding: &'static str,
    },

    #[error("groups {first} and {second} would both be written to '{}'", .path.display())]
    NameCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ChopError {
    /// True when the run was rejected because of how it was configured,
    /// rather than because of the data it read.
    pub fn is_config(&self) -> bool {
        matches!(self, ChopError::Config(_) | ChopError::UnknownColumn { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChopError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        ChopError::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ChopError> = std::result::Result<T, E>;
