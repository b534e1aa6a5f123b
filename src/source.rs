//! Input discovery and the logical record stream.
//!
//! Any number of files (and directories expanded into files) are read as one
//! ordered sequence of records sharing the header of the first file.

use crate::config::{ChopConfig, Encoding, MalformedPolicy};
use crate::error::{ChopError, ConfigError, Result};
use crate::key::{KeyExtractor, PartitionKey};
use csv::ByteRecord;
use flate2::read::GzDecoder;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Expand input paths into the ordered list of files to read.
///
/// Files are kept as given. Directories are walked recursively and filtered
/// by `extension` (which also matches a trailing `.gz`); with no extension
/// every file is taken.
pub fn discover_inputs(
    inputs: &[PathBuf],
    extension: Option<&str>,
) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();

    for input in inputs {
        if !input.exists() {
            return Err(ConfigError::InputNotFound {
                path: input.clone(),
            });
        }

        if input.is_dir() {
            files.extend(collect_files_by_extension(input, extension)?);
        } else {
            files.push(input.clone());
        }
    }

    Ok(files)
}

fn collect_files_by_extension(
    dir: &Path,
    extension: Option<&str>,
) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| ConfigError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;

        if entry.file_type().is_file() && matches_extension(entry.path(), extension) {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(ConfigError::NoMatchingFiles {
            dir: dir.to_path_buf(),
            extension: extension.map(str::to_owned),
        });
    }

    Ok(files)
}

fn matches_extension(path: &Path, extension: Option<&str>) -> bool {
    let Some(extension) = extension else {
        return true;
    };
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

    let target_extension = format!(".{}", extension);
    let target_extension_gz = format!(".{}.gz", extension);
    name.ends_with(&target_extension) || name.ends_with(&target_extension_gz)
}

pub(crate) fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Settings shared by every reader of a run.
#[derive(Debug, Clone, Copy)]
pub struct ReadSettings {
    pub delimiter: u8,
    pub encoding: Encoding,
    pub malformed: MalformedPolicy,
}

impl From<&ChopConfig> for ReadSettings {
    fn from(config: &ChopConfig) -> Self {
        Self {
            delimiter: config.delimiter,
            encoding: config.encoding,
            malformed: config.malformed,
        }
    }
}

/// Open `path` as a CSV reader, decompressing `.gz` files on the fly.
pub(crate) fn open_csv(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let file = File::open(path).map_err(|e| ChopError::io(path, e))?;
    let inner: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };

    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(inner))
}

/// The ordered field names shared by every record of a run.
#[derive(Debug, Clone)]
pub struct Header {
    record: ByteRecord,
    names: Vec<String>,
}

impl Header {
    pub fn from_record(record: ByteRecord, encoding: Encoding, path: &Path) -> Result<Self> {
        let names = record
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                encoding.decode(raw).ok_or_else(|| ChopError::Decode {
                    path: path.to_path_buf(),
                    line: 1,
                    what: format!("header field #{}", i + 1),
                    encoding: encoding.name(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { record, names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn record(&self) -> &ByteRecord {
        &self.record
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn matches(&self, other: &ByteRecord) -> bool {
        self.record.iter().eq(other.iter())
    }
}

/// One data row. `line` is its 1-based line number in the source file.
#[derive(Debug, Clone)]
pub struct Record {
    pub fields: ByteRecord,
    pub line: u64,
}

struct OpenSource {
    path: PathBuf,
    reader: csv::Reader<Box<dyn Read>>,
}

/// A lazy, header-validated sequence of records over several files.
///
/// The stream cannot seek; to read the input again, open a new stream.
pub struct RecordStream {
    pending: VecDeque<PathBuf>,
    settings: ReadSettings,
    header: Header,
    current: Option<OpenSource>,
    current_path: PathBuf,
    records_read: u64,
    records_skipped: u64,
}

impl RecordStream {
    /// Open the first file and establish the header from it.
    pub fn open(files: &[PathBuf], settings: ReadSettings) -> Result<Self> {
        let mut pending: VecDeque<PathBuf> = files.iter().cloned().collect();
        let Some(first) = pending.pop_front() else {
            return Err(ConfigError::NoInputs.into());
        };

        let mut reader = open_csv(&first, settings.delimiter)?;
        let header_record = reader
            .byte_headers()
            .map_err(|e| ChopError::csv(&first, e))?
            .clone();
        let header = Header::from_record(header_record, settings.encoding, &first)?;
        debug!("Opened {} ({} columns)", first.display(), header.len());

        Ok(Self {
            pending,
            settings,
            header,
            current: Some(OpenSource {
                path: first.clone(),
                reader,
            }),
            current_path: first,
            records_read: 0,
            records_skipped: 0,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// File the most recent record came from.
    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn records_skipped(&self) -> u64 {
        self.records_skipped
    }

    fn advance_file(&mut self) -> Result<()> {
        self.current = None;
        let Some(path) = self.pending.pop_front() else {
            return Ok(());
        };

        let mut reader = open_csv(&path, self.settings.delimiter)?;
        let found = reader
            .byte_headers()
            .map_err(|e| ChopError::csv(&path, e))?
            .clone();
        if !self.header.matches(&found) {
            let encoding = self.settings.encoding;
            return Err(ChopError::SchemaMismatch {
                expected: self.header.names().to_vec(),
                found: found
                    .iter()
                    .map(|raw| {
                        encoding
                            .decode(raw)
                            .unwrap_or_else(|| String::from_utf8_lossy(raw).into_owned())
                    })
                    .collect(),
                path,
            });
        }

        debug!("Opened {}", path.display());
        self.current_path = path.clone();
        self.current = Some(OpenSource { path, reader });
        Ok(())
    }

    /// Next record, or `None` once every file is exhausted.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(source) = self.current.as_mut() else {
                return Ok(None);
            };

            let mut fields = ByteRecord::new();
            let more = source
                .reader
                .read_byte_record(&mut fields)
                .map_err(|e| ChopError::csv(&source.path, e))?;
            if !more {
                self.advance_file()?;
                continue;
            }

            let line = fields.position().map_or(0, |p| p.line());
            if fields.len() != self.header.len() {
                match self.settings.malformed {
                    MalformedPolicy::Abort => {
                        return Err(ChopError::MalformedRecord {
                            path: source.path.clone(),
                            line,
                            expected: self.header.len(),
                            found: fields.len(),
                        });
                    }
                    MalformedPolicy::Skip => {
                        warn!(
                            "Skipping malformed record in {} at line {}: expected {} fields, found {}",
                            source.path.display(),
                            line,
                            self.header.len(),
                            fields.len()
                        );
                        self.records_skipped += 1;
                        continue;
                    }
                }
            }

            self.records_read += 1;
            return Ok(Some(Record { fields, line }));
        }
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Count records per partition key with a full pass over the inputs.
pub fn count_by_key(
    files: &[PathBuf],
    settings: ReadSettings,
    extractor: &KeyExtractor,
) -> Result<HashMap<PartitionKey, usize>> {
    let mut stream = RecordStream::open(files, settings)?;
    let mut counts: HashMap<PartitionKey, usize> = HashMap::new();

    while let Some(record) = stream.next_record()? {
        let key = extractor.extract(&record, stream.current_path())?;
        *counts.entry(key).or_default() += 1;
    }

    Ok(counts)
}
