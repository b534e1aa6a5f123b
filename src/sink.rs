//! Output files and their lifecycle.

use crate::config::ChopConfig;
use crate::error::{ChopError, ConfigError, Result};
use crate::key::PartitionKey;
use csv::ByteRecord;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identity of one output file.
///
/// `shuffle_index` is `None` for unshuffled output and `Some(pass)` for the
/// 0-based shuffle pass that produced the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputUnit {
    pub key: PartitionKey,
    pub split_index: usize,
    pub shuffle_index: Option<usize>,
}

impl OutputUnit {
    pub fn new(key: PartitionKey, split_index: usize, shuffle_index: Option<usize>) -> Self {
        Self {
            key,
            split_index,
            shuffle_index,
        }
    }
}

/// A closed output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub unit: OutputUnit,
    pub path: PathBuf,
    /// Data rows, header excluded.
    pub rows: usize,
}

/// Replace every character that is not alphanumeric or `_` with `_`.
fn clean_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// File stem and extension of an input, ignoring a trailing `.gz`.
fn stem_and_extension(path: &Path) -> (Option<String>, Option<String>) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let inner = Path::new(name);

    let stem = inner.file_stem().map(|s| s.to_string_lossy().into_owned());
    let extension = inner
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty());
    (stem, extension)
}

/// Deterministic mapping from [`OutputUnit`] to file name:
/// `[prefix_]segment[_split][_shufflepass].ext`.
#[derive(Debug, Clone)]
pub struct OutputNaming {
    prefix: Option<String>,
    stem: String,
    extension: String,
    columns: Vec<String>,
    numbered_splits: bool,
    numbered_shuffles: bool,
}

impl OutputNaming {
    pub fn new(config: &ChopConfig, files: &[PathBuf]) -> Self {
        let (first_stem, first_ext) = files
            .first()
            .map(|f| stem_and_extension(f))
            .unwrap_or((None, None));

        let stem = match files {
            [_] => first_stem.unwrap_or_else(|| "output".to_string()),
            _ => "combined".to_string(),
        };

        Self {
            prefix: config.prefix.clone(),
            stem,
            extension: first_ext.unwrap_or_else(|| "csv".to_string()),
            columns: config.columns.clone(),
            numbered_splits: config.split.is_numbered(),
            numbered_shuffles: config.shuffles > 1,
        }
    }

    pub fn file_name(&self, unit: &OutputUnit) -> String {
        let mut name = if unit.key.is_universal() {
            self.stem.clone()
        } else {
            let segment = self
                .columns
                .iter()
                .zip(unit.key.values())
                .map(|(column, value)| format!("{column}_{value}"))
                .collect::<Vec<_>>()
                .join("__");
            clean_filename(&segment)
        };

        if self.numbered_splits {
            name.push_str(&format!("_{}", unit.split_index + 1));
        }
        if let (true, Some(pass)) = (self.numbered_shuffles, unit.shuffle_index) {
            name.push_str(&format!("_shuffle{}", pass + 1));
        }
        if let Some(prefix) = &self.prefix {
            name = format!("{prefix}_{name}");
        }

        format!("{name}.{}", self.extension)
    }
}

/// Write `header` followed by `records` to a fresh file at `path`.
pub(crate) fn write_file<'a>(
    path: &Path,
    delimiter: u8,
    header: &ByteRecord,
    records: impl IntoIterator<Item = &'a ByteRecord>,
) -> Result<usize> {
    let file = File::create(path).map_err(|e| ChopError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(file);

    writer
        .write_byte_record(header)
        .map_err(|e| ChopError::csv(path, e))?;
    let mut rows = 0;
    for record in records {
        writer
            .write_byte_record(record)
            .map_err(|e| ChopError::csv(path, e))?;
        rows += 1;
    }
    writer.flush().map_err(|e| ChopError::io(path, e))?;
    Ok(rows)
}

struct OpenUnit {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

/// Owns every open output file of a run.
///
/// A unit's file is created, with the header, on its first record. Handles
/// are closed explicitly by [`close`](Self::close) or [`finish`](Self::finish),
/// and by `Drop` on early exit.
///
/// Every path handed out is first [claimed](Self::claim): a path belongs to
/// the key that claimed it for the rest of the run, and protected inputs are
/// never claimable.
pub struct OutputSinks {
    dir: PathBuf,
    naming: OutputNaming,
    header: ByteRecord,
    delimiter: u8,
    open: HashMap<OutputUnit, OpenUnit>,
    claimed: HashMap<PathBuf, PartitionKey>,
    resolved_dir: Option<PathBuf>,
    inputs: HashSet<PathBuf>,
    written: Vec<WrittenFile>,
}

impl OutputSinks {
    pub fn new(
        dir: impl Into<PathBuf>,
        naming: OutputNaming,
        header: ByteRecord,
        delimiter: u8,
    ) -> Self {
        Self {
            dir: dir.into(),
            naming,
            header,
            delimiter,
            open: HashMap::new(),
            claimed: HashMap::new(),
            resolved_dir: None,
            inputs: HashSet::new(),
            written: Vec::new(),
        }
    }

    /// Refuse to write over any of `inputs`.
    ///
    /// The inputs and the output directory must already exist.
    pub fn protect_inputs(&mut self, inputs: &[PathBuf]) -> Result<()> {
        for input in inputs {
            let resolved = fs::canonicalize(input).map_err(|e| ChopError::io(input, e))?;
            self.inputs.insert(resolved);
        }
        let dir = fs::canonicalize(&self.dir).map_err(|e| ChopError::io(&self.dir, e))?;
        self.resolved_dir = Some(dir);
        Ok(())
    }

    fn path_for(&self, unit: &OutputUnit) -> PathBuf {
        self.dir.join(self.naming.file_name(unit))
    }

    #[cfg(test)]
    fn open_count(&self) -> usize {
        self.open.len()
    }

    fn is_protected(&self, path: &Path) -> bool {
        let (Some(dir), Some(name)) = (&self.resolved_dir, path.file_name()) else {
            return false;
        };
        let candidate = dir.join(name);
        // Follows a symlink sitting at the output name.
        let resolved = fs::canonicalize(&candidate).unwrap_or(candidate);
        self.inputs.contains(&resolved)
    }

    /// Reserve the path of `unit` for its key and return it.
    ///
    /// Claiming a path the same key already owns is fine. A path owned by
    /// another key fails with [`ChopError::NameCollision`], and a path that
    /// resolves to a protected input fails with [`ConfigError::OutputIsInput`].
    pub fn claim(&mut self, unit: &OutputUnit) -> Result<PathBuf> {
        let path = self.path_for(unit);
        if self.is_protected(&path) {
            return Err(ConfigError::OutputIsInput { path }.into());
        }

        match self.claimed.get(&path) {
            Some(owner) if owner != &unit.key => {
                return Err(ChopError::NameCollision {
                    path,
                    first: owner.to_string(),
                    second: unit.key.to_string(),
                });
            }
            Some(_) => {}
            None => {
                self.claimed.insert(path.clone(), unit.key.clone());
            }
        }
        Ok(path)
    }

    fn create(&mut self, unit: &OutputUnit) -> Result<OpenUnit> {
        let path = self.claim(unit)?;
        let file = File::create(&path).map_err(|e| ChopError::io(&path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(file);
        writer
            .write_byte_record(&self.header)
            .map_err(|e| ChopError::csv(&path, e))?;
        debug!("Created {}", path.display());

        Ok(OpenUnit {
            path,
            writer,
            rows: 0,
        })
    }

    /// Append `record` to `unit`, creating its file first if needed.
    pub fn write(&mut self, unit: &OutputUnit, record: &ByteRecord) -> Result<()> {
        if !self.open.contains_key(unit) {
            let created = self.create(unit)?;
            self.open.insert(unit.clone(), created);
        }

        if let Some(open) = self.open.get_mut(unit) {
            open.writer
                .write_byte_record(record)
                .map_err(|e| ChopError::csv(&open.path, e))?;
            open.rows += 1;
        }
        Ok(())
    }

    /// Flush and close `unit`. No-op when it is not open.
    pub fn close(&mut self, unit: &OutputUnit) -> Result<()> {
        let Some(open) = self.open.remove(unit) else {
            return Ok(());
        };
        self.finalize(unit.clone(), open)
    }

    fn finalize(&mut self, unit: OutputUnit, mut open: OpenUnit) -> Result<()> {
        open.writer
            .flush()
            .map_err(|e| ChopError::io(&open.path, e))?;
        debug!("Closed {} ({} rows)", open.path.display(), open.rows);

        self.written.push(WrittenFile {
            unit,
            path: open.path,
            rows: open.rows,
        });
        Ok(())
    }

    /// Close every open unit, in file-name order.
    pub fn close_all(&mut self) -> Result<()> {
        let mut units: Vec<(OutputUnit, OpenUnit)> = self.open.drain().collect();
        units.sort_by(|a, b| a.1.path.cmp(&b.1.path));
        for (unit, open) in units {
            self.finalize(unit, open)?;
        }
        Ok(())
    }

    /// Close everything and hand back the files written so far, in closing
    /// order.
    pub fn finish(&mut self) -> Result<Vec<WrittenFile>> {
        self.close_all()?;
        Ok(std::mem::take(&mut self.written))
    }
}
