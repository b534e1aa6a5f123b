//! chopper: split large delimited-text files into many smaller ones.
//!
//! Records can be grouped by column values, capped at a row count or spread
//! evenly over a number of files, and shuffled any number of times, each
//! shuffle producing its own set of files.

mod config;
mod engine;
mod error;
mod key;
mod shuffle;
mod sink;
mod source;
mod split;

pub use config::{parse_delimiter, ChopConfig, Encoding, MalformedPolicy};
pub use engine::{chop, ChopReport};
pub use error::{ChopError, ConfigError};
pub use key::{KeyExtractor, PartitionKey};
pub use shuffle::ShuffleEngine;
pub use sink::{OutputNaming, OutputSinks, OutputUnit, WrittenFile};
pub use source::{count_by_key, discover_inputs, Header, ReadSettings, Record, RecordStream};
pub use split::{equal_sizes, row_sizes, Placement, SplitCursor, SplitMode};

// Python bindings - only when pyo3 feature enabled
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pyfunction]
#[pyo3(name = "chop_csv")]
#[pyo3(signature = (inputs, output_dir, columns=None, rows=None, equal=None, shuffles=0, seed=None))]
fn chop_csv_py(
    inputs: Vec<String>,
    output_dir: &str,
    columns: Option<Vec<String>>,
    rows: Option<usize>,
    equal: Option<usize>,
    shuffles: usize,
    seed: Option<u64>,
) -> PyResult<Vec<String>> {
    let to_py_err = |e: ChopError| {
        if e.is_config() {
            pyo3::exceptions::PyValueError::new_err(e.to_string())
        } else {
            pyo3::exceptions::PyIOError::new_err(e.to_string())
        }
    };

    let split = SplitMode::from_limits(rows, equal)
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?;
    let config = ChopConfig::new(inputs.into_iter().map(Into::into).collect(), output_dir)
        .map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))?
        .columns(columns.unwrap_or_default())
        .split(split)
        .shuffles(shuffles)
        .seed(seed);

    let report = chop(&config).map_err(to_py_err)?;

    Ok(report
        .output_files
        .into_iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect())
}

#[cfg(feature = "pyo3")]
#[pymodule]
fn chopper(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(chop_csv_py, m)?)?;
    Ok(())
}
