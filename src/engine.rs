//! The chopping pipeline: read, group, split, write, and optionally shuffle.
//!
//! Two paths exist. Without shuffles, or with shuffles and grouping columns,
//! records stream straight from the inputs to their output files and memory
//! stays bounded; shuffles then run file by file over the finished outputs.
//! Shuffling with no grouping columns has to see the whole input first, so
//! that path buffers every record.

use crate::config::ChopConfig;
use crate::error::{ChopError, Result};
use crate::key::{KeyExtractor, PartitionKey};
use crate::shuffle::ShuffleEngine;
use crate::sink::{OutputNaming, OutputSinks, OutputUnit, WrittenFile};
use crate::source::{count_by_key, discover_inputs, ReadSettings, RecordStream};
use crate::split::{SplitCursor, SplitMode};
use csv::ByteRecord;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ChopReport {
    pub output_files: Vec<PathBuf>,
    pub records_read: u64,
    pub records_skipped: u64,
}

/// Run the whole pipeline for `config`.
pub fn chop(config: &ChopConfig) -> Result<ChopReport> {
    let files = discover_inputs(&config.inputs, config.extension.as_deref())?;
    info!("Reading {} input file(s)", files.len());

    let settings = ReadSettings::from(config);
    let mut stream = RecordStream::open(&files, settings)?;
    let extractor = KeyExtractor::new(stream.header(), &config.columns, config.encoding)?;

    fs::create_dir_all(&config.output_dir).map_err(|e| ChopError::io(&config.output_dir, e))?;
    let naming = OutputNaming::new(config, &files);
    let mut sinks = OutputSinks::new(
        &config.output_dir,
        naming,
        stream.header().record().clone(),
        config.delimiter,
    );
    sinks.protect_inputs(&files)?;
    let mut shuffler = ShuffleEngine::new(config.seed);

    let written = if config.buffers_whole_input() {
        warn!("Shuffling without grouping columns loads the entire input into memory");
        let records = buffer_all(&mut stream)?;
        shuffle_whole_input(&records, config.split, config.shuffles, &mut sinks, &mut shuffler)?;
        sinks.finish()?
    } else {
        let totals = if config.split.needs_totals() {
            info!("Counting records per group");
            Some(count_by_key(&files, settings, &extractor)?)
        } else {
            None
        };

        split_stream(&mut stream, &extractor, config.split, totals.as_ref(), &mut sinks)?;
        let written = sinks.finish()?;
        shuffler.reshuffle_outputs(written, config.shuffles, &mut sinks, config.delimiter)?
    };

    let report = ChopReport {
        output_files: written.into_iter().map(|f: WrittenFile| f.path).collect(),
        records_read: stream.records_read(),
        records_skipped: stream.records_skipped(),
    };
    info!(
        "Wrote {} records to {} files",
        report.records_read,
        report.output_files.len()
    );
    Ok(report)
}

/// Route each record to its key's current unit as it arrives.
fn split_stream(
    stream: &mut RecordStream,
    extractor: &KeyExtractor,
    mode: SplitMode,
    totals: Option<&HashMap<PartitionKey, usize>>,
    sinks: &mut OutputSinks,
) -> Result<()> {
    let mut cursors: HashMap<PartitionKey, SplitCursor> = HashMap::new();

    while let Some(record) = stream.next_record()? {
        let key = extractor.extract(&record, stream.current_path())?;
        let cursor = cursors.entry(key.clone()).or_insert_with(|| {
            SplitCursor::new(mode, totals.and_then(|t| t.get(&key).copied()))
        });

        let placement = cursor.advance();
        let unit = OutputUnit::new(key, placement.split_index, None);
        sinks.write(&unit, &record.fields)?;
        if placement.closes_unit {
            sinks.close(&unit)?;
        }
    }

    info!("Split {} records into {} groups", stream.records_read(), cursors.len());
    Ok(())
}

fn buffer_all(stream: &mut RecordStream) -> Result<Vec<ByteRecord>> {
    let mut records = Vec::new();
    while let Some(record) = stream.next_record()? {
        records.push(record.fields);
    }
    info!("Buffered {} records for shuffling", records.len());
    Ok(records)
}

/// Write `passes` independent random orderings of `records`, each split
/// under `mode` into its own set of files.
fn shuffle_whole_input(
    records: &[ByteRecord],
    mode: SplitMode,
    passes: usize,
    sinks: &mut OutputSinks,
    shuffler: &mut ShuffleEngine,
) -> Result<()> {
    for pass in 0..passes {
        let order = shuffler.permutation(records.len());
        let mut cursor = SplitCursor::new(mode, Some(records.len()));

        for &i in &order {
            let placement = cursor.advance();
            let unit =
                OutputUnit::new(PartitionKey::universal(), placement.split_index, Some(pass));
            sinks.write(&unit, &records[i])?;
            if placement.closes_unit {
                sinks.close(&unit)?;
            }
        }
        sinks.close_all()?;
        info!("Finished shuffle pass {}/{}", pass + 1, passes);
    }
    Ok(())
}
