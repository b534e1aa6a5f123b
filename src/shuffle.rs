use crate::error::{ChopError, Result};
use crate::sink::{write_file, OutputSinks, OutputUnit, WrittenFile};
use crate::source::open_csv;
use csv::ByteRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use tracing::{debug, info};

/// Source of uniformly random permutations for shuffle passes.
///
/// Seeded engines produce the same permutations on every run.
pub struct ShuffleEngine {
    rng: StdRng,
}

impl ShuffleEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// A uniformly random ordering of `0..len`.
    pub fn permutation(&mut self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut self.rng);
        order
    }

    /// Reload every file in `files`, and for each of `passes` passes write
    /// its records in a fresh random order under that pass's name.
    ///
    /// Each pass permutes the original split file, never an earlier pass.
    /// With a single pass the file is rewritten in place; with more, the
    /// unshuffled file is removed once all of its passes are written. Only
    /// one file's records are held in memory at a time.
    ///
    /// Every pass path is claimed from `sinks` before the first write, so a
    /// shuffled name that lands on another group's file fails the run with
    /// nothing touched.
    pub fn reshuffle_outputs(
        &mut self,
        files: Vec<WrittenFile>,
        passes: usize,
        sinks: &mut OutputSinks,
        delimiter: u8,
    ) -> Result<Vec<WrittenFile>> {
        if passes == 0 {
            return Ok(files);
        }
        info!("Shuffling {} output files ({} passes each)", files.len(), passes);

        let mut plan = Vec::with_capacity(files.len());
        for file in files {
            let targets = (0..passes)
                .map(|pass| {
                    let unit = OutputUnit {
                        shuffle_index: Some(pass),
                        ..file.unit.clone()
                    };
                    sinks.claim(&unit).map(|path| (unit, path))
                })
                .collect::<Result<Vec<_>>>()?;
            plan.push((file, targets));
        }

        let mut shuffled = Vec::with_capacity(plan.len() * passes);
        for (file, targets) in plan {
            let mut reader = open_csv(&file.path, delimiter)?;
            let header = reader
                .byte_headers()
                .map_err(|e| ChopError::csv(&file.path, e))?
                .clone();
            let records = reader
                .byte_records()
                .collect::<std::result::Result<Vec<ByteRecord>, _>>()
                .map_err(|e| ChopError::csv(&file.path, e))?;
            drop(reader);

            let mut replaced = false;
            for (unit, path) in targets {
                replaced |= path == file.path;

                let order = self.permutation(records.len());
                let rows = write_file(
                    &path,
                    delimiter,
                    &header,
                    order.iter().map(|&i| &records[i]),
                )?;
                debug!("Wrote {} ({} rows)", path.display(), rows);
                shuffled.push(WrittenFile { unit, path, rows });
            }

            if !replaced {
                fs::remove_file(&file.path).map_err(|e| ChopError::io(&file.path, e))?;
            }
        }

        Ok(shuffled)
    }
}
