//! Build stage
//!
//! Streams the permutation once, looking each entry up in the merged marker
//! table and folding marked ranks into compressed runs. Outputs are committed
//! only when the whole stream was consumed.

use super::merge::load_table;
use super::{OutputPaths, PipelineResult};
use crate::core::{
    MarkerConfig, PendingFile, Rearranger, RunLengthCompressor, RunPolicy, SmartReader,
    SparseMarkerTable, StreamResult, WordReader,
};
use crate::formats::{MarkerPairWriter, PairKind, RunWriter};
use log::info;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Build statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Permutation entries read
    pub ranks: u64,
    /// Ranks that carried a marker
    pub marked: u64,
    /// Compressed runs written
    pub runs: u64,
}

/// Stream a permutation into compressed runs and, optionally, sparse pairs
pub fn build_marker_array<R: Read, W: Write, S: Write>(
    permutation: WordReader<R>,
    table: &SparseMarkerTable,
    policy: RunPolicy,
    runs_out: &mut RunWriter<W>,
    mut sparse_out: Option<&mut MarkerPairWriter<S>>,
    cancel: Option<Arc<AtomicBool>>,
) -> StreamResult<BuildStats> {
    let mut rearranger = Rearranger::new(permutation, table);
    if let Some(flag) = cancel {
        rearranger = rearranger.with_cancel(flag);
    }
    let mut compressor = RunLengthCompressor::new(policy);
    let mut marked = 0u64;

    for entry in rearranger.by_ref() {
        let (rank, marker) = entry?;
        marked += 1;
        if let Some(sparse) = sparse_out.as_mut() {
            sparse.write(rank, marker)?;
        }
        if let Some(run) = compressor.push(rank, marker)? {
            runs_out.write_run(&run)?;
        }
    }
    if let Some(run) = compressor.finish() {
        runs_out.write_run(&run)?;
    }

    Ok(BuildStats {
        ranks: rearranger.ranks_read(),
        marked,
        runs: runs_out.len(),
    })
}

/// Build stage inputs
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub prefix: PathBuf,
    /// Permutation stream, or `-` for standard input
    pub permutation: PathBuf,
    /// Marker event file; defaults to the merged `<prefix>.mps`
    pub events: Option<PathBuf>,
    /// Also write the uncompressed `<prefix>.sma`
    pub write_sparse: bool,
    pub config: MarkerConfig,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Run the build stage
pub fn run_build(options: &BuildOptions) -> PipelineResult<BuildStats> {
    options.config.validate()?;
    let paths = OutputPaths::new(&options.prefix);
    let events = options
        .events
        .clone()
        .unwrap_or_else(|| paths.merged_events());

    let start = Instant::now();
    let table = load_table(&events, &options.config)?;
    info!(
        "Loaded {} markers from {:?} in {:.2?}",
        table.len(),
        events,
        start.elapsed()
    );

    let permutation = WordReader::with_config(
        SmartReader::open_auto(&options.permutation)?,
        &options.config,
    );
    let mut runs_out = RunWriter::new(PendingFile::create(paths.marker_array())?, &options.config);
    let mut sparse_out = if options.write_sparse {
        Some(MarkerPairWriter::new(
            PendingFile::create(paths.sparse_array())?,
            &options.config,
            PairKind::SparseArray,
        ))
    } else {
        None
    };

    let stats = build_marker_array(
        permutation,
        &table,
        options.config.run_policy,
        &mut runs_out,
        sparse_out.as_mut(),
        options.cancel.clone(),
    )?;

    runs_out.finish()?.commit()?;
    if let Some(sparse) = sparse_out {
        sparse.finish()?.commit()?;
    }
    info!(
        "Streamed {} ranks: {} marked, {} runs in {:.2?}",
        stats.ranks,
        stats.marked,
        stats.runs,
        start.elapsed()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CompressedMarkerRun, PackedMarker, StreamError, WordWidth};
    use crate::formats::{MarkerPairReader, RunReader};
    use std::io::Cursor;

    fn m(raw: u64) -> PackedMarker {
        PackedMarker::from_raw(raw)
    }

    fn permutation(config: &MarkerConfig, positions: &[u32]) -> WordReader<Cursor<Vec<u8>>> {
        let bytes = positions.iter().flat_map(|p| p.to_le_bytes()).collect();
        WordReader::with_config(Cursor::new(bytes), config)
    }

    #[test]
    fn test_build_small() {
        let config = MarkerConfig::with_width(WordWidth::W32);
        // text positions 3,4,5 share marker 1; 8 carries marker 2
        let table: SparseMarkerTable = [(3, m(1)), (4, m(1)), (5, m(1)), (8, m(2))]
            .into_iter()
            .collect();
        let perm = permutation(&config, &[0, 9, 7, 6, 1, 3, 4, 5, 2, 8]);

        let mut runs = RunWriter::new(Vec::new(), &config);
        let mut sparse = MarkerPairWriter::new(Vec::new(), &config, PairKind::SparseArray);
        let stats = build_marker_array(
            perm,
            &table,
            RunPolicy::Relaxed,
            &mut runs,
            Some(&mut sparse),
            None,
        )
        .unwrap();
        assert_eq!(stats, BuildStats { ranks: 10, marked: 4, runs: 2 });

        let runs: Vec<_> = RunReader::new(Cursor::new(runs.finish().unwrap()), &config)
            .collect::<StreamResult<_>>()
            .unwrap();
        assert_eq!(
            runs,
            vec![
                CompressedMarkerRun::new(5, 7, m(1)),
                CompressedMarkerRun::new(9, 9, m(2)),
            ]
        );

        let pairs: Vec<_> = MarkerPairReader::new(
            Cursor::new(sparse.finish().unwrap()),
            &config,
            PairKind::SparseArray,
        )
        .collect::<StreamResult<_>>()
        .unwrap();
        assert_eq!(pairs, vec![(5, m(1)), (6, m(1)), (7, m(1)), (9, m(2))]);
    }

    #[test]
    fn test_build_truncated_permutation() {
        let config = MarkerConfig::with_width(WordWidth::W32);
        let table: SparseMarkerTable = [(0, m(1))].into_iter().collect();
        let perm = WordReader::with_config(Cursor::new(vec![0u8, 0, 0, 0, 1]), &config);
        let mut runs = RunWriter::new(Vec::new(), &config);
        let err = build_marker_array(
            perm,
            &table,
            RunPolicy::Relaxed,
            &mut runs,
            None::<&mut MarkerPairWriter<Vec<u8>>>,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, StreamError::TruncatedStream { offset: 4, got: 1, .. }));
    }
}
