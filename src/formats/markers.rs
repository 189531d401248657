//! Binary marker files
//!
//! All files are flat sequences of fixed-width words in the run's width and
//! byte order:
//!
//! - marker event files (`.mps`): `(position, marker)` pairs, positions strictly increasing
//! - sparse marker arrays (`.sma`): `(rank, marker)` pairs, ranks strictly increasing
//! - compressed marker arrays (`.ma`): `(first_rank, last_rank, marker, sentinel)` quadruples
//!
//! [`MarkerArray`] loads a `.ma` file for random access by rank.
//!
//! Readers validate everything a writer guarantees and stop at the first
//! violation.

use crate::core::codec::{MarkerCodec, PackedMarker};
use crate::core::config::MarkerConfig;
use crate::core::{StreamError, StreamResult};
use crate::core::io::{SmartReader, WordReader, WordWriter};
use crate::core::rle::CompressedMarkerRun;
use std::io::{Read, Write};
use std::path::Path;

/// The two pair-shaped marker files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    /// Text position → marker
    Events,
    /// Output rank → marker
    SparseArray,
}

impl PairKind {
    fn key_name(&self) -> &'static str {
        match self {
            PairKind::Events => "marker position",
            PairKind::SparseArray => "rank",
        }
    }

    fn record_name(&self) -> &'static str {
        match self {
            PairKind::Events => "marker event",
            PairKind::SparseArray => "sparse marker array entry",
        }
    }
}

/// Writes `(key, marker)` pairs with strictly increasing keys
pub struct MarkerPairWriter<W: Write> {
    words: WordWriter<W>,
    kind: PairKind,
    last_key: Option<u64>,
    pairs: u64,
}

impl<W: Write> MarkerPairWriter<W> {
    pub fn new(writer: W, config: &MarkerConfig, kind: PairKind) -> Self {
        Self {
            words: WordWriter::with_config(writer, config),
            kind,
            last_key: None,
            pairs: 0,
        }
    }

    /// Pairs written so far
    pub fn len(&self) -> u64 {
        self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }

    pub fn write(&mut self, key: u64, marker: PackedMarker) -> StreamResult<()> {
        if let Some(previous) = self.last_key {
            if key <= previous {
                return Err(StreamError::OutOfOrder {
                    what: self.kind.key_name(),
                    previous,
                    current: key,
                });
            }
        }
        self.words.write_words(&[key, marker.raw()])?;
        self.last_key = Some(key);
        self.pairs += 1;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> StreamResult<W> {
        self.words.flush()?;
        Ok(self.words.into_inner())
    }
}

/// Reads and validates `(key, marker)` pairs
pub struct MarkerPairReader<R: Read> {
    words: WordReader<R>,
    codec: MarkerCodec,
    kind: PairKind,
    last_key: Option<u64>,
    done: bool,
}

impl<R: Read> MarkerPairReader<R> {
    pub fn new(reader: R, config: &MarkerConfig, kind: PairKind) -> Self {
        Self {
            words: WordReader::with_config(reader, config),
            codec: MarkerCodec::from_config(config),
            kind,
            last_key: None,
            done: false,
        }
    }

    fn read_pair(&mut self) -> StreamResult<Option<(u64, PackedMarker)>> {
        let mut record = [0u64; 2];
        if !self.words.read_record(&mut record, self.kind.record_name())? {
            return Ok(None);
        }
        let [key, word] = record;
        if let Some(previous) = self.last_key {
            if key <= previous {
                return Err(StreamError::OutOfOrder {
                    what: self.kind.key_name(),
                    previous,
                    current: key,
                });
            }
        }
        self.last_key = Some(key);
        Ok(Some((key, self.codec.check(word)?)))
    }
}

impl<R: Read> Iterator for MarkerPairReader<R> {
    type Item = StreamResult<(u64, PackedMarker)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_pair().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Writes compressed marker runs as sentinel-terminated quadruples
pub struct RunWriter<W: Write> {
    words: WordWriter<W>,
    sentinel: u64,
    last_rank: Option<u64>,
    runs: u64,
}

impl<W: Write> RunWriter<W> {
    pub fn new(writer: W, config: &MarkerConfig) -> Self {
        Self {
            words: WordWriter::with_config(writer, config),
            sentinel: config.width.sentinel(),
            last_rank: None,
            runs: 0,
        }
    }

    /// Runs written so far
    pub fn len(&self) -> u64 {
        self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs == 0
    }

    pub fn write_run(&mut self, run: &CompressedMarkerRun) -> StreamResult<()> {
        check_run(run, self.last_rank)?;
        self.words.write_words(&[
            run.first_rank,
            run.last_rank,
            run.marker.raw(),
            self.sentinel,
        ])?;
        self.last_rank = Some(run.last_rank);
        self.runs += 1;
        Ok(())
    }

    pub fn finish(mut self) -> StreamResult<W> {
        self.words.flush()?;
        Ok(self.words.into_inner())
    }
}

fn check_run(run: &CompressedMarkerRun, last_rank: Option<u64>) -> StreamResult<()> {
    if run.first_rank > run.last_rank {
        return Err(StreamError::InvalidRun {
            first_rank: run.first_rank,
            last_rank: run.last_rank,
        });
    }
    if let Some(previous) = last_rank {
        if run.first_rank <= previous {
            return Err(StreamError::OutOfOrder {
                what: "run",
                previous,
                current: run.first_rank,
            });
        }
    }
    Ok(())
}

/// Reads and validates compressed marker runs
pub struct RunReader<R: Read> {
    words: WordReader<R>,
    codec: MarkerCodec,
    last_rank: Option<u64>,
    done: bool,
}

impl<R: Read> RunReader<R> {
    pub fn new(reader: R, config: &MarkerConfig) -> Self {
        Self {
            words: WordReader::with_config(reader, config),
            codec: MarkerCodec::from_config(config),
            last_rank: None,
            done: false,
        }
    }

    fn read_run(&mut self) -> StreamResult<Option<CompressedMarkerRun>> {
        let offset = self.words.offset();
        let mut record = [0u64; 4];
        if !self.words.read_record(&mut record, "marker run")? {
            return Ok(None);
        }
        let [first_rank, last_rank, word, terminator] = record;
        if terminator != self.codec.sentinel() {
            return Err(StreamError::MissingSentinel {
                offset,
                found: terminator,
            });
        }
        let run = CompressedMarkerRun::new(first_rank, last_rank, self.codec.check(word)?);
        check_run(&run, self.last_rank)?;
        self.last_rank = Some(last_rank);
        Ok(Some(run))
    }
}

impl<R: Read> Iterator for RunReader<R> {
    type Item = StreamResult<CompressedMarkerRun>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_run().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// A compressed marker array held in memory for lookups by rank
///
/// Runs are disjoint and sorted, so the run covering a rank is found by
/// binary search over `last_rank`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerArray {
    runs: Vec<CompressedMarkerRun>,
}

impl MarkerArray {
    /// Wrap runs, checking they are well formed and in rank order
    pub fn from_runs(runs: Vec<CompressedMarkerRun>) -> StreamResult<Self> {
        let mut last_rank = None;
        for run in &runs {
            check_run(run, last_rank)?;
            last_rank = Some(run.last_rank);
        }
        Ok(Self { runs })
    }

    /// Load a `.ma` file (or `-`)
    pub fn load<P: AsRef<Path>>(path: P, config: &MarkerConfig) -> StreamResult<Self> {
        Ok(Self {
            runs: read_runs(path, config)?,
        })
    }

    /// Run covering `rank`, if any
    pub fn run_at(&self, rank: u64) -> Option<&CompressedMarkerRun> {
        let idx = self.runs.partition_point(|run| run.last_rank < rank);
        self.runs.get(idx).filter(|run| run.first_rank <= rank)
    }

    /// Marker at `rank`, if any
    #[inline]
    pub fn lookup(&self, rank: u64) -> Option<PackedMarker> {
        self.run_at(rank).map(|run| run.marker)
    }

    pub fn has_entry(&self, rank: u64) -> bool {
        self.run_at(rank).is_some()
    }

    pub fn runs(&self) -> &[CompressedMarkerRun] {
        &self.runs
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Ranks covered by some run
    pub fn covered_ranks(&self) -> u64 {
        self.runs.iter().map(|run| run.span()).sum()
    }
}

/// Open a pair file (or `-`) for reading
pub fn open_pairs<P: AsRef<Path>>(
    path: P,
    config: &MarkerConfig,
    kind: PairKind,
) -> StreamResult<MarkerPairReader<SmartReader>> {
    let reader = SmartReader::open_auto(path)?;
    Ok(MarkerPairReader::new(reader, config, kind))
}

/// Open a compressed marker array (or `-`) for reading
pub fn open_runs<P: AsRef<Path>>(
    path: P,
    config: &MarkerConfig,
) -> StreamResult<RunReader<SmartReader>> {
    let reader = SmartReader::open_auto(path)?;
    Ok(RunReader::new(reader, config))
}

/// Read a whole compressed marker array
pub fn read_runs<P: AsRef<Path>>(
    path: P,
    config: &MarkerConfig,
) -> StreamResult<Vec<CompressedMarkerRun>> {
    open_runs(path, config)?.collect()
}

/// Read a whole pair file
pub fn read_pairs<P: AsRef<Path>>(
    path: P,
    config: &MarkerConfig,
    kind: PairKind,
) -> StreamResult<Vec<(u64, PackedMarker)>> {
    open_pairs(path, config, kind)?.collect()
}
