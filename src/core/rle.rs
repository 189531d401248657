//! Run-length marker compression
//!
//! Folds the rank-ordered `(rank, marker)` stream into maximal runs of equal
//! markers. Under [`RunPolicy::Relaxed`] a run also spans unmarked ranks
//! between two equal markers; under [`RunPolicy::Contiguous`] any rank gap
//! closes it, so [`expand`] reproduces the input exactly.

use crate::core::codec::PackedMarker;
use crate::core::config::RunPolicy;
use crate::core::error::{StreamError, StreamResult};

/// An inclusive rank range sharing one marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedMarkerRun {
    pub first_rank: u64,
    pub last_rank: u64,
    pub marker: PackedMarker,
}

impl CompressedMarkerRun {
    pub fn new(first_rank: u64, last_rank: u64, marker: PackedMarker) -> Self {
        Self {
            first_rank,
            last_rank,
            marker,
        }
    }

    /// Number of ranks covered
    pub fn span(&self) -> u64 {
        self.last_rank - self.first_rank + 1
    }

    pub fn contains(&self, rank: u64) -> bool {
        self.first_rank <= rank && rank <= self.last_rank
    }
}

/// Streaming run-length compressor with one open run
#[derive(Debug, Clone)]
pub struct RunLengthCompressor {
    policy: RunPolicy,
    open: Option<CompressedMarkerRun>,
    entries: u64,
    runs: u64,
}

impl RunLengthCompressor {
    pub fn new(policy: RunPolicy) -> Self {
        Self {
            policy,
            open: None,
            entries: 0,
            runs: 0,
        }
    }

    /// Entries pushed so far
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Runs closed so far
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Feed the next entry; returns the run it closed, if any
    ///
    /// Ranks must strictly increase.
    pub fn push(
        &mut self,
        rank: u64,
        marker: PackedMarker,
    ) -> StreamResult<Option<CompressedMarkerRun>> {
        if let Some(open) = self.open.as_mut() {
            if rank <= open.last_rank {
                return Err(StreamError::OutOfOrder {
                    what: "rank",
                    previous: open.last_rank,
                    current: rank,
                });
            }
            let adjacent = rank == open.last_rank + 1;
            let extends = open.marker == marker
                && (adjacent || self.policy == RunPolicy::Relaxed);
            if extends {
                open.last_rank = rank;
                self.entries += 1;
                return Ok(None);
            }
        }

        self.entries += 1;
        let closed = self.open.replace(CompressedMarkerRun::new(rank, rank, marker));
        if closed.is_some() {
            self.runs += 1;
        }
        Ok(closed)
    }

    /// Close the open run at end of stream
    pub fn finish(&mut self) -> Option<CompressedMarkerRun> {
        let closed = self.open.take();
        if closed.is_some() {
            self.runs += 1;
        }
        closed
    }
}

/// Compress a whole rank-ordered stream
pub fn compress<I>(entries: I, policy: RunPolicy) -> StreamResult<Vec<CompressedMarkerRun>>
where
    I: IntoIterator<Item = (u64, PackedMarker)>,
{
    let mut compressor = RunLengthCompressor::new(policy);
    let mut runs = Vec::new();
    for (rank, marker) in entries {
        if let Some(run) = compressor.push(rank, marker)? {
            runs.push(run);
        }
    }
    runs.extend(compressor.finish());
    Ok(runs)
}

/// Expand runs into one `(rank, marker)` per covered rank
pub fn expand<'a>(
    runs: &'a [CompressedMarkerRun],
) -> impl Iterator<Item = (u64, PackedMarker)> + 'a {
    runs.iter()
        .flat_map(|run| (run.first_rank..=run.last_rank).map(move |rank| (rank, run.marker)))
}
