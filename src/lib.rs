//! marker-array - Variant marker arrays for haplotype-aware text indexes
//!
//! Builds, for every rank of a suffix-array-like permutation over a set of
//! haplotype sequences, the variant that position came from.
//!
//! # Features
//!
//! - Haplotype reconstruction from a reference FASTA and phased VCFs
//! - Fixed-width packed markers (32 or 64 bit, either byte order)
//! - Single-pass streaming over the permutation with run-length compression
//! - Parallel per-haplotype scanning with rayon
//!
//! # Example
//!
//! ```ignore
//! use marker_array::{MarkerCodec, RunLengthCompressor, RunPolicy, WordWidth};
//!
//! let codec = MarkerCodec::new(WordWidth::W64);
//! let marker = codec.encode(0, 1_000, 1)?;
//!
//! let mut rle = RunLengthCompressor::new(RunPolicy::Relaxed);
//! rle.push(5, marker)?;
//! rle.push(6, marker)?;
//! let run = rle.finish();
//! ```

pub mod core;
pub mod formats;
pub mod pipeline;

// Re-export commonly used types
pub use core::{
    CompressedMarkerRun, CoordinateTracker, Endian, FieldLayout, Haplotype, Marker,
    MarkerCodec, MarkerConfig, MarkerEvent, PackedMarker, Rearranger, RunLengthCompressor,
    RunPolicy, SparseMarkerTable, VariantRecord, WordWidth,
};
pub use pipeline::PipelineError;
