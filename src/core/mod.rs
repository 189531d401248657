//! Core marker array functionality
//!
//! This module contains the marker codec, the haplotype coordinate tracker,
//! the sparse marker table, the permutation rearranger and the run-length
//! compressor.

pub mod codec;
pub mod config;
mod error;
pub mod io;
mod rearrange;
pub mod rle;
mod table;
pub mod tracker;

pub use codec::{Marker, MarkerCodec, PackedMarker};
pub use config::{Endian, FieldLayout, MarkerConfig, RunPolicy, WordWidth, LAYOUT_32, LAYOUT_64};
pub use error::{
    CodecError, CodecResult, ConfigError, Locus, MarkerField, StreamError, StreamResult,
    TrackingError, TrackingResult,
};
pub use io::{
    open_text, CompressionFormat, PendingFile, ReadMode, SmartReader, WordReader, WordWriter,
    DEFAULT_BUFFER_SIZE, LARGE_BUFFER_SIZE, MMAP_THRESHOLD,
};
pub use rearrange::Rearranger;
pub use rle::{compress, expand, CompressedMarkerRun, RunLengthCompressor};
pub use table::SparseMarkerTable;
pub use tracker::{
    classify, track_contig, ContigRef, ContigTrack, CoordinateTracker, Genotype, Haplotype,
    HaplotypeCoordinateState, MarkerEvent, TrackWarning, VariantRecord, VariantShape,
};
