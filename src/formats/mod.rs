//! File format adapters
//!
//! Text inputs (VCF, FASTA) and the binary marker files (event files, sparse
//! and compressed marker arrays, loaded for lookups by rank).

pub mod fasta;
pub mod markers;
pub mod vcf;

pub use fasta::{FastaError, FastaRecord, FastaWriter, ReferenceGenome, FASTA_LINE_WIDTH};
pub use markers::{
    open_pairs, open_runs, read_pairs, read_runs, MarkerArray, MarkerPairReader, MarkerPairWriter,
    PairKind, RunReader, RunWriter,
};
pub use vcf::{load_vcfs, VariantCatalog, VcfParseError, VcfRecordView, VcfStats};
