//! Pipeline stages
//!
//! - `scan`: one worker per haplotype copy plus the reference, writing
//!   haplotype FASTA, marker event and log files, then the manifest
//! - `merge`: linearise worker coordinates into one marker event file
//! - `build`: stream the permutation into sparse and compressed marker arrays
//! - `dump`: render binary marker files as text and look up ranks in a
//!   compressed marker array

pub mod build;
pub mod dump;
pub mod merge;
pub mod scan;

use crate::core::{ConfigError, StreamError, TrackingError};
use crate::formats::{FastaError, VcfParseError};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use build::{build_marker_array, run_build, BuildOptions, BuildStats};
pub use dump::{dump_file, lookup_ranks, DumpKind, DumpOptions};
pub use merge::{
    load_table, read_manifest, run_merge, worker_offsets, write_manifest, ManifestEntry, MergeOptions,
    MergeReport,
};
pub use scan::{haplotypes, run_scan, ScanOptions, ScanReport, WorkerReport};

/// Pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("VCF error: {0}")]
    Vcf(#[from] VcfParseError),

    #[error("FASTA error: {0}")]
    Fasta(#[from] FastaError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),

    #[error("merge refused: worker(s) {} failed during scan", .0.join(", "))]
    MergeRefused(Vec<String>),

    #[error("{path:?} line {line}: {reason}")]
    Manifest {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("worker {label}: marker position {position} outside its {length} positions")]
    PositionOutOfRange {
        label: String,
        position: u64,
        length: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline stages
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// File names derived from an output prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    prefix: PathBuf,
}

impl OutputPaths {
    pub fn new<P: AsRef<Path>>(prefix: P) -> Self {
        Self {
            prefix: prefix.as_ref().to_path_buf(),
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.prefix.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// `<prefix>.<label>.fa`
    pub fn worker_fasta(&self, label: &str) -> PathBuf {
        self.with_suffix(&format!(".{}.fa", label))
    }

    /// `<prefix>.<label>.mps`
    pub fn worker_events(&self, label: &str) -> PathBuf {
        self.with_suffix(&format!(".{}.mps", label))
    }

    /// `<prefix>.<label>.log`
    pub fn worker_log(&self, label: &str) -> PathBuf {
        self.with_suffix(&format!(".{}.log", label))
    }

    pub fn manifest(&self) -> PathBuf {
        self.with_suffix(".manifest")
    }

    /// Merged marker event file
    pub fn merged_events(&self) -> PathBuf {
        self.with_suffix(".mps")
    }

    /// Concatenated haplotype FASTA
    pub fn merged_fasta(&self) -> PathBuf {
        self.with_suffix(".fa")
    }

    /// Compressed marker array
    pub fn marker_array(&self) -> PathBuf {
        self.with_suffix(".ma")
    }

    /// Uncompressed sparse marker array
    pub fn sparse_array(&self) -> PathBuf {
        self.with_suffix(".sma")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::new("out/run1");
        assert_eq!(paths.worker_fasta("ref"), PathBuf::from("out/run1.ref.fa"));
        assert_eq!(paths.worker_events("HG002.1"), PathBuf::from("out/run1.HG002.1.mps"));
        assert_eq!(paths.worker_log("HG002.0"), PathBuf::from("out/run1.HG002.0.log"));
        assert_eq!(paths.manifest(), PathBuf::from("out/run1.manifest"));
        assert_eq!(paths.marker_array(), PathBuf::from("out/run1.ma"));
        assert_eq!(paths.sparse_array(), PathBuf::from("out/run1.sma"));
    }

    #[test]
    fn test_merge_refused_lists_workers() {
        let err = PipelineError::MergeRefused(vec!["A.0".into(), "B.1".into()]);
        assert_eq!(err.to_string(), "merge refused: worker(s) A.0, B.1 failed during scan");
    }
}
