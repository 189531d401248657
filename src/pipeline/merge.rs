//! Merge stage
//!
//! Places every worker's text one after another in manifest order and
//! rewrites worker-local marker positions into that shared coordinate space.
//! Worker `i` starts at the sum of the lengths of workers `0..i`.

use super::{OutputPaths, PipelineError, PipelineResult};
use crate::core::{MarkerConfig, PendingFile, SmartReader, SparseMarkerTable};
use crate::formats::{open_pairs, MarkerPairWriter, PairKind};
use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const MANIFEST_HEADER: &str = "#label\tlength\tstatus";

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub label: String,
    pub length: u64,
    pub ok: bool,
}

/// Write the manifest in merge order
pub fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> io::Result<()> {
    let mut out = PendingFile::create(path)?;
    writeln!(out, "{}", MANIFEST_HEADER)?;
    for entry in entries {
        let status = if entry.ok { "ok" } else { "failed" };
        writeln!(out, "{}\t{}\t{}", entry.label, entry.length, status)?;
    }
    out.commit()?;
    Ok(())
}

/// Read a manifest written by the scan stage
pub fn read_manifest(path: &Path) -> PipelineResult<Vec<ManifestEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad = |reason: String| PipelineError::Manifest {
            path: path.to_path_buf(),
            line: i + 1,
            reason,
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            return Err(bad(format!("expected 3 fields, found {}", fields.len())));
        }
        let length = fields[1]
            .parse::<u64>()
            .map_err(|_| bad(format!("invalid length {:?}", fields[1])))?;
        let ok = match fields[2] {
            "ok" => true,
            "failed" => false,
            other => return Err(bad(format!("invalid status {:?}", other))),
        };
        entries.push(ManifestEntry {
            label: fields[0].to_string(),
            length,
            ok,
        });
    }
    Ok(entries)
}

/// Merge stage inputs
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub prefix: PathBuf,
    /// Also concatenate worker FASTA files into `<prefix>.fa`
    pub concat_fasta: bool,
    pub config: MarkerConfig,
}

/// Merge statistics
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub workers: usize,
    pub markers: u64,
    /// Length of the concatenated text
    pub total_length: u64,
    pub events: PathBuf,
    pub fasta: Option<PathBuf>,
}

/// Global start of every worker, in manifest order
pub fn worker_offsets(entries: &[ManifestEntry]) -> Vec<u64> {
    entries
        .iter()
        .scan(0u64, |next, entry| {
            let start = *next;
            *next += entry.length;
            Some(start)
        })
        .collect()
}

/// Run the merge stage
pub fn run_merge(options: &MergeOptions) -> PipelineResult<MergeReport> {
    options.config.validate()?;
    let paths = OutputPaths::new(&options.prefix);
    let entries = read_manifest(&paths.manifest())?;

    let failed: Vec<String> = entries
        .iter()
        .filter(|e| !e.ok)
        .map(|e| e.label.clone())
        .collect();
    if !failed.is_empty() {
        return Err(PipelineError::MergeRefused(failed));
    }

    let offsets = worker_offsets(&entries);
    let events_path = paths.merged_events();
    let mut merged = MarkerPairWriter::new(
        PendingFile::create(&events_path)?,
        &options.config,
        PairKind::Events,
    );

    for (entry, offset) in entries.iter().zip(&offsets) {
        let before = merged.len();
        for pair in open_pairs(paths.worker_events(&entry.label), &options.config, PairKind::Events)? {
            let (position, marker) = pair?;
            if position >= entry.length {
                return Err(PipelineError::PositionOutOfRange {
                    label: entry.label.clone(),
                    position,
                    length: entry.length,
                });
            }
            merged.write(offset + position, marker)?;
        }
        info!(
            "{}: {} markers at offset {}",
            entry.label,
            merged.len() - before,
            offset
        );
    }

    let markers = merged.len();
    merged.finish()?.commit()?;

    let fasta = if options.concat_fasta {
        let path = paths.merged_fasta();
        let mut out = PendingFile::create(&path)?;
        for entry in &entries {
            let mut worker = SmartReader::open_auto(paths.worker_fasta(&entry.label))?;
            io::copy(&mut worker, &mut out)?;
        }
        Some(out.commit()?)
    } else {
        None
    };

    Ok(MergeReport {
        workers: entries.len(),
        markers,
        total_length: entries.iter().map(|e| e.length).sum(),
        events: events_path,
        fasta,
    })
}

/// Load a marker event file into a lookup table
pub fn load_table<P: AsRef<Path>>(path: P, config: &MarkerConfig) -> PipelineResult<SparseMarkerTable> {
    let mut table = SparseMarkerTable::new();
    for pair in open_pairs(path, config, PairKind::Events)? {
        let (position, marker) = pair?;
        table.insert(position, marker);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(label: &str, length: u64, ok: bool) -> ManifestEntry {
        ManifestEntry {
            label: label.to_string(),
            length,
            ok,
        }
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.manifest");
        let entries = vec![entry("ref", 10, true), entry("S.0", 12, false)];
        write_manifest(&path, &entries).unwrap();
        assert_eq!(read_manifest(&path).unwrap(), entries);
    }

    #[test]
    fn test_manifest_bad_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.manifest");
        std::fs::write(&path, "ref\t10\tmaybe\n").unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Manifest { line: 1, .. }));
    }

    #[test]
    fn test_worker_offsets_prefix_sum() {
        let entries = vec![entry("ref", 10, true), entry("A.0", 8, true), entry("A.1", 12, true)];
        assert_eq!(worker_offsets(&entries), vec![0, 10, 18]);
    }

    #[test]
    fn test_merge_refuses_failed_worker() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("run");
        let paths = OutputPaths::new(&prefix);
        write_manifest(&paths.manifest(), &[entry("ref", 4, true), entry("A.0", 0, false)]).unwrap();

        let options = MergeOptions {
            prefix,
            concat_fasta: false,
            config: MarkerConfig::default(),
        };
        match run_merge(&options) {
            Err(PipelineError::MergeRefused(labels)) => assert_eq!(labels, vec!["A.0"]),
            other => panic!("unexpected: {:?}", other.map(|r| r.markers)),
        }
        assert!(!paths.merged_events().exists());
    }
}
