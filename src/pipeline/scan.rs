//! Scan stage
//!
//! Runs one coordinate-tracking worker per haplotype copy plus one for the
//! reference. Workers share the reference and variant catalog read-only and
//! own everything they write.

use super::merge::{write_manifest, ManifestEntry};
use super::{OutputPaths, PipelineError, PipelineResult};
use crate::core::{
    track_contig, ContigRef, Haplotype, MarkerCodec, MarkerConfig, PendingFile,
};
use crate::formats::{load_vcfs, FastaWriter, MarkerPairWriter, PairKind, ReferenceGenome, VariantCatalog};
use log::{error, info, warn};
use rayon::prelude::*;
use std::io::Write;
use std::path::PathBuf;

/// Scan stage inputs
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub reference: PathBuf,
    pub vcfs: Vec<PathBuf>,
    pub prefix: PathBuf,
    pub threads: usize,
    pub config: MarkerConfig,
}

/// Outcome of one worker
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub label: String,
    /// Positions the worker's text occupies, separators included
    pub length: u64,
    pub markers: u64,
    pub applied: usize,
    pub skipped: usize,
    /// Set when the worker failed; its files were removed
    pub error: Option<String>,
}

impl WorkerReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of the whole scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub workers: Vec<WorkerReport>,
    pub manifest: PathBuf,
    pub contigs: usize,
    pub variants: usize,
}

impl ScanReport {
    pub fn failed(&self) -> Vec<&WorkerReport> {
        self.workers.iter().filter(|w| !w.is_ok()).collect()
    }
}

/// Worker haplotypes in merge order: the reference, then both copies of each sample
pub fn haplotypes(samples: &[String]) -> Vec<Haplotype> {
    std::iter::once(Haplotype::Reference)
        .chain(samples.iter().enumerate().flat_map(|(index, name)| {
            (0..2).map(move |copy| Haplotype::Sample {
                index,
                name: name.clone(),
                copy,
            })
        }))
        .collect()
}

struct WorkerOutput {
    length: u64,
    markers: u64,
    applied: usize,
    skipped: usize,
}

/// Track one haplotype over every contig and commit its three files
fn run_worker(
    genome: &ReferenceGenome,
    catalog: &VariantCatalog,
    haplotype: &Haplotype,
    config: &MarkerConfig,
    paths: &OutputPaths,
) -> PipelineResult<WorkerOutput> {
    let label = haplotype.label();
    let codec = MarkerCodec::from_config(config);

    let mut fasta = FastaWriter::new(PendingFile::create(paths.worker_fasta(&label))?);
    let mut events = MarkerPairWriter::new(
        PendingFile::create(paths.worker_events(&label))?,
        config,
        PairKind::Events,
    );
    let mut log = PendingFile::create(paths.worker_log(&label))?;

    let mut offset = 0u64;
    let mut applied = 0usize;
    let mut skipped = 0usize;

    for (contig_id, record) in genome.contigs().iter().enumerate() {
        let header = match haplotype {
            Haplotype::Reference => record.name.clone(),
            Haplotype::Sample { .. } => format!("{}.{}", label, record.name),
        };
        fasta.begin_record(&header)?;

        let contig = ContigRef {
            name: &record.name,
            id: contig_id as u64,
            sequence: &record.sequence,
        };
        let track = track_contig(
            contig,
            catalog.contig(contig_id as u64),
            haplotype,
            codec,
            &mut fasta,
        )?;

        for event in &track.events {
            events.write(offset + event.haplotype_position, event.packed)?;
        }
        for warning in &track.warnings {
            writeln!(log, "{}\t{}", warning.reason(), warning)?;
        }

        applied += track.applied;
        skipped += track.warnings.len();
        offset += track.length + config.separator_len;
    }

    writeln!(
        log,
        "# {}: {} positions, {} markers, {} variants applied, {} skipped",
        label,
        offset,
        events.len(),
        applied,
        skipped
    )?;

    let markers = events.len();
    fasta.finish()?.commit()?;
    events.finish()?.commit()?;
    log.commit()?;

    Ok(WorkerOutput {
        length: offset,
        markers,
        applied,
        skipped,
    })
}

/// Remove whatever a failed worker committed, or left from an earlier run
fn remove_worker_files(paths: &OutputPaths, label: &str) {
    for path in [
        paths.worker_fasta(label),
        paths.worker_events(label),
        paths.worker_log(label),
    ] {
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove {:?}: {}", path, e);
            }
        }
    }
}

/// Run the scan stage
pub fn run_scan(options: &ScanOptions) -> PipelineResult<ScanReport> {
    options.config.validate()?;
    let paths = OutputPaths::new(&options.prefix);

    let genome = ReferenceGenome::load(&options.reference)?;
    let catalog = load_vcfs(&options.vcfs, &genome.contig_ids())?;
    let workers = haplotypes(catalog.samples());
    info!(
        "Scanning {} haplotypes ({} samples) over {} contigs with {} threads",
        workers.len(),
        catalog.samples().len(),
        genome.len(),
        options.threads
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads)
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

    let reports: Vec<WorkerReport> = pool.install(|| {
        workers
            .par_iter()
            .map(|haplotype| {
                let label = haplotype.label();
                match run_worker(&genome, &catalog, haplotype, &options.config, &paths) {
                    Ok(out) => {
                        info!(
                            "{}: {} positions, {} markers, {} skipped",
                            label, out.length, out.markers, out.skipped
                        );
                        WorkerReport {
                            label,
                            length: out.length,
                            markers: out.markers,
                            applied: out.applied,
                            skipped: out.skipped,
                            error: None,
                        }
                    }
                    Err(e) => {
                        error!("{}: {}", label, e);
                        remove_worker_files(&paths, &label);
                        WorkerReport {
                            label,
                            length: 0,
                            markers: 0,
                            applied: 0,
                            skipped: 0,
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .collect()
    });

    let entries: Vec<ManifestEntry> = reports
        .iter()
        .map(|r| ManifestEntry {
            label: r.label.clone(),
            length: r.length,
            ok: r.is_ok(),
        })
        .collect();
    let manifest = paths.manifest();
    write_manifest(&manifest, &entries)?;

    Ok(ScanReport {
        workers: reports,
        manifest,
        contigs: genome.len(),
        variants: catalog.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haplotype_order() {
        let labels: Vec<String> = haplotypes(&["A".to_string(), "B".to_string()])
            .iter()
            .map(|h| h.label())
            .collect();
        assert_eq!(labels, vec!["ref", "A.0", "A.1", "B.0", "B.1"]);
    }

    #[test]
    fn test_reference_only() {
        assert_eq!(haplotypes(&[]), vec![Haplotype::Reference]);
    }
}
