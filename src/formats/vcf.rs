//! VCF reader
//!
//! Loads variant records with per-sample genotypes from one or more VCF files
//! (plain, gzip or bzip2) and groups them per contig, sorted by start.
//!
//! Lines are split with `memchr`; only the fields the tracker needs are decoded.

use crate::core::io::open_text;
use crate::core::tracker::{Genotype, VariantRecord};
use log::{debug, info, warn};
use memchr::memchr;
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Zero-copy view of one VCF data line
pub struct VcfRecordView<'a> {
    line: &'a [u8],
    /// Chromosome name
    pub chrom: &'a str,
    /// Position (1-based)
    pub pos: u64,
    /// Field boundaries (start, end) for lazy access
    field_bounds: Vec<(usize, usize)>,
}

impl<'a> VcfRecordView<'a> {
    /// Split a data line and decode CHROM and POS
    pub fn parse(line: &'a [u8]) -> Result<Self, VcfParseError> {
        if line.is_empty() {
            return Err(VcfParseError::EmptyLine);
        }

        let mut field_bounds = Vec::with_capacity(10);
        let mut start = 0;
        while let Some(tab) = memchr(b'\t', &line[start..]) {
            field_bounds.push((start, start + tab));
            start += tab + 1;
        }
        field_bounds.push((start, line.len()));

        // CHROM POS ID REF ALT QUAL FILTER INFO
        if field_bounds.len() < 8 {
            return Err(VcfParseError::TooFewFields {
                expected: 8,
                found: field_bounds.len(),
            });
        }

        let chrom = std::str::from_utf8(&line[field_bounds[0].0..field_bounds[0].1])
            .map_err(|_| VcfParseError::InvalidUtf8("CHROM"))?;
        let pos_str = std::str::from_utf8(&line[field_bounds[1].0..field_bounds[1].1])
            .map_err(|_| VcfParseError::InvalidUtf8("POS"))?;
        let pos: u64 = match pos_str.parse() {
            Ok(p) if p > 0 => p,
            _ => return Err(VcfParseError::InvalidNumber("POS", pos_str.to_string())),
        };

        Ok(Self {
            line,
            chrom,
            pos,
            field_bounds,
        })
    }

    pub fn field_count(&self) -> usize {
        self.field_bounds.len()
    }

    /// Field as string slice
    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.field_bounds
            .get(index)
            .and_then(|(start, end)| std::str::from_utf8(&self.line[*start..*end]).ok())
    }

    pub fn id(&self) -> Option<&'a str> {
        self.field(2)
    }

    pub fn ref_allele(&self) -> Option<&'a str> {
        self.field(3)
    }

    /// Raw ALT column (comma separated)
    pub fn alt_alleles(&self) -> Option<&'a str> {
        self.field(4)
    }

    pub fn format(&self) -> Option<&'a str> {
        self.field(8)
    }

    /// Number of sample columns
    pub fn sample_count(&self) -> usize {
        self.field_count().saturating_sub(9)
    }

    pub fn sample(&self, index: usize) -> Option<&'a str> {
        self.field(9 + index)
    }

    /// Position of `GT` within the FORMAT column
    pub fn gt_index(&self) -> Option<usize> {
        self.format()?.split(':').position(|key| key == "GT")
    }

    /// Genotypes of all samples; a sample without a GT value gets no allele slots
    pub fn genotypes(&self) -> Vec<Genotype> {
        let gt_index = match self.gt_index() {
            Some(i) => i,
            None => return vec![Genotype::default(); self.sample_count()],
        };
        (0..self.sample_count())
            .map(|i| {
                self.sample(i)
                    .and_then(|s| s.split(':').nth(gt_index))
                    .map(Genotype::parse)
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Convert to an owned record on contig `contig_id`
    pub fn to_record(&self, contig_id: u64) -> Result<VariantRecord, VcfParseError> {
        let reference_allele = self
            .ref_allele()
            .ok_or(VcfParseError::InvalidUtf8("REF"))?
            .to_string();
        let alternate_alleles = match self.alt_alleles().ok_or(VcfParseError::InvalidUtf8("ALT"))? {
            "." => Vec::new(),
            alts => alts.split(',').map(|a| a.to_string()).collect(),
        };
        Ok(VariantRecord {
            contig_id,
            start: self.pos - 1,
            id: self.id().unwrap_or(".").to_string(),
            reference_allele,
            alternate_alleles,
            genotypes: self.genotypes(),
        })
    }
}

/// VCF parsing error
#[derive(Debug, thiserror::Error)]
pub enum VcfParseError {
    #[error("Empty line")]
    EmptyLine,

    #[error("Too few fields: expected at least {expected}, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("Invalid UTF-8 in field: {0}")]
    InvalidUtf8(&'static str),

    #[error("Invalid number in field {0}: {1}")]
    InvalidNumber(&'static str, String),

    #[error("{path:?}: data line {line} before the #CHROM header")]
    MissingHeader { path: PathBuf, line: usize },

    #[error("{path:?}: sample columns {found:?} differ from {expected:?}")]
    SampleMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{path:?} line {line}: {source}")]
    Line {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<VcfParseError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loading statistics
#[derive(Debug, Default, Clone)]
pub struct VcfStats {
    pub files: usize,
    pub records: usize,
    /// Records on contigs absent from the reference
    pub unknown_contig: usize,
}

/// All variant records of a run, grouped by contig
#[derive(Debug, Default, Clone)]
pub struct VariantCatalog {
    samples: Vec<String>,
    by_contig: HashMap<u64, Vec<VariantRecord>>,
    stats: VcfStats,
}

impl VariantCatalog {
    /// Sample names in column order
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Records of one contig sorted by start; empty if none
    pub fn contig(&self, contig_id: u64) -> &[VariantRecord] {
        self.by_contig
            .get(&contig_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> &VcfStats {
        &self.stats
    }

    /// Total number of records kept
    pub fn len(&self) -> usize {
        self.by_contig.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse the sample names of a `#CHROM` line
fn parse_samples(header: &str) -> Vec<String> {
    header.split('\t').skip(9).map(|s| s.to_string()).collect()
}

/// Load one or more VCF files
///
/// `contig_ids` maps reference contig names to ids. Records on other contigs
/// are skipped with a warning. Every file must list the same samples.
pub fn load_vcfs<P: AsRef<Path>>(
    paths: &[P],
    contig_ids: &HashMap<String, u64>,
) -> Result<VariantCatalog, VcfParseError> {
    let mut catalog = VariantCatalog::default();
    let mut warned: HashSet<String> = HashSet::new();

    for (file_index, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        info!("Loading variants from {:?}", path);
        let mut reader = open_text(path)?;
        let mut buf = Vec::with_capacity(4096);
        let mut line_no = 0usize;
        let mut samples: Option<Vec<String>> = None;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                buf.pop();
            }
            if buf.is_empty() || buf.starts_with(b"##") {
                continue;
            }

            if buf.starts_with(b"#") {
                let header = String::from_utf8_lossy(&buf);
                let found = parse_samples(&header);
                if file_index == 0 {
                    catalog.samples = found.clone();
                } else if found != catalog.samples {
                    return Err(VcfParseError::SampleMismatch {
                        path: path.to_path_buf(),
                        expected: catalog.samples.clone(),
                        found,
                    });
                }
                samples = Some(found);
                continue;
            }

            if samples.is_none() {
                return Err(VcfParseError::MissingHeader {
                    path: path.to_path_buf(),
                    line: line_no,
                });
            }

            let with_line = |e: VcfParseError| VcfParseError::Line {
                path: path.to_path_buf(),
                line: line_no,
                source: Box::new(e),
            };
            let view = VcfRecordView::parse(&buf).map_err(with_line)?;

            let contig_id = match contig_ids.get(view.chrom) {
                Some(id) => *id,
                None => {
                    if warned.insert(view.chrom.to_string()) {
                        warn!("{:?}: contig {} not in reference, skipping its records", path, view.chrom);
                    }
                    catalog.stats.unknown_contig += 1;
                    continue;
                }
            };

            let record = view.to_record(contig_id).map_err(with_line)?;
            catalog.by_contig.entry(contig_id).or_default().push(record);
            catalog.stats.records += 1;
        }

        if samples.is_none() {
            return Err(VcfParseError::MissingHeader {
                path: path.to_path_buf(),
                line: line_no,
            });
        }
        catalog.stats.files += 1;
    }

    // stable: records sharing a start keep file order
    for records in catalog.by_contig.values_mut() {
        records.sort_by_key(|r| r.start);
    }
    debug!(
        "Loaded {} records on {} contigs for {} samples",
        catalog.stats.records,
        catalog.by_contig.len(),
        catalog.samples.len()
    );
    Ok(catalog)
}
