//! Haplotype coordinate tracking
//!
//! Substitutes one haplotype's alleles into a contig's reference sequence and
//! emits a marker event at every haplotype position that belongs to a variant.
//!
//! Coordinates drift from the reference as indels are applied; the drift is
//! carried in an explicit [`HaplotypeCoordinateState`] owned by one tracker,
//! so trackers for different haplotypes never share mutable state.
//!
//! Marker placement per applied variant, with `p` the haplotype position of
//! the variant's first base:
//!
//! | allele              | markers                      | bases written | bias            |
//! |---------------------|------------------------------|---------------|-----------------|
//! | reference (index 0) | `p`                          | `ref`         | –               |
//! | SNP                 | `p`                          | 1             | –               |
//! | deletion            | `p`, `p + 1`                 | 1 (anchor)    | `-(ref - 1)`    |
//! | insertion           | `p ..= p + alt - ref`        | `alt`         | `+(alt - ref)`  |
//!
//! Every marker points at the variant's reference start. An applied variant
//! consumes its whole reference span whatever allele is carried, so a later
//! record starting inside that span is skipped as an overlap.

use crate::core::codec::{MarkerCodec, PackedMarker};
use crate::core::error::{Locus, TrackingError, TrackingResult};
use log::{debug, warn};
use std::fmt;
use std::io::Write;

/// Genotype of one sample at one record: allele index per haplotype copy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Genotype {
    /// `None` for a missing call (`.`)
    pub alleles: Vec<Option<usize>>,
    pub phased: bool,
}

impl Genotype {
    /// Diploid genotype from two called alleles
    pub fn diploid(a: usize, b: usize) -> Self {
        Self {
            alleles: vec![Some(a), Some(b)],
            phased: true,
        }
    }

    /// Parse a `GT` value such as `0|1`, `1/1`, `./.` or `1`
    ///
    /// Unparseable slots are kept as missing so that the slot count still
    /// reflects what the caller wrote.
    pub fn parse(gt: &str) -> Self {
        let phased = gt.contains('|');
        let alleles = gt
            .split(|c| c == '|' || c == '/')
            .map(|s| s.parse::<usize>().ok())
            .collect();
        Self { alleles, phased }
    }

    /// Number of allele slots
    pub fn ploidy(&self) -> usize {
        self.alleles.len()
    }
}

/// One variant call record, restricted to the fields the tracker needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRecord {
    pub contig_id: u64,
    /// 0-based reference start
    pub start: u64,
    /// VCF ID (`.` when absent)
    pub id: String,
    pub reference_allele: String,
    pub alternate_alleles: Vec<String>,
    /// One genotype per sample, in catalog sample order
    pub genotypes: Vec<Genotype>,
}

impl VariantRecord {
    /// Exclusive reference end of the record
    pub fn end(&self) -> u64 {
        self.start + self.reference_allele.len() as u64
    }

    /// Allele string by index (0 = reference)
    pub fn allele(&self, index: usize) -> Option<&str> {
        if index == 0 {
            Some(&self.reference_allele)
        } else {
            self.alternate_alleles.get(index - 1).map(|s| s.as_str())
        }
    }
}

/// Which sequence a tracker reconstructs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Haplotype {
    /// The reference itself; every record resolves to allele 0
    Reference,
    /// Copy `copy` (0 or 1) of sample `name`, the `index`-th sample of the catalog
    Sample {
        index: usize,
        name: String,
        copy: usize,
    },
}

impl Haplotype {
    /// Worker label: `ref` or `{sample}.{copy}`
    pub fn label(&self) -> String {
        match self {
            Haplotype::Reference => "ref".to_string(),
            Haplotype::Sample { name, copy, .. } => format!("{}.{}", name, copy),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Haplotype::Reference)
    }
}

/// A contig's reference bases and its id in the marker layout
#[derive(Debug, Clone, Copy)]
pub struct ContigRef<'a> {
    pub name: &'a str,
    pub id: u64,
    pub sequence: &'a [u8],
}

/// Per-haplotype, per-contig coordinate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HaplotypeCoordinateState {
    /// Offset into the haplotype sequence produced so far
    pub running_position: u64,
    /// Haplotype length minus reference length over the consumed prefix
    pub bias: i64,
    /// Reference start of the most recently applied variant
    pub last_consumed_start: u64,
    /// Reference end of the most recently applied variant
    pub last_consumed_end: u64,
}

/// A marker at a haplotype-local position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerEvent {
    pub haplotype_position: u64,
    pub contig_id: u64,
    pub reference_position: u64,
    pub allele_index: u64,
    /// The packed form of the three marker fields
    pub packed: PackedMarker,
}

/// How an allele is substituted into the haplotype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantShape {
    /// The haplotype carries the reference allele
    Reference,
    Snp,
    Deletion,
    Insertion,
}

fn is_base_string(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Classify an allele against the record's reference allele
///
/// Returns `None` for shapes the tracker cannot represent: multi-base or
/// mixed substitutions, indels without a shared anchor base, and symbolic
/// (`<DEL>`), spanning (`*`) or missing alleles.
pub fn classify(reference_allele: &str, allele: &str, allele_index: usize) -> Option<VariantShape> {
    if !is_base_string(reference_allele) {
        return None;
    }
    if allele_index == 0 {
        return Some(VariantShape::Reference);
    }
    if !is_base_string(allele) {
        return None;
    }

    let ref_len = reference_allele.len();
    let alt_len = allele.len();
    let anchored = reference_allele.as_bytes()[0].eq_ignore_ascii_case(&allele.as_bytes()[0]);

    match (ref_len, alt_len) {
        (1, 1) => Some(VariantShape::Snp),
        (r, 1) if r > 1 && anchored => Some(VariantShape::Deletion),
        (1, a) if a > 1 && anchored => Some(VariantShape::Insertion),
        _ => None,
    }
}

/// A variant the tracker dropped without failing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackWarning {
    /// The variant starts inside the previously applied one
    OverlapSkipped {
        contig: String,
        position: u64,
        id: String,
        previous_start: u64,
        previous_end: u64,
    },
    /// The variant is neither a SNP nor a clean indel
    UnsupportedVariantShape {
        contig: String,
        position: u64,
        id: String,
        reference_allele: String,
        allele: String,
    },
}

impl fmt::Display for TrackWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackWarning::OverlapSkipped {
                contig,
                position,
                id,
                previous_start,
                previous_end,
            } => write!(
                f,
                "skipping {} at {}:{}: overlaps previous variant [{}, {})",
                id, contig, position, previous_start, previous_end
            ),
            TrackWarning::UnsupportedVariantShape {
                contig,
                position,
                id,
                reference_allele,
                allele,
            } => write!(
                f,
                "skipping {} at {}:{}: unsupported variant shape {}>{}",
                id, contig, position, reference_allele, allele
            ),
        }
    }
}

impl TrackWarning {
    /// Short reason tag for log files
    pub fn reason(&self) -> &'static str {
        match self {
            TrackWarning::OverlapSkipped { .. } => "OverlapSkipped",
            TrackWarning::UnsupportedVariantShape { .. } => "UnsupportedVariantShape",
        }
    }
}

/// Result of tracking one haplotype over one contig
#[derive(Debug, Clone, Default)]
pub struct ContigTrack {
    /// Marker events, strictly increasing in haplotype position
    pub events: Vec<MarkerEvent>,
    pub warnings: Vec<TrackWarning>,
    /// Length of the haplotype contig sequence
    pub length: u64,
    pub bias: i64,
    /// Number of variants applied
    pub applied: usize,
}

/// Applies sorted variant records of one contig to one haplotype
pub struct CoordinateTracker<'a> {
    haplotype: &'a Haplotype,
    label: String,
    contig: ContigRef<'a>,
    codec: MarkerCodec,
    state: HaplotypeCoordinateState,
    events: Vec<MarkerEvent>,
    warnings: Vec<TrackWarning>,
    applied: usize,
}

impl<'a> CoordinateTracker<'a> {
    pub fn new(haplotype: &'a Haplotype, contig: ContigRef<'a>, codec: MarkerCodec) -> Self {
        Self {
            haplotype,
            label: haplotype.label(),
            contig,
            codec,
            state: HaplotypeCoordinateState::default(),
            events: Vec::new(),
            warnings: Vec::new(),
            applied: 0,
        }
    }

    /// Current coordinate state
    pub fn state(&self) -> HaplotypeCoordinateState {
        self.state
    }

    fn locus(&self, variant: &VariantRecord) -> Locus {
        Locus {
            haplotype: self.label.clone(),
            contig: self.contig.name.to_string(),
            position: variant.start,
            variant: variant.id.clone(),
        }
    }

    /// Allele index this haplotype carries at `variant`
    fn resolve_allele(&self, variant: &VariantRecord) -> TrackingResult<usize> {
        let (index, copy) = match self.haplotype {
            Haplotype::Reference => return Ok(0),
            Haplotype::Sample { index, copy, .. } => (*index, *copy),
        };

        let found = variant.genotypes.get(index).map_or(0, |gt| gt.ploidy());
        if found != 2 {
            return Err(TrackingError::MalformedGenotype {
                locus: self.locus(variant),
                expected: 2,
                found,
            });
        }

        match variant.genotypes[index].alleles[copy] {
            None => {
                debug!(
                    "{}: missing allele at {}:{}, using reference",
                    self.label, self.contig.name, variant.start
                );
                Ok(0)
            }
            Some(allele) if allele > variant.alternate_alleles.len() => {
                Err(TrackingError::AlleleOutOfRange {
                    locus: self.locus(variant),
                    allele,
                    alternates: variant.alternate_alleles.len(),
                })
            }
            Some(allele) => Ok(allele),
        }
    }

    fn skip(&mut self, warning: TrackWarning) {
        warn!("{}: {}", self.label, warning);
        self.warnings.push(warning);
    }

    /// Record a marker; a later marker at the same position replaces the earlier one
    fn emit(&mut self, position: u64, variant: &VariantRecord, allele_index: usize) -> TrackingResult<()> {
        let packed = self
            .codec
            .encode(self.contig.id, variant.start, allele_index as u64)
            .map_err(|source| TrackingError::Encoding {
                locus: self.locus(variant),
                source,
            })?;
        let event = MarkerEvent {
            haplotype_position: position,
            contig_id: self.contig.id,
            reference_position: variant.start,
            allele_index: allele_index as u64,
            packed,
        };

        match self.events.last_mut() {
            Some(last) if last.haplotype_position == position => *last = event,
            last => {
                debug_assert!(last.map_or(true, |l| l.haplotype_position < position));
                self.events.push(event);
            }
        }
        Ok(())
    }

    /// Apply the next variant, writing the haplotype bases it completes to `out`
    pub fn apply<W: Write>(&mut self, variant: &VariantRecord, out: &mut W) -> TrackingResult<()> {
        let allele_index = self.resolve_allele(variant)?;

        let contig_len = self.contig.sequence.len() as u64;
        if variant.end() > contig_len {
            return Err(TrackingError::VariantOutOfBounds {
                locus: self.locus(variant),
                end: variant.end(),
                contig_len,
            });
        }

        if variant.start < self.state.last_consumed_end {
            let warning = TrackWarning::OverlapSkipped {
                contig: self.contig.name.to_string(),
                position: variant.start,
                id: variant.id.clone(),
                previous_start: self.state.last_consumed_start,
                previous_end: self.state.last_consumed_end,
            };
            self.skip(warning);
            return Ok(());
        }

        let allele = variant.allele(allele_index).unwrap_or_default();
        let shape = match classify(&variant.reference_allele, allele, allele_index) {
            Some(shape) => shape,
            None => {
                let warning = TrackWarning::UnsupportedVariantShape {
                    contig: self.contig.name.to_string(),
                    position: variant.start,
                    id: variant.id.clone(),
                    reference_allele: variant.reference_allele.clone(),
                    allele: allele.to_string(),
                };
                self.skip(warning);
                return Ok(());
            }
        };

        // unchanged reference bases up to the variant
        let start = variant.start as usize;
        let gap_start = self.state.last_consumed_end as usize;
        out.write_all(&self.contig.sequence[gap_start..start])?;
        self.state.running_position += variant.start - self.state.last_consumed_end;

        let p = self.state.running_position;
        let ref_len = variant.reference_allele.len() as u64;
        let consumed = match shape {
            VariantShape::Reference => {
                self.emit(p, variant, 0)?;
                out.write_all(&self.contig.sequence[start..start + ref_len as usize])?;
                self.state.running_position += ref_len;
                ref_len
            }
            VariantShape::Snp => {
                self.emit(p, variant, allele_index)?;
                out.write_all(allele.as_bytes())?;
                self.state.running_position += 1;
                ref_len
            }
            VariantShape::Deletion => {
                self.emit(p, variant, allele_index)?;
                self.emit(p + 1, variant, allele_index)?;
                out.write_all(allele.as_bytes())?;
                self.state.running_position += 1;
                self.state.bias -= (ref_len - 1) as i64;
                ref_len
            }
            VariantShape::Insertion => {
                let alt_len = allele.len() as u64;
                for i in 0..=(alt_len - ref_len) {
                    self.emit(p + i, variant, allele_index)?;
                }
                out.write_all(allele.as_bytes())?;
                self.state.running_position += alt_len;
                self.state.bias += (alt_len - ref_len) as i64;
                ref_len
            }
        };

        self.state.last_consumed_start = variant.start;
        self.state.last_consumed_end = variant.start + consumed;
        self.applied += 1;
        Ok(())
    }

    /// Copy the unconsumed tail of the contig and return the result
    pub fn finish<W: Write>(mut self, out: &mut W) -> TrackingResult<ContigTrack> {
        let contig_len = self.contig.sequence.len() as u64;
        let tail_start = self.state.last_consumed_end as usize;
        out.write_all(&self.contig.sequence[tail_start..])?;
        self.state.running_position += contig_len - self.state.last_consumed_end;

        let length = self.state.running_position;
        debug_assert_eq!(length as i64, contig_len as i64 + self.state.bias);

        // a deletion bracket at the very end of the contig has no base to sit on
        while self.events.last().map_or(false, |e| e.haplotype_position >= length) {
            if let Some(dropped) = self.events.pop() {
                debug!(
                    "{}: dropping marker at {} past end of {} ({} bases)",
                    self.label, dropped.haplotype_position, self.contig.name, length
                );
            }
        }

        Ok(ContigTrack {
            events: self.events,
            warnings: self.warnings,
            length,
            bias: self.state.bias,
            applied: self.applied,
        })
    }
}

/// Track one haplotype over one contig
///
/// `variants` must be the contig's records sorted by start. The haplotype
/// sequence is written to `sequence_out`; marker positions are local to the
/// contig (the first base is position 0).
pub fn track_contig<W: Write>(
    contig: ContigRef<'_>,
    variants: &[VariantRecord],
    haplotype: &Haplotype,
    codec: MarkerCodec,
    sequence_out: &mut W,
) -> TrackingResult<ContigTrack> {
    let mut tracker = CoordinateTracker::new(haplotype, contig, codec);
    for variant in variants {
        tracker.apply(variant, sequence_out)?;
    }
    tracker.finish(sequence_out)
}
