//! Error types for marker array construction
//!
//! One error enum per core concern; the pipeline wraps them in
//! `PipelineError`.

use std::fmt;
use thiserror::Error;

/// Errors raised while validating a [`MarkerConfig`](crate::core::MarkerConfig)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Contig and position fields do not fit next to the allele field
    #[error("contig ({contig_bits} bits) + position ({position_bits} bits) exceed the {available} bits left in a {width}-bit word")]
    FieldsTooWide {
        contig_bits: u32,
        position_bits: u32,
        available: u32,
        width: u32,
    },

    /// The allele field is fixed at 4 bits
    #[error("allele field must be {expected} bits, got {found}")]
    AlleleBits { expected: u32, found: u32 },

    /// A field was configured with zero width
    #[error("{0} field must be at least one bit wide")]
    EmptyField(&'static str),

    /// Only diploid input is supported
    #[error("unsupported ploidy {0}: only diploid samples are supported")]
    UnsupportedPloidy(u8),
}

/// A named bit field of a packed marker word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerField {
    Allele,
    Contig,
    Position,
    /// The whole packed word (reserved sentinel or fixed-width word I/O)
    Word,
}

impl fmt::Display for MarkerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkerField::Allele => "allele index",
            MarkerField::Contig => "contig id",
            MarkerField::Position => "reference position",
            MarkerField::Word => "packed word",
        };
        f.write_str(name)
    }
}

/// Errors raised while packing or unpacking marker words
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A value does not fit its configured field, or the packed word equals the sentinel
    #[error("encoding overflow: {field} {value:#x} does not fit in {bits} bits")]
    EncodingOverflow {
        field: MarkerField,
        value: u64,
        bits: u32,
    },

    /// The reserved "no marker" word cannot be decoded
    #[error("cannot decode the reserved sentinel word")]
    SentinelWord,

    /// A word read for a narrower layout carries bits beyond its width
    #[error("word {word:#x} is wider than {bits} bits")]
    WordTooWide { word: u64, bits: u32 },
}

/// Identifies the variant a tracking error happened at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locus {
    /// Worker label: `ref` or `{sample}.{copy}`
    pub haplotype: String,
    /// Contig name
    pub contig: String,
    /// 0-based reference start of the variant
    pub position: u64,
    /// VCF ID field (`.` when absent)
    pub variant: String,
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "haplotype {} at {}:{} (variant {})",
            self.haplotype, self.contig, self.position, self.variant
        )
    }
}

/// Fatal errors raised by the haplotype coordinate tracker
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The sample's genotype does not have exactly two allele slots
    #[error("malformed genotype for {locus}: expected {expected} alleles, found {found}")]
    MalformedGenotype {
        locus: Locus,
        expected: usize,
        found: usize,
    },

    /// The genotype names an allele the record does not have
    #[error("malformed genotype for {locus}: allele {allele} but only {alternates} alternate(s)")]
    AlleleOutOfRange {
        locus: Locus,
        allele: usize,
        alternates: usize,
    },

    /// The reference allele runs past the end of the contig
    #[error("variant {locus} ends at {end}, past contig length {contig_len}")]
    VariantOutOfBounds {
        locus: Locus,
        end: u64,
        contig_len: u64,
    },

    /// A marker of this variant could not be packed
    #[error("cannot encode marker for {locus}: {source}")]
    Encoding {
        locus: Locus,
        #[source]
        source: CodecError,
    },

    /// Writing the haplotype sequence failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackingError {
    /// The variant the error happened at
    pub fn locus(&self) -> Option<&Locus> {
        match self {
            TrackingError::MalformedGenotype { locus, .. }
            | TrackingError::AlleleOutOfRange { locus, .. }
            | TrackingError::VariantOutOfBounds { locus, .. }
            | TrackingError::Encoding { locus, .. } => Some(locus),
            TrackingError::Io(_) => None,
        }
    }
}

/// Errors raised while reading or writing fixed-width binary streams
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream ended in the middle of a record
    #[error("truncated {what}: stream ended after {got} of {expected} bytes at byte offset {offset}")]
    TruncatedStream {
        what: &'static str,
        offset: u64,
        got: usize,
        expected: usize,
    },

    /// A run record was not terminated by the sentinel word
    #[error("run record at byte offset {offset} ends with {found:#x} instead of the sentinel")]
    MissingSentinel { offset: u64, found: u64 },

    /// A run record has its bounds reversed
    #[error("invalid run: first rank {first_rank} > last rank {last_rank}")]
    InvalidRun { first_rank: u64, last_rank: u64 },

    /// Keys that must strictly increase did not
    #[error("{what} out of order: {current} follows {previous}")]
    OutOfOrder {
        what: &'static str,
        previous: u64,
        current: u64,
    },

    /// A value does not fit the configured word width
    #[error("value {value:#x} does not fit in a {bits}-bit word")]
    WordOverflow { value: u64, bits: u32 },

    /// Streaming was cancelled; partial output was discarded
    #[error("cancelled after {ranks} ranks; partial output discarded")]
    Cancelled { ranks: u64 },

    /// Marker word in the stream could not be decoded
    #[error("invalid marker word: {0}")]
    Codec(#[from] CodecError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Result type alias for tracking operations
pub type TrackingResult<T> = std::result::Result<T, TrackingError>;

/// Result type alias for stream operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn locus() -> Locus {
        Locus {
            haplotype: "HG002.1".to_string(),
            contig: "chr20".to_string(),
            position: 1234,
            variant: "rs42".to_string(),
        }
    }

    #[test]
    fn test_tracking_error_names_the_full_tuple() {
        let err = TrackingError::MalformedGenotype {
            locus: locus(),
            expected: 2,
            found: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("HG002.1"));
        assert!(msg.contains("chr20:1234"));
        assert!(msg.contains("rs42"));
        assert_eq!(err.locus().map(|l| l.position), Some(1234));
    }

    #[test]
    fn test_overflow_message_names_field() {
        let err = CodecError::EncodingOverflow {
            field: MarkerField::Contig,
            value: 1 << 14,
            bits: 14,
        };
        assert!(err.to_string().contains("contig id"));
    }

    #[test]
    fn test_stream_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: StreamError = io.into();
        assert!(matches!(err, StreamError::Io(_)));
        assert!(err.to_string().contains("boom"));
    }
}
