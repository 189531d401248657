//! Packed marker codec
//!
//! A marker is the triple (contig id, reference position, allele index)
//! packed into one word, fields high-to-low:
//!
//! ```text
//! 64-bit:  [63..60 allele][59..46 contig][45..0 position]
//! 32-bit:  [31..28 allele][27..22 contig][21..0 position]
//! ```
//!
//! The all-ones word is reserved as the "no marker" / run terminator value
//! and is never produced by [`MarkerCodec::encode`].

use crate::core::config::{FieldLayout, MarkerConfig, WordWidth};
use crate::core::error::{CodecError, CodecResult, MarkerField};
use std::fmt;

/// A marker packed into one word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedMarker(u64);

impl PackedMarker {
    /// Raw word value
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Wrap a raw word without validation (use [`MarkerCodec::check`] for untrusted input)
    pub fn from_raw(word: u64) -> Self {
        PackedMarker(word)
    }
}

impl fmt::Display for PackedMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Unpacked marker fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker {
    pub contig_id: u64,
    pub reference_position: u64,
    pub allele_index: u64,
}

impl Marker {
    pub fn new(contig_id: u64, reference_position: u64, allele_index: u64) -> Self {
        Self {
            contig_id,
            reference_position,
            allele_index,
        }
    }
}

/// Packs and unpacks markers for one word width and layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerCodec {
    width: WordWidth,
    layout: FieldLayout,
}

impl Default for MarkerCodec {
    fn default() -> Self {
        Self::new(WordWidth::W64)
    }
}

#[inline]
fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

impl MarkerCodec {
    /// Codec with the default layout for `width`
    pub fn new(width: WordWidth) -> Self {
        Self {
            width,
            layout: width.default_layout(),
        }
    }

    /// Codec for a validated configuration
    pub fn from_config(config: &MarkerConfig) -> Self {
        Self {
            width: config.width,
            layout: config.layout,
        }
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }

    pub fn layout(&self) -> FieldLayout {
        self.layout
    }

    /// The reserved sentinel word
    pub fn sentinel(&self) -> u64 {
        self.width.sentinel()
    }

    /// Largest encodable contig id
    pub fn max_contig_id(&self) -> u64 {
        mask(self.layout.contig_bits)
    }

    /// Largest encodable reference position
    pub fn max_reference_position(&self) -> u64 {
        mask(self.layout.position_bits)
    }

    /// Pack a marker, failing instead of truncating any field
    pub fn encode(
        &self,
        contig_id: u64,
        reference_position: u64,
        allele_index: u64,
    ) -> CodecResult<PackedMarker> {
        let l = &self.layout;
        check_field(MarkerField::Allele, allele_index, l.allele_bits)?;
        check_field(MarkerField::Contig, contig_id, l.contig_bits)?;
        check_field(MarkerField::Position, reference_position, l.position_bits)?;

        let word = (allele_index << l.allele_shift())
            | (contig_id << l.contig_shift())
            | reference_position;

        if word == self.sentinel() {
            return Err(CodecError::EncodingOverflow {
                field: MarkerField::Word,
                value: word,
                bits: self.width.bits(),
            });
        }
        Ok(PackedMarker(word))
    }

    /// Pack an unpacked [`Marker`]
    pub fn encode_marker(&self, marker: &Marker) -> CodecResult<PackedMarker> {
        self.encode(
            marker.contig_id,
            marker.reference_position,
            marker.allele_index,
        )
    }

    /// Unpack a marker
    pub fn decode(&self, marker: PackedMarker) -> CodecResult<Marker> {
        let word = self.check(marker.raw())?.raw();
        let l = &self.layout;
        Ok(Marker {
            allele_index: (word >> l.allele_shift()) & mask(l.allele_bits),
            contig_id: (word >> l.contig_shift()) & mask(l.contig_bits),
            reference_position: word & mask(l.position_bits),
        })
    }

    /// Validate a raw word read from a file
    pub fn check(&self, word: u64) -> CodecResult<PackedMarker> {
        if word > self.width.max_value() {
            return Err(CodecError::WordTooWide {
                word,
                bits: self.width.bits(),
            });
        }
        if word == self.sentinel() {
            return Err(CodecError::SentinelWord);
        }
        Ok(PackedMarker(word))
    }
}

fn check_field(field: MarkerField, value: u64, bits: u32) -> CodecResult<()> {
    if value > mask(bits) {
        return Err(CodecError::EncodingOverflow { field, value, bits });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_64() {
        let codec = MarkerCodec::new(WordWidth::W64);
        let packed = codec.encode(3, 123_456_789, 1).unwrap();
        assert_eq!(packed.raw(), (1u64 << 60) | (3u64 << 46) | 123_456_789);
        assert_eq!(codec.decode(packed).unwrap(), Marker::new(3, 123_456_789, 1));
    }

    #[test]
    fn test_encode_decode_32() {
        let codec = MarkerCodec::new(WordWidth::W32);
        let packed = codec.encode(5, 4_000_000, 2).unwrap();
        assert_eq!(packed.raw(), (2u64 << 28) | (5u64 << 22) | 4_000_000);
        assert_eq!(codec.decode(packed).unwrap(), Marker::new(5, 4_000_000, 2));
    }

    #[test]
    fn test_custom_layout_round_trip() {
        let config = MarkerConfig::with_width(WordWidth::W64).layout(FieldLayout::new(20, 32));
        config.validate().unwrap();
        let codec = MarkerCodec::from_config(&config);
        assert_eq!(codec.max_contig_id(), (1 << 20) - 1);

        let packed = codec.encode(600_000, 4_000_000_000, 3).unwrap();
        assert_eq!(packed.raw(), (3u64 << 52) | (600_000u64 << 32) | 4_000_000_000);
        assert_eq!(codec.decode(packed).unwrap(), Marker::new(600_000, 4_000_000_000, 3));
        assert!(matches!(
            codec.encode(0, 1 << 32, 0),
            Err(CodecError::EncodingOverflow { field: MarkerField::Position, bits: 32, .. })
        ));
    }

    #[test]
    fn test_zero_marker_is_legal() {
        let codec = MarkerCodec::default();
        let packed = codec.encode(0, 0, 0).unwrap();
        assert_eq!(packed.raw(), 0);
        assert_eq!(codec.decode(packed).unwrap(), Marker::new(0, 0, 0));
    }

    #[test]
    fn test_field_overflow() {
        let codec = MarkerCodec::default();
        assert!(matches!(
            codec.encode(0, 0, 16),
            Err(CodecError::EncodingOverflow { field: MarkerField::Allele, bits: 4, .. })
        ));
        assert!(matches!(
            codec.encode(1 << 14, 0, 0),
            Err(CodecError::EncodingOverflow { field: MarkerField::Contig, bits: 14, .. })
        ));
        assert!(matches!(
            codec.encode(0, 1 << 46, 0),
            Err(CodecError::EncodingOverflow { field: MarkerField::Position, bits: 46, .. })
        ));
    }

    #[test]
    fn test_sentinel_rejected() {
        for width in [WordWidth::W32, WordWidth::W64] {
            let codec = MarkerCodec::new(width);
            let err = codec
                .encode(codec.max_contig_id(), codec.max_reference_position(), 15)
                .unwrap_err();
            assert!(matches!(err, CodecError::EncodingOverflow { field: MarkerField::Word, .. }));

            // one below the sentinel in any field is fine
            assert!(codec
                .encode(codec.max_contig_id(), codec.max_reference_position() - 1, 15)
                .is_ok());
        }
    }

    #[test]
    fn test_decode_rejects_sentinel_and_wide_words() {
        let codec = MarkerCodec::new(WordWidth::W32);
        assert_eq!(
            codec.decode(PackedMarker::from_raw(0xFFFF_FFFF)),
            Err(CodecError::SentinelWord)
        );
        assert!(matches!(
            codec.decode(PackedMarker::from_raw(1 << 32)),
            Err(CodecError::WordTooWide { bits: 32, .. })
        ));
    }
}
