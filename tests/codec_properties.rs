//! Property-based tests for the packed marker codec and binary word I/O

use marker_array::core::{
    CodecError, Endian, Marker, MarkerCodec, MarkerField, PackedMarker, WordReader, WordWidth,
    WordWriter,
};
use proptest::prelude::*;
use std::io::Cursor;

fn arb_width() -> impl Strategy<Value = WordWidth> {
    prop_oneof![Just(WordWidth::W32), Just(WordWidth::W64)]
}

fn arb_endian() -> impl Strategy<Value = Endian> {
    prop_oneof![Just(Endian::Little), Just(Endian::Big)]
}

/// Legal field values for a width, excluding the all-ones combination
fn arb_marker(width: WordWidth) -> impl Strategy<Value = Marker> {
    let codec = MarkerCodec::new(width);
    (
        0..=codec.max_contig_id(),
        0..=codec.max_reference_position(),
        0u64..=15,
    )
        .prop_filter("sentinel", move |(c, p, a)| {
            !(*c == codec.max_contig_id() && *p == codec.max_reference_position() && *a == 15)
        })
        .prop_map(|(c, p, a)| Marker::new(c, p, a))
}

fn arb_width_and_marker() -> impl Strategy<Value = (WordWidth, Marker)> {
    arb_width().prop_flat_map(|w| (Just(w), arb_marker(w)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// decode(encode(x)) == x for every legal marker of both widths
    #[test]
    fn prop_encode_decode_roundtrip((width, marker) in arb_width_and_marker()) {
        let codec = MarkerCodec::new(width);
        let packed = codec.encode_marker(&marker).unwrap();
        prop_assert!(packed.raw() <= width.max_value());
        prop_assert_ne!(packed.raw(), width.sentinel());
        prop_assert_eq!(codec.decode(packed).unwrap(), marker);
    }

    /// Field order is allele, contig, position from high to low bits
    #[test]
    fn prop_packing_preserves_order((width, a) in arb_width_and_marker(), b_seed in any::<u64>()) {
        let codec = MarkerCodec::new(width);
        let b = Marker::new(
            b_seed % (codec.max_contig_id() + 1),
            (b_seed >> 8) % codec.max_reference_position(),
            (b_seed >> 60) & 0xF,
        );
        let pa = codec.encode_marker(&a).unwrap();
        let pb = codec.encode_marker(&b).unwrap();
        let key = |m: &Marker| (m.allele_index, m.contig_id, m.reference_position);
        prop_assert_eq!(pa.cmp(&pb), key(&a).cmp(&key(&b)));
    }

    /// Oversized fields are rejected, never truncated
    #[test]
    fn prop_oversized_position_rejected(width in arb_width(), extra in 1u64..1000) {
        let codec = MarkerCodec::new(width);
        let err = codec.encode(0, codec.max_reference_position() + extra, 0).unwrap_err();
        let is_position_overflow = matches!(
            err,
            CodecError::EncodingOverflow { field: MarkerField::Position, .. }
        );
        prop_assert!(is_position_overflow);
    }

    /// Words survive a write/read cycle in either byte order
    #[test]
    fn prop_word_io_roundtrip(
        width in arb_width(),
        endian in arb_endian(),
        words in prop::collection::vec(any::<u64>(), 0..50),
    ) {
        let words: Vec<u64> = words.into_iter().map(|w| w & width.max_value()).collect();
        let mut writer = WordWriter::new(Vec::new(), width, endian);
        writer.write_words(&words).unwrap();
        let bytes = writer.into_inner();
        prop_assert_eq!(bytes.len(), words.len() * width.bytes());

        let mut reader = WordReader::new(Cursor::new(bytes), width, endian);
        let mut back = Vec::new();
        while let Some(w) = reader.next_word("word").unwrap() {
            back.push(w);
        }
        prop_assert_eq!(back, words);
    }

    /// A stream cut inside a word always reports truncation
    #[test]
    fn prop_partial_word_is_truncation(width in arb_width(), words in 0usize..5, cut in 1usize..4) {
        let bytes = vec![0u8; words * width.bytes() + cut];
        let mut reader = WordReader::new(Cursor::new(bytes), width, Endian::Little);
        for _ in 0..words {
            prop_assert!(reader.next_word("word").unwrap().is_some());
        }
        prop_assert!(reader.next_word("word").is_err());
    }
}

#[test]
fn test_64_bit_layout_is_bit_exact() {
    let codec = MarkerCodec::new(WordWidth::W64);
    let packed = codec.encode(0x2A, 0x1234_5678, 0x3).unwrap();
    assert_eq!(packed, PackedMarker::from_raw(0x3 << 60 | 0x2A << 46 | 0x1234_5678));
}

#[test]
fn test_32_bit_layout_is_bit_exact() {
    let codec = MarkerCodec::new(WordWidth::W32);
    let packed = codec.encode(0x3F, 0x3F_FFFF, 0xE).unwrap();
    assert_eq!(packed.raw(), 0xEFFF_FFFF);
    assert!(codec.encode(0x40, 0, 0).is_err());
    assert!(codec.encode(0, 0x40_0000, 0).is_err());
}
