//! Run-wide configuration
//!
//! Word width, byte order and marker field layout are chosen once per run.
//! Every binary file produced or consumed by one run shares them.

use crate::core::error::ConfigError;

/// Width of the allele/genotype field, fixed for every layout
pub const ALLELE_BITS: u32 = 4;

/// Field layout used with 64-bit words: 4 allele / 14 contig / 46 position bits
pub const LAYOUT_64: FieldLayout = FieldLayout {
    allele_bits: ALLELE_BITS,
    contig_bits: 14,
    position_bits: 46,
};

/// Field layout used with 32-bit words: 4 allele / 6 contig / 22 position bits
pub const LAYOUT_32: FieldLayout = FieldLayout {
    allele_bits: ALLELE_BITS,
    contig_bits: 6,
    position_bits: 22,
};

/// Binary word width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum WordWidth {
    W32,
    #[default]
    W64,
}

impl WordWidth {
    /// Width in bits
    pub fn bits(&self) -> u32 {
        match self {
            WordWidth::W32 => 32,
            WordWidth::W64 => 64,
        }
    }

    /// Width in bytes
    pub fn bytes(&self) -> usize {
        self.bits() as usize / 8
    }

    /// The all-ones word of this width
    pub fn sentinel(&self) -> u64 {
        self.max_value()
    }

    /// Largest value representable in one word
    pub fn max_value(&self) -> u64 {
        match self {
            WordWidth::W32 => u32::MAX as u64,
            WordWidth::W64 => u64::MAX,
        }
    }

    /// Default field layout for this width
    pub fn default_layout(&self) -> FieldLayout {
        match self {
            WordWidth::W32 => LAYOUT_32,
            WordWidth::W64 => LAYOUT_64,
        }
    }
}

/// Byte order of binary words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Bit widths of the three packed marker fields, high-to-low: allele, contig, position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    pub allele_bits: u32,
    pub contig_bits: u32,
    pub position_bits: u32,
}

impl FieldLayout {
    /// Layout with the fixed allele field and the given contig and position widths
    pub fn new(contig_bits: u32, position_bits: u32) -> Self {
        Self {
            allele_bits: ALLELE_BITS,
            contig_bits,
            position_bits,
        }
    }

    /// Shift of the contig field
    pub fn contig_shift(&self) -> u32 {
        self.position_bits
    }

    /// Shift of the allele field
    pub fn allele_shift(&self) -> u32 {
        self.position_bits + self.contig_bits
    }

    /// Total bits used by the layout
    pub fn total_bits(&self) -> u32 {
        self.allele_bits + self.contig_bits + self.position_bits
    }

    /// Check the layout against a word width
    pub fn validate(&self, width: WordWidth) -> Result<(), ConfigError> {
        if self.allele_bits != ALLELE_BITS {
            return Err(ConfigError::AlleleBits {
                expected: ALLELE_BITS,
                found: self.allele_bits,
            });
        }
        if self.contig_bits == 0 {
            return Err(ConfigError::EmptyField("contig"));
        }
        if self.position_bits == 0 {
            return Err(ConfigError::EmptyField("position"));
        }
        let available = width.bits() - ALLELE_BITS;
        if self.contig_bits + self.position_bits > available {
            return Err(ConfigError::FieldsTooWide {
                contig_bits: self.contig_bits,
                position_bits: self.position_bits,
                available,
                width: width.bits(),
            });
        }
        Ok(())
    }
}

/// How the run-length compressor treats rank gaps between equal markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum RunPolicy {
    /// Equal markers extend the open run across rank gaps
    #[default]
    Relaxed,
    /// A rank gap closes the open run
    Contiguous,
}

/// Configuration shared by every stage of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerConfig {
    pub width: WordWidth,
    pub endian: Endian,
    pub layout: FieldLayout,
    /// Haplotype copies per sample; only 2 is supported
    pub ploidy: u8,
    /// Positions the index engine inserts after every contig
    pub separator_len: u64,
    pub run_policy: RunPolicy,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self::with_width(WordWidth::W64)
    }
}

impl MarkerConfig {
    /// Default configuration for a word width
    pub fn with_width(width: WordWidth) -> Self {
        Self {
            width,
            endian: Endian::Little,
            layout: width.default_layout(),
            ploidy: 2,
            separator_len: 0,
            run_policy: RunPolicy::Relaxed,
        }
    }

    /// Set the marker field layout; checked by [`MarkerConfig::validate`]
    pub fn layout(mut self, layout: FieldLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set byte order
    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Set contig separator length
    pub fn separator_len(mut self, len: u64) -> Self {
        self.separator_len = len;
        self
    }

    /// Set run policy
    pub fn run_policy(mut self, policy: RunPolicy) -> Self {
        self.run_policy = policy;
        self
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ploidy != 2 {
            return Err(ConfigError::UnsupportedPloidy(self.ploidy));
        }
        self.layout.validate(self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layouts_fill_their_words() {
        assert_eq!(LAYOUT_64.total_bits(), 64);
        assert_eq!(LAYOUT_32.total_bits(), 32);
        assert_eq!(LAYOUT_64.allele_shift(), 60);
        assert_eq!(LAYOUT_64.contig_shift(), 46);
        assert_eq!(LAYOUT_32.allele_shift(), 28);
        assert_eq!(LAYOUT_32.contig_shift(), 22);
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = MarkerConfig::default();
        assert_eq!(cfg.width, WordWidth::W64);
        assert_eq!(cfg.endian, Endian::Little);
        assert_eq!(cfg.run_policy, RunPolicy::Relaxed);
        assert!(cfg.validate().is_ok());
        assert!(MarkerConfig::with_width(WordWidth::W32).validate().is_ok());
    }

    #[test]
    fn test_layout_too_wide_for_32_bits() {
        let err = LAYOUT_64.validate(WordWidth::W32).unwrap_err();
        assert!(matches!(err, ConfigError::FieldsTooWide { available: 28, .. }));
    }

    #[test]
    fn test_allele_bits_fixed() {
        let layout = FieldLayout { allele_bits: 8, contig_bits: 8, position_bits: 48 };
        assert_eq!(
            layout.validate(WordWidth::W64),
            Err(ConfigError::AlleleBits { expected: 4, found: 8 })
        );
    }

    #[test]
    fn test_polyploid_rejected() {
        let mut cfg = MarkerConfig::default();
        cfg.ploidy = 3;
        assert_eq!(cfg.validate(), Err(ConfigError::UnsupportedPloidy(3)));
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(WordWidth::W64.sentinel(), 0xFFFF_FFFF_FFFF_FFFF);
        assert_eq!(WordWidth::W32.sentinel(), 0xFFFF_FFFF);
        assert_eq!(WordWidth::W32.bytes(), 4);
    }

    #[test]
    fn test_custom_layout() {
        let cfg = MarkerConfig::with_width(WordWidth::W64).layout(FieldLayout::new(20, 32));
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.layout.allele_shift(), 52);
        assert_eq!(cfg.layout.total_bits(), 56);

        let narrow = MarkerConfig::with_width(WordWidth::W32).layout(FieldLayout::new(8, 20));
        assert!(narrow.validate().is_ok());
    }

    #[test]
    fn test_custom_layout_too_wide() {
        let cfg = MarkerConfig::with_width(WordWidth::W32).layout(FieldLayout::new(8, 21));
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::FieldsTooWide {
                contig_bits: 8,
                position_bits: 21,
                available: 28,
                width: 32,
            })
        );
        let empty = MarkerConfig::default().layout(FieldLayout::new(0, 40));
        assert_eq!(empty.validate(), Err(ConfigError::EmptyField("contig")));
    }
}
