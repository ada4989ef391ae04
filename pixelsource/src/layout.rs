//! Derivation of the sample layout constants of an image.
//!
//! [`resolve`] turns an [`ImageDescriptor`] into a [`DerivedLayout`]:
//! the number of samples and bytes in each frame,
//! the mask of significant bits,
//! and the sign extension constants for signed samples.

use snafu::{ensure, Backtrace, Snafu};

use crate::descriptor::{ImageDescriptor, PlanarConfiguration};

/// The image metadata is contradictory or incomplete.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigurationError {
    #[snafu(display(
        "BitsStored ({}) is larger than BitsAllocated ({})",
        bits_stored,
        bits_allocated
    ))]
    BitsStoredExceedsAllocated {
        bits_stored: u16,
        bits_allocated: u16,
        backtrace: Backtrace,
    },

    #[snafu(display("Attribute `{}` must not be zero", name))]
    ZeroValue {
        name: &'static str,
        backtrace: Backtrace,
    },

    #[snafu(display("Semantically invalid value `{}` for attribute `{}`: {}", value, name, reason))]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
        backtrace: Backtrace,
    },
}

impl ConfigurationError {
    /// The name of the attribute at fault.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigurationError::BitsStoredExceedsAllocated { .. } => "BitsStored",
            ConfigurationError::ZeroValue { name, .. } => name,
            ConfigurationError::InvalidValue { name, .. } => name,
        }
    }
}

/// The in-memory representation chosen for individual samples.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum SampleKind {
    /// one bit per sample, packed
    Bit,
    /// one byte per sample
    U8,
    /// two bytes per sample
    U16,
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    F64,
}

/// Layout constants derived from an [`ImageDescriptor`].
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct DerivedLayout {
    /// the number of samples stored for a single frame
    pub samples_per_frame: usize,
    /// the number of bits a single frame takes in a packed stream
    pub bits_per_frame: u64,
    /// the size of a sample container in bytes, 0 for single-bit samples
    pub bytes_per_sample: u16,
    /// the sample representation, or `None`
    /// if the sample width has no supported representation
    pub sample_kind: Option<SampleKind>,
    /// the _Bits Allocated_
    pub bits_allocated: u16,
    /// the _Bits Stored_
    pub bits_stored: u16,
    /// `2^bits_stored - 1`
    pub mask: u32,
    /// the bit holding the sign of a stored value, 0 if unsigned
    pub sign_bit: u32,
    /// bits set on negative values by sign extension, 0 if unsigned
    pub sign_extend_pattern: u32,
    /// whether samples are signed
    pub signed: bool,
    /// whether chroma channels are horizontally subsampled
    pub chroma_subsampled: bool,
}

impl DerivedLayout {
    /// The number of bytes holding a frame which starts `bit_offset` bits
    /// into its first byte.
    #[inline]
    pub fn frame_byte_len(&self, bit_offset: u8) -> usize {
        ((self.bits_per_frame + u64::from(bit_offset) + 7) / 8) as usize
    }

    /// The number of bytes in a byte-aligned frame.
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.frame_byte_len(0)
    }

    /// Apply the sample mask and, for signed samples, sign extension,
    /// returning the bit pattern to store in the sample container.
    #[inline]
    pub fn normalize(&self, raw: u32) -> u32 {
        let value = raw & self.mask;
        if value & self.sign_bit != 0 {
            value | self.sign_extend_pattern
        } else {
            value
        }
    }

    /// The numeric value of a raw sample after masking and sign extension.
    #[inline]
    pub fn value_of(&self, raw: u32) -> i32 {
        // sign extension already filled the upper bits
        self.normalize(raw) as i32
    }

    /// The range of values representable in the stored bits.
    pub fn stored_range(&self) -> (i64, i64) {
        let bits = u32::from(self.bits_stored.min(32));
        if self.signed {
            (-(1_i64 << (bits - 1)), (1_i64 << (bits - 1)) - 1)
        } else {
            (0, (1_i64 << bits) - 1)
        }
    }
}

/// Derive the layout constants of the image described.
///
/// Fails if the descriptor is contradictory,
/// naming the offending attribute.
pub fn resolve(descriptor: &ImageDescriptor) -> Result<DerivedLayout, ConfigurationError> {
    ensure!(descriptor.width > 0, ZeroValueSnafu { name: "Columns" });
    ensure!(descriptor.height > 0, ZeroValueSnafu { name: "Rows" });
    ensure!(
        descriptor.frame_count > 0,
        ZeroValueSnafu {
            name: "NumberOfFrames"
        }
    );
    ensure!(
        descriptor.samples_per_pixel > 0,
        ZeroValueSnafu {
            name: "SamplesPerPixel"
        }
    );
    ensure!(
        descriptor.bits_allocated > 0,
        ZeroValueSnafu {
            name: "BitsAllocated"
        }
    );
    ensure!(
        descriptor.bits_stored > 0,
        ZeroValueSnafu { name: "BitsStored" }
    );
    ensure!(
        descriptor.bits_stored <= descriptor.bits_allocated,
        BitsStoredExceedsAllocatedSnafu {
            bits_stored: descriptor.bits_stored,
            bits_allocated: descriptor.bits_allocated,
        }
    );
    ensure!(
        descriptor.bits_allocated <= 64,
        InvalidValueSnafu {
            name: "BitsAllocated",
            value: descriptor.bits_allocated.to_string(),
            reason: "at most 64 bits per sample are supported",
        }
    );

    if descriptor.chroma_subsampled {
        ensure!(
            descriptor.samples_per_pixel == 3,
            InvalidValueSnafu {
                name: "SamplesPerPixel",
                value: descriptor.samples_per_pixel.to_string(),
                reason: "chroma subsampling requires 3 samples per pixel",
            }
        );
        ensure!(
            descriptor.planar_configuration == PlanarConfiguration::Interleaved,
            InvalidValueSnafu {
                name: "PlanarConfiguration",
                value: "1",
                reason: "chroma subsampled pixel data must be interleaved",
            }
        );
        // 4:2:2 pairs pixels within a row only, so any number of rows works
        ensure!(
            descriptor.width % 2 == 0,
            InvalidValueSnafu {
                name: "Columns",
                value: descriptor.width.to_string(),
                reason: "chroma subsampled pixel data must have an even width",
            }
        );
    }

    let pixels = descriptor.pixel_count();
    let samples = descriptor.samples_per_pixel as usize;
    let samples_per_frame = if descriptor.chroma_subsampled {
        pixels + (samples - 1) * pixels / 2
    } else {
        pixels * samples
    };

    let sample_kind = match (descriptor.bits_allocated, descriptor.floating_point) {
        (1, false) => Some(SampleKind::Bit),
        (2..=8, false) => Some(SampleKind::U8),
        (9..=16, false) => Some(SampleKind::U16),
        (32, true) => Some(SampleKind::F32),
        (64, true) => Some(SampleKind::F64),
        _ => None,
    };
    // samples are never split across containers, except single bits
    let bytes_per_sample = match sample_kind {
        Some(SampleKind::Bit) => 0,
        _ => (descriptor.bits_allocated + 7) / 8,
    };
    let bits_per_frame = if bytes_per_sample == 0 {
        samples_per_frame as u64
    } else {
        samples_per_frame as u64 * u64::from(bytes_per_sample) * 8
    };

    let bits_stored = u32::from(descriptor.bits_stored);
    let mask = if bits_stored >= 32 {
        u32::MAX
    } else {
        (1_u32 << bits_stored) - 1
    };
    let signed = descriptor.is_signed();
    let (sign_bit, sign_extend_pattern) = if signed && bits_stored <= 32 {
        (1_u32 << (bits_stored - 1), !mask)
    } else {
        (0, 0)
    };

    Ok(DerivedLayout {
        samples_per_frame,
        bits_per_frame,
        bytes_per_sample,
        sample_kind,
        bits_allocated: descriptor.bits_allocated,
        bits_stored: descriptor.bits_stored,
        mask,
        sign_bit,
        sign_extend_pattern,
        signed,
        chroma_subsampled: descriptor.chroma_subsampled,
    })
}
