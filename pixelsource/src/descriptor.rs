//! Declared image properties.
//!
//! An [`ImageDescriptor`] gathers the attributes of the _Image Pixel_ module
//! which are needed to interpret the samples in a pixel data stream,
//! as produced by whichever metadata reader opened the object.
//! Nothing here touches the pixel data itself.

use std::fmt;
use std::sync::Arc;

use dicom_dictionary_std::uids;

use crate::source::Endianness;

/// An interpreted representation of the DICOM _Photometric Interpretation_ attribute.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum PhotometricInterpretation {
    /// MONOCHROME1: grayscale, lowest value is displayed as white
    Monochrome1,
    /// MONOCHROME2: grayscale, lowest value is displayed as black
    Monochrome2,
    /// PALETTE COLOR: single sample indices into a color palette
    PaletteColor,
    /// YBR_FULL
    YbrFull,
    /// YBR_FULL_422: YBR_FULL with horizontally halved chroma
    YbrFull422,
    /// RGB
    Rgb,
    /// any other defined term, kept verbatim
    Other(String),
}

impl PhotometricInterpretation {
    /// Obtain the defined term of this photometric interpretation.
    pub fn as_str(&self) -> &str {
        match self {
            PhotometricInterpretation::Monochrome1 => "MONOCHROME1",
            PhotometricInterpretation::Monochrome2 => "MONOCHROME2",
            PhotometricInterpretation::PaletteColor => "PALETTE COLOR",
            PhotometricInterpretation::YbrFull => "YBR_FULL",
            PhotometricInterpretation::YbrFull422 => "YBR_FULL_422",
            PhotometricInterpretation::Rgb => "RGB",
            PhotometricInterpretation::Other(s) => s,
        }
    }

    /// Whether this is MONOCHROME1 or MONOCHROME2.
    pub fn is_monochrome(&self) -> bool {
        matches!(
            self,
            PhotometricInterpretation::Monochrome1 | PhotometricInterpretation::Monochrome2
        )
    }

    /// Whether this is one of the YCbCr interpretations.
    pub fn is_ybr(&self) -> bool {
        matches!(
            self,
            PhotometricInterpretation::YbrFull | PhotometricInterpretation::YbrFull422
        )
    }
}

impl From<&str> for PhotometricInterpretation {
    fn from(s: &str) -> Self {
        match s.trim_end_matches(['\0', ' ']).trim_start() {
            "MONOCHROME1" => PhotometricInterpretation::Monochrome1,
            "MONOCHROME2" => PhotometricInterpretation::Monochrome2,
            "PALETTE COLOR" => PhotometricInterpretation::PaletteColor,
            "YBR_FULL" => PhotometricInterpretation::YbrFull,
            "YBR_FULL_422" => PhotometricInterpretation::YbrFull422,
            "RGB" => PhotometricInterpretation::Rgb,
            other => PhotometricInterpretation::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PhotometricInterpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interpreted representation of the DICOM _Pixel Representation_ attribute.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum PixelRepresentation {
    /// unsigned pixel data sample values
    #[default]
    Unsigned,
    /// signed pixel data sample values
    Signed,
}

/// An interpreted representation of the DICOM _Planar Configuration_ attribute.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum PlanarConfiguration {
    /// color-by-pixel: `R1 G1 B1 R2 G2 B2 ...`
    #[default]
    Interleaved,
    /// color-by-plane: `R1 R2 ... G1 G2 ... B1 B2 ...`
    ByPlane,
}

/// The order in which single-bit samples are packed into each byte.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum BitOrder {
    /// the first sample is in the least significant bit (DICOM native)
    #[default]
    LsbFirst,
    /// the first sample is in the most significant bit
    MsbFirst,
}

/// Pixel padding declared for an image.
///
/// Padding samples do not represent content
/// and are left out of the frame statistics.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct Padding {
    /// the _Pixel Padding Value_
    pub value: i32,
    /// the _Pixel Padding Range Limit_, if any
    pub range_limit: Option<i32>,
}

impl Padding {
    /// Padding of a single sample value.
    pub fn new(value: i32) -> Self {
        Padding {
            value,
            range_limit: None,
        }
    }

    /// Padding of every value between `value` and `range_limit`, inclusive.
    pub fn with_range_limit(value: i32, range_limit: i32) -> Self {
        Padding {
            value,
            range_limit: Some(range_limit),
        }
    }
}

/// A palette color lookup table.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct PaletteLut {
    /// the first stored value mapped by the palette
    pub first_value_mapped: i32,
    /// the number of entries in each table
    pub entry_count: u32,
    /// the number of significant bits in each entry
    pub bits_per_entry: u16,
    /// red channel entries
    pub red: Vec<u16>,
    /// green channel entries
    pub green: Vec<u16>,
    /// blue channel entries
    pub blue: Vec<u16>,
}

impl PaletteLut {
    /// Create a palette from its three tables.
    ///
    /// The entry count is taken from the shortest table.
    pub fn new(
        first_value_mapped: i32,
        bits_per_entry: u16,
        red: Vec<u16>,
        green: Vec<u16>,
        blue: Vec<u16>,
    ) -> Self {
        let entry_count = red.len().min(green.len()).min(blue.len()) as u32;
        PaletteLut {
            first_value_mapped,
            entry_count,
            bits_per_entry,
            red,
            green,
            blue,
        }
    }

    /// Map a stored sample value to its RGB entry.
    ///
    /// Values below the first mapped value take the first entry
    /// and values past the end of the table take the last one.
    /// Returns `None` if the palette is empty.
    pub fn lookup(&self, value: i32) -> Option<[u16; 3]> {
        let len = (self.entry_count as usize)
            .min(self.red.len())
            .min(self.green.len())
            .min(self.blue.len());
        if len == 0 {
            return None;
        }
        let index = (i64::from(value) - i64::from(self.first_value_mapped)).clamp(0, len as i64 - 1)
            as usize;
        Some([self.red[index], self.green[index], self.blue[index]])
    }
}

/// The declared geometry and sample encoding of an image.
///
/// Fields are public so that metadata readers may fill them in directly;
/// the `with_*` methods are a convenience for chained construction.
///
/// # Example
///
/// ```
/// # use dicom_pixelsource::{ImageDescriptor, Padding, PhotometricInterpretation};
/// let pi = PhotometricInterpretation::Monochrome2;
/// let descriptor = ImageDescriptor::new(512, 512, 16, 12, 1, pi)
///     .with_frame_count(40)
///     .with_signed(true)
///     .with_padding(Padding::new(-2000));
/// assert_eq!(descriptor.pixel_count(), 262_144);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor {
    /// the _Columns_
    pub width: u32,
    /// the _Rows_
    pub height: u32,
    /// the _Number of Frames_
    pub frame_count: u32,
    /// the _Bits Allocated_
    pub bits_allocated: u16,
    /// the _Bits Stored_
    pub bits_stored: u16,
    /// the _Samples per Pixel_
    pub samples_per_pixel: u16,
    /// the _Planar Configuration_
    pub planar_configuration: PlanarConfiguration,
    /// the _Pixel Representation_
    pub pixel_representation: PixelRepresentation,
    /// the _Photometric Interpretation_
    pub photometric_interpretation: PhotometricInterpretation,
    /// whether the chroma channels are stored horizontally subsampled
    pub chroma_subsampled: bool,
    /// pixel padding, if declared
    pub padding: Option<Padding>,
    /// palette color lookup table, if declared
    pub palette: Option<Arc<PaletteLut>>,
    /// embedded ICC profile, if declared
    pub icc_profile: Option<Arc<[u8]>>,
    /// an explicit bound on grayscale sample values
    /// (e.g. _Largest Monochrome Pixel Value_)
    pub largest_gray: Option<i32>,
    /// whether samples are IEEE 754 floating point numbers
    pub floating_point: bool,
    /// the packing order of single-bit samples
    pub bit_order: BitOrder,
    /// the transfer syntax UID of the pixel data
    pub transfer_syntax: String,
}

impl ImageDescriptor {
    /// Create a single frame, unsigned, natively encoded image descriptor.
    ///
    /// `YBR_FULL_422` is assumed to be chroma subsampled,
    /// since that is how it is stored in native encodings.
    pub fn new(
        width: u32,
        height: u32,
        bits_allocated: u16,
        bits_stored: u16,
        samples_per_pixel: u16,
        photometric_interpretation: PhotometricInterpretation,
    ) -> Self {
        let chroma_subsampled = photometric_interpretation == PhotometricInterpretation::YbrFull422;
        ImageDescriptor {
            width,
            height,
            frame_count: 1,
            bits_allocated,
            bits_stored,
            samples_per_pixel,
            planar_configuration: PlanarConfiguration::Interleaved,
            pixel_representation: PixelRepresentation::Unsigned,
            photometric_interpretation,
            chroma_subsampled,
            padding: None,
            palette: None,
            icc_profile: None,
            largest_gray: None,
            floating_point: false,
            bit_order: BitOrder::LsbFirst,
            transfer_syntax: uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
        }
    }

    /// Set the number of frames.
    pub fn with_frame_count(mut self, frame_count: u32) -> Self {
        self.frame_count = frame_count;
        self
    }

    /// Set whether samples are signed.
    pub fn with_signed(mut self, signed: bool) -> Self {
        self.pixel_representation = if signed {
            PixelRepresentation::Signed
        } else {
            PixelRepresentation::Unsigned
        };
        self
    }

    /// Set the planar configuration.
    pub fn with_planar_configuration(mut self, planar: PlanarConfiguration) -> Self {
        self.planar_configuration = planar;
        self
    }

    /// Set whether chroma channels are stored subsampled.
    pub fn with_chroma_subsampled(mut self, chroma_subsampled: bool) -> Self {
        self.chroma_subsampled = chroma_subsampled;
        self
    }

    /// Declare pixel padding.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Declare a palette color lookup table.
    pub fn with_palette(mut self, palette: PaletteLut) -> Self {
        self.palette = Some(Arc::new(palette));
        self
    }

    /// Attach an ICC profile.
    pub fn with_icc_profile(mut self, profile: impl Into<Arc<[u8]>>) -> Self {
        self.icc_profile = Some(profile.into());
        self
    }

    /// Declare the largest grayscale sample value.
    pub fn with_largest_gray(mut self, value: i32) -> Self {
        self.largest_gray = Some(value);
        self
    }

    /// Declare samples as floating point numbers.
    pub fn with_floating_point(mut self, floating_point: bool) -> Self {
        self.floating_point = floating_point;
        self
    }

    /// Set the packing order of single-bit samples.
    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    /// Set the transfer syntax UID.
    ///
    /// This does not change [`chroma_subsampled`](Self::chroma_subsampled),
    /// since codecs usually hand back full resolution chroma.
    pub fn with_transfer_syntax(mut self, uid: impl Into<String>) -> Self {
        self.transfer_syntax = uid.into();
        self
    }

    /// Whether sample values are signed.
    #[inline]
    pub fn is_signed(&self) -> bool {
        self.pixel_representation == PixelRepresentation::Signed
    }

    /// The byte order of native samples in this transfer syntax.
    pub fn endianness(&self) -> Endianness {
        Endianness::of_transfer_syntax(&self.transfer_syntax)
    }

    /// The number of pixels in a single frame.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("MONOCHROME1", PhotometricInterpretation::Monochrome1)]
    #[case("MONOCHROME2 ", PhotometricInterpretation::Monochrome2)]
    #[case("PALETTE COLOR", PhotometricInterpretation::PaletteColor)]
    #[case("YBR_FULL_422", PhotometricInterpretation::YbrFull422)]
    #[case("RGB\0", PhotometricInterpretation::Rgb)]
    #[case("YBR_ICT", PhotometricInterpretation::Other("YBR_ICT".to_string()))]
    fn parse_photometric_interpretation(
        #[case] term: &str,
        #[case] expected: PhotometricInterpretation,
    ) {
        let pi = PhotometricInterpretation::from(term);
        assert_eq!(pi, expected);
        assert_eq!(pi.as_str(), term.trim_end_matches(['\0', ' ']));
    }

    #[test]
    fn palette_lookup_clamps_to_table() {
        let palette = PaletteLut::new(
            10,
            16,
            vec![0, 100, 200],
            vec![1, 101, 201],
            vec![2, 102, 202],
        );
        assert_eq!(palette.entry_count, 3);
        assert_eq!(palette.lookup(10), Some([0, 1, 2]));
        assert_eq!(palette.lookup(11), Some([100, 101, 102]));
        // below the first mapped value
        assert_eq!(palette.lookup(-5), Some([0, 1, 2]));
        // past the end
        assert_eq!(palette.lookup(500), Some([200, 201, 202]));

        let empty = PaletteLut::new(0, 8, vec![], vec![], vec![]);
        assert_eq!(empty.lookup(0), None);
    }

    #[test]
    fn ybr_422_defaults_to_subsampled() {
        let d = ImageDescriptor::new(4, 2, 8, 8, 3, PhotometricInterpretation::YbrFull422);
        assert!(d.chroma_subsampled);
        let d = ImageDescriptor::new(4, 2, 8, 8, 3, PhotometricInterpretation::YbrFull);
        assert!(!d.chroma_subsampled);
        assert_eq!(d.transfer_syntax, uids::EXPLICIT_VR_LITTLE_ENDIAN);
    }
}
