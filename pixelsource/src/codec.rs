//! The interface to decoders of encapsulated pixel data.
//!
//! Compressed pixel data is never decoded by this crate itself:
//! a [`FrameCodec`] handed over when opening the image
//! turns each encoded frame into native samples.
//! [`UncompressedCodec`] is the one implementation provided,
//! for _Encapsulated Uncompressed Explicit VR Little Endian_.

use byteorder::{ByteOrder, LittleEndian};
use dicom_dictionary_std::uids;
use snafu::{ensure, Snafu};

use crate::descriptor::PhotometricInterpretation;
use crate::frame::FrameSamples;

/// An error raised by a frame codec.
///
/// Codecs are free to report any failure
/// through the [`Custom`](CodecError::Custom) variant.
/// See also [`snafu`] for guidance on using context selectors.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub), module)]
pub enum CodecError {
    /// A custom error occurred when decoding,
    /// reported as a dynamic error value with a message.
    ///
    /// The [`whatever!`](snafu::whatever) macro can be used
    /// to easily create an error of this kind.
    #[snafu(whatever, display("{}", message))]
    Custom {
        /// The error message.
        message: String,
        /// The underlying error cause, if any.
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync + 'static>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// The codec does not handle this transfer syntax.
    #[snafu(display("Unsupported transfer syntax {}", transfer_syntax))]
    UnsupportedTransferSyntax { transfer_syntax: String },

    /// The encoded frame is shorter than the frame it should hold.
    #[snafu(display("Encoded frame has {} bytes, expected {}", actual, expected))]
    ShortFrame { expected: usize, actual: usize },
}

/// The image properties a codec needs to decode a frame.
#[derive(Debug, Copy, Clone)]
pub struct CodecParams<'a> {
    /// the transfer syntax UID of the encoded frame
    pub transfer_syntax: &'a str,
    /// the size of each decoded sample in bytes
    pub bytes_per_sample: u16,
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u16,
    /// the photometric interpretation of the encoded samples
    pub photometric_interpretation: &'a PhotometricInterpretation,
    /// whether decoded samples are signed
    pub signed: bool,
}

impl CodecParams<'_> {
    /// The number of samples in a decoded frame.
    pub fn sample_count(&self) -> usize {
        self.width as usize * self.height as usize * self.samples_per_pixel as usize
    }
}

/// A decoder of single encoded frames.
///
/// Decoded samples must be pixel interleaved.
/// Single sample output is interpreted as `MONOCHROME2`,
/// three sample output as RGB.
pub trait FrameCodec {
    /// Decode one encoded frame.
    fn decode(&self, blob: &[u8], params: &CodecParams<'_>) -> Result<FrameSamples, CodecError>;

    /// Release whatever the codec holds.
    /// Called once when the image is closed.
    fn dispose(&mut self) {}
}

/// A boxed frame codec.
pub type DynFrameCodec = Box<dyn FrameCodec + Send + Sync + 'static>;

/// Codec for [Encapsulated Uncompressed Explicit VR Little Endian][1].
///
/// [1]: https://dicom.nema.org/medical/dicom/2023c/output/chtml/part05/sect_A.4.11.html
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UncompressedCodec;

impl FrameCodec for UncompressedCodec {
    fn decode(&self, blob: &[u8], params: &CodecParams<'_>) -> Result<FrameSamples, CodecError> {
        let transfer_syntax = params.transfer_syntax.trim_end_matches(['\0', ' ']);
        ensure!(
            transfer_syntax == uids::ENCAPSULATED_UNCOMPRESSED_EXPLICIT_VR_LITTLE_ENDIAN,
            codec_error::UnsupportedTransferSyntaxSnafu { transfer_syntax }
        );

        let samples = params.sample_count();
        let expected = samples * params.bytes_per_sample as usize;
        ensure!(
            blob.len() >= expected,
            codec_error::ShortFrameSnafu {
                expected,
                actual: blob.len(),
            }
        );

        match params.bytes_per_sample {
            1 => Ok(FrameSamples::U8(blob[..samples].to_vec())),
            2 => {
                let mut out = vec![0; samples];
                LittleEndian::read_u16_into(&blob[..expected], &mut out);
                Ok(FrameSamples::U16(out))
            }
            n => snafu::whatever!("Unsupported sample size of {} bytes", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params<'a>(
        transfer_syntax: &'a str,
        bytes_per_sample: u16,
        pi: &'a PhotometricInterpretation,
    ) -> CodecParams<'a> {
        CodecParams {
            transfer_syntax,
            bytes_per_sample,
            width: 2,
            height: 2,
            samples_per_pixel: 1,
            photometric_interpretation: pi,
            signed: false,
        }
    }

    #[test]
    fn decode_uncompressed_fragments() {
        let pi = PhotometricInterpretation::Monochrome2;
        let ts = uids::ENCAPSULATED_UNCOMPRESSED_EXPLICIT_VR_LITTLE_ENDIAN;

        let out = UncompressedCodec
            .decode(&[1, 2, 3, 4], &params(ts, 1, &pi))
            .unwrap();
        assert_eq!(out, FrameSamples::U8(vec![1, 2, 3, 4]));

        let out = UncompressedCodec
            .decode(&[1, 0, 2, 0, 0, 1, 0xFF, 0xFF], &params(ts, 2, &pi))
            .unwrap();
        assert_eq!(out, FrameSamples::U16(vec![1, 2, 0x100, 0xFFFF]));
    }

    #[test]
    fn reject_other_transfer_syntaxes_and_short_frames() {
        let pi = PhotometricInterpretation::Monochrome2;
        let err = UncompressedCodec
            .decode(&[0; 4], &params(uids::RLE_LOSSLESS, 1, &pi))
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedTransferSyntax { .. }));

        let err = UncompressedCodec
            .decode(
                &[0; 3],
                &params(uids::ENCAPSULATED_UNCOMPRESSED_EXPLICIT_VR_LITTLE_ENDIAN, 1, &pi),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::ShortFrame {
                expected: 4,
                actual: 3
            }
        ));
    }
}
