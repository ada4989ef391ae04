//! Decoded frames.
use snafu::Snafu;

#[cfg(feature = "image")]
use image::{DynamicImage, ImageBuffer, Luma, Rgb};
#[cfg(feature = "ndarray")]
use ndarray::{Array, IxDyn};
#[cfg(any(feature = "ndarray", feature = "image"))]
use snafu::OptionExt;
#[cfg(feature = "ndarray")]
use snafu::ResultExt;

use crate::color::ColorSpace;
use crate::descriptor::PhotometricInterpretation;

/// The samples of a decoded frame, pixel interleaved.
///
/// Signed integer samples are held in the unsigned container
/// of the same width as two's complement bit patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl FrameSamples {
    pub fn len(&self) -> usize {
        match self {
            FrameSamples::U8(v) => v.len(),
            FrameSamples::U16(v) => v.len(),
            FrameSamples::F32(v) => v.len(),
            FrameSamples::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            FrameSamples::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match self {
            FrameSamples::U16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            FrameSamples::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            FrameSamples::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// How the samples of a frame are to be displayed.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ColorModel {
    /// one gray level per pixel
    Monochrome,
    /// one palette index per pixel
    Palette,
    /// three color channels per pixel
    Rgb,
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ConvertError {
    #[cfg(feature = "ndarray")]
    #[snafu(display("Invalid shape for ndarray"))]
    Shape { source: ndarray::ShapeError },

    #[snafu(display("Invalid data type for ndarray element"))]
    InvalidDataType,

    #[snafu(display("Invalid buffer when constructing ImageBuffer"))]
    InvalidImageBuffer,

    #[snafu(display("Unsupported SamplesPerPixel {}", spp))]
    UnsupportedSamplesPerPixel { spp: u16 },
}

/// A single decoded frame of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub(crate) index: u32,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) samples_per_pixel: u16,
    pub(crate) samples: FrameSamples,
    pub(crate) color_model: ColorModel,
    pub(crate) photometric_interpretation: PhotometricInterpretation,
    pub(crate) signed: bool,
    pub(crate) bits_stored: u16,
    pub(crate) color_space: Option<ColorSpace>,
}

impl DecodedFrame {
    /// The index of this frame in the image.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples_per_pixel(&self) -> u16 {
        self.samples_per_pixel
    }

    pub fn samples(&self) -> &FrameSamples {
        &self.samples
    }

    /// Take the samples out of the frame.
    pub fn into_samples(self) -> FrameSamples {
        self.samples
    }

    pub fn color_model(&self) -> ColorModel {
        self.color_model
    }

    /// The photometric interpretation the samples are in,
    /// which may differ from the declared one after decoding.
    pub fn photometric_interpretation(&self) -> &PhotometricInterpretation {
        &self.photometric_interpretation
    }

    /// Whether integer samples are signed.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn bits_stored(&self) -> u16 {
        self.bits_stored
    }

    /// The color space of the samples, if known.
    pub fn color_space(&self) -> Option<&ColorSpace> {
        self.color_space.as_ref()
    }

    /// The numeric value of the sample at index `i`,
    /// interpreting the container bits as signed if applicable.
    pub fn signed_sample(&self, i: usize) -> Option<f64> {
        match &self.samples {
            FrameSamples::U8(v) if self.signed => v.get(i).map(|&x| f64::from(x as i8)),
            FrameSamples::U8(v) => v.get(i).map(|&x| f64::from(x)),
            FrameSamples::U16(v) if self.signed => v.get(i).map(|&x| f64::from(x as i16)),
            FrameSamples::U16(v) => v.get(i).map(|&x| f64::from(x)),
            FrameSamples::F32(v) => v.get(i).map(|&x| f64::from(x)),
            FrameSamples::F64(v) => v.get(i).copied(),
        }
    }

    /// Convert the frame into an ndarray of a given type T.
    ///
    /// The array shape is Rows x Cols x SamplesPerPixel.
    /// Signed samples are converted by value.
    #[cfg(feature = "ndarray")]
    pub fn to_ndarray<T>(&self) -> Result<Array<T, IxDyn>, ConvertError>
    where
        T: num_traits::NumCast,
    {
        let shape = IxDyn(&[
            self.height as usize,
            self.width as usize,
            self.samples_per_pixel as usize,
        ]);

        let converted: Option<Vec<T>> = match &self.samples {
            FrameSamples::U8(v) if self.signed => v.iter().map(|&x| T::from(x as i8)).collect(),
            FrameSamples::U8(v) => v.iter().map(|&x| T::from(x)).collect(),
            FrameSamples::U16(v) if self.signed => v.iter().map(|&x| T::from(x as i16)).collect(),
            FrameSamples::U16(v) => v.iter().map(|&x| T::from(x)).collect(),
            FrameSamples::F32(v) => v.iter().map(|&x| T::from(x)).collect(),
            FrameSamples::F64(v) => v.iter().map(|&x| T::from(x)).collect(),
        };
        let converted = converted.context(InvalidDataTypeSnafu)?;
        Array::from_shape_vec(shape, converted).context(ShapeSnafu)
    }

    /// Convert the frame into a [`DynamicImage`].
    ///
    /// Sample values are kept as is, without any windowing.
    /// Signed samples are offset to the unsigned range,
    /// floating point samples produce an RGB 32-bit float image.
    /// Palette indices are exported as gray levels.
    #[cfg(feature = "image")]
    pub fn to_dynamic_image(&self) -> Result<DynamicImage, ConvertError> {
        let (w, h) = (self.width, self.height);
        match (self.samples_per_pixel, &self.samples) {
            (1, FrameSamples::U8(v)) => {
                let data = if self.signed {
                    v.iter().map(|x| x ^ 0x80).collect()
                } else {
                    v.clone()
                };
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(w, h, data).context(InvalidImageBufferSnafu)?;
                Ok(DynamicImage::ImageLuma8(buffer))
            }
            (1, FrameSamples::U16(v)) => {
                let data = if self.signed {
                    v.iter().map(|x| x ^ 0x8000).collect()
                } else {
                    v.clone()
                };
                let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
                    ImageBuffer::from_raw(w, h, data).context(InvalidImageBufferSnafu)?;
                Ok(DynamicImage::ImageLuma16(buffer))
            }
            (3, FrameSamples::U8(v)) => {
                let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(w, h, v.clone()).context(InvalidImageBufferSnafu)?;
                Ok(DynamicImage::ImageRgb8(buffer))
            }
            (3, FrameSamples::U16(v)) => {
                let buffer: ImageBuffer<Rgb<u16>, Vec<u16>> =
                    ImageBuffer::from_raw(w, h, v.clone()).context(InvalidImageBufferSnafu)?;
                Ok(DynamicImage::ImageRgb16(buffer))
            }
            (spp @ (1 | 3), FrameSamples::F32(_) | FrameSamples::F64(_)) => {
                let values = (0..self.samples.len()).filter_map(|i| self.signed_sample(i));
                let data: Vec<f32> = if spp == 1 {
                    values.flat_map(|x| [x as f32; 3]).collect()
                } else {
                    values.map(|x| x as f32).collect()
                };
                let buffer: ImageBuffer<Rgb<f32>, Vec<f32>> =
                    ImageBuffer::from_raw(w, h, data).context(InvalidImageBufferSnafu)?;
                Ok(DynamicImage::ImageRgb32F(buffer))
            }
            (spp, _) => UnsupportedSamplesPerPixelSnafu { spp }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: FrameSamples, samples_per_pixel: u16, signed: bool) -> DecodedFrame {
        DecodedFrame {
            index: 0,
            width: 2,
            height: 1,
            samples_per_pixel,
            samples,
            color_model: if samples_per_pixel == 3 {
                ColorModel::Rgb
            } else {
                ColorModel::Monochrome
            },
            photometric_interpretation: PhotometricInterpretation::Monochrome2,
            signed,
            bits_stored: 16,
            color_space: None,
        }
    }

    #[test]
    fn signed_samples_from_containers() {
        let f = frame(FrameSamples::U16(vec![0xFFFF, 0x7FFF]), 1, true);
        assert_eq!(f.signed_sample(0), Some(-1.));
        assert_eq!(f.signed_sample(1), Some(32767.));
        assert_eq!(f.signed_sample(2), None);

        let f = frame(FrameSamples::U16(vec![0xFFFF, 0x7FFF]), 1, false);
        assert_eq!(f.signed_sample(0), Some(65535.));

        let f = frame(FrameSamples::U8(vec![0x80, 1]), 1, true);
        assert_eq!(f.signed_sample(0), Some(-128.));
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn frame_to_ndarray() {
        let f = frame(FrameSamples::U16(vec![0xFFFE, 5]), 1, true);
        let array = f.to_ndarray::<i32>().unwrap();
        assert_eq!(array.shape(), &[1, 2, 1]);
        assert_eq!(array[[0, 0, 0]], -2);
        assert_eq!(array[[0, 1, 0]], 5);
    }

    #[cfg(feature = "image")]
    #[test]
    fn frame_to_dynamic_image() {
        let f = frame(FrameSamples::U8(vec![1, 2, 3, 4, 5, 6]), 3, false);
        let image = f.to_dynamic_image().unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 1);
        assert_eq!(image.as_rgb8().unwrap().get_pixel(1, 0).0, [4, 5, 6]);

        let f = frame(FrameSamples::U16(vec![0xFFFF, 0]), 1, true);
        let image = f.to_dynamic_image().unwrap();
        assert_eq!(image.as_luma16().unwrap().as_raw(), &vec![0x7FFF, 0x8000]);

        let f = frame(FrameSamples::U8(vec![0; 4]), 2, false);
        assert!(matches!(
            f.to_dynamic_image(),
            Err(ConvertError::UnsupportedSamplesPerPixel { spp: 2 })
        ));
    }
}
