//! Color space conversion of decoded RGB frames.
//!
//! Conversion is done through ICC profiles with Little CMS
//! when the `icc` feature is enabled.
//! Without it, frames keep their samples
//! and are only tagged with the target color space.
use std::sync::Arc;

use snafu::Snafu;
use tracing::debug;

use crate::descriptor::PhotometricInterpretation;
use crate::frame::{ColorModel, DecodedFrame, FrameSamples};

/// The color space of RGB samples.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub enum ColorSpace {
    /// standard sRGB (IEC 61966-2-1)
    Srgb,
    /// described by an ICC profile
    Icc(Arc<[u8]>),
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ColorError {
    #[snafu(display("Invalid ICC profile: {}", message))]
    InvalidProfile { message: String },

    #[snafu(display("Could not create color transform: {}", message))]
    Transform { message: String },
}

/// Convert an RGB frame from the `src` color space to `dst`.
///
/// Only 8 and 16 bit frames in the RGB photometric interpretation
/// are converted, and only when both color spaces are known
/// and differ. Returns whether the samples were converted.
pub fn post_process(
    frame: &mut DecodedFrame,
    src: Option<&ColorSpace>,
    dst: Option<&ColorSpace>,
) -> Result<bool, ColorError> {
    if frame.color_model != ColorModel::Rgb
        || frame.photometric_interpretation != PhotometricInterpretation::Rgb
        || !matches!(frame.samples, FrameSamples::U8(_) | FrameSamples::U16(_))
    {
        return Ok(false);
    }
    let (Some(src), Some(dst)) = (src, dst) else {
        return Ok(false);
    };
    if src == dst {
        return Ok(false);
    }

    let converted = convert(&mut frame.samples, src, dst)?;
    frame.color_space = Some(dst.clone());
    Ok(converted)
}

#[cfg(feature = "icc")]
fn convert(
    samples: &mut FrameSamples,
    src: &ColorSpace,
    dst: &ColorSpace,
) -> Result<bool, ColorError> {
    use lcms2::{Intent, PixelFormat, Profile, Transform};

    fn profile(space: &ColorSpace) -> Result<Profile, ColorError> {
        match space {
            ColorSpace::Srgb => Ok(Profile::new_srgb()),
            ColorSpace::Icc(data) => {
                Profile::new_icc(data).map_err(|e| ColorError::InvalidProfile {
                    message: e.to_string(),
                })
            }
        }
    }

    fn apply<T: Copy + Default + lcms2::Pod>(
        samples: &mut [T],
        src: &Profile,
        dst: &Profile,
        format: PixelFormat,
    ) -> Result<(), ColorError> {
        let transform =
            Transform::<[T; 3], [T; 3]>::new(src, format, dst, format, Intent::Perceptual)
                .map_err(|e| ColorError::Transform {
                    message: e.to_string(),
                })?;
        let mut pixels: Vec<[T; 3]> = samples
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        transform.transform_in_place(&mut pixels);
        for (out, pixel) in samples.chunks_exact_mut(3).zip(&pixels) {
            out.copy_from_slice(pixel);
        }
        Ok(())
    }

    let src = profile(src)?;
    let dst = profile(dst)?;
    match samples {
        FrameSamples::U8(v) => apply(v, &src, &dst, PixelFormat::RGB_8)?,
        FrameSamples::U16(v) => apply(v, &src, &dst, PixelFormat::RGB_16)?,
        FrameSamples::F32(_) | FrameSamples::F64(_) => return Ok(false),
    }
    debug!("Converted frame samples to the target color space");
    Ok(true)
}

#[cfg(not(feature = "icc"))]
fn convert(
    _samples: &mut FrameSamples,
    _src: &ColorSpace,
    _dst: &ColorSpace,
) -> Result<bool, ColorError> {
    debug!("ICC support is disabled, frame samples left as is");
    Ok(false)
}
