//! Materialization of single frames.
//!
//! [`decode_frame`] fetches the raw samples of one frame
//! from whichever source the image was bound to
//! and turns them into a [`DecodedFrame`],
//! taking the frame statistics along the way.
use std::borrow::Cow;

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::codec::{CodecError, CodecParams, FrameCodec};
use crate::color::ColorSpace;
use crate::descriptor::{ImageDescriptor, PhotometricInterpretation, PlanarConfiguration};
use crate::frame::{ColorModel, DecodedFrame, FrameSamples};
use crate::layout::{DerivedLayout, SampleKind};
use crate::resource::{ResourceError, ResourceRegistry};
use crate::source::{packed_bit, Endianness, FrameData, FrameOffset, PixelDataSource, SampleBuffer};
use crate::stats::{FloatAccumulator, FrameStatistics, IntAccumulator, PaddingFilter};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DecodeError {
    #[snafu(display(
        "Unsupported pixel encoding: {} with {} samples per pixel and {} bits allocated",
        photometric,
        samples_per_pixel,
        bits_allocated
    ))]
    UnsupportedEncoding {
        photometric: PhotometricInterpretation,
        samples_per_pixel: u16,
        bits_allocated: u16,
    },

    #[snafu(display("Frame #{} is out of range, image has {} frames", frame, frame_count))]
    FrameOutOfRange { frame: u32, frame_count: u32 },

    #[snafu(display("Could not read frame #{}", frame))]
    ReadFrame { frame: u32, source: ResourceError },

    #[snafu(display("Could not decode frame #{} in transfer syntax {}", frame, transfer_syntax))]
    Codec {
        frame: u32,
        transfer_syntax: String,
        source: CodecError,
    },

    #[snafu(display("No frame codec available for transfer syntax {}", transfer_syntax))]
    MissingCodec { transfer_syntax: String },

    #[snafu(display("Frame #{} has {} samples, expected {}", frame, actual, expected))]
    TruncatedFrame {
        frame: u32,
        expected: usize,
        actual: usize,
    },
}

/// Everything a frame is decoded from.
#[derive(Copy, Clone)]
pub struct DecodeContext<'a> {
    pub descriptor: &'a ImageDescriptor,
    pub layout: &'a DerivedLayout,
    pub source: &'a PixelDataSource,
    pub resources: &'a ResourceRegistry,
    pub codec: Option<&'a (dyn FrameCodec + Send + Sync)>,
}

impl std::fmt::Debug for DecodeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeContext")
            .field("descriptor", self.descriptor)
            .field("layout", self.layout)
            .field("source", &self.source.kind())
            .field("codec", &self.codec.is_some())
            .finish()
    }
}

impl DecodeContext<'_> {
    fn unsupported(&self) -> UnsupportedEncodingSnafu<PhotometricInterpretation, u16, u16> {
        UnsupportedEncodingSnafu {
            photometric: self.descriptor.photometric_interpretation.clone(),
            samples_per_pixel: self.descriptor.samples_per_pixel,
            bits_allocated: self.descriptor.bits_allocated,
        }
    }

    fn frame(
        &self,
        index: u32,
        samples: FrameSamples,
        color_model: ColorModel,
        photometric_interpretation: PhotometricInterpretation,
        signed: bool,
        color_space: Option<ColorSpace>,
    ) -> DecodedFrame {
        let samples_per_pixel = match color_model {
            ColorModel::Rgb => 3,
            ColorModel::Monochrome | ColorModel::Palette => 1,
        };
        DecodedFrame {
            index,
            width: self.descriptor.width,
            height: self.descriptor.height,
            samples_per_pixel,
            samples,
            color_model,
            photometric_interpretation,
            signed,
            bits_stored: self.descriptor.bits_stored,
            color_space,
        }
    }

    fn declared_color_space(&self) -> Option<ColorSpace> {
        self.descriptor.icc_profile.clone().map(ColorSpace::Icc)
    }
}

/// Decode one frame and take its statistics.
///
/// Statistics are `None` when every sample is padding.
pub fn decode_frame(
    ctx: &DecodeContext<'_>,
    frame: u32,
) -> Result<(DecodedFrame, Option<FrameStatistics>), DecodeError> {
    let d = ctx.descriptor;
    ensure!(
        frame < d.frame_count,
        FrameOutOfRangeSnafu {
            frame,
            frame_count: d.frame_count,
        }
    );

    if let PixelDataSource::Compressed {
        frames,
        transfer_syntax,
    } = ctx.source
    {
        let blob = frames.get(frame as usize).context(FrameOutOfRangeSnafu {
            frame,
            frame_count: frames.len() as u32,
        })?;
        return decode_compressed(ctx, frame, blob, transfer_syntax);
    }

    use PhotometricInterpretation as PI;
    match (&d.photometric_interpretation, d.samples_per_pixel, ctx.layout.sample_kind) {
        (
            PI::Monochrome1 | PI::Monochrome2 | PI::PaletteColor,
            1,
            Some(SampleKind::U8 | SampleKind::U16),
        ) => decode_gray(ctx, frame),
        (PI::Monochrome1 | PI::Monochrome2, 1, Some(SampleKind::Bit)) => decode_bits(ctx, frame),
        (PI::Monochrome1 | PI::Monochrome2, 1, Some(SampleKind::F32 | SampleKind::F64)) => {
            decode_float(ctx, frame)
        }
        (PI::Rgb | PI::YbrFull | PI::YbrFull422, 3, Some(SampleKind::U8 | SampleKind::U16)) => {
            decode_color(ctx, frame)
        }
        _ => ctx.unsupported().fail(),
    }
}

/// The largest gray value allowed to raise the maximum.
fn largest_gray(descriptor: &ImageDescriptor) -> Option<i64> {
    descriptor.largest_gray.map(i64::from).or_else(|| {
        descriptor
            .palette
            .as_ref()
            .filter(|p| p.first_value_mapped > 0)
            .map(|p| i64::from(p.first_value_mapped) - 1)
    })
}

fn gray_model(pi: &PhotometricInterpretation) -> ColorModel {
    if *pi == PhotometricInterpretation::PaletteColor {
        ColorModel::Palette
    } else {
        ColorModel::Monochrome
    }
}

/// Fetch the raw samples of a frame from a native source.
fn fetch<'a>(ctx: &DecodeContext<'a>, frame: u32) -> Result<FrameData<'a>, DecodeError> {
    let layout = ctx.layout;
    let kind = layout.sample_kind.with_context(|| ctx.unsupported())?;
    let endianness = ctx.descriptor.endianness();
    let data = match ctx.source {
        PixelDataSource::Contiguous(buffer) => {
            slice_buffer(buffer, kind, layout, endianness, frame as usize)
        }
        PixelDataSource::PerFrame(buffers) => {
            let buffer = buffers.get(frame as usize).context(FrameOutOfRangeSnafu {
                frame,
                frame_count: buffers.len() as u32,
            })?;
            slice_buffer(buffer, kind, layout, endianness, 0)
        }
        PixelDataSource::FileBacked { .. }
        | PixelDataSource::MultiFileBacked { .. }
        | PixelDataSource::MemoryMapped { .. } => {
            let location = ctx
                .source
                .frame_location(frame)
                .context(FrameOutOfRangeSnafu {
                    frame,
                    frame_count: ctx.descriptor.frame_count,
                })?;
            let bytes = ctx
                .resources
                .read_at(
                    location.resource,
                    location.offset.byte,
                    layout.frame_byte_len(location.offset.bit),
                )
                .context(ReadFrameSnafu { frame })?;
            Some(FrameData::from_bytes(
                bytes,
                kind,
                location.offset.bit,
                ctx.source.endianness(),
            ))
        }
        PixelDataSource::Compressed { .. } => None,
    };
    let data = data.with_context(|| ctx.unsupported())?;
    ensure!(
        data.len() >= layout.samples_per_frame,
        TruncatedFrameSnafu {
            frame,
            expected: layout.samples_per_frame,
            actual: data.len(),
        }
    );
    Ok(data)
}

/// Borrow frame `index` of an in-memory buffer.
/// Returns `None` if the buffer type cannot hold samples of this kind.
fn slice_buffer<'a>(
    buffer: &'a SampleBuffer,
    kind: SampleKind,
    layout: &DerivedLayout,
    endianness: Endianness,
    index: usize,
) -> Option<FrameData<'a>> {
    fn clamp<T>(v: &[T], start: usize, len: usize) -> &[T] {
        let start = start.min(v.len());
        let end = start.saturating_add(len).min(v.len());
        &v[start..end]
    }

    let spf = layout.samples_per_frame;
    Some(match (buffer, kind) {
        (SampleBuffer::U8(v), SampleKind::Bit) => {
            let offset = FrameOffset::from_bits(index as u64 * layout.bits_per_frame);
            FrameData::Bits {
                data: Cow::Borrowed(clamp(
                    v,
                    offset.byte as usize,
                    layout.frame_byte_len(offset.bit),
                )),
                bit_offset: offset.bit,
            }
        }
        (SampleBuffer::U8(v), SampleKind::U8) => {
            FrameData::U8(Cow::Borrowed(clamp(v, index * spf, spf)))
        }
        (SampleBuffer::U16(v), SampleKind::U16) => {
            FrameData::U16(Cow::Borrowed(clamp(v, index * spf, spf)))
        }
        (SampleBuffer::F32(v), SampleKind::F32) => {
            FrameData::F32(Cow::Borrowed(clamp(v, index * spf, spf)))
        }
        (SampleBuffer::F64(v), SampleKind::F64) => {
            FrameData::F64(Cow::Borrowed(clamp(v, index * spf, spf)))
        }
        // wider samples as raw bytes
        (SampleBuffer::U8(v), kind) => {
            let len = layout.bytes_per_frame();
            FrameData::from_bytes(Cow::Borrowed(clamp(v, index * len, len)), kind, 0, endianness)
        }
        _ => return None,
    })
}

fn decode_gray(
    ctx: &DecodeContext<'_>,
    frame: u32,
) -> Result<(DecodedFrame, Option<FrameStatistics>), DecodeError> {
    let d = ctx.descriptor;
    let layout = ctx.layout;
    let spf = layout.samples_per_frame;
    let padding = PaddingFilter::new(d.padding.as_ref(), layout);
    let mut acc = IntAccumulator::new(padding, largest_gray(d));

    let samples = match fetch(ctx, frame)? {
        FrameData::U8(v) => FrameSamples::U8(
            v[..spf]
                .iter()
                .map(|&x| {
                    let value = layout.normalize(u32::from(x));
                    acc.update(i64::from(value as i32));
                    value as u8
                })
                .collect(),
        ),
        FrameData::U16(v) => FrameSamples::U16(
            v[..spf]
                .iter()
                .map(|&x| {
                    let value = layout.normalize(u32::from(x));
                    acc.update(i64::from(value as i32));
                    value as u16
                })
                .collect(),
        ),
        _ => return ctx.unsupported().fail(),
    };

    let decoded = ctx.frame(
        frame,
        samples,
        gray_model(&d.photometric_interpretation),
        d.photometric_interpretation.clone(),
        layout.signed,
        None,
    );
    Ok((decoded, acc.finish(frame)))
}

fn decode_bits(
    ctx: &DecodeContext<'_>,
    frame: u32,
) -> Result<(DecodedFrame, Option<FrameStatistics>), DecodeError> {
    let d = ctx.descriptor;
    let FrameData::Bits { data, bit_offset } = fetch(ctx, frame)? else {
        return ctx.unsupported().fail();
    };
    let first = usize::from(bit_offset);
    let samples = (0..ctx.layout.samples_per_frame)
        .map(|k| packed_bit(&data, first + k, d.bit_order))
        .collect();

    let decoded = ctx.frame(
        frame,
        FrameSamples::U8(samples),
        ColorModel::Monochrome,
        d.photometric_interpretation.clone(),
        false,
        None,
    );
    let stats = FrameStatistics {
        frame,
        min: 0.,
        max: 1.,
    };
    Ok((decoded, Some(stats)))
}

fn decode_float(
    ctx: &DecodeContext<'_>,
    frame: u32,
) -> Result<(DecodedFrame, Option<FrameStatistics>), DecodeError> {
    let d = ctx.descriptor;
    let spf = ctx.layout.samples_per_frame;
    let mut acc = FloatAccumulator::default();
    let samples = match fetch(ctx, frame)? {
        FrameData::F32(v) => {
            let samples = v[..spf].to_vec();
            samples.iter().for_each(|&x| acc.update(f64::from(x)));
            FrameSamples::F32(samples)
        }
        FrameData::F64(v) => {
            let samples = v[..spf].to_vec();
            samples.iter().for_each(|&x| acc.update(x));
            FrameSamples::F64(samples)
        }
        _ => return ctx.unsupported().fail(),
    };

    let decoded = ctx.frame(
        frame,
        samples,
        ColorModel::Monochrome,
        d.photometric_interpretation.clone(),
        false,
        None,
    );
    Ok((decoded, acc.finish(frame)))
}

fn decode_color(
    ctx: &DecodeContext<'_>,
    frame: u32,
) -> Result<(DecodedFrame, Option<FrameStatistics>), DecodeError> {
    let d = ctx.descriptor;
    let layout = ctx.layout;
    let spf = layout.samples_per_frame;
    let pixels = d.pixel_count();
    let mask = layout.mask;
    let reorder = Reorder {
        pixels,
        planar: d.planar_configuration,
        chroma_subsampled: layout.chroma_subsampled,
    };

    let samples = match fetch(ctx, frame)? {
        FrameData::U8(v) => FrameSamples::U8(reorder.interleave(&v[..spf], |x| x & mask as u8)),
        FrameData::U16(v) => FrameSamples::U16(reorder.interleave(&v[..spf], |x| x & mask as u16)),
        _ => return ctx.unsupported().fail(),
    };

    // upsampled chroma is no longer subsampled
    let photometric_interpretation = match &d.photometric_interpretation {
        PhotometricInterpretation::YbrFull422 => PhotometricInterpretation::YbrFull,
        pi => pi.clone(),
    };
    let decoded = ctx.frame(
        frame,
        samples,
        ColorModel::Rgb,
        photometric_interpretation,
        false,
        ctx.declared_color_space(),
    );
    let stats = FrameStatistics {
        frame,
        min: 0.,
        max: f64::from(mask),
    };
    Ok((decoded, Some(stats)))
}

/// Reconstruction of pixel interleaved three channel samples.
#[derive(Debug, Copy, Clone)]
struct Reorder {
    pixels: usize,
    planar: PlanarConfiguration,
    chroma_subsampled: bool,
}

impl Reorder {
    /// The position in the stored frame of output sample `i`.
    #[inline]
    fn source_index(&self, i: usize) -> usize {
        let (pixel, channel) = (i / 3, i % 3);
        if self.chroma_subsampled {
            // Y1 Y2 Cb Cr shared by each pair of pixels
            let group = pixel / 2 * 4;
            match channel {
                0 => group + pixel % 2,
                c => group + 1 + c,
            }
        } else if self.planar == PlanarConfiguration::ByPlane {
            channel * self.pixels + pixel
        } else {
            i
        }
    }

    fn interleave<T, F>(&self, src: &[T], f: F) -> Vec<T>
    where
        T: Copy + Send + Sync,
        F: Fn(T) -> T + Send + Sync,
    {
        let len = self.pixels * 3;

        #[cfg(feature = "rayon")]
        let iter = (0..len).into_par_iter();
        #[cfg(not(feature = "rayon"))]
        let iter = (0..len).into_iter();

        iter.map(|i| f(src[self.source_index(i)])).collect()
    }
}

fn decode_compressed(
    ctx: &DecodeContext<'_>,
    frame: u32,
    blob: &[u8],
    transfer_syntax: &str,
) -> Result<(DecodedFrame, Option<FrameStatistics>), DecodeError> {
    let d = ctx.descriptor;
    let codec = ctx
        .codec
        .context(MissingCodecSnafu { transfer_syntax })?;
    let params = CodecParams {
        transfer_syntax,
        bytes_per_sample: ctx.layout.bytes_per_sample.max(1),
        width: d.width,
        height: d.height,
        samples_per_pixel: d.samples_per_pixel,
        photometric_interpretation: &d.photometric_interpretation,
        signed: d.is_signed(),
    };
    let mut samples = codec
        .decode(blob, &params)
        .context(CodecSnafu {
            frame,
            transfer_syntax,
        })?;

    let expected = params.sample_count();
    ensure!(
        samples.len() >= expected,
        TruncatedFrameSnafu {
            frame,
            expected,
            actual: samples.len(),
        }
    );
    match &mut samples {
        FrameSamples::U8(v) => v.truncate(expected),
        FrameSamples::U16(v) => v.truncate(expected),
        FrameSamples::F32(v) => v.truncate(expected),
        FrameSamples::F64(v) => v.truncate(expected),
    }

    let signed = d.is_signed();
    match d.samples_per_pixel {
        1 => {
            let stats = match &samples {
                FrameSamples::F32(v) => float_stats(frame, v.iter().map(|&x| f64::from(x))),
                FrameSamples::F64(v) => float_stats(frame, v.iter().copied()),
                FrameSamples::U8(v) => {
                    let padding = PaddingFilter::new(d.padding.as_ref(), ctx.layout);
                    let mut acc = IntAccumulator::new(padding, largest_gray(d));
                    for &x in v {
                        acc.update(if signed { i64::from(x as i8) } else { i64::from(x) });
                    }
                    acc.finish(frame)
                }
                FrameSamples::U16(v) => {
                    let padding = PaddingFilter::new(d.padding.as_ref(), ctx.layout);
                    let mut acc = IntAccumulator::new(padding, largest_gray(d));
                    for &x in v {
                        acc.update(if signed { i64::from(x as i16) } else { i64::from(x) });
                    }
                    acc.finish(frame)
                }
            };
            let photometric_interpretation = match &d.photometric_interpretation {
                pi @ (PhotometricInterpretation::Monochrome1
                | PhotometricInterpretation::PaletteColor) => pi.clone(),
                _ => PhotometricInterpretation::Monochrome2,
            };
            let decoded = ctx.frame(
                frame,
                samples,
                gray_model(&photometric_interpretation),
                photometric_interpretation,
                signed,
                None,
            );
            Ok((decoded, stats))
        }
        3 => {
            let stats = match &samples {
                FrameSamples::U8(v) => int_stats(frame, v.iter().map(|&x| i64::from(x))),
                FrameSamples::U16(v) => int_stats(frame, v.iter().map(|&x| i64::from(x))),
                FrameSamples::F32(v) => float_stats(frame, v.iter().map(|&x| f64::from(x))),
                FrameSamples::F64(v) => float_stats(frame, v.iter().copied()),
            };
            let decoded = ctx.frame(
                frame,
                samples,
                ColorModel::Rgb,
                PhotometricInterpretation::Rgb,
                false,
                ctx.declared_color_space(),
            );
            Ok((decoded, stats))
        }
        _ => ctx.unsupported().fail(),
    }
}

fn int_stats(frame: u32, values: impl Iterator<Item = i64>) -> Option<FrameStatistics> {
    let mut acc = IntAccumulator::new(None, None);
    values.for_each(|v| acc.update(v));
    acc.finish(frame)
}

fn float_stats(frame: u32, values: impl Iterator<Item = f64>) -> Option<FrameStatistics> {
    let mut acc = FloatAccumulator::default();
    values.for_each(|v| acc.update(v));
    acc.finish(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{bind, BindOptions};
    use crate::codec::UncompressedCodec;
    use crate::descriptor::{BitOrder, Padding, PaletteLut};
    use crate::layout::resolve;
    use crate::source::RawPixelData;
    use dicom_dictionary_std::uids;

    /// Bind in-memory data and decode one frame.
    fn decode(
        descriptor: &ImageDescriptor,
        raw: RawPixelData,
        frame: u32,
    ) -> Result<(DecodedFrame, Option<FrameStatistics>), DecodeError> {
        let layout = resolve(descriptor).unwrap();
        let mut resources = ResourceRegistry::new();
        let source = bind(
            descriptor,
            &layout,
            raw,
            &BindOptions::default(),
            &mut resources,
        )
        .unwrap();
        let codec = UncompressedCodec;
        let ctx = DecodeContext {
            descriptor,
            layout: &layout,
            source: &source,
            resources: &resources,
            codec: Some(&codec),
        };
        decode_frame(&ctx, frame)
    }

    fn minmax(stats: Option<FrameStatistics>) -> Option<(f64, f64)> {
        stats.map(|s| (s.min, s.max))
    }

    #[test]
    fn unsigned_12_bit_frame() {
        let d = ImageDescriptor::new(4, 2, 16, 12, 1, PhotometricInterpretation::Monochrome2);
        let samples: Vec<u16> = vec![0, 1, 2, 3, 4095, 4095, 4095, 0x1FFF];
        let (frame, stats) = decode(&d, RawPixelData::Contiguous(samples.into()), 0).unwrap();
        assert_eq!(frame.samples().len(), 8);
        assert_eq!(
            frame.samples().as_u16().unwrap(),
            &[0, 1, 2, 3, 4095, 4095, 4095, 4095]
        );
        assert_eq!(minmax(stats), Some((0., 4095.)));
        assert_eq!(frame.color_model(), ColorModel::Monochrome);
    }

    #[test]
    fn signed_12_bit_frame() {
        let d = ImageDescriptor::new(2, 1, 16, 12, 1, PhotometricInterpretation::Monochrome2)
            .with_signed(true);
        let raw = RawPixelData::Contiguous(vec![0x1FFF_u16, 0x07FF].into());
        let (frame, stats) = decode(&d, raw, 0).unwrap();
        assert_eq!(frame.samples().as_u16().unwrap(), &[0xFFFF, 0x07FF]);
        assert_eq!(frame.signed_sample(0), Some(-1.));
        assert_eq!(minmax(stats), Some((-1., 2047.)));
    }

    #[test]
    fn padding_is_left_out_of_statistics() {
        let d = ImageDescriptor::new(2, 2, 16, 16, 1, PhotometricInterpretation::Monochrome2)
            .with_signed(true)
            .with_padding(Padding::new(-2000));
        let pad = -2000_i16 as u16;
        let raw = RawPixelData::Contiguous(vec![pad, 300, pad, pad].into());
        let (frame, stats) = decode(&d, raw, 0).unwrap();
        assert_eq!(frame.samples().len(), 4);
        assert_eq!(minmax(stats), Some((300., 300.)));
    }

    #[test]
    fn palette_first_value_bounds_the_maximum() {
        let palette = PaletteLut::new(100, 8, vec![0; 4], vec![0; 4], vec![0; 4]);
        let d = ImageDescriptor::new(4, 1, 8, 8, 1, PhotometricInterpretation::PaletteColor)
            .with_palette(palette);
        let raw = RawPixelData::Contiguous(vec![3_u8, 99, 100, 200].into());
        let (frame, stats) = decode(&d, raw, 0).unwrap();
        assert_eq!(frame.color_model(), ColorModel::Palette);
        assert_eq!(minmax(stats), Some((3., 99.)));
    }

    #[test]
    fn single_bit_frames_across_byte_boundaries() {
        // 3x3 frames packed back to back, least significant bit first
        let d = ImageDescriptor::new(3, 3, 1, 1, 1, PhotometricInterpretation::Monochrome2)
            .with_frame_count(2);
        let bits: [u8; 18] = [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 1, 1, 1, 1, 1, 1, 1, 0];
        let mut packed = vec![0_u8; 3];
        for (i, b) in bits.iter().enumerate() {
            packed[i / 8] |= b << (i % 8);
        }

        let raw = RawPixelData::Contiguous(packed.into());
        let (first, stats) = decode(&d, raw.clone(), 0).unwrap();
        assert_eq!(first.samples().as_u8().unwrap(), &bits[..9]);
        assert_eq!(minmax(stats), Some((0., 1.)));
        let (second, _) = decode(&d, raw, 1).unwrap();
        assert_eq!(second.samples().as_u8().unwrap(), &bits[9..]);
    }

    #[test]
    fn single_bit_msb_first() {
        let d = ImageDescriptor::new(4, 2, 1, 1, 1, PhotometricInterpretation::Monochrome2)
            .with_bit_order(BitOrder::MsbFirst);
        let raw = RawPixelData::Contiguous(vec![0b1010_0001_u8].into());
        let (frame, _) = decode(&d, raw, 0).unwrap();
        assert_eq!(frame.samples().as_u8().unwrap(), &[1, 0, 1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn rgb_by_plane_is_interleaved() {
        let d = ImageDescriptor::new(2, 1, 8, 8, 3, PhotometricInterpretation::Rgb)
            .with_planar_configuration(PlanarConfiguration::ByPlane);
        let raw = RawPixelData::Contiguous(vec![1_u8, 2, 10, 20, 100, 200].into());
        let (frame, stats) = decode(&d, raw, 0).unwrap();
        assert_eq!(frame.samples().as_u8().unwrap(), &[1, 10, 100, 2, 20, 200]);
        assert_eq!(minmax(stats), Some((0., 255.)));
        assert_eq!(frame.samples_per_pixel(), 3);
    }

    #[test]
    fn ybr_422_chroma_is_shared_by_pixel_pairs() {
        let d = ImageDescriptor::new(4, 1, 8, 8, 3, PhotometricInterpretation::YbrFull422);
        // Y1 Y2 Cb Cr, Y3 Y4 Cb Cr
        let stored = vec![10_u8, 11, 128, 129, 20, 21, 60, 61];
        let (frame, _) = decode(&d, RawPixelData::Contiguous(stored.into()), 0).unwrap();
        assert_eq!(
            frame.samples().as_u8().unwrap(),
            &[10, 128, 129, 11, 128, 129, 20, 60, 61, 21, 60, 61]
        );
        assert_eq!(
            frame.photometric_interpretation(),
            &PhotometricInterpretation::YbrFull
        );
    }

    #[test]
    fn float_frames_ignore_nan() {
        let d = ImageDescriptor::new(2, 2, 32, 32, 1, PhotometricInterpretation::Monochrome2)
            .with_floating_point(true);
        let (frame, stats) = decode(
            &d,
            RawPixelData::Contiguous(vec![f32::NAN, -0.5, 2.5, 1.0].into()),
            0,
        )
        .unwrap();
        assert_eq!(frame.samples().len(), 4);
        assert_eq!(minmax(stats), Some((-0.5, 2.5)));
    }

    #[test]
    fn compressed_frames_go_through_the_codec() {
        let d = ImageDescriptor::new(2, 1, 16, 16, 1, PhotometricInterpretation::Monochrome2)
            .with_signed(true)
            .with_frame_count(2)
            .with_transfer_syntax(uids::ENCAPSULATED_UNCOMPRESSED_EXPLICIT_VR_LITTLE_ENDIAN);
        let raw = RawPixelData::compressed(
            vec![vec![0xFE_u8, 0xFF, 0x10, 0x00], vec![0x01]],
            uids::ENCAPSULATED_UNCOMPRESSED_EXPLICIT_VR_LITTLE_ENDIAN,
        );
        let (frame, stats) = decode(&d, raw.clone(), 0).unwrap();
        assert_eq!(frame.samples().as_u16().unwrap(), &[0xFFFE, 0x0010]);
        assert_eq!(minmax(stats), Some((-2., 16.)));

        let err = decode(&d, raw, 1).unwrap_err();
        assert!(matches!(err, DecodeError::Codec { frame: 1, .. }));
    }

    #[rstest::rstest]
    #[case(ImageDescriptor::new(2, 1, 8, 8, 2, PhotometricInterpretation::Rgb))]
    #[case(ImageDescriptor::new(2, 1, 8, 8, 1, PhotometricInterpretation::Other("YBR_ICT".into())))]
    #[case(ImageDescriptor::new(2, 1, 24, 24, 1, PhotometricInterpretation::Monochrome2))]
    fn unsupported_encodings(#[case] d: ImageDescriptor) {
        let raw = RawPixelData::Contiguous(vec![0_u8; 64].into());
        let err = decode(&d, raw, 0).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn frames_out_of_range() {
        let d = ImageDescriptor::new(2, 1, 8, 8, 1, PhotometricInterpretation::Monochrome2);
        let err = decode(&d, RawPixelData::Contiguous(vec![0_u8; 2].into()), 1).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::FrameOutOfRange {
                frame: 1,
                frame_count: 1
            }
        ));
    }
}
