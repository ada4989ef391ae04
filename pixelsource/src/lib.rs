//! This crate provides lazy, frame-at-a-time access to DICOM pixel data.
//!
//! A [`SourceImage`] is opened from an [`ImageDescriptor`],
//! holding the attributes of the _Image Pixel_ module,
//! and a [`RawPixelData`] handle to where the samples are stored:
//! in memory, in one or more files, or as encoded frames.
//! Frames are then decoded one at a time on request
//! into a [`DecodedFrame`] of pixel interleaved samples,
//! masked to the bits stored and sign extended,
//! along with the minimum and maximum sample value of the frame.
//!
//! Files are memory mapped when possible,
//! or otherwise read on demand,
//! and are released when the image is closed or dropped.
//! Encoded frames are decoded through a [`FrameCodec`]
//! given in [`OpenImageOptions`].
//!
//! # Example
//!
//! ```
//! # use dicom_pixelsource::{ImageDescriptor, PhotometricInterpretation};
//! # use dicom_pixelsource::{RawPixelData, SourceImage};
//! let descriptor = ImageDescriptor::new(4, 2, 16, 12, 1, PhotometricInterpretation::Monochrome2);
//! let samples: Vec<u16> = vec![0, 100, 200, 300, 400, 500, 600, 4095];
//! let mut image = SourceImage::open(descriptor, RawPixelData::Contiguous(samples.into()))?;
//!
//! let frame = image.frame(0)?;
//! assert_eq!(frame.samples().len(), 8);
//! assert_eq!(image.minimum(), Some(0.));
//! assert_eq!(image.maximum(), Some(4095.));
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```
//!
//! # Features
//!
//! - `icc` (default): color space conversion of RGB frames with Little CMS
//! - `rayon` (default): parallel reconstruction of color frames
//! - `ndarray`: [`DecodedFrame::to_ndarray`]
//! - `image`: [`DecodedFrame::to_dynamic_image`]
//! - `cli`: the `dicom-framestats` command line tool
use std::sync::Arc;

use snafu::{ensure, ResultExt, Snafu};
use tracing::debug;

pub mod bind;
pub mod cache;
pub mod codec;
pub mod color;
pub mod decode;
pub mod descriptor;
pub mod frame;
pub mod layout;
pub mod options;
pub mod resource;
pub mod source;
pub mod stats;

pub use bind::{BindError, BindOptions, Mapper, SystemMapper};
pub use codec::{CodecError, CodecParams, DynFrameCodec, FrameCodec, UncompressedCodec};
pub use color::{ColorError, ColorSpace};
pub use decode::DecodeError;
pub use descriptor::{
    BitOrder, ImageDescriptor, Padding, PaletteLut, PhotometricInterpretation, PixelRepresentation,
    PlanarConfiguration,
};
pub use frame::{ColorModel, DecodedFrame, FrameSamples};
pub use layout::{ConfigurationError, DerivedLayout, SampleKind};
pub use options::OpenImageOptions;
pub use resource::{ResourceError, ResourceRegistry};
pub use source::{Endianness, PixelDataSource, RawPixelData, SampleBuffer, SourceKind};
pub use stats::{FrameStatistics, Statistics};

use crate::cache::FrameCache;
use crate::decode::DecodeContext;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Invalid image attributes"))]
    Configuration { source: ConfigurationError },

    #[snafu(display("Could not bind pixel data"))]
    Bind { source: BindError },

    #[snafu(display("Could not decode frame #{}", frame))]
    DecodeFrame { frame: u32, source: DecodeError },

    #[snafu(display("Could not convert the color space of frame #{}", frame))]
    ConvertColor { frame: u32, source: ColorError },

    #[snafu(display("Image is closed"))]
    Closed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An image whose frames are decoded on demand.
///
/// The most recently decoded frame is kept,
/// so asking for it again does not decode it again.
/// Statistics reflect the most recently decoded frame.
pub struct SourceImage {
    descriptor: ImageDescriptor,
    layout: DerivedLayout,
    source: PixelDataSource,
    resources: ResourceRegistry,
    codec: Option<DynFrameCodec>,
    target_color_space: Option<ColorSpace>,
    cache: FrameCache,
    statistics: Statistics,
    closed: bool,
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceImage")
            .field("descriptor", &self.descriptor)
            .field("layout", &self.layout)
            .field("source", &self.source.kind())
            .field("resources", &self.resources)
            .field("cached_frame", &self.cache.cached_index())
            .field("statistics", &self.statistics)
            .field("closed", &self.closed)
            .finish()
    }
}

impl SourceImage {
    /// Open an image with the default options.
    pub fn open(descriptor: ImageDescriptor, raw: RawPixelData) -> Result<Self> {
        OpenImageOptions::new().open(descriptor, raw)
    }

    pub(crate) fn open_with_options(
        descriptor: ImageDescriptor,
        raw: RawPixelData,
        options: OpenImageOptions,
    ) -> Result<Self> {
        let layout = layout::resolve(&descriptor).context(ConfigurationSnafu)?;
        let mut resources = ResourceRegistry::new();
        let source = bind::bind(&descriptor, &layout, raw, &options.bind, &mut resources)
            .context(BindSnafu)?;
        debug!(
            "Opened {}x{} image with {} frame(s) as {:?}",
            descriptor.width,
            descriptor.height,
            descriptor.frame_count,
            source.kind()
        );
        let statistics = Statistics::new(&layout);
        Ok(SourceImage {
            descriptor,
            layout,
            source,
            resources,
            codec: options.codec,
            target_color_space: options.target_color_space,
            cache: FrameCache::new(),
            statistics,
            closed: false,
        })
    }

    /// Obtain the frame at `index`, decoding it unless it is cached.
    ///
    /// A failure affects this request only:
    /// other frames can still be decoded afterwards.
    pub fn frame(&mut self, index: u32) -> Result<Arc<DecodedFrame>> {
        ensure!(!self.closed, ClosedSnafu);
        let SourceImage {
            descriptor,
            layout,
            source,
            resources,
            codec,
            target_color_space,
            cache,
            statistics,
            ..
        } = self;
        let ctx = DecodeContext {
            descriptor,
            layout,
            source,
            resources,
            codec: codec.as_deref(),
        };
        cache.get_or_try_insert_with(index, || {
            let (mut frame, stats) =
                decode::decode_frame(&ctx, index).context(DecodeFrameSnafu { frame: index })?;
            let src = frame.color_space.clone();
            color::post_process(&mut frame, src.as_ref(), target_color_space.as_ref())
                .context(ConvertColorSnafu { frame: index })?;
            statistics.update(stats);
            Ok(frame)
        })
    }

    /// Obtain the first frame.
    pub fn first_frame(&mut self) -> Result<Arc<DecodedFrame>> {
        self.frame(0)
    }

    /// The smallest sample value of the last decoded frame.
    pub fn minimum(&self) -> Option<f64> {
        self.statistics.minimum()
    }

    /// The largest sample value of the last decoded frame.
    pub fn maximum(&self) -> Option<f64> {
        self.statistics.maximum()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn is_grayscale(&self) -> bool {
        self.descriptor.photometric_interpretation.is_monochrome()
    }

    pub fn is_ybr(&self) -> bool {
        self.descriptor.photometric_interpretation.is_ybr()
    }

    pub fn is_padded(&self) -> bool {
        self.descriptor.padding.is_some()
    }

    pub fn pad_value(&self) -> Option<i32> {
        self.descriptor.padding.map(|p| p.value)
    }

    pub fn pad_range_limit(&self) -> Option<i32> {
        self.descriptor.padding.and_then(|p| p.range_limit)
    }

    /// The sample value to show where there is no image content:
    /// the padding value if declared,
    /// otherwise the value displayed as black.
    pub fn background_value(&self) -> f64 {
        if let Some(value) = self.pad_value() {
            return f64::from(value);
        }
        let (min, max) = self.layout.stored_range();
        if self.descriptor.photometric_interpretation == PhotometricInterpretation::Monochrome1 {
            max as f64
        } else {
            min as f64
        }
    }

    pub fn palette(&self) -> Option<&PaletteLut> {
        self.descriptor.palette.as_deref()
    }

    pub fn frame_count(&self) -> u32 {
        self.descriptor.frame_count
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    pub fn layout(&self) -> &DerivedLayout {
        &self.layout
    }

    /// The storage strategy the pixel data was bound to.
    pub fn source_kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the cached frame, every open file and mapping, and the codec.
    ///
    /// Frames can no longer be obtained afterwards.
    /// Closing more than once does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cache.clear();
        self.statistics.reset();
        self.resources.release();
        if let Some(mut codec) = self.codec.take() {
            codec.dispose();
        }
        debug!("Closed image");
    }
}

impl Drop for SourceImage {
    fn drop(&mut self) {
        self.close();
    }
}
