//! Options for opening a [`SourceImage`].
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::bind::{BindOptions, Mapper};
use crate::codec::{DynFrameCodec, FrameCodec};
use crate::color::ColorSpace;
use crate::descriptor::ImageDescriptor;
use crate::source::RawPixelData;
use crate::{Result, SourceImage};

/// A builder type for opening an image with additional options.
///
/// # Example
///
/// Create an `OpenImageOptions`,
/// call adaptor methods in a chain,
/// and finish the operation with [`.open()`](OpenImageOptions::open).
///
/// ```no_run
/// # use dicom_pixelsource::{ImageDescriptor, OpenImageOptions};
/// # use dicom_pixelsource::{PhotometricInterpretation, RawPixelData};
/// let pi = PhotometricInterpretation::Monochrome2;
/// let descriptor = ImageDescriptor::new(512, 512, 16, 12, 1, pi);
/// let image = OpenImageOptions::new()
///     .memory_mapping(false)
///     .open(descriptor, RawPixelData::file("path/to/pixels.raw", 0))?;
/// # Result::<(), Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Default)]
#[non_exhaustive]
pub struct OpenImageOptions {
    pub(crate) bind: BindOptions,
    pub(crate) codec: Option<DynFrameCodec>,
    pub(crate) target_color_space: Option<ColorSpace>,
}

impl fmt::Debug for OpenImageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenImageOptions")
            .field("bind", &self.bind)
            .field("codec", &self.codec.as_ref().map(|_| ".."))
            .field("target_color_space", &self.target_color_space)
            .finish()
    }
}

impl OpenImageOptions {
    pub fn new() -> Self {
        OpenImageOptions::default()
    }

    /// Set whether files may be memory mapped.
    ///
    /// This is enabled by default.
    pub fn memory_mapping(mut self, allow: bool) -> Self {
        self.bind.allow_memory_mapping = allow;
        self
    }

    /// Set whether file data may stay on disk until a frame is requested.
    /// When disabled, and files are not mapped,
    /// every frame is read into memory on open.
    ///
    /// This is enabled by default.
    pub fn deferred_read(mut self, allow: bool) -> Self {
        self.bind.allow_deferred_read = allow;
        self
    }

    /// Set the total number of attempts at mapping each file.
    pub fn map_attempts(mut self, attempts: u32) -> Self {
        self.bind.map_attempts = attempts;
        self
    }

    /// Set the pause between mapping attempts.
    pub fn map_retry_backoff(mut self, backoff: Duration) -> Self {
        self.bind.map_retry_backoff = backoff;
        self
    }

    /// Replace the file mapping implementation.
    pub fn mapper<M>(mut self, mapper: M) -> Self
    where
        M: Mapper + 'static,
    {
        self.bind.mapper = Arc::new(mapper);
        self
    }

    /// Set the codec for compressed pixel data.
    pub fn codec<C>(mut self, codec: C) -> Self
    where
        C: FrameCodec + Send + Sync + 'static,
    {
        self.codec = Some(Box::new(codec));
        self
    }

    /// Convert RGB frames to this color space.
    pub fn target_color_space(mut self, space: ColorSpace) -> Self {
        self.target_color_space = Some(space);
        self
    }

    /// Open the image.
    pub fn open(self, descriptor: ImageDescriptor, raw: RawPixelData) -> Result<SourceImage> {
        SourceImage::open_with_options(descriptor, raw, self)
    }
}
