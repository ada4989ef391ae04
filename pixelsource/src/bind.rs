//! Binding of raw pixel data to a storage strategy.
//!
//! See [`bind`] for the order in which strategies are tried.
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use memmap2::Mmap;
use snafu::{ensure, ResultExt, Snafu};
use tracing::{debug, warn};

use crate::descriptor::{BitOrder, ImageDescriptor};
use crate::layout::{ConfigurationError, DerivedLayout, InvalidValueSnafu, SampleKind};
use crate::resource::{ResourceError, ResourceRegistry};
use crate::source::{
    packed_bit, Endianness, FrameData, FrameLocation, FrameOffset, PixelDataSource, RawPixelData,
    SampleBuffer,
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum BindError {
    #[snafu(display("Pixel data does not match the image attributes"))]
    InvalidPixelData { source: ConfigurationError },

    #[snafu(display("Could not open pixel data file {}", path.display()))]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not read frame #{} from disk", frame))]
    ReadFile { frame: u32, source: ResourceError },
}

/// A failed attempt at memory mapping a file.
///
/// These never fail an open:
/// binding falls back to reading the file on demand.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum RecoverableResourceError {
    #[snafu(display("Could not map {} after {} attempts", path.display(), attempts))]
    MapExhausted {
        path: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    #[snafu(display("Could not open {} for mapping", path.display()))]
    OpenForMapping {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The means of memory mapping a file.
///
/// Implementors may hook [`reclaim`](Mapper::reclaim)
/// to free address space between attempts.
pub trait Mapper: fmt::Debug + Send + Sync {
    /// Map the whole of an open file into memory.
    fn map(&self, path: &Path, file: &File) -> std::io::Result<Mmap>;

    /// Called after a failed attempt, before the next one.
    fn reclaim(&self) {}
}

/// Maps files with the operating system's `mmap`.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemMapper;

impl Mapper for SystemMapper {
    fn map(&self, _path: &Path, file: &File) -> std::io::Result<Mmap> {
        // SAFETY: pixel data files are opened read-only
        // and are not expected to be truncated while an image is open
        unsafe { Mmap::map(file) }
    }
}

/// Which storage strategies binding may use.
#[derive(Debug, Clone)]
pub struct BindOptions {
    /// map files into memory
    pub allow_memory_mapping: bool,
    /// leave file data on disk until a frame is requested
    pub allow_deferred_read: bool,
    /// total attempts at mapping a file, 0 to never map
    pub map_attempts: u32,
    /// pause between mapping attempts
    pub map_retry_backoff: Duration,
    /// the mapping implementation
    pub mapper: Arc<dyn Mapper>,
}

impl Default for BindOptions {
    fn default() -> Self {
        BindOptions {
            allow_memory_mapping: true,
            allow_deferred_read: true,
            map_attempts: 4,
            map_retry_backoff: Duration::from_millis(10),
            mapper: Arc::new(SystemMapper),
        }
    }
}

/// Map a file, retrying up to the configured number of attempts.
pub fn map_with_retry(
    path: &Path,
    file: &File,
    options: &BindOptions,
) -> Result<Mmap, RecoverableResourceError> {
    let mut attempt = 1;
    loop {
        match options.mapper.map(path, file) {
            Ok(map) => return Ok(map),
            Err(e) if attempt >= options.map_attempts => {
                return Err(e).context(MapExhaustedSnafu {
                    path,
                    attempts: attempt,
                });
            }
            Err(e) => {
                warn!(
                    "Mapping attempt {} of {} for {} failed: {}",
                    attempt,
                    options.map_attempts,
                    path.display(),
                    e
                );
                options.mapper.reclaim();
                if !options.map_retry_backoff.is_zero() {
                    std::thread::sleep(options.map_retry_backoff);
                }
                attempt += 1;
            }
        }
    }
}

/// Bind raw pixel data to a storage strategy.
///
/// In-memory data is bound as is.
/// For the rest, the first applicable strategy wins:
///
/// 1. compressed frames are kept encoded;
/// 2. files are memory mapped, if allowed and every file maps;
/// 3. files are kept open and read on demand, if allowed;
/// 4. every frame is read into memory.
///
/// Opened files and mappings are registered in `resources`.
pub fn bind(
    descriptor: &ImageDescriptor,
    layout: &DerivedLayout,
    raw: RawPixelData,
    options: &BindOptions,
    resources: &mut ResourceRegistry,
) -> Result<PixelDataSource, BindError> {
    let frame_count = descriptor.frame_count as usize;
    match raw {
        RawPixelData::Compressed {
            frames,
            transfer_syntax,
        } => {
            ensure_frames(frames.len(), frame_count).context(InvalidPixelDataSnafu)?;
            debug!(
                "Keeping {} encoded frames in {}",
                frames.len(),
                transfer_syntax
            );
            Ok(PixelDataSource::Compressed {
                frames,
                transfer_syntax,
            })
        }
        RawPixelData::Contiguous(buffer) => {
            check_buffer(&buffer, layout, frame_count).context(InvalidPixelDataSnafu)?;
            Ok(PixelDataSource::Contiguous(buffer))
        }
        RawPixelData::PerFrame(buffers) => {
            ensure_frames(buffers.len(), frame_count).context(InvalidPixelDataSnafu)?;
            for buffer in &buffers {
                check_buffer(buffer, layout, 1).context(InvalidPixelDataSnafu)?;
            }
            Ok(PixelDataSource::PerFrame(buffers))
        }
        RawPixelData::File {
            path,
            offset,
            frame_stride,
            endianness,
        } => {
            let frames = (0..frame_count as u64)
                .map(|i| {
                    let offset = match frame_stride {
                        Some(stride) => FrameOffset::from(offset + i * stride),
                        None => FrameOffset::from_bits(offset * 8 + i * layout.bits_per_frame),
                    };
                    (path.clone(), offset)
                })
                .collect::<Vec<_>>();
            bind_files(descriptor, layout, frames, endianness, true, options, resources)
        }
        RawPixelData::FileFrames {
            path,
            frame_offsets,
            endianness,
        } => {
            ensure_frames(frame_offsets.len(), frame_count).context(InvalidPixelDataSnafu)?;
            let frames = frame_offsets
                .into_iter()
                .map(|offset| (path.clone(), FrameOffset::from(offset)))
                .collect::<Vec<_>>();
            bind_files(descriptor, layout, frames, endianness, true, options, resources)
        }
        RawPixelData::MultiFile { frames, endianness } => {
            ensure_frames(frames.len(), frame_count).context(InvalidPixelDataSnafu)?;
            let frames = frames
                .into_iter()
                .map(|(path, offset)| (path, FrameOffset::from(offset)))
                .collect::<Vec<_>>();
            bind_files(descriptor, layout, frames, endianness, false, options, resources)
        }
    }
}

/// Bind frames stored at the given file positions.
fn bind_files(
    descriptor: &ImageDescriptor,
    layout: &DerivedLayout,
    frames: Vec<(PathBuf, FrameOffset)>,
    endianness: Option<Endianness>,
    single_file: bool,
    options: &BindOptions,
    resources: &mut ResourceRegistry,
) -> Result<PixelDataSource, BindError> {
    let endianness = endianness.unwrap_or_else(|| descriptor.endianness());
    let mut paths: Vec<&Path> = Vec::new();
    for (path, _) in &frames {
        if !paths.contains(&path.as_path()) {
            paths.push(path);
        }
    }

    if options.allow_memory_mapping && options.map_attempts > 0 {
        match map_all(&paths, options) {
            Ok(maps) => {
                let ids: Vec<_> = paths
                    .iter()
                    .zip(maps)
                    .map(|(path, map)| resources.register_mapping(*path, map))
                    .collect();
                debug!("Bound pixel data to {} memory mapped file(s)", ids.len());
                let frames = locate(&frames, &paths, &ids);
                return Ok(PixelDataSource::MemoryMapped { frames, endianness });
            }
            Err(e) => {
                warn!("{}, reading from disk instead", snafu::Report::from_error(e));
            }
        }
    }

    let mut ids = Vec::with_capacity(paths.len());
    if options.allow_deferred_read {
        for path in &paths {
            let file = File::open(path).context(OpenFileSnafu { path: *path })?;
            ids.push(resources.register_file(*path, file));
        }
        debug!("Bound pixel data to {} open file(s)", ids.len());
        return if single_file {
            Ok(PixelDataSource::FileBacked {
                file: ids[0],
                frame_offsets: frames.iter().map(|(_, offset)| *offset).collect(),
                endianness,
            })
        } else {
            Ok(PixelDataSource::MultiFileBacked {
                frames: locate(&frames, &paths, &ids),
                endianness,
            })
        };
    }

    // files are only open for the duration of the copy
    let mut scratch = ResourceRegistry::new();
    for path in &paths {
        let file = File::open(path).context(OpenFileSnafu { path: *path })?;
        ids.push(scratch.register_file(*path, file));
    }
    let kind = layout.sample_kind.unwrap_or(SampleKind::U8);
    let mut buffers = Vec::with_capacity(frames.len());
    for (i, location) in locate(&frames, &paths, &ids).into_iter().enumerate() {
        let FrameLocation { resource, offset } = location;
        let bytes = scratch
            .read_at(resource, offset.byte, layout.frame_byte_len(offset.bit))
            .context(ReadFileSnafu { frame: i as u32 })?;
        let data = if offset.bit != 0 {
            let bits = realign_bits(
                &bytes,
                offset.bit,
                layout.bits_per_frame as usize,
                descriptor.bit_order,
            );
            FrameData::from_bytes(bits.into(), kind, 0, endianness)
        } else {
            FrameData::from_bytes(bytes, kind, 0, endianness)
        };
        buffers.push(data.into_buffer());
    }
    debug!("Read {} frames into memory", buffers.len());
    Ok(PixelDataSource::PerFrame(buffers))
}

fn map_all(paths: &[&Path], options: &BindOptions) -> Result<Vec<Mmap>, RecoverableResourceError> {
    paths
        .iter()
        .map(|path| {
            let file = File::open(path).context(OpenForMappingSnafu { path: *path })?;
            map_with_retry(path, &file, options)
        })
        .collect()
}

fn locate(
    frames: &[(PathBuf, FrameOffset)],
    paths: &[&Path],
    ids: &[crate::resource::ResourceId],
) -> Vec<FrameLocation> {
    frames
        .iter()
        .map(|(path, offset)| {
            let index = paths
                .iter()
                .position(|p| *p == path.as_path())
                .unwrap_or_default();
            FrameLocation {
                resource: ids[index],
                offset: *offset,
            }
        })
        .collect()
}

/// Repack `bit_len` single-bit samples so that the first one
/// sits at bit 0 of the first byte.
fn realign_bits(data: &[u8], bit_offset: u8, bit_len: usize, order: BitOrder) -> Vec<u8> {
    let mut out = vec![0_u8; (bit_len + 7) / 8];
    for k in 0..bit_len {
        if packed_bit(data, usize::from(bit_offset) + k, order) != 0 {
            let shift = match order {
                BitOrder::LsbFirst => k % 8,
                BitOrder::MsbFirst => 7 - k % 8,
            };
            out[k / 8] |= 1 << shift;
        }
    }
    out
}

fn ensure_frames(available: usize, frame_count: usize) -> Result<(), ConfigurationError> {
    ensure!(
        available >= frame_count,
        InvalidValueSnafu {
            name: "NumberOfFrames",
            value: frame_count.to_string(),
            reason: "pixel data holds fewer frames than declared",
        }
    );
    Ok(())
}

/// Check that an in-memory buffer holds `frames` whole frames
/// of a type compatible with the layout.
fn check_buffer(
    buffer: &SampleBuffer,
    layout: &DerivedLayout,
    frames: usize,
) -> Result<(), ConfigurationError> {
    let Some(kind) = layout.sample_kind else {
        return Ok(());
    };
    let required = match (buffer.kind(), kind) {
        (SampleKind::U8, SampleKind::Bit) => (frames as u64 * layout.bits_per_frame + 7) / 8,
        (buffer_kind, kind) if buffer_kind == kind => (frames * layout.samples_per_frame) as u64,
        // raw little endian bytes
        (SampleKind::U8, _) => (frames * layout.bytes_per_frame()) as u64,
        (buffer_kind, _) => {
            return InvalidValueSnafu {
                name: "BitsAllocated",
                value: layout.bits_allocated.to_string(),
                reason: match buffer_kind {
                    SampleKind::U16 => "pixel data holds 16-bit samples",
                    SampleKind::F32 => "pixel data holds 32-bit floating point samples",
                    SampleKind::F64 => "pixel data holds 64-bit floating point samples",
                    SampleKind::U8 | SampleKind::Bit => "pixel data holds 8-bit samples",
                },
            }
            .fail();
        }
    };
    ensure!(
        buffer.len() as u64 >= required,
        InvalidValueSnafu {
            name: "PixelData",
            value: format!("{} elements", buffer.len()),
            reason: "pixel data is too short for the declared frames",
        }
    );
    Ok(())
}
