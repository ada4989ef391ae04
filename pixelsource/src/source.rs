//! Physical representations of pixel data.
//!
//! [`RawPixelData`] is what a caller hands over when opening an image,
//! [`PixelDataSource`] is what it is bound to
//! once a storage strategy has been chosen.
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use dicom_dictionary_std::uids;

use crate::descriptor::BitOrder;
use crate::layout::SampleKind;
use crate::resource::ResourceId;

/// Byte order of multi-byte samples in a pixel data stream.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// The byte order of native pixel data in the given transfer syntax.
    #[allow(deprecated)]
    pub fn of_transfer_syntax(uid: &str) -> Self {
        if uid.trim_end_matches(['\0', ' ']) == uids::EXPLICIT_VR_BIG_ENDIAN {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// An in-memory array of samples, shared without copying.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    U8(Arc<[u8]>),
    U16(Arc<[u16]>),
    F32(Arc<[f32]>),
    F64(Arc<[f64]>),
}

impl SampleBuffer {
    /// The number of elements in the buffer.
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::U8(v) => v.len(),
            SampleBuffer::U16(v) => v.len(),
            SampleBuffer::F32(v) => v.len(),
            SampleBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The representation of the buffer elements,
    /// single bits being carried in `U8` buffers.
    pub fn kind(&self) -> SampleKind {
        match self {
            SampleBuffer::U8(_) => SampleKind::U8,
            SampleBuffer::U16(_) => SampleKind::U16,
            SampleBuffer::F32(_) => SampleKind::F32,
            SampleBuffer::F64(_) => SampleKind::F64,
        }
    }
}

macro_rules! impl_sample_buffer_from {
    ($t:ty, $variant:ident) => {
        impl From<Vec<$t>> for SampleBuffer {
            fn from(v: Vec<$t>) -> Self {
                SampleBuffer::$variant(v.into())
            }
        }

        impl From<Arc<[$t]>> for SampleBuffer {
            fn from(v: Arc<[$t]>) -> Self {
                SampleBuffer::$variant(v)
            }
        }
    };
}

impl_sample_buffer_from!(u8, U8);
impl_sample_buffer_from!(u16, U16);
impl_sample_buffer_from!(f32, F32);
impl_sample_buffer_from!(f64, F64);

/// The pixel data of an image as handed over by the caller.
#[derive(Debug, Clone)]
pub enum RawPixelData {
    /// all frames back to back in one buffer
    Contiguous(SampleBuffer),
    /// one buffer per frame
    PerFrame(Vec<SampleBuffer>),
    /// all frames in a single file, starting at byte `offset`
    ///
    /// Without a `frame_stride`, frames are packed back to back,
    /// so single-bit frames may start in the middle of a byte.
    ///
    /// In all file variants, an `endianness` of `None`
    /// follows the transfer syntax of the image descriptor.
    File {
        path: PathBuf,
        offset: u64,
        frame_stride: Option<u64>,
        endianness: Option<Endianness>,
    },
    /// frames in a single file, at the given byte offsets
    FileFrames {
        path: PathBuf,
        frame_offsets: Vec<u64>,
        endianness: Option<Endianness>,
    },
    /// frames spread over several files, one `(path, offset)` per frame
    MultiFile {
        frames: Vec<(PathBuf, u64)>,
        endianness: Option<Endianness>,
    },
    /// one encoded blob per frame
    Compressed {
        frames: Vec<Arc<[u8]>>,
        transfer_syntax: String,
    },
}

impl RawPixelData {
    /// Pixel data of a single file, frames packed back to back from `offset`,
    /// in the byte order of the descriptor's transfer syntax.
    pub fn file(path: impl Into<PathBuf>, offset: u64) -> Self {
        RawPixelData::File {
            path: path.into(),
            offset,
            frame_stride: None,
            endianness: None,
        }
    }

    /// Compressed pixel data, one fragment sequence item per frame.
    pub fn compressed<I, B>(frames: I, transfer_syntax: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Arc<[u8]>>,
    {
        RawPixelData::Compressed {
            frames: frames.into_iter().map(Into::into).collect(),
            transfer_syntax: transfer_syntax.into(),
        }
    }

    /// Whether the pixel data lives on disk.
    pub fn is_on_disk(&self) -> bool {
        matches!(
            self,
            RawPixelData::File { .. }
                | RawPixelData::FileFrames { .. }
                | RawPixelData::MultiFile { .. }
        )
    }
}

/// Where a frame starts: a byte offset and,
/// for packed single-bit data, a bit within that byte.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct FrameOffset {
    pub byte: u64,
    pub bit: u8,
}

impl FrameOffset {
    /// The offset of a stream position expressed in bits.
    pub fn from_bits(bits: u64) -> Self {
        FrameOffset {
            byte: bits / 8,
            bit: (bits % 8) as u8,
        }
    }
}

impl From<u64> for FrameOffset {
    fn from(byte: u64) -> Self {
        FrameOffset { byte, bit: 0 }
    }
}

/// A frame position in one of the registered resources.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct FrameLocation {
    pub resource: ResourceId,
    pub offset: FrameOffset,
}

/// The strategy a pixel data source was bound to.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum SourceKind {
    Contiguous,
    PerFrame,
    FileBacked,
    MultiFileBacked,
    MemoryMapped,
    Compressed,
}

/// Pixel data bound to a storage strategy.
///
/// File and mapping variants refer to resources
/// owned by a [`ResourceRegistry`](crate::ResourceRegistry).
#[derive(Debug, Clone)]
pub enum PixelDataSource {
    /// all frames in one shared buffer
    Contiguous(SampleBuffer),
    /// one shared buffer per frame
    PerFrame(Vec<SampleBuffer>),
    /// frames read on demand from a single open file
    FileBacked {
        file: ResourceId,
        frame_offsets: Vec<FrameOffset>,
        endianness: Endianness,
    },
    /// frames read on demand from several open files
    MultiFileBacked {
        frames: Vec<FrameLocation>,
        endianness: Endianness,
    },
    /// frames borrowed from memory mapped files
    MemoryMapped {
        frames: Vec<FrameLocation>,
        endianness: Endianness,
    },
    /// encoded frames, decoded by a frame codec
    Compressed {
        frames: Vec<Arc<[u8]>>,
        transfer_syntax: String,
    },
}

impl PixelDataSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            PixelDataSource::Contiguous(_) => SourceKind::Contiguous,
            PixelDataSource::PerFrame(_) => SourceKind::PerFrame,
            PixelDataSource::FileBacked { .. } => SourceKind::FileBacked,
            PixelDataSource::MultiFileBacked { .. } => SourceKind::MultiFileBacked,
            PixelDataSource::MemoryMapped { .. } => SourceKind::MemoryMapped,
            PixelDataSource::Compressed { .. } => SourceKind::Compressed,
        }
    }

    /// The byte order of samples read from disk.
    pub fn endianness(&self) -> Endianness {
        match self {
            PixelDataSource::FileBacked { endianness, .. }
            | PixelDataSource::MultiFileBacked { endianness, .. }
            | PixelDataSource::MemoryMapped { endianness, .. } => *endianness,
            _ => Endianness::Little,
        }
    }

    /// The location of a frame stored in a registered resource.
    pub fn frame_location(&self, frame: u32) -> Option<FrameLocation> {
        match self {
            PixelDataSource::FileBacked {
                file,
                frame_offsets,
                ..
            } => frame_offsets
                .get(frame as usize)
                .map(|&offset| FrameLocation {
                    resource: *file,
                    offset,
                }),
            PixelDataSource::MultiFileBacked { frames, .. }
            | PixelDataSource::MemoryMapped { frames, .. } => frames.get(frame as usize).copied(),
            _ => None,
        }
    }
}

/// The raw samples of one frame, borrowed where possible.
#[derive(Debug)]
pub(crate) enum FrameData<'a> {
    U8(Cow<'a, [u8]>),
    U16(Cow<'a, [u16]>),
    F32(Cow<'a, [f32]>),
    F64(Cow<'a, [f64]>),
    /// packed single-bit samples, the first one `bit_offset` bits in
    Bits { data: Cow<'a, [u8]>, bit_offset: u8 },
}

impl<'a> FrameData<'a> {
    /// Interpret a byte stream as samples of the given kind.
    ///
    /// Byte samples and packed bits are borrowed as is,
    /// wider samples are converted to native byte order.
    pub(crate) fn from_bytes(
        bytes: Cow<'a, [u8]>,
        kind: SampleKind,
        bit_offset: u8,
        endianness: Endianness,
    ) -> Self {
        macro_rules! read_into {
            ($t:ty, $size:expr, $method:ident) => {{
                let mut out = vec![<$t>::default(); bytes.len() / $size];
                let src = &bytes[..out.len() * $size];
                match endianness {
                    Endianness::Little => LittleEndian::$method(src, &mut out),
                    Endianness::Big => BigEndian::$method(src, &mut out),
                }
                out
            }};
        }

        match kind {
            SampleKind::Bit => FrameData::Bits {
                data: bytes,
                bit_offset,
            },
            SampleKind::U8 => FrameData::U8(bytes),
            SampleKind::U16 => FrameData::U16(Cow::Owned(read_into!(u16, 2, read_u16_into))),
            SampleKind::F32 => FrameData::F32(Cow::Owned(read_into!(f32, 4, read_f32_into))),
            SampleKind::F64 => FrameData::F64(Cow::Owned(read_into!(f64, 8, read_f64_into))),
        }
    }

    /// The number of samples available.
    pub(crate) fn len(&self) -> usize {
        match self {
            FrameData::U8(v) => v.len(),
            FrameData::U16(v) => v.len(),
            FrameData::F32(v) => v.len(),
            FrameData::F64(v) => v.len(),
            FrameData::Bits { data, bit_offset } => {
                (data.len() * 8).saturating_sub(usize::from(*bit_offset))
            }
        }
    }

    /// Take ownership of the samples.
    pub(crate) fn into_buffer(self) -> SampleBuffer {
        match self {
            FrameData::U8(v) | FrameData::Bits { data: v, .. } => v.into_owned().into(),
            FrameData::U16(v) => v.into_owned().into(),
            FrameData::F32(v) => v.into_owned().into(),
            FrameData::F64(v) => v.into_owned().into(),
        }
    }
}

/// The single-bit sample at a bit position of a packed stream.
/// Positions past the end read as 0.
#[inline]
pub(crate) fn packed_bit(data: &[u8], position: usize, order: BitOrder) -> u8 {
    let byte = data.get(position / 8).copied().unwrap_or(0);
    let shift = match order {
        BitOrder::LsbFirst => position % 8,
        BitOrder::MsbFirst => 7 - position % 8,
    };
    (byte >> shift) & 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(deprecated)]
    fn endianness_from_transfer_syntax() {
        assert_eq!(
            Endianness::of_transfer_syntax(uids::EXPLICIT_VR_BIG_ENDIAN),
            Endianness::Big
        );
        assert_eq!(
            Endianness::of_transfer_syntax(uids::IMPLICIT_VR_LITTLE_ENDIAN),
            Endianness::Little
        );
        assert_eq!(
            Endianness::of_transfer_syntax("1.2.840.10008.1.2.2\0"),
            Endianness::Big
        );
    }

    #[test]
    fn bytes_as_16_bit_samples() {
        let bytes: &[u8] = &[0x01, 0x02, 0x03, 0x04];
        let FrameData::U16(le) =
            FrameData::from_bytes(Cow::Borrowed(bytes), SampleKind::U16, 0, Endianness::Little)
        else {
            panic!("expected 16-bit samples");
        };
        assert_eq!(&*le, &[0x0201, 0x0403]);

        let FrameData::U16(be) =
            FrameData::from_bytes(Cow::Borrowed(bytes), SampleKind::U16, 0, Endianness::Big)
        else {
            panic!("expected 16-bit samples");
        };
        assert_eq!(&*be, &[0x0102, 0x0304]);
    }

    #[test]
    fn byte_samples_are_borrowed() {
        let bytes: &[u8] = &[1, 2, 3];
        let data = FrameData::from_bytes(Cow::Borrowed(bytes), SampleKind::U8, 0, Endianness::Big);
        assert!(matches!(data, FrameData::U8(Cow::Borrowed(_))));
        assert_eq!(data.len(), 3);

        let data =
            FrameData::from_bytes(Cow::Borrowed(bytes), SampleKind::Bit, 3, Endianness::Little);
        assert_eq!(data.len(), 21);
    }

    #[test]
    fn frame_offsets_in_bits() {
        assert_eq!(FrameOffset::from_bits(15), FrameOffset { byte: 1, bit: 7 });
        assert_eq!(FrameOffset::from(12), FrameOffset { byte: 12, bit: 0 });
    }
}
