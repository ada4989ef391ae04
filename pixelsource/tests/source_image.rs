//! Tests for opening images and decoding their frames
//! through every storage strategy.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dicom_dictionary_std::uids;
use dicom_pixelsource::{
    Endianness, Error, ImageDescriptor, Mapper, OpenImageOptions, PaletteLut,
    PhotometricInterpretation, RawPixelData, SourceImage, SourceKind, UncompressedCodec,
};
use memmap2::Mmap;
use rstest::rstest;
use tempfile::TempDir;

const FRAME_0: [u16; 8] = [0, 100, 200, 300, 400, 500, 600, 4095];
// the high nibble of the first sample is outside of the bits stored
const FRAME_1: [u16; 8] = [0xF00A, 1, 2, 3, 4, 5, 6, 7];

fn descriptor() -> ImageDescriptor {
    ImageDescriptor::new(4, 2, 16, 12, 1, PhotometricInterpretation::Monochrome2)
        .with_frame_count(2)
}

fn write_samples(path: &Path, header: usize, samples: &[u16], big_endian: bool) {
    let mut file = File::create(path).unwrap();
    file.write_all(&vec![0xAB; header]).unwrap();
    for &s in samples {
        let bytes = if big_endian {
            s.to_be_bytes()
        } else {
            s.to_le_bytes()
        };
        file.write_all(&bytes).unwrap();
    }
}

fn both_frames() -> Vec<u16> {
    FRAME_0.iter().chain(FRAME_1.iter()).copied().collect()
}

#[derive(Debug, Copy, Clone)]
enum Strategy {
    Heap,
    HeapPerFrame,
    Mapped,
    Deferred,
    Eager,
    BigEndian,
    MultiFile,
    FileFrames,
    Strided,
}

/// Open the two frame test image with the given strategy.
/// The returned directory must outlive the image.
fn open(strategy: Strategy) -> (SourceImage, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let single = dir.path().join("pixels.raw");
    let options = OpenImageOptions::new();
    let (options, raw) = match strategy {
        Strategy::Heap => (options, RawPixelData::Contiguous(both_frames().into())),
        Strategy::HeapPerFrame => (
            options,
            RawPixelData::PerFrame(vec![FRAME_0.to_vec().into(), FRAME_1.to_vec().into()]),
        ),
        Strategy::Mapped => {
            write_samples(&single, 128, &both_frames(), false);
            (options, RawPixelData::file(&single, 128))
        }
        Strategy::Deferred => {
            write_samples(&single, 128, &both_frames(), false);
            (options.memory_mapping(false), RawPixelData::file(&single, 128))
        }
        Strategy::Eager => {
            write_samples(&single, 128, &both_frames(), false);
            (
                options.memory_mapping(false).deferred_read(false),
                RawPixelData::file(&single, 128),
            )
        }
        Strategy::BigEndian => {
            write_samples(&single, 0, &both_frames(), true);
            (
                options,
                RawPixelData::File {
                    path: single,
                    offset: 0,
                    frame_stride: None,
                    endianness: Some(Endianness::Big),
                },
            )
        }
        Strategy::MultiFile => {
            let paths: Vec<PathBuf> = (0..2)
                .map(|i| dir.path().join(format!("frame{}.raw", i)))
                .collect();
            write_samples(&paths[0], 16, &FRAME_0, false);
            write_samples(&paths[1], 0, &FRAME_1, false);
            (
                options.memory_mapping(false),
                RawPixelData::MultiFile {
                    frames: vec![(paths[0].clone(), 16), (paths[1].clone(), 0)],
                    endianness: None,
                },
            )
        }
        Strategy::FileFrames => {
            // frames stored in reverse order
            let samples: Vec<u16> = FRAME_1.iter().chain(FRAME_0.iter()).copied().collect();
            write_samples(&single, 0, &samples, false);
            (
                options.memory_mapping(false),
                RawPixelData::FileFrames {
                    path: single,
                    frame_offsets: vec![16, 0],
                    endianness: None,
                },
            )
        }
        Strategy::Strided => {
            // 4 bytes of filler after each frame
            let samples: Vec<u16> = FRAME_0
                .iter()
                .chain(&[0xFFFF, 0xFFFF])
                .chain(FRAME_1.iter())
                .copied()
                .collect();
            write_samples(&single, 8, &samples, false);
            (
                options,
                RawPixelData::File {
                    path: single,
                    offset: 8,
                    frame_stride: Some(20),
                    endianness: None,
                },
            )
        }
    };
    let image = options.open(descriptor(), raw).unwrap();
    (image, dir)
}

#[rstest]
#[case(Strategy::Heap, SourceKind::Contiguous)]
#[case(Strategy::HeapPerFrame, SourceKind::PerFrame)]
#[case(Strategy::Mapped, SourceKind::MemoryMapped)]
#[case(Strategy::Deferred, SourceKind::FileBacked)]
#[case(Strategy::Eager, SourceKind::PerFrame)]
#[case(Strategy::BigEndian, SourceKind::MemoryMapped)]
#[case(Strategy::MultiFile, SourceKind::MultiFileBacked)]
#[case(Strategy::FileFrames, SourceKind::FileBacked)]
#[case(Strategy::Strided, SourceKind::MemoryMapped)]
fn every_strategy_decodes_the_same_frames(#[case] strategy: Strategy, #[case] kind: SourceKind) {
    let (mut image, _dir) = open(strategy);
    assert_eq!(image.source_kind(), kind);

    let frame = image.frame(0).unwrap();
    assert_eq!(frame.samples().as_u16().unwrap(), &FRAME_0);
    assert_eq!(image.minimum(), Some(0.));
    assert_eq!(image.maximum(), Some(4095.));

    let frame = image.frame(1).unwrap();
    assert_eq!(frame.index(), 1);
    assert_eq!(frame.samples().as_u16().unwrap(), &[10, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(image.minimum(), Some(1.));
    assert_eq!(image.maximum(), Some(10.));

    image.close();
}

#[test]
fn contiguous_12_bit_frame_statistics() {
    let d = ImageDescriptor::new(4, 2, 16, 12, 1, PhotometricInterpretation::Monochrome2);
    let samples: Vec<u16> = vec![10, 4095, 0, 200, 300, 4095, 10, 0];
    let mut image = SourceImage::open(d, RawPixelData::Contiguous(samples.clone().into())).unwrap();
    assert_eq!(image.minimum(), None);

    let frame = image.frame(0).unwrap();
    assert_eq!(frame.samples().as_u16().unwrap(), &samples[..]);
    assert_eq!(image.minimum(), Some(0.));
    assert_eq!(image.maximum(), Some(4095.));
}

#[test]
fn byte_order_follows_the_transfer_syntax() {
    #[allow(deprecated)]
    let big_endian = uids::EXPLICIT_VR_BIG_ENDIAN;
    let d = ImageDescriptor::new(2, 1, 16, 16, 1, PhotometricInterpretation::Monochrome2)
        .with_transfer_syntax(big_endian);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixels.raw");
    std::fs::write(&path, [0_u8, 1, 0, 2]).unwrap();

    for options in [
        OpenImageOptions::new(),
        OpenImageOptions::new().memory_mapping(false),
        OpenImageOptions::new().memory_mapping(false).deferred_read(false),
    ] {
        let mut image = options.open(d.clone(), RawPixelData::file(&path, 0)).unwrap();
        let frame = image.frame(0).unwrap();
        assert_eq!(frame.samples().as_u16().unwrap(), &[1, 2]);
    }

    // raw bytes held in memory
    let raw = RawPixelData::Contiguous(vec![0_u8, 1, 0, 2].into());
    let mut image = SourceImage::open(d.clone(), raw).unwrap();
    assert_eq!(image.frame(0).unwrap().samples().as_u16().unwrap(), &[1, 2]);

    // an explicit byte order wins over the transfer syntax
    let raw = RawPixelData::File {
        path: path.clone(),
        offset: 0,
        frame_stride: None,
        endianness: Some(Endianness::Little),
    };
    let mut image = SourceImage::open(d, raw).unwrap();
    assert_eq!(image.frame(0).unwrap().samples().as_u16().unwrap(), &[256, 512]);
}

/// Two 3x2 single-bit frames, the second one starting at bit 6,
/// after a 3 byte header.
fn write_bit_frames(path: &Path) {
    // frame 0: 1 0 1 1 0 0, frame 1: 0 1 1 0 1 1, least significant bit first
    std::fs::write(path, [0xAB_u8, 0xAB, 0xAB, 0b1000_1101, 0b0000_1101]).unwrap();
}

#[rstest]
#[case(OpenImageOptions::new(), SourceKind::MemoryMapped)]
#[case(OpenImageOptions::new().memory_mapping(false), SourceKind::FileBacked)]
#[case(
    OpenImageOptions::new().memory_mapping(false).deferred_read(false),
    SourceKind::PerFrame
)]
fn packed_bit_frames_from_file(#[case] options: OpenImageOptions, #[case] kind: SourceKind) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bits.raw");
    write_bit_frames(&path);

    let d = ImageDescriptor::new(3, 2, 1, 1, 1, PhotometricInterpretation::Monochrome2)
        .with_frame_count(2);
    let mut image = options.open(d, RawPixelData::file(&path, 3)).unwrap();
    assert_eq!(image.source_kind(), kind);

    let frame = image.frame(0).unwrap();
    assert_eq!(frame.samples().as_u8().unwrap(), &[1, 0, 1, 1, 0, 0]);
    let frame = image.frame(1).unwrap();
    assert_eq!(frame.samples().as_u8().unwrap(), &[0, 1, 1, 0, 1, 1]);
    assert_eq!(image.minimum(), Some(0.));
    assert_eq!(image.maximum(), Some(1.));
}

#[test]
fn largest_gray_bounds_the_maximum() {
    let d = ImageDescriptor::new(2, 2, 8, 8, 1, PhotometricInterpretation::Monochrome2)
        .with_largest_gray(100);
    let mut image =
        SourceImage::open(d, RawPixelData::Contiguous(vec![5_u8, 50, 200, 20].into())).unwrap();
    let frame = image.frame(0).unwrap();
    // samples are left untouched
    assert_eq!(frame.samples().as_u8().unwrap(), &[5, 50, 200, 20]);
    assert_eq!(image.minimum(), Some(5.));
    assert_eq!(image.maximum(), Some(50.));
}

#[cfg(feature = "icc")]
#[test]
fn rgb_frames_are_converted_to_the_target_color_space() {
    use dicom_pixelsource::{ColorModel, ColorSpace};

    let profile = lcms2::Profile::new_srgb().icc().unwrap();
    let original = vec![0_u8, 0, 0, 255, 255, 255];
    let d = ImageDescriptor::new(2, 1, 8, 8, 3, PhotometricInterpretation::Rgb)
        .with_icc_profile(profile);
    let mut image = OpenImageOptions::new()
        .target_color_space(ColorSpace::Srgb)
        .open(d, RawPixelData::Contiguous(original.clone().into()))
        .unwrap();

    let frame = image.frame(0).unwrap();
    assert_eq!(frame.color_model(), ColorModel::Rgb);
    assert_eq!(frame.color_space(), Some(&ColorSpace::Srgb));
    let converted = frame.samples().as_u8().unwrap();
    for (a, b) in converted.iter().zip(&original) {
        assert!((i16::from(*a) - i16::from(*b)).abs() <= 2, "{} vs {}", a, b);
    }
}

#[test]
fn repeated_requests_are_served_from_cache() {
    let (mut image, _dir) = open(Strategy::Heap);
    let a = image.frame(0).unwrap();
    let b = image.frame(0).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    image.frame(1).unwrap();
    let c = image.frame(0).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(a, c);
}

#[test]
fn frames_are_unavailable_after_close() {
    let (mut image, _dir) = open(Strategy::Mapped);
    image.frame(0).unwrap();
    image.close();
    assert!(image.is_closed());
    assert!(matches!(image.frame(0), Err(Error::Closed)));
    assert!(matches!(image.frame(1), Err(Error::Closed)));
    assert_eq!(image.maximum(), None);
    image.close();
}

#[test]
fn out_of_range_frames_are_rejected() {
    let (mut image, _dir) = open(Strategy::Deferred);
    let err = image.frame(2).unwrap_err();
    assert!(matches!(err, Error::DecodeFrame { frame: 2, .. }));
    // the image remains usable
    assert!(image.frame(1).is_ok());
}

#[test]
fn a_broken_frame_does_not_affect_others() {
    let d = ImageDescriptor::new(2, 2, 8, 8, 1, PhotometricInterpretation::Monochrome2)
        .with_frame_count(2)
        .with_transfer_syntax(uids::ENCAPSULATED_UNCOMPRESSED_EXPLICIT_VR_LITTLE_ENDIAN);
    let raw = RawPixelData::compressed(
        vec![vec![1_u8], vec![9_u8, 3, 5, 7]],
        uids::ENCAPSULATED_UNCOMPRESSED_EXPLICIT_VR_LITTLE_ENDIAN,
    );
    let mut image = OpenImageOptions::new()
        .codec(UncompressedCodec)
        .open(d, raw)
        .unwrap();
    assert_eq!(image.source_kind(), SourceKind::Compressed);

    let err = image.frame(0).unwrap_err();
    assert!(matches!(err, Error::DecodeFrame { frame: 0, .. }));
    assert_eq!(image.minimum(), None);

    let frame = image.frame(1).unwrap();
    assert_eq!(frame.samples().as_u8().unwrap(), &[9, 3, 5, 7]);
    assert_eq!(image.minimum(), Some(3.));
    assert_eq!(image.maximum(), Some(9.));

    // a later failure keeps the statistics of the last decoded frame
    assert!(image.frame(0).is_err());
    assert_eq!(image.maximum(), Some(9.));
}

#[test]
fn compressed_data_needs_a_codec() {
    let d = ImageDescriptor::new(1, 1, 8, 8, 1, PhotometricInterpretation::Monochrome2);
    let raw = RawPixelData::compressed(vec![vec![1_u8]], uids::RLE_LOSSLESS);
    let mut image = SourceImage::open(d, raw).unwrap();
    assert!(matches!(image.frame(0), Err(Error::DecodeFrame { frame: 0, .. })));
}

#[test]
fn odd_width_chroma_subsampling_is_rejected() {
    let d = ImageDescriptor::new(3, 2, 8, 8, 3, PhotometricInterpretation::YbrFull422);
    let err = SourceImage::open(d, RawPixelData::Contiguous(vec![0_u8; 12].into())).unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn short_buffers_are_rejected_on_open() {
    let err = SourceImage::open(descriptor(), RawPixelData::Contiguous(FRAME_0.to_vec().into()))
        .unwrap_err();
    assert!(matches!(err, Error::Bind { .. }));
}

/// Never manages to map anything.
#[derive(Debug)]
struct NoAddressSpace;

impl Mapper for NoAddressSpace {
    fn map(&self, _path: &Path, _file: &File) -> std::io::Result<Mmap> {
        Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "no address space left",
        ))
    }
}

#[test]
fn exhausted_mapping_falls_back_to_reading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixels.raw");
    write_samples(&path, 0, &both_frames(), false);

    let mut image = OpenImageOptions::new()
        .mapper(NoAddressSpace)
        .map_attempts(2)
        .map_retry_backoff(Duration::ZERO)
        .open(descriptor(), RawPixelData::file(&path, 0))
        .unwrap();
    assert_eq!(image.source_kind(), SourceKind::FileBacked);
    let frame = image.frame(1).unwrap();
    assert_eq!(frame.samples().as_u16().unwrap(), &[10, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn palette_is_available_for_lookup() {
    let palette = PaletteLut::new(
        10,
        16,
        vec![0, 0x8000, 0xFFFF],
        vec![0, 0x4000, 0x8000],
        vec![0xFFFF, 0, 0],
    );
    let d = ImageDescriptor::new(2, 1, 8, 8, 1, PhotometricInterpretation::PaletteColor)
        .with_palette(palette);
    let mut image = SourceImage::open(d, RawPixelData::Contiguous(vec![10_u8, 12].into())).unwrap();

    let frame = image.frame(0).unwrap();
    assert_eq!(frame.samples().as_u8().unwrap(), &[10, 12]);

    let palette = image.palette().unwrap();
    assert_eq!(palette.lookup(11), Some([0x8000, 0x4000, 0]));
    assert_eq!(palette.lookup(0), Some([0, 0, 0xFFFF]));
    assert_eq!(palette.lookup(200), Some([0xFFFF, 0x8000, 0]));
    assert!(!image.is_grayscale());
}
