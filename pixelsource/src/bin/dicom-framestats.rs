//! A CLI tool for inspecting native pixel data stored in a raw file:
//! prints the sample range of each frame
//! and optionally exports one frame as an image.
use clap::Parser;
use dicom_pixelsource::{
    Endianness, ImageDescriptor, OpenImageOptions, Padding, PhotometricInterpretation,
    PlanarConfiguration, RawPixelData,
};
use snafu::{Report, Whatever};
use std::path::PathBuf;
use tracing::Level;

/// Exit code for when an error emerged while opening the pixel data.
const ERROR_OPEN: i32 = -2;
/// Exit code for when an error emerged while decoding a frame.
const ERROR_DECODE: i32 = -3;
/// Exit code for when an error emerged while writing the output image.
const ERROR_WRITE: i32 = -4;
/// Exit code for any other error.
const ERROR_OTHER: i32 = -128;

/// Print the sample range of each frame in a raw pixel data file
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// The file holding the pixel data
    file: PathBuf,
    /// The byte offset of the first frame in the file
    #[clap(long = "offset", default_value = "0")]
    offset: u64,

    /// The number of columns
    #[clap(short = 'c', long = "columns")]
    columns: u32,
    /// The number of rows
    #[clap(short = 'r', long = "rows")]
    rows: u32,
    /// The number of frames
    #[clap(short = 'n', long = "frames", default_value = "1")]
    frames: u32,
    /// The number of bits allocated per sample
    #[clap(long = "bits-allocated", default_value = "16")]
    bits_allocated: u16,
    /// The number of bits stored per sample (default is bits allocated)
    #[clap(long = "bits-stored")]
    bits_stored: Option<u16>,
    /// The number of samples per pixel
    #[clap(long = "samples", default_value = "1")]
    samples_per_pixel: u16,
    /// The photometric interpretation
    #[clap(long = "photometric", default_value = "MONOCHROME2")]
    photometric: String,
    /// Samples are signed
    #[clap(long)]
    signed: bool,
    /// Samples are IEEE floating point numbers
    #[clap(long)]
    float: bool,
    /// Color samples are stored plane by plane
    #[clap(long = "by-plane")]
    by_plane: bool,
    /// Samples are big endian, regardless of the transfer syntax
    #[clap(long = "big-endian")]
    big_endian: bool,

    /// The pixel padding value
    #[clap(long = "pad-value", allow_negative_numbers = true)]
    pad_value: Option<i32>,
    /// The pixel padding range limit
    #[clap(long = "pad-range-limit", requires = "pad_value", allow_negative_numbers = true)]
    pad_range_limit: Option<i32>,

    /// Do not memory map the file
    #[clap(long = "no-mmap")]
    no_mmap: bool,
    /// Read all frames into memory up front
    #[clap(long = "no-deferred")]
    no_deferred: bool,

    /// Only inspect this frame
    #[clap(short = 'f', long = "frame")]
    frame: Option<u32>,
    /// Save the inspected frame (or the first one) as an image
    #[clap(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Verbose mode
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    run().unwrap_or_else(|e| {
        eprintln!("{}", Report::from_error(e));
        std::process::exit(ERROR_OTHER);
    });
}

fn run() -> Result<(), Whatever> {
    let App {
        file,
        offset,
        columns,
        rows,
        frames,
        bits_allocated,
        bits_stored,
        samples_per_pixel,
        photometric,
        signed,
        float,
        by_plane,
        big_endian,
        pad_value,
        pad_range_limit,
        no_mmap,
        no_deferred,
        frame,
        output,
        verbose,
    } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .unwrap_or_else(|e| {
        eprintln!("{}", snafu::Report::from_error(e));
    });

    let mut descriptor = ImageDescriptor::new(
        columns,
        rows,
        bits_allocated,
        bits_stored.unwrap_or(bits_allocated),
        samples_per_pixel,
        PhotometricInterpretation::from(photometric.as_str()),
    )
    .with_frame_count(frames)
    .with_signed(signed)
    .with_floating_point(float);
    if by_plane {
        descriptor = descriptor.with_planar_configuration(PlanarConfiguration::ByPlane);
    }
    if let Some(value) = pad_value {
        descriptor = descriptor.with_padding(match pad_range_limit {
            Some(limit) => Padding::with_range_limit(value, limit),
            None => Padding::new(value),
        });
    }

    let raw = RawPixelData::File {
        path: file,
        offset,
        frame_stride: None,
        endianness: big_endian.then_some(Endianness::Big),
    };

    let mut image = OpenImageOptions::new()
        .memory_mapping(!no_mmap)
        .deferred_read(!no_deferred)
        .open(descriptor, raw)
        .unwrap_or_else(|e| {
            eprintln!("{}", Report::from_error(e));
            std::process::exit(ERROR_OPEN);
        });
    tracing::debug!("Pixel data bound as {:?}", image.source_kind());

    let indices = match frame {
        Some(index) => index..index + 1,
        None => 0..image.frame_count(),
    };
    for index in indices {
        image.frame(index).unwrap_or_else(|e| {
            eprintln!("{}", Report::from_error(e));
            std::process::exit(ERROR_DECODE);
        });
        match (image.minimum(), image.maximum()) {
            (Some(min), Some(max)) => println!("frame #{}: min = {}, max = {}", index, min, max),
            _ => println!("frame #{}: only padding", index),
        }
    }

    if let Some(output) = output {
        let decoded = image.frame(frame.unwrap_or(0)).unwrap_or_else(|e| {
            eprintln!("{}", Report::from_error(e));
            std::process::exit(ERROR_DECODE);
        });
        let dynamic_image = decoded.to_dynamic_image().unwrap_or_else(|e| {
            eprintln!("{}", Report::from_error(e));
            std::process::exit(ERROR_WRITE);
        });
        dynamic_image.save(&output).unwrap_or_else(|e| {
            eprintln!("{}", Report::from_error(e));
            std::process::exit(ERROR_WRITE);
        });
    }

    image.close();
    Ok(())
}
