//! Frame capture sources.
//!
//! This module provides different sources for frames:
//! - Synthetic test pattern (`synthetic://`)
//! - Image files and directories of images (plain paths or `file://`)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - RTSP streams (feature: rtsp-gstreamer)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Every source hands out owned `Frame`s. A capture that produced nothing yet
//! (timeout, device warming up) is `Capture::NoFrame`, not an error; only
//! `Source::is_streaming` decides when the stream is over.

#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod images;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "rtsp-gstreamer")]
pub mod rtsp;
pub mod synthetic;
mod uri;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{Context, Result};
use std::time::Duration;

use crate::frame::Frame;

pub use images::ImageSequenceSource;
#[cfg(feature = "rtsp-gstreamer")]
pub use rtsp::RtspSource;
pub use synthetic::SyntheticSource;
pub use uri::InputUri;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Outcome of a single capture call.
#[derive(Debug)]
pub enum Capture {
    /// A new frame, owned by the caller.
    Frame(Frame),
    /// Nothing available yet; try again.
    NoFrame,
}

/// Video input.
pub trait Source {
    /// Block until the next frame is available, or report that none is.
    fn capture(&mut self) -> Result<Capture>;

    /// False once the stream has ended (end of file, device gone).
    fn is_streaming(&self) -> bool;
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn capture(&mut self) -> Result<Capture> {
        (**self).capture()
    }

    fn is_streaming(&self) -> bool {
        (**self).is_streaming()
    }
}

/// Construction options shared by all sources. Unsupported options are ignored.
#[derive(Clone, Debug, Default)]
pub struct SourceOptions {
    /// Requested frame width.
    pub width: Option<u32>,
    /// Requested frame height.
    pub height: Option<u32>,
    /// How long a capture may block before reporting `NoFrame`.
    pub timeout: Option<Duration>,
    /// Frame rate hint (frames per second).
    pub frame_rate: Option<u32>,
    /// Replay count for finite sources: 0 plays once, -1 loops forever.
    pub loop_count: i32,
    /// Ask for frames mapped from device memory. Every source here delivers
    /// host-owned buffers, so the hint is accepted and has no effect.
    pub zero_copy: bool,
}

/// Open the source named by `uri`.
pub fn open_source(uri: &str, options: &SourceOptions) -> Result<Box<dyn Source>> {
    let parsed = InputUri::parse(uri)?;
    log::info!("opening input {} ({})", parsed, parsed.kind());
    if options.zero_copy {
        log::debug!("zero-copy requested; {} frames are host buffers", parsed.kind());
    }

    match parsed {
        InputUri::Synthetic {
            name,
            frames,
            misses,
        } => Ok(Box::new(SyntheticSource::new(name, frames, misses, options))),
        InputUri::Images(path) => Ok(Box::new(ImageSequenceSource::open(&path, options)?)),
        InputUri::Video(path) => open_video(&path, options),
        InputUri::V4l2(device) => open_v4l2(&device, options),
        InputUri::Rtsp(url) => open_rtsp(&url, options),
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(path: &std::path::Path, options: &SourceOptions) -> Result<Box<dyn Source>> {
    Ok(Box::new(file_ffmpeg::FfmpegFileSource::open(path, options)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(path: &std::path::Path, _options: &SourceOptions) -> Result<Box<dyn Source>> {
    anyhow::bail!(
        "video file input {} requires the ingest-file-ffmpeg feature",
        path.display()
    )
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(device: &str, options: &SourceOptions) -> Result<Box<dyn Source>> {
    Ok(Box::new(V4l2Source::open(device, options)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(device: &str, _options: &SourceOptions) -> Result<Box<dyn Source>> {
    anyhow::bail!("camera input {} requires the ingest-v4l2 feature", device)
}

#[cfg(feature = "rtsp-gstreamer")]
fn open_rtsp(url: &str, options: &SourceOptions) -> Result<Box<dyn Source>> {
    Ok(Box::new(RtspSource::open(url, options)?))
}

#[cfg(not(feature = "rtsp-gstreamer"))]
fn open_rtsp(url: &str, _options: &SourceOptions) -> Result<Box<dyn Source>> {
    anyhow::bail!("RTSP input {} requires the rtsp-gstreamer feature", url)
}

/// Help text describing accepted input URIs.
pub fn usage() -> &'static str {
    "inputs (positional input URI):\n  \
     synthetic://NAME[?frames=N&misses=K]  generated test pattern (default without a camera)\n  \
     PATH | file://PATH                    image file or directory of images\n  \
     PATH.mp4|.mkv|.avi|.mov|.webm         video file (ingest-file-ffmpeg)\n  \
     /dev/videoN | v4l2:///dev/videoN      V4L2 camera (ingest-v4l2)\n  \
     rtsp://HOST[:PORT]/PATH               RTSP stream (rtsp-gstreamer)\n"
}

/// Copy `height` rows of `row_bytes` each out of a buffer whose rows are
/// `stride` bytes apart. Fails if the buffer is shorter than that layout.
#[cfg_attr(
    not(any(feature = "rtsp-gstreamer", feature = "ingest-file-ffmpeg")),
    allow(dead_code)
)]
pub(crate) fn pack_rows(
    data: &[u8],
    stride: usize,
    row_bytes: usize,
    height: usize,
) -> Result<Vec<u8>> {
    if stride == row_bytes {
        let len = row_bytes * height;
        let packed = data.get(..len).with_context(|| {
            format!("buffer holds {} bytes, frame needs {}", data.len(), len)
        })?;
        return Ok(packed.to_vec());
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .with_context(|| format!("buffer row {} is out of bounds", row))?,
        );
    }
    Ok(pixels)
}
