//! Local video file source using FFmpeg.
//!
//! Decodes the best video track and converts each frame to packed RGB. When
//! the demuxer runs dry the decoder is flushed; after the last buffered frame
//! the source stops streaming (or rewinds, when looping was requested).

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::{Path, PathBuf};

use super::{pack_rows, Capture, Source, SourceOptions};
use crate::frame::{Frame, FrameSpec, PixelFormat};

pub(crate) struct FfmpegFileSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    /// Remaining replays; negative means forever.
    loops_left: i32,
    draining: bool,
    ended: bool,
    frame_count: u64,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &Path, options: &SourceOptions) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}'", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("{} has no video track", path.display()))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FfmpegFileSource: opened {} ({}x{})",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            scaler,
            loops_left: options.loop_count,
            draining: false,
            ended: false,
            frame_count: 0,
        })
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        self.frame_count += 1;
        Frame::new(pixels, FrameSpec::new(width, height, PixelFormat::Rgb8)).map(Some)
    }

    fn rewind(&mut self) -> Result<bool> {
        if self.loops_left == 0 {
            return Ok(false);
        }
        if self.loops_left > 0 {
            self.loops_left -= 1;
        }
        self.input
            .seek(0, ..)
            .with_context(|| format!("rewind {}", self.path.display()))?;
        self.decoder.flush();
        self.draining = false;
        Ok(true)
    }
}

impl Source for FfmpegFileSource {
    fn capture(&mut self) -> Result<Capture> {
        if self.ended {
            return Ok(Capture::NoFrame);
        }

        loop {
            if let Some(frame) = self.receive()? {
                return Ok(Capture::Frame(frame));
            }
            if self.draining {
                if self.rewind()? {
                    continue;
                }
                log::info!(
                    "FfmpegFileSource: {} ended after {} frames",
                    self.path.display(),
                    self.frame_count
                );
                self.ended = true;
                return Ok(Capture::NoFrame);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.draining = true;
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("read packet from {}", self.path.display())))
                }
            }
        }
    }

    fn is_streaming(&self) -> bool {
        !self.ended
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let pixels = pack_rows(data, stride, row_bytes, height as usize)
        .context("ffmpeg frame is smaller than its video info")?;
    Ok((pixels, width, height))
}
