//! Synthetic frame source.
//!
//! Produces a moving test pattern without any hardware, for demos and tests.
//! `frames` bounds the stream length and `misses` makes the first captures
//! report `NoFrame`, mimicking a camera that is still warming up.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::{Capture, Source, SourceOptions};
use crate::frame::{Frame, FrameSpec, PixelFormat};

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 960;

pub struct SyntheticSource {
    name: String,
    spec: FrameSpec,
    frame_limit: u64,
    misses_left: u64,
    frame_interval: Option<Duration>,
    next_frame_at: Option<Instant>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(name: String, frames: u64, misses: u64, options: &SourceOptions) -> Self {
        let spec = FrameSpec::new(
            options.width.unwrap_or(DEFAULT_WIDTH).max(1),
            options.height.unwrap_or(DEFAULT_HEIGHT).max(1),
            PixelFormat::Rgb8,
        );
        let frame_interval = options
            .frame_rate
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / fps as f64));
        log::info!(
            "SyntheticSource: {} producing {} frames ({})",
            name,
            spec,
            if frames == 0 {
                "endless".to_string()
            } else {
                frames.to_string()
            }
        );
        Self {
            name,
            spec,
            frame_limit: frames,
            misses_left: misses,
            frame_interval,
            next_frame_at: None,
            frame_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn pace(&mut self) {
        let Some(interval) = self.frame_interval else {
            return;
        };
        let now = Instant::now();
        if let Some(deadline) = self.next_frame_at {
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        self.next_frame_at = Some(Instant::now() + interval);
    }

    /// Horizontal gradient with a bright square sweeping across it.
    fn generate_pixels(&self) -> Vec<u8> {
        let w = self.spec.width as usize;
        let h = self.spec.height as usize;
        let side = (w.min(h) / 4).max(1);
        let travel = w.saturating_sub(side).max(1);
        let square_x = (self.frame_count as usize * 16) % travel;
        let square_y = h.saturating_sub(side) / 2;

        let mut pixels = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * 3;
                let inside = x >= square_x && x < square_x + side && y >= square_y && y < square_y + side;
                if inside {
                    pixels[offset..offset + 3].copy_from_slice(&[240, 240, 240]);
                } else {
                    let shade = ((x * 255) / w.max(1)) as u8;
                    pixels[offset] = shade;
                    pixels[offset + 1] = (y * 255 / h.max(1)) as u8;
                    pixels[offset + 2] = 96;
                }
            }
        }
        pixels
    }
}

impl Source for SyntheticSource {
    fn capture(&mut self) -> Result<Capture> {
        if self.misses_left > 0 {
            self.misses_left -= 1;
            return Ok(Capture::NoFrame);
        }
        if !self.is_streaming() {
            return Ok(Capture::NoFrame);
        }

        self.pace();
        let frame = Frame::new(self.generate_pixels(), self.spec)?;
        self.frame_count += 1;
        Ok(Capture::Frame(frame))
    }

    fn is_streaming(&self) -> bool {
        self.frame_limit == 0 || self.frame_count < self.frame_limit
    }
}
