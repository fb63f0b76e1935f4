//! Image file source.
//!
//! Plays a single image or a directory of images (sorted by file name) as a
//! stream. Decoding happens on capture, so only one decoded image is alive at
//! a time. Finite by default; `SourceOptions::loop_count` replays the sequence.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{Capture, Source, SourceOptions};
use crate::frame::{Frame, FrameSpec, PixelFormat};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequenceSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    /// Remaining replays; negative means forever.
    loops_left: i32,
    frame_count: u64,
}

impl ImageSequenceSource {
    pub fn open(path: &Path, options: &SourceOptions) -> Result<Self> {
        let files = if path.is_dir() {
            list_images(path)?
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(anyhow!("input path {} does not exist", path.display()));
        };
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", path.display()));
        }

        log::info!(
            "ImageSequenceSource: {} image(s) from {} (loop={})",
            files.len(),
            path.display(),
            options.loop_count
        );
        Ok(Self {
            root: path.to_path_buf(),
            files,
            position: 0,
            loops_left: options.loop_count,
            frame_count: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn rewind_if_looping(&mut self) {
        if self.position < self.files.len() || self.loops_left == 0 {
            return;
        }
        if self.loops_left > 0 {
            self.loops_left -= 1;
        }
        self.position = 0;
    }
}

impl Source for ImageSequenceSource {
    fn capture(&mut self) -> Result<Capture> {
        self.rewind_if_looping();
        let Some(path) = self.files.get(self.position) else {
            return Ok(Capture::NoFrame);
        };

        let frame = decode_image(path)?;
        self.position += 1;
        self.frame_count += 1;
        Ok(Capture::Frame(frame))
    }

    fn is_streaming(&self) -> bool {
        self.position < self.files.len() || self.loops_left != 0
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read input directory {}", dir.display()))?
    {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn decode_image(path: &Path) -> Result<Frame> {
    let image =
        image::open(path).with_context(|| format!("failed to decode image {}", path.display()))?;
    let (width, height) = (image.width(), image.height());
    if image.color().has_alpha() {
        let spec = FrameSpec::new(width, height, PixelFormat::Rgba8);
        Frame::new(image.into_rgba8().into_raw(), spec)
    } else {
        let spec = FrameSpec::new(width, height, PixelFormat::Rgb8);
        Frame::new(image.into_rgb8().into_raw(), spec)
    }
}
