//! Image file sink.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::Sink;
use crate::frame::{Frame, PixelFormat};

const INDEX_PLACEHOLDER: &str = "%i";

/// Where rendered frames end up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageTarget {
    /// `frame_000000.png`, `frame_000001.png`, ... inside a directory.
    Directory(PathBuf),
    /// File name pattern; `%i` is replaced by the frame index.
    Pattern(String),
    /// One file, overwritten by every frame.
    Single(PathBuf),
}

impl ImageTarget {
    pub fn classify(path: &Path) -> Self {
        let raw = path.to_string_lossy();
        if raw.contains(INDEX_PLACEHOLDER) {
            return Self::Pattern(raw.into_owned());
        }
        if raw.ends_with('/') || path.is_dir() || path.extension().is_none() {
            return Self::Directory(path.to_path_buf());
        }
        Self::Single(path.to_path_buf())
    }

    pub fn path_for(&self, index: u64) -> PathBuf {
        match self {
            Self::Directory(dir) => dir.join(format!("frame_{:06}.png", index)),
            Self::Pattern(pattern) => {
                PathBuf::from(pattern.replace(INDEX_PLACEHOLDER, &index.to_string()))
            }
            Self::Single(path) => path.clone(),
        }
    }
}

pub struct ImageSequenceSink {
    target: ImageTarget,
    frames: u64,
    status: String,
}

impl ImageSequenceSink {
    pub fn create(target: ImageTarget) -> Result<Self> {
        let parent = match &target {
            ImageTarget::Directory(dir) => Some(dir.clone()),
            ImageTarget::Pattern(_) | ImageTarget::Single(_) => target
                .path_for(0)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf),
        };
        if let Some(dir) = parent {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        }
        log::info!("ImageSequenceSink: writing to {:?}", target);
        Ok(Self {
            target,
            frames: 0,
            status: String::new(),
        })
    }

    pub fn target(&self) -> &ImageTarget {
        &self.target
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}

impl Sink for ImageSequenceSink {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        let path = self.target.path_for(self.frames);
        let color = match frame.format() {
            PixelFormat::Rgb8 => image::ColorType::Rgb8,
            PixelFormat::Rgba8 => image::ColorType::Rgba8,
        };
        image::save_buffer(&path, frame.pixels(), frame.width(), frame.height(), color)
            .with_context(|| format!("failed to write output image {}", path.display()))?;
        self.frames += 1;
        log::debug!("ImageSequenceSink: wrote {}", path.display());
        Ok(())
    }

    fn set_status(&mut self, status: &str) {
        if self.status != status {
            log::debug!("ImageSequenceSink: {}", status);
            self.status = status.to_string();
        }
    }
}
