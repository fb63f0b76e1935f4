//! Frame sinks.
//!
//! - Terminal display with a live status line (`display://N`)
//! - Image files: a directory, a `%i` file name pattern, or one image
//!   overwritten every frame (plain paths or `file://`)
//! - Discard (`null://`)

pub mod display;
pub mod images;

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::PathBuf;
use url::Url;

use crate::frame::Frame;
use crate::ui::Ui;

pub use display::DisplaySink;
pub use images::{ImageSequenceSink, ImageTarget};

/// Video output.
pub trait Sink {
    /// Present one frame. The frame is only borrowed for the call.
    fn render(&mut self, frame: &Frame) -> Result<()>;

    /// Replace the sink's status text (window title, status line).
    fn set_status(&mut self, status: &str);
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        (**self).render(frame)
    }

    fn set_status(&mut self, status: &str) {
        (**self).set_status(status)
    }
}

/// Sink that accepts and drops everything.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

impl Sink for NullSink {
    fn render(&mut self, _frame: &Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn set_status(&mut self, _status: &str) {}
}

/// A parsed output location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputUri {
    Display(u32),
    Images(PathBuf),
    Null,
}

impl OutputUri {
    /// Parse an output URI. An empty string selects `display://0`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::Display(0));
        }
        if !raw.contains("://") {
            return Ok(Self::Images(PathBuf::from(raw)));
        }

        let url = Url::parse(raw).with_context(|| format!("invalid output URI '{}'", raw))?;
        match url.scheme() {
            "display" => {
                let index = match url.host_str().filter(|h| !h.is_empty()) {
                    Some(host) => host
                        .parse()
                        .map_err(|_| anyhow!("display index '{}' must be an integer", host))?,
                    None => 0,
                };
                Ok(Self::Display(index))
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow!("file URI '{}' is not a local path", raw))?;
                Ok(Self::Images(path))
            }
            "null" => Ok(Self::Null),
            other => Err(anyhow!("unsupported output scheme '{}://'", other)),
        }
    }
}

impl fmt::Display for OutputUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Display(index) => write!(f, "display://{}", index),
            Self::Images(path) => write!(f, "{}", path.display()),
            Self::Null => f.write_str("null://"),
        }
    }
}

/// Open the sink named by `uri`.
pub fn open_sink(uri: &str, ui: &Ui) -> Result<Box<dyn Sink>> {
    let parsed = OutputUri::parse(uri)?;
    log::info!("opening output {}", parsed);
    match parsed {
        OutputUri::Display(index) => Ok(Box::new(DisplaySink::new(
            index,
            ui.status_line(&format!("display://{}", index)),
        ))),
        OutputUri::Images(path) => Ok(Box::new(ImageSequenceSink::create(ImageTarget::classify(
            &path,
        ))?)),
        OutputUri::Null => Ok(Box::new(NullSink::new())),
    }
}

/// Help text describing accepted output URIs.
pub fn usage() -> &'static str {
    "outputs (positional output URI):\n  \
     display://N                 terminal status line (default display://0)\n  \
     DIR/ | file://DIR/          directory of frame_NNNNNN.png images\n  \
     PATH_%i.png                 numbered images, %i replaced by the frame index\n  \
     PATH.png|.jpg|.bmp          single image, overwritten every frame\n  \
     null://                     discard frames\n"
}
