//! detect-stream
//!
//! Runs an object detection network over a live video stream and renders the
//! annotated frames.
//!
//! # Architecture
//!
//! A single-threaded frame loop ([`pipeline::FrameLoop`]) ties three
//! collaborators together:
//!
//! 1. **Source** ([`ingest::Source`]): hands out captured frames until the stream ends.
//! 2. **Network** ([`detect::Network`]): finds objects in a frame and draws the overlay.
//! 3. **Sink** ([`output::Sink`]): presents frames and a status line.
//!
//! Each captured frame is resized into one scratch buffer that lives for the
//! whole run, then released before detection starts.
//!
//! # Module Structure
//!
//! - `frame`: Frame buffers, allocators and the scratch buffer
//! - `resize`: Bilinear resize into the scratch buffer
//! - `overlay`: Overlay flags and drawing
//! - `detect`: Network trait, backends, catalog, post-processing
//! - `ingest`: Frame sources (synthetic, image files, V4L2, RTSP, video files)
//! - `output`: Frame sinks (display, image files, null)
//! - `pipeline`: The frame loop
//! - `config`, `cli`, `ui`: Configuration layers, argument parsing, terminal output

pub mod cli;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod resize;
pub mod ui;

pub use cli::{parse_args, Args, ParseOutcome, StartupContext, StartupError, StartupStage};
pub use config::{ConfigOverrides, DetectConfig};
pub use detect::{BoundingBox, Detection, Network, NetworkRegistry, NetworkSettings};
pub use frame::{
    Frame, FrameAllocator, FrameSpec, HostAllocator, PixelFormat, ReleaseHook, ScratchBuffer,
};
pub use ingest::{open_source, Capture, Source, SourceOptions};
pub use output::{open_sink, Sink};
pub use overlay::OverlayFlags;
pub use pipeline::{FrameLoop, LoopSettings, RunState, RunSummary};
