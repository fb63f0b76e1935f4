//! Frame buffers and their lifetimes.
//!
//! - `Frame`: an image buffer with explicit dimensions and pixel format.
//! - `FrameAllocator`: where long-lived buffers come from (`HostAllocator` by default).
//! - `ScratchBuffer`: the loop's fixed working buffer, allocated once per run.
//!
//! Every `Frame` may carry a release hook. The hook runs exactly once, when the
//! frame is dropped or explicitly released, so allocators and capture sources can
//! account for outstanding buffers without a garbage collector pass.
//!
//! A released frame is consumed and cannot be read again:
//!
//! ```compile_fail
//! use detect_stream::frame::{Frame, FrameSpec, PixelFormat};
//!
//! let frame = Frame::zeroed(FrameSpec::new(4, 4, PixelFormat::Rgb8)).unwrap();
//! frame.release();
//! let _ = frame.width();
//! ```

use anyhow::{anyhow, Result};
use std::fmt;

/// Pixel layouts understood by the resize and overlay stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB.
    Rgb8,
    /// Packed 8-bit RGBA.
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgb8 => f.write_str("rgb8"),
            PixelFormat::Rgba8 => f.write_str("rgba8"),
        }
    }
}

/// Dimensions and format of a frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameSpec {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Number of bytes a packed buffer of this spec occupies.
    pub fn byte_len(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(self.format.bytes_per_pixel()))
            .ok_or_else(|| anyhow!("frame dimensions overflow: {}", self))
    }

    /// Scale width and height by `factor`, never collapsing below 1x1.
    pub fn scaled(&self, factor: f32) -> Self {
        let scale = |v: u32| ((v as f32 * factor).round() as u32).max(1);
        Self {
            width: scale(self.width),
            height: scale(self.height),
            format: self.format,
        }
    }
}

impl fmt::Display for FrameSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

/// Callback run exactly once when a frame's resources are released.
pub type ReleaseHook = Box<dyn FnOnce(&FrameSpec) + Send>;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Image buffer handed between source, network and sink.
///
/// Deliberately not `Clone`: a frame has a single owner and a single release.
pub struct Frame {
    data: Vec<u8>,
    spec: FrameSpec,
    release: Option<ReleaseHook>,
}

impl Frame {
    /// Wrap packed pixel data. The length must match `spec` exactly.
    pub fn new(data: Vec<u8>, spec: FrameSpec) -> Result<Self> {
        let expected = spec.byte_len()?;
        if data.len() != expected {
            return Err(anyhow!(
                "{} frame length mismatch: expected {}, got {}",
                spec,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            spec,
            release: None,
        })
    }

    /// Allocate a black frame.
    pub fn zeroed(spec: FrameSpec) -> Result<Self> {
        let len = spec.byte_len()?;
        Self::new(vec![0u8; len], spec)
    }

    /// Attach a hook that observes the release of this frame.
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn spec(&self) -> FrameSpec {
        self.spec
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn height(&self) -> u32 {
        self.spec.height
    }

    pub fn format(&self) -> PixelFormat {
        self.spec.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Release the frame now. Equivalent to dropping it, but reads as intent.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("spec", &self.spec)
            .field("tracked", &self.release.is_some())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook(&self.spec);
        }
    }
}

// ----------------------------------------------------------------------------
// Allocation
// ----------------------------------------------------------------------------

/// Source of long-lived frame buffers.
pub trait FrameAllocator {
    fn allocate(&mut self, spec: FrameSpec) -> Result<Frame>;
}

/// Allocator backed by host memory.
#[derive(Debug, Default)]
pub struct HostAllocator {
    allocations: u64,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total buffers handed out by this allocator.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}

impl FrameAllocator for HostAllocator {
    fn allocate(&mut self, spec: FrameSpec) -> Result<Frame> {
        let frame = Frame::zeroed(spec)?;
        self.allocations += 1;
        log::debug!("HostAllocator: allocated {} ({} bytes)", spec, frame.pixels().len());
        Ok(frame)
    }
}

/// Fixed-size working buffer reused across loop iterations.
///
/// Acquired once before the loop starts and released when dropped.
pub struct ScratchBuffer {
    frame: Frame,
}

impl ScratchBuffer {
    pub fn allocate(allocator: &mut dyn FrameAllocator, spec: FrameSpec) -> Result<Self> {
        let frame = allocator.allocate(spec)?;
        if frame.spec() != spec {
            return Err(anyhow!(
                "allocator returned {} for a {} scratch buffer",
                frame.spec(),
                spec
            ));
        }
        Ok(Self { frame })
    }

    pub fn spec(&self) -> FrameSpec {
        self.frame.spec()
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
