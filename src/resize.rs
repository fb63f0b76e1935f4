//! Resize captured frames into the scratch buffer.
//!
//! The destination keeps its own dimensions, so a frame of unexpected size
//! still fills the whole scratch buffer. Resampling is a bilinear convolution
//! from `fast_image_resize`; both frames are wrapped in place and the resizer's
//! working buffers are kept between calls.

use anyhow::{Context, Result};
use fast_image_resize as fr;

use crate::frame::{Frame, PixelFormat};

fn pixel_type(format: PixelFormat) -> fr::PixelType {
    match format {
        PixelFormat::Rgb8 => fr::PixelType::U8x3,
        PixelFormat::Rgba8 => fr::PixelType::U8x4,
    }
}

/// Reusable bilinear resizer for RGB/RGBA frames.
pub struct FrameResizer {
    resizer: fr::Resizer,
    options: fr::ResizeOptions,
    /// Holds the resized image when the source and destination formats differ.
    staging: Vec<u8>,
}

impl Default for FrameResizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameResizer {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
            options: fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            staging: Vec::new(),
        }
    }

    /// Resize `src` into `dst`, converting between RGB and RGBA as needed.
    pub fn resize_into(&mut self, src: &Frame, dst: &mut Frame) -> Result<()> {
        let src_spec = src.spec();
        let dst_spec = dst.spec();
        anyhow::ensure!(
            src_spec.width > 0 && src_spec.height > 0,
            "cannot resize an empty {} frame",
            src_spec
        );

        if src_spec == dst_spec {
            dst.pixels_mut().copy_from_slice(src.pixels());
            return Ok(());
        }

        let source = fr::images::ImageRef::new(
            src_spec.width,
            src_spec.height,
            src.pixels(),
            pixel_type(src_spec.format),
        )
        .with_context(|| format!("wrap {} source frame", src_spec))?;

        if src_spec.format == dst_spec.format {
            let mut target = fr::images::Image::from_slice_u8(
                dst_spec.width,
                dst_spec.height,
                dst.pixels_mut(),
                pixel_type(dst_spec.format),
            )
            .with_context(|| format!("wrap {} scratch frame", dst_spec))?;
            self.resizer
                .resize(&source, &mut target, Some(&self.options))
                .with_context(|| format!("resize {} to {}", src_spec, dst_spec))?;
            return Ok(());
        }

        if (src_spec.width, src_spec.height) == (dst_spec.width, dst_spec.height) {
            convert_channels(src.pixels(), src_spec.format, dst.pixels_mut(), dst_spec.format);
            return Ok(());
        }

        let staged_len = dst_spec.width as usize
            * dst_spec.height as usize
            * src_spec.format.bytes_per_pixel();
        self.staging.resize(staged_len, 0);
        {
            let mut staged = fr::images::Image::from_slice_u8(
                dst_spec.width,
                dst_spec.height,
                &mut self.staging,
                pixel_type(src_spec.format),
            )
            .context("wrap staging buffer")?;
            self.resizer
                .resize(&source, &mut staged, Some(&self.options))
                .with_context(|| format!("resize {} to {}", src_spec, dst_spec))?;
        }
        convert_channels(&self.staging, src_spec.format, dst.pixels_mut(), dst_spec.format);
        Ok(())
    }
}

/// Copy pixels between layouts of equal pixel count. Alpha is dropped, or set
/// opaque when the source has none.
fn convert_channels(src: &[u8], from: PixelFormat, dst: &mut [u8], to: PixelFormat) {
    let src_px = src.chunks_exact(from.bytes_per_pixel());
    let dst_px = dst.chunks_exact_mut(to.bytes_per_pixel());
    for (s, d) in src_px.zip(dst_px) {
        d[..3].copy_from_slice(&s[..3]);
        if to == PixelFormat::Rgba8 {
            d[3] = match from {
                PixelFormat::Rgba8 => s[3],
                PixelFormat::Rgb8 => u8::MAX,
            };
        }
    }
}
