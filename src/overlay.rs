//! Detection overlays drawn onto a frame.
//!
//! Overlay selection is a comma-separated subset of `box`, `labels`, `conf` and
//! `none` (`none` contributes nothing, so `box,none` is just `box`).
//!
//! - `box`: outline around each detection in its class color.
//! - `labels`: class-colored tag above the box.
//! - `conf`: bar inside the tag whose length tracks the confidence.

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::fmt;
use std::str::FromStr;

use crate::detect::Detection;
use crate::frame::{Frame, PixelFormat};

const TAG_HEIGHT: u32 = 10;
const CONF_BAR_HEIGHT: u32 = 3;
const BOX_THICKNESS: i32 = 2;

const PALETTE: [[u8; 3]; 8] = [
    [0, 255, 0],
    [255, 64, 64],
    [64, 128, 255],
    [255, 200, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 0],
    [160, 96, 255],
];

/// Which overlay elements a network should draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayFlags {
    pub boxes: bool,
    pub labels: bool,
    pub confidence: bool,
}

impl OverlayFlags {
    pub const NONE: Self = Self {
        boxes: false,
        labels: false,
        confidence: false,
    };

    pub const ALL: Self = Self {
        boxes: true,
        labels: true,
        confidence: true,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl FromStr for OverlayFlags {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let mut flags = Self::NONE;
        let mut seen = 0usize;
        for token in value.split(',').map(|t| t.trim()).filter(|t| !t.is_empty()) {
            seen += 1;
            match token.to_ascii_lowercase().as_str() {
                "box" => flags.boxes = true,
                "labels" => flags.labels = true,
                "conf" => flags.confidence = true,
                "none" => {}
                other => {
                    return Err(anyhow!(
                        "invalid overlay flag '{}' (valid: box, labels, conf, none)",
                        other
                    ))
                }
            }
        }
        if seen == 0 {
            return Err(anyhow!("overlay flags must not be empty (use 'none')"));
        }
        Ok(flags)
    }
}

impl fmt::Display for OverlayFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("none");
        }
        let parts: Vec<&str> = [
            (self.boxes, "box"),
            (self.labels, "labels"),
            (self.confidence, "conf"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        f.write_str(&parts.join(","))
    }
}

/// Stable color for a class id.
pub fn class_color(class_id: u32) -> [u8; 3] {
    PALETTE[class_id as usize % PALETTE.len()]
}

/// Draw `detections` onto `frame` according to `flags`.
pub fn draw_overlay(frame: &mut Frame, detections: &[Detection], flags: OverlayFlags) -> Result<()> {
    if flags.is_none() || detections.is_empty() {
        return Ok(());
    }
    if frame.format() != PixelFormat::Rgb8 {
        return Err(anyhow!("overlay requires an rgb8 frame, got {}", frame.spec()));
    }

    let (width, height) = (frame.width(), frame.height());
    let mut canvas: ImageBuffer<Rgb<u8>, &mut [u8]> =
        ImageBuffer::from_raw(width, height, frame.pixels_mut())
            .ok_or_else(|| anyhow!("frame buffer too small for {}x{}", width, height))?;

    for detection in detections {
        let Some(bounds) = clip(detection, width, height) else {
            continue;
        };
        let color = Rgb(class_color(detection.class_id));

        if flags.boxes {
            for inset in 0..BOX_THICKNESS {
                let w = bounds.w.saturating_sub(2 * inset as u32);
                let h = bounds.h.saturating_sub(2 * inset as u32);
                if w == 0 || h == 0 {
                    break;
                }
                let rect = Rect::at(bounds.x + inset, bounds.y + inset).of_size(w, h);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
        }

        if flags.labels || flags.confidence {
            let tag_y = (bounds.y - TAG_HEIGHT as i32).max(0);
            let tag_w = bounds.w.max(TAG_HEIGHT);
            if flags.labels {
                draw_filled_rect_mut(
                    &mut canvas,
                    Rect::at(bounds.x, tag_y).of_size(tag_w, TAG_HEIGHT),
                    color,
                );
            }
            if flags.confidence {
                let filled = ((tag_w as f32) * detection.confidence.clamp(0.0, 1.0)).round() as u32;
                if filled > 0 {
                    let bar_y = tag_y + (TAG_HEIGHT - CONF_BAR_HEIGHT) as i32;
                    draw_filled_rect_mut(
                        &mut canvas,
                        Rect::at(bounds.x, bar_y).of_size(filled, CONF_BAR_HEIGHT),
                        Rgb([255, 255, 255]),
                    );
                }
            }
        }
    }

    Ok(())
}

struct PixelBounds {
    x: i32,
    y: i32,
    w: u32,
    h: u32,
}

fn clip(detection: &Detection, width: u32, height: u32) -> Option<PixelBounds> {
    let bbox = &detection.bbox;
    let left = bbox.left.max(0.0);
    let top = bbox.top.max(0.0);
    let right = bbox.right.min(width as f32);
    let bottom = bbox.bottom.min(height as f32);
    if right - left < 1.0 || bottom - top < 1.0 {
        return None;
    }
    Some(PixelBounds {
        x: left as i32,
        y: top as i32,
        w: (right - left) as u32,
        h: (bottom - top) as u32,
    })
}
