use std::time::Instant;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::Network;
use crate::detect::result::{BoundingBox, Detection};
use crate::detect::throughput::ThroughputMeter;
use crate::frame::Frame;
use crate::overlay::{draw_overlay, OverlayFlags};

const LABELS: [&str; 8] = [
    "background",
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "bus",
    "dog",
    "chair",
];

/// Model-free network. Uses a pixel hash to derive stable pseudo-detections,
/// so identical frames always yield identical results.
pub struct SyntheticNetwork {
    threshold: f32,
    meter: ThroughputMeter,
}

impl SyntheticNetwork {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            meter: ThroughputMeter::default(),
        }
    }

    fn infer(&self, frame: &Frame) -> Vec<Detection> {
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let count = (digest[0] % 4) as usize;

        (0..count)
            .filter_map(|i| {
                let b = &digest[1 + i * 6..7 + i * 6];
                let class_id = 1 + (b[0] as u32 % (LABELS.len() as u32 - 1));
                let confidence = 0.3 + 0.7 * (b[1] as f32 / 255.0);
                if confidence < self.threshold {
                    return None;
                }
                let cx = w * (b[2] as f32 / 255.0);
                let cy = h * (b[3] as f32 / 255.0);
                let half_w = w * (0.05 + 0.2 * b[4] as f32 / 255.0);
                let half_h = h * (0.05 + 0.2 * b[5] as f32 / 255.0);
                Some(Detection {
                    class_id,
                    label: LABELS[class_id as usize].to_string(),
                    confidence,
                    bbox: BoundingBox::new(
                        (cx - half_w).max(0.0),
                        (cy - half_h).max(0.0),
                        (cx + half_w).min(w),
                        (cy + half_h).min(h),
                    ),
                })
            })
            .collect()
    }
}

impl Network for SyntheticNetwork {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn detect(&mut self, frame: &mut Frame, overlay: OverlayFlags) -> Result<Vec<Detection>> {
        let started = Instant::now();
        let detections = self.infer(frame);
        self.meter.record(started.elapsed());

        draw_overlay(frame, &detections, overlay)?;
        Ok(detections)
    }

    fn throughput(&self) -> f32 {
        self.meter.fps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameSpec, PixelFormat};

    fn patterned(seed: u8) -> Frame {
        let spec = FrameSpec::new(64, 48, PixelFormat::Rgb8);
        let data = (0..spec.byte_len().unwrap())
            .map(|i| (i as u8).wrapping_mul(seed))
            .collect();
        Frame::new(data, spec).unwrap()
    }

    #[test]
    fn identical_frames_give_identical_detections() -> Result<()> {
        let mut network = SyntheticNetwork::new(0.0);
        let a = network.detect(&mut patterned(3), OverlayFlags::NONE)?;
        let b = network.detect(&mut patterned(3), OverlayFlags::NONE)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn detections_stay_inside_the_frame() -> Result<()> {
        let mut network = SyntheticNetwork::new(0.0);
        for seed in 1..40u8 {
            let mut frame = patterned(seed);
            for d in network.detect(&mut frame, OverlayFlags::NONE)? {
                assert!(d.bbox.left >= 0.0 && d.bbox.right <= 64.0);
                assert!(d.bbox.top >= 0.0 && d.bbox.bottom <= 48.0);
                assert!((0.3..=1.0).contains(&d.confidence));
                assert_ne!(d.class_id, 0);
            }
        }
        Ok(())
    }

    #[test]
    fn threshold_above_one_filters_everything() -> Result<()> {
        let mut network = SyntheticNetwork::new(1.01);
        for seed in 1..20u8 {
            assert!(network.detect(&mut patterned(seed), OverlayFlags::ALL)?.is_empty());
        }
        Ok(())
    }

    #[test]
    fn throughput_is_reported_after_a_call() -> Result<()> {
        let mut network = SyntheticNetwork::new(0.5);
        network.detect(&mut patterned(7), OverlayFlags::NONE)?;
        assert!(network.throughput() >= 0.0);
        Ok(())
    }
}
