//! Decoding and suppression for raw SSD-style network outputs.
//!
//! Expected layout (batch of one):
//! - boxes: `[N, 4]` normalized `x1, y1, x2, y2`
//! - scores: `[N, C]` per-class scores, class 0 is background

use anyhow::{anyhow, Result};

use crate::detect::registry::Labels;
use crate::detect::result::{BoundingBox, Detection};

/// IoU above which a weaker box of the same class is dropped.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Turn raw box/score tensors into pixel-space detections above `threshold`.
pub fn decode_ssd(
    boxes: &[f32],
    scores: &[f32],
    num_classes: usize,
    frame_width: u32,
    frame_height: u32,
    labels: &Labels,
    threshold: f32,
) -> Result<Vec<Detection>> {
    if num_classes < 2 {
        return Err(anyhow!("ssd output needs background plus at least one class"));
    }
    if boxes.len() % 4 != 0 {
        return Err(anyhow!("box tensor length {} is not a multiple of 4", boxes.len()));
    }
    let anchors = boxes.len() / 4;
    if scores.len() != anchors * num_classes {
        return Err(anyhow!(
            "score tensor length {} does not match {} anchors x {} classes",
            scores.len(),
            anchors,
            num_classes
        ));
    }

    let (w, h) = (frame_width as f32, frame_height as f32);
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let row = &scores[anchor * num_classes..(anchor + 1) * num_classes];
        let Some((class_id, &confidence)) = row
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            continue;
        };
        if confidence < threshold {
            continue;
        }
        let b = &boxes[anchor * 4..anchor * 4 + 4];
        candidates.push(Detection {
            class_id: class_id as u32,
            label: labels.name(class_id as u32),
            confidence,
            bbox: BoundingBox::new(
                b[0].clamp(0.0, 1.0) * w,
                b[1].clamp(0.0, 1.0) * h,
                b[2].clamp(0.0, 1.0) * w,
                b[3].clamp(0.0, 1.0) * h,
            ),
        });
    }

    Ok(non_max_suppression(candidates, NMS_IOU_THRESHOLD))
}

/// Greedy per-class suppression. Output is ordered by descending confidence.
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
