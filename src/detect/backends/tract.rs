#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::Network;
use crate::detect::postprocess::decode_ssd;
use crate::detect::registry::Labels;
use crate::detect::result::Detection;
use crate::detect::throughput::ThroughputMeter;
use crate::frame::{Frame, FrameSpec, PixelFormat};
use crate::overlay::{draw_overlay, OverlayFlags};
use crate::resize::FrameResizer;

/// Tract-based ONNX detection network.
///
/// Loads a local SSD-style model whose first output holds normalized boxes
/// `[1, N, 4]` and whose second output holds class scores `[1, N, C]`.
pub struct TractNetwork {
    name: String,
    model: TypedRunnableModel<TypedModel>,
    input: Frame,
    resizer: FrameResizer,
    labels: Labels,
    confidence_threshold: f32,
    meter: ThroughputMeter,
}

impl TractNetwork {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        name: &str,
        model_path: P,
        width: u32,
        height: u32,
        labels: Labels,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractNetwork: loaded {} from {} ({}x{}, {} labels)",
            name,
            model_path.display(),
            width,
            height,
            labels.len()
        );

        Ok(Self {
            name: name.to_string(),
            model,
            input: Frame::zeroed(FrameSpec::new(width, height, PixelFormat::Rgb8))?,
            resizer: FrameResizer::new(),
            labels,
            confidence_threshold: 0.5,
            meter: ThroughputMeter::default(),
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&mut self, frame: &Frame) -> Result<Tensor> {
        self.resizer.resize_into(frame, &mut self.input)?;

        let width = self.input.width() as usize;
        let height = self.input.height() as usize;
        let pixels = self.input.pixels();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let boxes = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no box output"))?
            .to_array_view::<f32>()
            .context("box tensor was not f32")?;
        let scores = outputs
            .get(1)
            .ok_or_else(|| anyhow!("model produced no score output"))?
            .to_array_view::<f32>()
            .context("score tensor was not f32")?;
        let num_classes = *scores
            .shape()
            .last()
            .ok_or_else(|| anyhow!("score tensor has no dimensions"))?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        decode_ssd(
            &boxes,
            &scores,
            num_classes,
            frame.width(),
            frame.height(),
            &self.labels,
            self.confidence_threshold,
        )
    }
}

impl Network for TractNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &mut Frame, overlay: OverlayFlags) -> Result<Vec<Detection>> {
        let started = Instant::now();
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = self.decode(outputs, frame)?;
        self.meter.record(started.elapsed());

        draw_overlay(frame, &detections, overlay)?;
        Ok(detections)
    }

    fn throughput(&self) -> f32 {
        self.meter.fps()
    }
}
