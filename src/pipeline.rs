//! The frame processing loop.
//!
//! One iteration, strictly in order:
//!
//! 1. capture a frame from the [`Source`] (`NoFrame` skips to step 8)
//! 2. resize it into the fixed scratch buffer
//! 3. release the captured frame
//! 4. run the [`Network`] on the scratch buffer, drawing the overlay
//! 5. report the detections
//! 6. render the scratch buffer to the [`Sink`]
//! 7. update the sink's status text
//! 8. stop once the source is no longer streaming
//!
//! The scratch buffer is the only long-lived allocation. It is acquired once
//! before the first capture and released when the loop returns.

use anyhow::{Context, Result};
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::detect::{Detection, Network};
use crate::frame::{FrameAllocator, FrameSpec, ScratchBuffer};
use crate::ingest::{Capture, Source};
use crate::output::Sink;
use crate::overlay::OverlayFlags;
use crate::resize::FrameResizer;
use crate::ui::format_duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

/// Fixed parameters of one run.
#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub overlay: OverlayFlags,
    /// Resolution the input is expected to deliver.
    pub input_width: u32,
    pub input_height: u32,
    /// Scratch buffer size relative to the input resolution.
    pub scale: f32,
    /// Log per-stage timings for every frame.
    pub profile: bool,
}

impl LoopSettings {
    pub fn scratch_spec(&self) -> FrameSpec {
        FrameSpec::new(
            self.input_width,
            self.input_height,
            crate::frame::PixelFormat::Rgb8,
        )
        .scaled(self.scale)
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            overlay: OverlayFlags::ALL,
            input_width: 1280,
            input_height: 960,
            scale: 0.5,
            profile: false,
        }
    }
}

/// Accumulated time spent in each stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub capture: Duration,
    pub resize: Duration,
    pub detect: Duration,
    pub render: Duration,
}

impl StageTimings {
    fn add(&mut self, other: &StageTimings) {
        self.capture += other.capture;
        self.resize += other.resize;
        self.detect += other.detect;
        self.render += other.render;
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capture {} / resize {} / detect {} / render {}",
            format_duration(self.capture),
            format_duration(self.resize),
            format_duration(self.detect),
            format_duration(self.render)
        )
    }
}

/// What a finished run did.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Iterations that processed a frame.
    pub frames: u64,
    pub detections: u64,
    /// Captures that returned no frame.
    pub capture_misses: u64,
    /// Frames whose resolution differed from the configured input.
    pub size_mismatches: u64,
    pub elapsed: Duration,
    pub timings: StageTimings,
}

impl RunSummary {
    pub fn mean_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} detections, {} capture misses, {} size mismatches in {} ({:.1} FPS)",
            self.frames,
            self.detections,
            self.capture_misses,
            self.size_mismatches,
            format_duration(self.elapsed),
            self.mean_fps()
        )
    }
}

/// Drives a network, a source and a sink until the source stops streaming.
pub struct FrameLoop {
    settings: LoopSettings,
    state: RunState,
    summary: RunSummary,
    mismatch_reported: bool,
    resizer: FrameResizer,
}

impl FrameLoop {
    pub fn new(settings: LoopSettings) -> Self {
        Self {
            settings,
            state: RunState::Running,
            summary: RunSummary::default(),
            mismatch_reported: false,
            resizer: FrameResizer::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run to completion. Detection reports go to `report`; writing them is
    /// best effort.
    pub fn run(
        &mut self,
        network: &mut dyn Network,
        source: &mut dyn Source,
        sink: &mut dyn Sink,
        allocator: &mut dyn FrameAllocator,
        report: &mut dyn Write,
    ) -> Result<RunSummary> {
        let scratch_spec = self.settings.scratch_spec();
        let mut scratch = ScratchBuffer::allocate(allocator, scratch_spec)
            .context("allocate scratch buffer")?;
        log::info!(
            "frame loop: network {} on {} scratch buffer (overlay {})",
            network.name(),
            scratch_spec,
            self.settings.overlay
        );

        self.state = RunState::Running;
        let started = Instant::now();
        while self.state == RunState::Running {
            self.iterate(network, source, sink, &mut scratch, report)?;
        }
        self.summary.elapsed = started.elapsed();

        log::info!("frame loop stopped: {}", self.summary);
        Ok(std::mem::take(&mut self.summary))
    }

    fn iterate(
        &mut self,
        network: &mut dyn Network,
        source: &mut dyn Source,
        sink: &mut dyn Sink,
        scratch: &mut ScratchBuffer,
        report: &mut dyn Write,
    ) -> Result<()> {
        let mut timings = StageTimings::default();

        let mark = Instant::now();
        let capture = source.capture().context("capture frame")?;
        timings.capture = mark.elapsed();

        if let Capture::Frame(frame) = capture {
            self.check_input_size(frame.spec());

            let mark = Instant::now();
            self.resizer
                .resize_into(&frame, scratch.frame_mut())
                .context("resize frame")?;
            frame.release();
            timings.resize = mark.elapsed();

            let mark = Instant::now();
            let detections = network
                .detect(scratch.frame_mut(), self.settings.overlay)
                .context("detect objects")?;
            timings.detect = mark.elapsed();

            if let Err(err) = write_report(report, &detections) {
                log::debug!("failed to write detection report: {}", err);
            }

            let mark = Instant::now();
            sink.render(scratch.frame()).context("render frame")?;
            timings.render = mark.elapsed();

            sink.set_status(&format!(
                "{} | Network {:.0} FPS",
                network.name(),
                network.throughput()
            ));

            self.summary.frames += 1;
            self.summary.detections += detections.len() as u64;
            self.summary.timings.add(&timings);
            if self.settings.profile {
                log::info!("frame {}: {}", self.summary.frames, timings);
            }
        } else {
            self.summary.capture_misses += 1;
            log::debug!("capture returned no frame");
        }

        if !source.is_streaming() {
            self.state = RunState::Stopped;
        }
        Ok(())
    }

    fn check_input_size(&mut self, captured: FrameSpec) {
        let expected = (self.settings.input_width, self.settings.input_height);
        if (captured.width, captured.height) == expected {
            return;
        }
        self.summary.size_mismatches += 1;
        if !self.mismatch_reported {
            self.mismatch_reported = true;
            log::warn!(
                "input delivers {} but the scratch buffer was sized for {}x{}; frames will be rescaled",
                captured,
                expected.0,
                expected.1
            );
        }
    }
}

fn write_report(report: &mut dyn Write, detections: &[Detection]) -> std::io::Result<()> {
    writeln!(report, "detected {} objects in image", detections.len())?;
    for detection in detections {
        writeln!(report, "{}", detection)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    #[test]
    fn scratch_is_half_of_default_input() {
        let spec = LoopSettings::default().scratch_spec();
        assert_eq!(spec, FrameSpec::new(640, 480, PixelFormat::Rgb8));
    }

    #[test]
    fn summary_reports_mean_fps() {
        let summary = RunSummary {
            frames: 30,
            elapsed: Duration::from_secs(2),
            ..RunSummary::default()
        };
        assert!((summary.mean_fps() - 15.0).abs() < f64::EPSILON);
        assert!(summary.to_string().starts_with("30 frames, 0 detections"));
        assert_eq!(RunSummary::default().mean_fps(), 0.0);
    }

    #[test]
    fn report_surfaces_write_failures() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        assert!(write_report(&mut Broken, &[]).is_err());
    }
}
