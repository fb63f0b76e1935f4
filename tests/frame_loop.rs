use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use detect_stream::detect::{BoundingBox, Detection, Network, NetworkRegistry, NetworkSettings};
use detect_stream::frame::{Frame, FrameAllocator, FrameSpec, PixelFormat};
use detect_stream::ingest::{open_source, Capture, Source, SourceOptions};
use detect_stream::output::{NullSink, Sink};
use detect_stream::overlay::{draw_overlay, OverlayFlags};
use detect_stream::pipeline::{FrameLoop, LoopSettings, RunState};

const COLOR: [u8; 3] = [10, 20, 30];

// ---- Test doubles ----

#[derive(Clone, Copy)]
enum Step {
    Frame,
    Miss,
}

struct ScriptedSource {
    steps: VecDeque<Step>,
    spec: FrameSpec,
    captures: usize,
    releases: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(steps: &[Step], spec: FrameSpec) -> Self {
        Self {
            steps: steps.iter().copied().collect(),
            spec,
            captures: 0,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn frames(count: usize) -> Self {
        Self::new(&vec![Step::Frame; count], input_spec())
    }

    fn released(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl Source for ScriptedSource {
    fn capture(&mut self) -> Result<Capture> {
        self.captures += 1;
        match self.steps.pop_front() {
            Some(Step::Frame) => {
                let pixels = COLOR.repeat((self.spec.width * self.spec.height) as usize);
                let releases = Arc::clone(&self.releases);
                let frame = Frame::new(pixels, self.spec)?.with_release_hook(Box::new(move |_| {
                    releases.fetch_add(1, Ordering::SeqCst);
                }));
                Ok(Capture::Frame(frame))
            }
            Some(Step::Miss) | None => Ok(Capture::NoFrame),
        }
    }

    fn is_streaming(&self) -> bool {
        !self.steps.is_empty()
    }
}

#[derive(Default)]
struct ScriptedNetwork {
    counts: VecDeque<usize>,
    overlays: Vec<OverlayFlags>,
    releases: Option<Arc<AtomicUsize>>,
    releases_seen: Vec<usize>,
    fail: bool,
}

impl ScriptedNetwork {
    fn with_counts(counts: &[usize]) -> Self {
        Self {
            counts: counts.iter().copied().collect(),
            ..Self::default()
        }
    }
}

impl Network for ScriptedNetwork {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&mut self, frame: &mut Frame, overlay: OverlayFlags) -> Result<Vec<Detection>> {
        self.overlays.push(overlay);
        if let Some(releases) = &self.releases {
            self.releases_seen.push(releases.load(Ordering::SeqCst));
        }
        if self.fail {
            return Err(anyhow!("inference failed"));
        }
        let count = self.counts.pop_front().unwrap_or(1);
        let detections: Vec<Detection> = (0..count)
            .map(|i| Detection {
                class_id: i as u32 + 1,
                label: format!("object{}", i),
                confidence: 0.9,
                bbox: BoundingBox::new(1.0, 1.0, 6.0, 5.0),
            })
            .collect();
        draw_overlay(frame, &detections, overlay)?;
        Ok(detections)
    }

    fn throughput(&self) -> f32 {
        25.0
    }
}

#[derive(Default)]
struct RecordingSink {
    frames: Vec<(FrameSpec, Vec<u8>)>,
    statuses: Vec<String>,
}

impl Sink for RecordingSink {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push((frame.spec(), frame.pixels().to_vec()));
        Ok(())
    }

    fn set_status(&mut self, status: &str) {
        self.statuses.push(status.to_string());
    }
}

#[derive(Default)]
struct CountingAllocator {
    allocations: usize,
    releases: Arc<AtomicUsize>,
}

impl FrameAllocator for CountingAllocator {
    fn allocate(&mut self, spec: FrameSpec) -> Result<Frame> {
        self.allocations += 1;
        let releases = Arc::clone(&self.releases);
        Ok(Frame::zeroed(spec)?.with_release_hook(Box::new(move |_| {
            releases.fetch_add(1, Ordering::SeqCst);
        })))
    }
}

fn input_spec() -> FrameSpec {
    FrameSpec::new(16, 12, PixelFormat::Rgb8)
}

fn settings(overlay: OverlayFlags) -> LoopSettings {
    LoopSettings {
        overlay,
        input_width: 16,
        input_height: 12,
        scale: 0.5,
        profile: false,
    }
}

struct Harness {
    source: ScriptedSource,
    network: ScriptedNetwork,
    sink: RecordingSink,
    allocator: CountingAllocator,
    report: Vec<u8>,
    frame_loop: FrameLoop,
}

impl Harness {
    fn new(source: ScriptedSource, network: ScriptedNetwork, overlay: OverlayFlags) -> Self {
        Self {
            source,
            network,
            sink: RecordingSink::default(),
            allocator: CountingAllocator::default(),
            report: Vec::new(),
            frame_loop: FrameLoop::new(settings(overlay)),
        }
    }

    fn run(&mut self) -> Result<detect_stream::pipeline::RunSummary> {
        self.frame_loop.run(
            &mut self.network,
            &mut self.source,
            &mut self.sink,
            &mut self.allocator,
            &mut self.report,
        )
    }

    fn report_text(&self) -> String {
        String::from_utf8_lossy(&self.report).into_owned()
    }
}

// ---- Overlay selection ----

#[test]
fn every_overlay_combination_reaches_the_network() -> Result<()> {
    for raw in [
        "box",
        "labels",
        "conf",
        "none",
        "box,labels",
        "box,conf",
        "labels,conf",
        "box,labels,conf",
    ] {
        let overlay: OverlayFlags = raw.parse()?;
        let mut harness = Harness::new(
            ScriptedSource::frames(1),
            ScriptedNetwork::with_counts(&[2]),
            overlay,
        );
        let summary = harness.run()?;
        assert_eq!(harness.network.overlays, vec![overlay], "overlay {}", raw);
        assert_eq!(summary.detections, 2, "overlay {}", raw);
    }
    Ok(())
}

#[test]
fn overlay_none_renders_the_plain_resized_frame() -> Result<()> {
    let mut plain = Harness::new(
        ScriptedSource::frames(1),
        ScriptedNetwork::with_counts(&[1]),
        OverlayFlags::NONE,
    );
    let summary = plain.run()?;
    assert_eq!(summary.detections, 1);
    let (spec, pixels) = &plain.sink.frames[0];
    assert_eq!(*spec, FrameSpec::new(8, 6, PixelFormat::Rgb8));
    assert!(pixels.chunks_exact(3).all(|px| px == COLOR));

    let mut drawn = Harness::new(
        ScriptedSource::frames(1),
        ScriptedNetwork::with_counts(&[1]),
        OverlayFlags::ALL,
    );
    let summary = drawn.run()?;
    assert_eq!(summary.detections, 1);
    assert!(drawn.sink.frames[0].1.chunks_exact(3).any(|px| px != COLOR));
    Ok(())
}

// ---- Buffer lifetimes ----

#[test]
fn each_captured_frame_is_released_once_before_detection() -> Result<()> {
    let source = ScriptedSource::frames(5);
    let mut network = ScriptedNetwork::default();
    network.releases = Some(Arc::clone(&source.releases));
    let mut harness = Harness::new(source, network, OverlayFlags::ALL);

    let summary = harness.run()?;
    assert_eq!(summary.frames, 5);
    assert_eq!(harness.source.released(), 5);
    assert_eq!(harness.network.releases_seen, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn scratch_buffer_is_allocated_once_and_released_after_the_run() -> Result<()> {
    let mut harness = Harness::new(
        ScriptedSource::frames(7),
        ScriptedNetwork::default(),
        OverlayFlags::ALL,
    );
    harness.run()?;
    assert_eq!(harness.allocator.allocations, 1);
    assert_eq!(harness.allocator.releases.load(Ordering::SeqCst), 1);
    assert!(harness
        .sink
        .frames
        .iter()
        .all(|(spec, _)| *spec == FrameSpec::new(8, 6, PixelFormat::Rgb8)));
    Ok(())
}

#[test]
fn failing_detection_still_releases_the_frame() {
    let network = ScriptedNetwork {
        fail: true,
        ..ScriptedNetwork::default()
    };
    let mut harness = Harness::new(ScriptedSource::frames(3), network, OverlayFlags::ALL);
    let err = harness.run().err().expect("detect failure must stop the loop");
    assert!(format!("{:#}", err).contains("inference failed"));
    assert_eq!(harness.source.captures, 1);
    assert_eq!(harness.source.released(), 1);
    assert_eq!(harness.allocator.releases.load(Ordering::SeqCst), 1);
    assert!(harness.sink.frames.is_empty());
}

// ---- Misses and termination ----

#[test]
fn leading_misses_are_retried_silently() -> Result<()> {
    let steps = [Step::Miss, Step::Miss, Step::Miss, Step::Frame, Step::Frame];
    let mut harness = Harness::new(
        ScriptedSource::new(&steps, input_spec()),
        ScriptedNetwork::with_counts(&[1, 1]),
        OverlayFlags::ALL,
    );
    let summary = harness.run()?;
    assert_eq!(harness.source.captures, 5);
    assert_eq!(summary.capture_misses, 3);
    assert_eq!(summary.frames, 2);
    assert_eq!(harness.sink.frames.len(), 2);
    assert_eq!(harness.sink.statuses.len(), 2);
    assert_eq!(harness.report_text().matches("detected").count(), 2);
    Ok(())
}

#[test]
fn loop_stops_as_soon_as_the_source_stops_streaming() -> Result<()> {
    let mut harness = Harness::new(
        ScriptedSource::frames(2),
        ScriptedNetwork::default(),
        OverlayFlags::ALL,
    );
    assert_eq!(harness.frame_loop.state(), RunState::Running);
    harness.run()?;
    assert_eq!(harness.source.captures, 2);
    assert_eq!(harness.frame_loop.state(), RunState::Stopped);
    Ok(())
}

#[test]
fn source_ending_while_idle_ends_the_loop() -> Result<()> {
    let mut harness = Harness::new(
        ScriptedSource::new(&[Step::Miss, Step::Miss], input_spec()),
        ScriptedNetwork::default(),
        OverlayFlags::ALL,
    );
    let summary = harness.run()?;
    assert_eq!(harness.source.captures, 2);
    assert_eq!(summary.frames, 0);
    assert_eq!(summary.capture_misses, 2);
    assert!(harness.network.overlays.is_empty());
    assert!(harness.sink.frames.is_empty());
    Ok(())
}

// ---- End to end ----

#[test]
fn three_frames_then_end_of_stream() -> Result<()> {
    let mut harness = Harness::new(
        ScriptedSource::frames(3),
        ScriptedNetwork::with_counts(&[0, 2, 1]),
        OverlayFlags::ALL,
    );
    let summary = harness.run()?;

    assert_eq!(harness.source.captures, 3);
    assert_eq!(harness.sink.frames.len(), 3);
    assert_eq!(harness.sink.statuses.len(), 3);
    assert!(harness
        .sink
        .statuses
        .iter()
        .all(|status| status == "scripted | Network 25 FPS"));
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.detections, 3);

    let report = harness.report_text();
    assert!(report.contains("detected 0 objects in image"));
    assert!(report.contains("detected 2 objects in image"));
    assert!(report.contains("detected 1 objects in image"));
    assert_eq!(report.matches("<Detection>").count(), 3);
    Ok(())
}

#[test]
fn mismatched_input_resolution_is_rescaled_and_counted() -> Result<()> {
    let mut harness = Harness::new(
        ScriptedSource::new(
            &[Step::Frame, Step::Frame],
            FrameSpec::new(20, 10, PixelFormat::Rgb8),
        ),
        ScriptedNetwork::default(),
        OverlayFlags::NONE,
    );
    let summary = harness.run()?;
    assert_eq!(summary.size_mismatches, 2);
    for (spec, pixels) in &harness.sink.frames {
        assert_eq!(*spec, FrameSpec::new(8, 6, PixelFormat::Rgb8));
        assert!(pixels.chunks_exact(3).all(|px| px == COLOR));
    }
    Ok(())
}

#[test]
fn synthetic_stack_runs_to_completion() -> Result<()> {
    let options = SourceOptions {
        width: Some(32),
        height: Some(24),
        ..SourceOptions::default()
    };
    let mut source = open_source("synthetic://bench?frames=4&misses=1", &options)?;
    let mut network = NetworkRegistry::builtin().build(
        "synthetic",
        &NetworkSettings {
            threshold: 0.0,
            ..NetworkSettings::default()
        },
    )?;
    let mut sink = NullSink::new();
    let mut allocator = detect_stream::frame::HostAllocator::new();
    let mut report = Vec::new();

    let mut frame_loop = FrameLoop::new(LoopSettings {
        input_width: 32,
        input_height: 24,
        ..LoopSettings::default()
    });
    let summary = frame_loop.run(
        network.as_mut(),
        source.as_mut(),
        &mut sink,
        &mut allocator,
        &mut report,
    )?;

    assert_eq!(summary.frames, 4);
    assert_eq!(summary.capture_misses, 1);
    assert_eq!(summary.size_mismatches, 0);
    assert_eq!(sink.frames_rendered(), 4);
    assert_eq!(allocator.allocations(), 1);
    assert_eq!(
        String::from_utf8(report)?.matches("objects in image").count(),
        4
    );
    Ok(())
}
