//! RTSP frame source.
//!
//! Uses GStreamer (`rtspsrc ! decodebin ! videoconvert ! appsink`) to decode an
//! IP camera stream to RGB. A pull that times out is reported as
//! `Capture::NoFrame`; an error or EOS on the pipeline bus ends the stream.

use anyhow::{Context, Result};
use std::time::Duration;

use super::{pack_rows, Capture, Source, SourceOptions};
use crate::frame::{Frame, FrameSpec, PixelFormat};

pub struct RtspSource {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    timeout: Duration,
    frame_count: u64,
    last_error: Option<String>,
}

impl RtspSource {
    /// Build the pipeline and start playing.
    pub fn open(url: &str, options: &SourceOptions) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            url
        );
        let pipeline = gstreamer::parse::launch(&pipeline_description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow::anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;
        log::info!("RtspSource: connected to {}", url);

        Ok(Self {
            url: url.to_string(),
            pipeline,
            appsink,
            timeout: options
                .timeout
                .unwrap_or_else(|| frame_timeout(options.frame_rate)),
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    let reason = format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                    log::warn!("RtspSource: {}", reason);
                    self.last_error = Some(reason);
                }
                MessageView::Eos(..) => {
                    log::info!("RtspSource: {} reached end of stream", self.url);
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

impl Source for RtspSource {
    fn capture(&mut self) -> Result<Capture> {
        self.poll_bus();
        if self.last_error.is_some() {
            return Ok(Capture::NoFrame);
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            return Ok(Capture::NoFrame);
        };

        let (pixels, width, height) = sample_to_pixels(&sample)?;
        self.frame_count += 1;
        let frame = Frame::new(pixels, FrameSpec::new(width, height, PixelFormat::Rgb8))?;
        Ok(Capture::Frame(frame))
    }

    fn is_streaming(&self) -> bool {
        self.last_error.is_none()
    }
}

impl Drop for RtspSource {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("RtspSource: failed to stop pipeline: {}", err);
        }
    }
}

fn frame_timeout(frame_rate: Option<u32>) -> Duration {
    let base_ms = match frame_rate {
        Some(fps) if fps > 0 => (1000 / fps).saturating_mul(4),
        _ => 500,
    };
    Duration::from_millis(base_ms.max(500) as u64)
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    let pixels = pack_rows(data, stride, row_bytes, height as usize)
        .context("RTSP buffer is smaller than its video info")?;
    Ok((pixels, width, height))
}
