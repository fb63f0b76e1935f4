//! V4L2 camera source.
//!
//! Captures from a local device node (e.g. /dev/video0) through libv4l memory
//! mapped buffers. The driver's buffer is copied and normalized to RGB before
//! the next dequeue, so the returned `Frame` never aliases driver memory.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, CameraFormat};
use super::{Capture, Source, SourceOptions};
use crate::frame::{Frame, FrameSpec, PixelFormat};

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const BUFFER_COUNT: u32 = 4;

pub struct V4l2Source {
    device_path: String,
    state: DeviceV4l2State,
    format: CameraFormat,
    spec: FrameSpec,
    frame_count: u64,
    last_error: Option<String>,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn open(device_path: &str, options: &SourceOptions) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture as _;

        let mut device = v4l::Device::with_path(device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = options.width.unwrap_or(DEFAULT_WIDTH);
        format.height = options.height.unwrap_or(DEFAULT_HEIGHT);
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Source: failed to set format on {}: {}", device_path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let camera_format = CameraFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} negotiated unsupported pixel format {}",
                device_path,
                format.fourcc
            )
        })?;

        if let Some(fps) = options.frame_rate.filter(|fps| *fps > 0) {
            let params = v4l::video::capture::Parameters::with_fps(fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Source: failed to set fps on {}: {}", device_path, err);
            }
        }

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        let spec = FrameSpec::new(format.width, format.height, PixelFormat::Rgb8);
        log::info!(
            "V4l2Source: connected to {} ({}, {:?})",
            device_path,
            spec,
            camera_format
        );

        Ok(Self {
            device_path: device_path.to_string(),
            state,
            format: camera_format,
            spec,
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl Source for V4l2Source {
    fn capture(&mut self) -> Result<Capture> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.spec.width, self.spec.height, self.format);
        let dequeued = self.state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, width, height, format)
        });
        // A failing device is treated as a disconnected camera: the stream ends.
        let pixels = match dequeued {
            Ok(pixels) => pixels,
            Err(err) => {
                log::warn!("V4l2Source: {} stopped streaming: {:#}", self.device_path, err);
                self.last_error = Some(err.to_string());
                return Ok(Capture::NoFrame);
            }
        };

        self.frame_count += 1;
        Ok(Capture::Frame(Frame::new(pixels, self.spec)?))
    }

    fn is_streaming(&self) -> bool {
        self.last_error.is_none()
    }
}
