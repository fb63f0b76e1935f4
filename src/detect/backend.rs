use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::overlay::OverlayFlags;

/// Object detection network.
///
/// Implementations run inference on the frame they are given and, when
/// `overlay` asks for it, draw the overlay straight onto that same frame.
/// The returned detections keep the network's own ordering.
pub trait Network {
    /// Network identifier shown in the status line.
    fn name(&self) -> &str;

    /// Run detection on `frame`, drawing the requested overlay in place.
    fn detect(&mut self, frame: &mut Frame, overlay: OverlayFlags) -> Result<Vec<Detection>>;

    /// Frames per second of the network alone, measured over recent calls.
    fn throughput(&self) -> f32;
}

impl<N: Network + ?Sized> Network for Box<N> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&mut self, frame: &mut Frame, overlay: OverlayFlags) -> Result<Vec<Detection>> {
        (**self).detect(frame, overlay)
    }

    fn throughput(&self) -> f32 {
        (**self).throughput()
    }
}
