use anyhow::Result;

use super::Sink;
use crate::frame::{Frame, FrameSpec};
use crate::ui::StatusLine;

/// Terminal "display": frames are accounted for, the status text is shown on
/// a live status line.
pub struct DisplaySink {
    index: u32,
    status: StatusLine,
    frames: u64,
    last_spec: Option<FrameSpec>,
}

impl DisplaySink {
    pub fn new(index: u32, status: StatusLine) -> Self {
        Self {
            index,
            status,
            frames: 0,
            last_spec: None,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn status(&self) -> &str {
        self.status.current()
    }
}

impl Sink for DisplaySink {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        let spec = frame.spec();
        if self.last_spec != Some(spec) {
            log::info!("display://{}: presenting {}", self.index, spec);
            self.last_spec = Some(spec);
        }
        self.frames += 1;
        log::debug!("display://{}: frame {}", self.index, self.frames);
        Ok(())
    }

    fn set_status(&mut self, status: &str) {
        self.status.set(status);
    }
}
