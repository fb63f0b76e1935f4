use std::time::Duration;

/// Exponentially smoothed frames-per-second estimate.
#[derive(Clone, Debug)]
pub struct ThroughputMeter {
    smoothing: f32,
    mean_secs: Option<f32>,
}

impl ThroughputMeter {
    /// `smoothing` is the weight given to the newest sample (0..=1).
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.01, 1.0),
            mean_secs: None,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f32();
        self.mean_secs = Some(match self.mean_secs {
            Some(mean) => mean + self.smoothing * (sample - mean),
            None => sample,
        });
    }

    /// Zero until the first sample is recorded.
    pub fn fps(&self) -> f32 {
        match self.mean_secs {
            Some(mean) if mean > 0.0 => 1.0 / mean,
            _ => 0.0,
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(0.1)
    }
}
