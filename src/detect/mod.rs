mod backend;
mod backends;
pub mod postprocess;
mod registry;
mod result;
mod throughput;

pub use backend::Network;
pub use backends::SyntheticNetwork;
#[cfg(feature = "backend-tract")]
pub use backends::TractNetwork;
pub use registry::{Labels, NetworkEntry, NetworkKind, NetworkRegistry, NetworkSettings};
pub use result::{BoundingBox, Detection};
pub use throughput::ThroughputMeter;
