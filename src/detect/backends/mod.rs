pub mod synthetic;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use synthetic::SyntheticNetwork;

#[cfg(feature = "backend-tract")]
pub use tract::TractNetwork;
