//! Clips and their recorded segments

#[allow(clippy::module_inception)]
mod clip;
pub mod layout;
mod segment;

pub use clip::{Clip, ClipId, Location, UploadState};
pub use segment::Segment;
