//! Audio render infrastructure

mod rodio_output;

pub use rodio_output::RodioOutput;
