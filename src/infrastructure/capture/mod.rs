//! Audio capture infrastructure

mod cpal_input;

pub use cpal_input::CpalInput;
