//! Configuration store adapters

mod xdg;

pub use xdg::{default_clips_dir, XdgConfigStore};
