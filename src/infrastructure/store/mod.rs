//! Clip record persistence

mod toml_store;

pub use toml_store::{TomlClipStore, SCHEMA_VERSION};
