//! Clip persistence port interface

use async_trait::async_trait;

use crate::domain::clip::{Clip, ClipId};
use crate::domain::error::StoreError;

/// Port for loading and saving clip records
#[async_trait]
pub trait ClipStore: Send + Sync {
    /// Load the clip record for `id`.
    async fn load_clip(&self, id: &ClipId) -> Result<Clip, StoreError>;

    /// Save a clip record, replacing any previous version.
    async fn save_clip(&self, clip: &Clip) -> Result<(), StoreError>;

    /// Delete a clip record together with its data directory.
    async fn delete_clip(&self, id: &ClipId) -> Result<(), StoreError>;

    /// Load every stored clip, oldest recording first.
    async fn list_clips(&self) -> Result<Vec<Clip>, StoreError>;
}
