//! TOML clip record store
//!
//! One `<id>.toml` record per clip under the store root, next to the clip's
//! `<id>.data` directory. Records carry a schema version; fields added in
//! later versions must be optional so older records keep loading.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::application::ports::ClipStore;
use crate::domain::clip::{Clip, ClipId};
use crate::domain::error::StoreError;

/// Version written into every record
pub const SCHEMA_VERSION: u32 = 1;

const RECORD_EXTENSION: &str = "toml";

#[derive(Debug, Serialize, Deserialize)]
struct ClipRecord {
    schema_version: u32,
    clip: Clip,
}

/// Read before the full record so newer layouts fail with a clear error
#[derive(Debug, Deserialize)]
struct VersionHeader {
    schema_version: u32,
}

/// Clip store keeping one TOML file per clip
pub struct TomlClipStore {
    root: PathBuf,
}

impl TomlClipStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// New clip whose data directory lives under this store
    pub fn create_clip(&self, title: impl Into<String>) -> Clip {
        Clip::create_in(&self.root, title)
    }

    fn record_path(&self, id: &ClipId) -> PathBuf {
        self.root.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    fn parse(content: &str) -> Result<Clip, StoreError> {
        let header: VersionHeader =
            toml::from_str(content).map_err(|e| StoreError::Parse(e.to_string()))?;
        if header.schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: header.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        let record: ClipRecord =
            toml::from_str(content).map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(record.clip)
    }

    fn render(clip: &Clip) -> Result<String, StoreError> {
        let record = ClipRecord {
            schema_version: SCHEMA_VERSION,
            clip: clip.clone(),
        };
        toml::to_string_pretty(&record).map_err(|e| StoreError::Write(e.to_string()))
    }

    async fn read_record(&self, path: &Path) -> Result<Clip, StoreError> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(path.display().to_string())
            } else {
                StoreError::Read(format!("{}: {}", path.display(), e))
            }
        })?;
        Self::parse(&content)
    }
}

#[async_trait]
impl ClipStore for TomlClipStore {
    async fn load_clip(&self, id: &ClipId) -> Result<Clip, StoreError> {
        self.read_record(&self.record_path(id)).await
    }

    async fn save_clip(&self, clip: &Clip) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", self.root.display(), e)))?;

        let content = Self::render(clip)?;
        let path = self.record_path(&clip.id);
        let staging = path.with_extension("toml.tmp");

        fs::write(&staging, content)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", staging.display(), e)))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", path.display(), e)))?;

        log::debug!("Saved clip {} to {}", clip.id, path.display());
        Ok(())
    }

    async fn delete_clip(&self, id: &ClipId) -> Result<(), StoreError> {
        let path = self.record_path(id);
        let clip = self.read_record(&path).await?;

        match fs::remove_dir_all(&clip.data_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::Write(format!(
                    "{}: {}",
                    clip.data_dir.display(),
                    e
                )))
            }
        }
        fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", path.display(), e)))?;

        log::info!("Deleted clip {} ({})", clip.id, clip.title);
        Ok(())
    }

    async fn list_clips(&self) -> Result<Vec<Clip>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Read(format!("{}: {}", self.root.display(), e))),
        };

        let mut clips = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match self.read_record(&path).await {
                Ok(clip) => clips.push(clip),
                Err(e) => log::warn!("Skipping clip record {}: {}", path.display(), e),
            }
        }

        clips.sort_by_key(|clip| clip.recorded_at);
        Ok(clips)
    }
}
