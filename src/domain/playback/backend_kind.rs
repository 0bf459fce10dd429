//! Choosing a playback backend from clip metadata

use std::fmt;
use std::path::Path;

use crate::domain::clip::Clip;

/// The two ways a clip can be played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Decode a local file and render it
    LocalDecode,
    /// Stream from a remote URI
    NetworkStream,
}

impl BackendKind {
    /// Pick the backend for `clip`.
    ///
    /// Recorded clips and sources whose extension is in `local_extensions`
    /// decode locally, `http(s)` sources stream. Anything else has no backend.
    pub fn select(clip: &Clip, local_extensions: &[String]) -> Option<Self> {
        if clip.is_local_recording() {
            return Some(Self::LocalDecode);
        }
        let source = clip.source.as_deref()?;
        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(Self::NetworkStream);
        }
        let extension = Path::new(source)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;
        local_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(&extension))
            .then_some(Self::LocalDecode)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LocalDecode => "local-decode",
            Self::NetworkStream => "network-stream",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
