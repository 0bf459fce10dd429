//! Observer-facing playback snapshot

use super::state::PlayerState;
use crate::domain::clip::ClipId;

/// What observers are told on every state change and progress tick
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlayerState,
    /// Seconds played of the bound clip
    pub progress: f64,
    /// Total seconds of the bound clip
    pub total: f64,
    pub clip_id: Option<ClipId>,
    pub title: Option<String>,
}

impl PlaybackStatus {
    pub fn idle() -> Self {
        Self {
            state: PlayerState::None,
            progress: 0.0,
            total: 0.0,
            clip_id: None,
            title: None,
        }
    }
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self::idle()
    }
}
