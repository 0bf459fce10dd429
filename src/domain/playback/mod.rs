//! Playback state machine domain

mod backend_kind;
mod state;
mod status;

pub use backend_kind::BackendKind;
pub use state::{decide, Action, PlayerState};
pub use status::PlaybackStatus;
