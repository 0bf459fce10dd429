//! Player states and the transition decision table

use std::fmt;

/// Player states.
///
/// `Buffering` and `Error` are only ever reported to observers. They are
/// normalized to `Playing` and `None` before any transition decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerState {
    /// Nothing bound, or playback finished
    #[default]
    None,
    Preparing,
    Paused,
    Playing,
    Buffering,
    Error,
}

impl PlayerState {
    /// Get the string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Preparing => "preparing",
            Self::Paused => "paused",
            Self::Playing => "playing",
            Self::Buffering => "buffering",
            Self::Error => "error",
        }
    }

    /// Collapse pseudo-states onto the primary state they stand for
    pub const fn normalize(self) -> Self {
        match self {
            Self::Buffering => Self::Playing,
            Self::Error => Self::None,
            other => other,
        }
    }

    pub const fn is_pseudo(&self) -> bool {
        matches!(self, Self::Buffering | Self::Error)
    }

    const fn index(self) -> usize {
        match self.normalize() {
            Self::None => 0,
            Self::Preparing => 1,
            Self::Paused => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the control loop does to move from the current to the desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Wait for the in-flight prepare to finish
    Ignore,
    /// Already there
    None,
    Prepare,
    Resume,
    Stop,
    Pause,
    /// Stop, then prepare again
    Reset,
    /// Prepare, then play once ready
    Start,
}

impl Action {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::None => "none",
            Self::Prepare => "prepare",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Reset => "reset",
            Self::Start => "start",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rows: current state. Columns: desired state.
/// Order: None, Preparing, Paused, Playing.
const DECISIONS: [[Action; 4]; 4] = [
    [Action::None, Action::Prepare, Action::Prepare, Action::Start],
    [Action::Ignore, Action::None, Action::Ignore, Action::Ignore],
    [Action::Stop, Action::Reset, Action::None, Action::Resume],
    [Action::Stop, Action::Reset, Action::Pause, Action::None],
];

/// Decide the action taking the player from `current` to `desired`.
///
/// A desired `Error` always stops, whatever the current state.
pub fn decide(current: PlayerState, desired: PlayerState) -> Action {
    if desired == PlayerState::Error {
        return Action::Stop;
    }
    DECISIONS[current.index()][desired.index()]
}
