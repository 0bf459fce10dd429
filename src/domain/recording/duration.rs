//! Duration value object

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::domain::error::DurationParseError;

/// Default interval between playback progress notifications
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Default idle sleep of the playback control loop when nothing wakes it
pub const DEFAULT_IDLE_WAIT_MS: u64 = 60 * 1000;

/// Default delay before the control loop retries a failed action
pub const DEFAULT_RETRY_WAIT_MS: u64 = 251;

/// Value object representing a time duration.
/// Immutable and validated on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    milliseconds: u64,
}

impl Duration {
    /// Create a Duration from milliseconds
    pub const fn from_millis(ms: u64) -> Self {
        Self { milliseconds: ms }
    }

    /// Create a Duration from seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            milliseconds: secs * 1000,
        }
    }

    pub const fn default_progress_interval() -> Self {
        Self::from_millis(DEFAULT_PROGRESS_INTERVAL_MS)
    }

    pub const fn default_idle_wait() -> Self {
        Self::from_millis(DEFAULT_IDLE_WAIT_MS)
    }

    pub const fn default_retry_wait() -> Self {
        Self::from_millis(DEFAULT_RETRY_WAIT_MS)
    }

    /// Get duration in whole seconds
    pub const fn as_secs(&self) -> u64 {
        self.milliseconds / 1000
    }

    /// Get duration in milliseconds
    pub const fn as_millis(&self) -> u64 {
        self.milliseconds
    }

    /// Convert to std::time::Duration
    pub const fn as_std(&self) -> StdDuration {
        StdDuration::from_millis(self.milliseconds)
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;

    /// Parse a duration string into a Duration value object.
    /// Supported formats: "500ms", "30s", "1m", "2m30s", "1s250ms"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().to_lowercase();
        let invalid = || DurationParseError { input: s.to_string() };

        let mut total_ms: u64 = 0;
        let mut current_num = String::new();
        let mut found_any = false;
        let mut chars = input.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch.is_ascii_digit() {
                current_num.push(ch);
                continue;
            }
            if current_num.is_empty() {
                return Err(invalid());
            }
            let value: u64 = current_num.parse().map_err(|_| invalid())?;
            let unit_ms = match ch {
                'm' if chars.peek() == Some(&'s') => {
                    chars.next();
                    1
                }
                'm' => 60 * 1000,
                's' => 1000,
                _ => return Err(invalid()),
            };
            total_ms = value
                .checked_mul(unit_ms)
                .and_then(|v| total_ms.checked_add(v))
                .ok_or_else(invalid)?;
            current_num.clear();
            found_any = true;
        }

        // Leftover digits without a unit are not accepted
        if !current_num.is_empty() || !found_any || total_ms == 0 {
            return Err(invalid());
        }

        Ok(Self {
            milliseconds: total_ms,
        })
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.as_secs();
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        let millis = self.milliseconds % 1000;

        let mut out = String::new();
        if minutes > 0 {
            out.push_str(&format!("{}m", minutes));
        }
        if seconds > 0 {
            out.push_str(&format!("{}s", seconds));
        }
        if millis > 0 || out.is_empty() {
            out.push_str(&format!("{}ms", millis));
        }
        write!(f, "{}", out)
    }
}

impl From<Duration> for StdDuration {
    fn from(value: Duration) -> Self {
        value.as_std()
    }
}
