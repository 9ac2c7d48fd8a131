use crate::time::duration_from_secs;
use std::time::{Duration, Instant};

/// Latest playback report from the audio transport
#[derive(Debug, Clone)]
pub struct PlaybackState {
    /// Whether audio is currently playing
    pub is_playing: bool,
    /// Current playback position
    pub position: Duration,
    /// Total audio duration
    pub duration: Duration,
    /// When this state was last updated (for interpolation)
    pub updated_at: Instant,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            updated_at: Instant::now(),
        }
    }
}

impl PlaybackState {
    /// Create a new playback state
    #[must_use]
    pub fn new(is_playing: bool, position: Duration, duration: Duration) -> Self {
        Self {
            is_playing,
            position,
            duration,
            updated_at: Instant::now(),
        }
    }

    /// Create a playback state from real-second values reported by a player.
    ///
    /// Negative or NaN values clamp to zero.
    #[must_use]
    pub fn from_secs(is_playing: bool, position_secs: f64, duration_secs: f64) -> Self {
        Self::new(
            is_playing,
            duration_from_secs(position_secs),
            duration_from_secs(duration_secs),
        )
    }

    /// Get interpolated position based on time elapsed since last update
    #[must_use]
    pub fn interpolated_position(&self) -> Duration {
        if !self.is_playing {
            return self.position;
        }

        let interpolated = self.position.saturating_add(self.updated_at.elapsed());

        // Unknown duration means nothing to clamp against
        if self.duration.is_zero() {
            interpolated
        } else {
            interpolated.min(self.duration)
        }
    }
}
