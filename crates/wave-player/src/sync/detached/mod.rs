//! The mini player running in its own window.
//!
//! It learns what is playing from pushed [`OutboundMessage`]s and
//! reconstructs the transport position by polling the opener's audio
//! element. Either path alone is enough to keep the view roughly current.

#[cfg(target_arch = "wasm32")]
pub mod web;

use super::OutboundMessage;
use crate::track::{format_time, known_duration, RepeatMode};

/// One read of the opener's audio element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollSample {
    pub current_time: f64,
    pub duration: f64,
    pub paused: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetachedView {
    pub title: String,
    pub artist: String,
    pub artwork: String,
    pub repeat: RepeatMode,
    pub playing: bool,
    pub current_time: f64,
    pub duration: Option<f64>,
}

impl DetachedView {
    /// Returns whether anything visible changed.
    pub fn apply(&mut self, message: OutboundMessage) -> bool {
        let before = self.clone();
        match message {
            OutboundMessage::SongUpdate { image, song, artist } => {
                self.title = song;
                self.artist = artist;
                self.artwork = image;
            }
            OutboundMessage::RepeatUpdate { mode } => self.repeat = mode,
        }
        *self != before
    }

    /// `None` means the opener could not be read; the view keeps what it has.
    pub fn apply_poll(&mut self, sample: Option<PollSample>) -> bool {
        let Some(sample) = sample else {
            return false;
        };
        let before = self.clone();
        if sample.current_time.is_finite() {
            self.current_time = sample.current_time.max(0.0);
        }
        self.duration = known_duration(sample.duration);
        self.playing = !sample.paused;
        *self != before
    }

    pub fn progress(&self) -> f64 {
        match self.duration {
            Some(d) => (self.current_time / d).clamp(0.0, 1.0),
            None => 0.0,
        }
    }

    pub fn time_label(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.current_time),
            format_time(self.duration.unwrap_or(f64::NAN))
        )
    }
}
