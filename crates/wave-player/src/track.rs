use serde::{Deserialize, Deserializer, Serialize};

/// Where a track came from. External tracks have no server-side identity
/// until they are saved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOrigin {
    #[default]
    Library,
    External,
}

// Field aliases accept the backend's song records as-is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    #[serde(alias = "song")]
    pub title: String,
    #[serde(default, alias = "music")]
    pub artist: Option<String>,
    #[serde(default, alias = "image")]
    pub artwork_uri: String,
    #[serde(alias = "media_url")]
    pub media_uri: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub origin: TrackOrigin,
}

impl Track {
    pub fn new(title: impl Into<String>, media_uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            media_uri: media_uri.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_artwork(mut self, uri: impl Into<String>) -> Self {
        self.artwork_uri = uri.into();
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = known_duration(seconds);
        self
    }

    pub fn external(mut self) -> Self {
        self.origin = TrackOrigin::External;
        self
    }

    pub fn artist_label(&self) -> &str {
        self.artist.as_deref().unwrap_or("Unknown Artist")
    }

    /// Tracks are identified by media URI within a queue.
    pub fn same_media(&self, other: &Track) -> bool {
        self.media_uri == other.media_uri
    }
}

// The backend hands out both numeric and string ids.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Media elements report `NaN`/infinite durations before metadata loads.
pub fn known_duration(seconds: f64) -> Option<f64> {
    (seconds.is_finite() && seconds > 0.0).then_some(seconds)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    Single,
    All,
}

impl RepeatMode {
    /// none → all → single → none
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::Single,
            RepeatMode::Single => RepeatMode::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RepeatMode::None => "Repeat off",
            RepeatMode::Single => "Repeat one",
            RepeatMode::All => "Repeat all",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

pub const PLAYBACK_RATES: [f64; 5] = [1.0, 1.25, 1.5, 1.75, 2.0];

/// The authoritative playback state. Surfaces only ever see clones of it.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub track: Option<Track>,
    pub status: PlaybackStatus,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub volume: f64,
    pub muted: bool,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    pub playback_rate: f64,
    /// Whether the presentation surfaces are shown.
    pub visible: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            track: None,
            status: PlaybackStatus::Idle,
            current_time: 0.0,
            duration: None,
            volume: 1.0,
            muted: false,
            repeat: RepeatMode::None,
            shuffle: false,
            playback_rate: 1.0,
            visible: false,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn progress(&self) -> f32 {
        match self.duration {
            Some(d) => (self.current_time / d).clamp(0.0, 1.0) as f32,
            None => 0.0,
        }
    }
}

/// `m:ss`, or `h:mm:ss` past an hour. Unknown times render as `0:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_owned();
    }
    let total = seconds as u64;
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}
