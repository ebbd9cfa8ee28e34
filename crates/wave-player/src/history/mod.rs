//! Listening history: recording plays and persisting external tracks.

#[cfg(target_arch = "wasm32")]
pub mod web;

use serde::{Deserialize, Serialize};

use crate::error::PlayerError;
use crate::track::Track;

/// Receives the id assigned by a save, or `None` when the save failed.
pub type SavedCallback = Box<dyn FnOnce(Option<String>)>;

/// Where plays are recorded. Implementations never block and never fail
/// loudly; errors are logged on their side.
pub trait PlayHistory {
    fn mark_played(&self, id: &str);
    fn save_external(&self, track: &Track, on_saved: SavedCallback);
}

/// History for pages without a backend.
#[derive(Default)]
pub struct LocalHistory;

impl PlayHistory for LocalHistory {
    fn mark_played(&self, id: &str) {
        log::debug!("played {id} (not persisted)");
    }

    fn save_external(&self, track: &Track, on_saved: SavedCallback) {
        log::debug!("external track {:?} not persisted", track.title);
        on_saved(None);
    }
}

pub const RECENT_PATH: &str = "/api/recent/RecentMusic";
pub const SAVE_PATH: &str = "/api/music/savetosongs";
pub const SONGS_PATH: &str = "/api/music";

#[derive(Serialize)]
pub struct MarkPlayedBody<'a> {
    pub song_id: &'a str,
}

/// A track in the shape the songs endpoints expect.
#[derive(Serialize)]
pub struct SongRecord<'a> {
    pub song: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music: Option<&'a str>,
    pub image: &'a str,
    pub media_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl<'a> From<&'a Track> for SongRecord<'a> {
    fn from(track: &'a Track) -> Self {
        Self {
            song: &track.title,
            music: track.artist.as_deref(),
            image: &track.artwork_uri,
            media_url: &track.media_uri,
            duration: track.duration,
        }
    }
}

#[derive(Serialize)]
pub struct SaveBody<'a> {
    pub items: Vec<SongRecord<'a>>,
}

#[derive(Deserialize)]
struct SongList {
    #[serde(default)]
    songs: Vec<Track>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Tracks listed in a `{songs: [...]}` response.
pub fn parse_song_list(text: &str) -> Result<Vec<Track>, PlayerError> {
    Ok(serde_json::from_str::<SongList>(text)?.songs)
}

/// Id of the first saved song, if the backend returned one.
pub fn parse_saved_id(text: &str) -> Result<Option<String>, PlayerError> {
    let saved = serde_json::from_str::<SongList>(text)?;
    Ok(saved.songs.into_iter().next().and_then(|t| t.id))
}

/// Message for a non-success response, preferring the backend's own.
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("HTTP error! status: {status}"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_body_uses_backend_field_names() {
        let track = Track::new("Blue", "blue.mp3").with_artwork("blue.jpg").external();
        let body = SaveBody {
            items: vec![SongRecord::from(&track)],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"items": [{"song": "Blue", "image": "blue.jpg", "media_url": "blue.mp3"}]})
        );
        let mark = serde_json::to_string(&MarkPlayedBody { song_id: "9" }).unwrap();
        assert_eq!(mark, r#"{"song_id":"9"}"#);
    }

    #[test]
    fn saved_id_comes_from_first_song() {
        let id = parse_saved_id(r#"{"songs": [{"id": 12, "song": "Blue", "media_url": "blue.mp3"}]}"#).unwrap();
        assert_eq!(id.as_deref(), Some("12"));
        assert_eq!(parse_saved_id(r#"{"songs": []}"#).unwrap(), None);
        assert_eq!(parse_saved_id(r#"{"status": "ok"}"#).unwrap(), None);
        assert!(parse_saved_id("<html>").is_err());
    }

    #[test]
    fn song_list_parses_backend_records() {
        let tracks = parse_song_list(
            r#"{"status": "success", "length": 2, "songs": [
                {"id": "1", "song": "One", "music": "A", "image": "1.jpg", "media_url": "1.mp3"},
                {"id": "2", "song": "Two", "media_url": "2.mp3"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].artist_label(), "Unknown Artist");
    }

    #[test]
    fn error_messages() {
        assert_eq!(error_message(401, r#"{"message": "jwt expired"}"#), "jwt expired");
        assert_eq!(error_message(502, "Bad Gateway"), "HTTP error! status: 502");
    }

    #[test]
    fn local_history_reports_no_id() {
        let saved = std::rc::Rc::new(std::cell::Cell::new(true));
        let flag = saved.clone();
        LocalHistory.save_external(&Track::new("x", "x.mp3"), Box::new(move |id| flag.set(id.is_some())));
        assert!(!saved.get());
    }
}
