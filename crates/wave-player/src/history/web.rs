use std::rc::Rc;

use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Request, RequestInit, RequestMode, Response};

use super::{
    error_message, parse_saved_id, parse_song_list, MarkPlayedBody, PlayHistory, SaveBody, SavedCallback, SongRecord,
    RECENT_PATH, SAVE_PATH, SONGS_PATH,
};
use crate::config::BackendSettings;
use crate::error::{describe_js, PlayerError};
use crate::track::{Track, TrackOrigin};

/// `fetch`-based client for the music backend.
#[derive(Clone)]
pub struct RestClient {
    settings: Rc<BackendSettings>,
}

impl RestClient {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings: Rc::new(settings),
        }
    }

    /// The signed-in user's library.
    pub async fn fetch_tracks(&self) -> Result<Vec<Track>, PlayerError> {
        let text = self.send("GET", SONGS_PATH, None).await?;
        parse_song_list(&text)
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<String, PlayerError> {
        let json = serde_json::to_string(body)?;
        self.send("POST", path, Some(json)).await
    }

    async fn send(&self, method: &str, path: &str, body: Option<String>) -> Result<String, PlayerError> {
        let js_err = |e: JsValue| PlayerError::Tracking(describe_js(&e));
        let window = web_sys::window().ok_or(PlayerError::Unavailable("window"))?;

        let init = RequestInit::new();
        init.set_method(method);
        init.set_mode(RequestMode::Cors);
        if let Some(body) = &body {
            init.set_body(&JsValue::from_str(body));
        }
        let url = format!("{}{path}", self.settings.base_url.trim_end_matches('/'));
        let request = Request::new_with_str_and_init(&url, &init).map_err(js_err)?;
        let headers = request.headers();
        headers.set("Content-Type", "application/json").map_err(js_err)?;
        if let Some(token) = self.token() {
            headers.set("Authorization", &format!("Bearer {token}")).map_err(js_err)?;
        }

        let response: Response = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(js_err)?
            .dyn_into()
            .map_err(js_err)?;
        let text = JsFuture::from(response.text().map_err(js_err)?)
            .await
            .map_err(js_err)?
            .as_string()
            .unwrap_or_default();
        if !response.ok() {
            return Err(PlayerError::Tracking(error_message(response.status(), &text)));
        }
        Ok(text)
    }

    fn token(&self) -> Option<String> {
        let storage = web_sys::window()?.local_storage().ok()??;
        storage.get_item(&self.settings.token_key).ok()?
    }
}

impl PlayHistory for RestClient {
    fn mark_played(&self, id: &str) {
        let client = self.clone();
        let id = id.to_owned();
        spawn_local(async move {
            match client.post(RECENT_PATH, &MarkPlayedBody { song_id: &id }).await {
                Ok(_) => log::info!("play of {id} recorded"),
                Err(e) => log::warn!("{e}"),
            }
        });
    }

    fn save_external(&self, track: &Track, on_saved: SavedCallback) {
        debug_assert_eq!(track.origin, TrackOrigin::External);
        let client = self.clone();
        let track = track.clone();
        spawn_local(async move {
            let body = SaveBody {
                items: vec![SongRecord::from(&track)],
            };
            let id = match client.post(SAVE_PATH, &body).await.and_then(|text| parse_saved_id(&text)) {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("saving {:?} failed: {e}", track.title);
                    None
                }
            };
            on_saved(id);
        });
    }
}
