use js_sys::{Array, Function, Reflect, JSON};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, Window};

use super::{
    Capabilities, DetachedOpener, InboundCommand, MediaSessionSurface, OutboundMessage, SurfaceChannel,
    SESSION_ACTIONS,
};
use crate::config::SyncSettings;
use crate::error::{describe_js, PlayerError};
use crate::playback::CommandInbox;
use crate::track::Track;

/// Serialize through JSON into a plain structured-clone-able JS object.
pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, PlayerError> {
    let text = serde_json::to_string(value)?;
    JSON::parse(&text).map_err(|e| PlayerError::Channel(describe_js(&e)))
}

pub(crate) fn from_js<T: DeserializeOwned>(value: &JsValue) -> Option<T> {
    let text = JSON::stringify(value).ok()?.as_string()?;
    serde_json::from_str(&text).ok()
}

pub(crate) fn page_origin(window: &Window) -> Option<String> {
    window.location().origin().ok()
}

pub fn detect_capabilities() -> Capabilities {
    let Some(window) = web_sys::window() else {
        return Capabilities::default();
    };
    let capabilities = Capabilities {
        media_session: media_session(&window).is_some()
            && Reflect::has(&window, &"MediaMetadata".into()).unwrap_or(false),
        detached_window: Reflect::get(&window, &"open".into()).is_ok_and(|f| f.is_function()),
    };
    log::info!("browser capabilities: {capabilities:?}");
    capabilities
}

fn media_session(window: &Window) -> Option<JsValue> {
    Reflect::get(&window.navigator(), &"mediaSession".into())
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

pub struct WebDetachedChannel {
    window: Window,
    origin: String,
}

impl SurfaceChannel for WebDetachedChannel {
    fn is_closed(&self) -> bool {
        self.window.closed().unwrap_or(true)
    }

    fn post(&self, message: &OutboundMessage) -> Result<(), PlayerError> {
        let payload = to_js(message)?;
        self.window
            .post_message(&payload, &self.origin)
            .map_err(|e| PlayerError::Channel(describe_js(&e)))
    }

    fn close(&self) {
        if let Err(e) = self.window.close() {
            log::debug!("closing detached window: {}", describe_js(&e));
        }
    }
}

pub struct WebDetachedOpener {
    settings: SyncSettings,
}

impl WebDetachedOpener {
    pub fn new(settings: SyncSettings) -> Self {
        Self { settings }
    }
}

impl DetachedOpener for WebDetachedOpener {
    fn open(&self) -> Result<Box<dyn SurfaceChannel>, PlayerError> {
        let window = web_sys::window().ok_or(PlayerError::Unavailable("window"))?;
        let origin = page_origin(&window).ok_or(PlayerError::Unavailable("location origin"))?;
        let detached = window
            .open_with_url_and_target_and_features(
                &self.settings.detached_url,
                &self.settings.detached_name,
                &self.settings.detached_features,
            )
            .map_err(|e| PlayerError::Channel(describe_js(&e)))?
            .ok_or_else(|| PlayerError::Channel("popup blocked".into()))?;
        Ok(Box::new(WebDetachedChannel {
            window: detached,
            origin,
        }))
    }
}

#[derive(Serialize)]
struct ArtworkImage<'a> {
    src: &'a str,
    sizes: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct MetadataInit<'a> {
    title: &'a str,
    artist: &'a str,
    artwork: Vec<ArtworkImage<'a>>,
}

/// `navigator.mediaSession`, reached through reflection since the binding is
/// still behind unstable web-sys APIs.
pub struct WebMediaSession {
    session: JsValue,
    handlers: Vec<Closure<dyn FnMut()>>,
}

impl WebMediaSession {
    pub fn detect() -> Option<Self> {
        let session = media_session(&web_sys::window()?)?;
        Some(Self {
            session,
            handlers: Vec::new(),
        })
    }

    fn set(&self, key: &str, value: &JsValue) {
        if let Err(e) = Reflect::set(&self.session, &key.into(), value) {
            log::warn!("media session {key}: {}", describe_js(&e));
        }
    }
}

impl MediaSessionSurface for WebMediaSession {
    fn register_handlers(&mut self, commands: CommandInbox) -> Result<(), PlayerError> {
        let js_err = |e: JsValue| PlayerError::Channel(describe_js(&e));
        let set_handler: Function = Reflect::get(&self.session, &"setActionHandler".into())
            .map_err(js_err)?
            .dyn_into()
            .map_err(js_err)?;
        for (action, command) in SESSION_ACTIONS {
            let commands = commands.clone();
            let handler = Closure::wrap(Box::new(move || commands.push(command)) as Box<dyn FnMut()>);
            // replaces whatever handler a previous registration installed
            set_handler
                .call2(&self.session, &action.into(), handler.as_ref())
                .map_err(js_err)?;
            self.handlers.push(handler);
        }
        Ok(())
    }

    fn set_metadata(&self, track: &Track) -> Result<(), PlayerError> {
        let js_err = |e: JsValue| PlayerError::Channel(describe_js(&e));
        let window = web_sys::window().ok_or(PlayerError::Unavailable("window"))?;
        let constructor: Function = Reflect::get(&window, &"MediaMetadata".into())
            .map_err(js_err)?
            .dyn_into()
            .map_err(js_err)?;
        let init = to_js(&MetadataInit {
            title: &track.title,
            artist: track.artist_label(),
            artwork: vec![ArtworkImage {
                src: &track.artwork_uri,
                sizes: "512x512",
                kind: "image/jpeg",
            }],
        })?;
        let metadata = Reflect::construct(&constructor, &Array::of1(&init)).map_err(js_err)?;
        self.set("metadata", &metadata);
        Ok(())
    }

    fn clear(&self) {
        self.set("metadata", &JsValue::NULL);
        self.set("playbackState", &"none".into());
    }

    fn set_playback_state(&self, playing: bool) {
        self.set("playbackState", &(if playing { "playing" } else { "paused" }).into());
    }
}

/// Forwards same-origin `{action}` messages from the detached window.
pub struct CommandListener {
    window: Window,
    closure: Closure<dyn FnMut(MessageEvent)>,
}

impl CommandListener {
    pub fn install(commands: CommandInbox) -> Result<Self, PlayerError> {
        let window = web_sys::window().ok_or(PlayerError::Unavailable("window"))?;
        let origin = page_origin(&window).ok_or(PlayerError::Unavailable("location origin"))?;
        let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
            if event.origin() != origin {
                return;
            }
            match from_js::<InboundCommand>(&event.data()) {
                Some(command) => commands.push(command.into()),
                None => log::debug!("ignoring unrelated window message"),
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        window
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            .map_err(|e| PlayerError::Channel(describe_js(&e)))?;
        Ok(Self { window, closure })
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        if let Err(e) = self
            .window
            .remove_event_listener_with_callback("message", self.closure.as_ref().unchecked_ref())
        {
            log::debug!("removing command listener: {}", describe_js(&e));
        }
    }
}
