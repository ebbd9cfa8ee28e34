use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{HtmlAudioElement, HtmlMediaElement};

use super::{EventInbox, MediaElement, PlayTicket, PlayerEvent};
use crate::error::{describe_js, PlayerError};

type Listener = Closure<dyn FnMut()>;

/// The page's single `<audio>` element. Its events are forwarded to the
/// controller's inbox for as long as this value lives.
pub struct WebMediaElement {
    node: HtmlMediaElement,
    inbox: EventInbox,
    listeners: Vec<(&'static str, Listener)>,
}

impl WebMediaElement {
    /// Create the element, attach it to `<body>` under `id` and start listening.
    pub fn create(id: &str, inbox: EventInbox) -> Result<Self, PlayerError> {
        let js_err = |e: JsValue| PlayerError::Playback(describe_js(&e));
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or(PlayerError::Unavailable("document"))?;

        let audio = HtmlAudioElement::new().map_err(js_err)?;
        audio.set_id(id);
        audio.set_cross_origin(Some("anonymous"));
        audio.set_preload("metadata");
        // in the DOM so a detached window can find it by id
        let body = document.body().ok_or(PlayerError::Unavailable("document body"))?;
        body.append_child(&audio).map_err(js_err)?;

        let mut element = Self {
            node: HtmlMediaElement::from(audio),
            inbox,
            listeners: Vec::new(),
        };
        element.listen().map_err(js_err)?;
        log::debug!("audio element #{id} ready");
        Ok(element)
    }

    fn listen(&mut self) -> Result<(), JsValue> {
        let events: [(&'static str, fn(&HtmlMediaElement) -> PlayerEvent); 7] = [
            ("timeupdate", |m| PlayerEvent::TimeUpdate(m.current_time())),
            ("durationchange", |m| PlayerEvent::DurationChange(m.duration())),
            ("loadedmetadata", |m| PlayerEvent::DurationChange(m.duration())),
            ("play", |_| PlayerEvent::Playing),
            ("playing", |_| PlayerEvent::Playing),
            ("pause", |_| PlayerEvent::Paused),
            ("ended", |_| PlayerEvent::Ended),
        ];
        for (name, make) in events {
            let inbox = self.inbox.clone();
            let media = self.node.clone();
            let listener = Listener::new(move || inbox.push(make(&media)));
            self.node
                .add_event_listener_with_callback(name, listener.as_ref().unchecked_ref())?;
            self.listeners.push((name, listener));
        }
        Ok(())
    }
}

impl Drop for WebMediaElement {
    fn drop(&mut self) {
        for (name, listener) in self.listeners.drain(..) {
            if let Err(e) = self
                .node
                .remove_event_listener_with_callback(name, listener.as_ref().unchecked_ref())
            {
                log::debug!("removing {name} listener: {}", describe_js(&e));
            }
        }
        if let Err(e) = self.node.pause() {
            log::debug!("pause on drop: {}", describe_js(&e));
        }
    }
}

impl MediaElement for WebMediaElement {
    type Node = HtmlMediaElement;

    fn node(&self) -> &HtmlMediaElement {
        &self.node
    }

    fn set_source(&self, uri: &str) {
        self.node.set_src(uri);
    }

    fn load(&self) {
        self.node.load();
    }

    fn play(&self, ticket: PlayTicket) {
        let inbox = self.inbox.clone();
        match self.node.play() {
            Ok(promise) => spawn_local(async move {
                let result = JsFuture::from(promise)
                    .await
                    .map(|_| ())
                    .map_err(|e| PlayerError::Playback(describe_js(&e)));
                inbox.push(PlayerEvent::PlaySettled { ticket, result });
            }),
            Err(e) => inbox.push(PlayerEvent::PlaySettled {
                ticket,
                result: Err(PlayerError::Playback(describe_js(&e))),
            }),
        }
    }

    fn pause(&self) {
        if let Err(e) = self.node.pause() {
            log::warn!("pause failed: {}", describe_js(&e));
        }
    }

    fn current_time(&self) -> f64 {
        self.node.current_time()
    }

    fn set_current_time(&self, seconds: f64) {
        self.node.set_current_time(seconds);
    }

    fn duration(&self) -> f64 {
        self.node.duration()
    }

    fn set_volume(&self, level: f64) {
        self.node.set_volume(level);
    }

    fn set_muted(&self, muted: bool) {
        self.node.set_muted(muted);
    }

    fn set_playback_rate(&self, rate: f64) {
        self.node.set_playback_rate(rate);
    }
}
