use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Reflect;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{AddEventListenerOptions, Document, Element, Event, EventTarget, HtmlElement, HtmlImageElement, MessageEvent, Window};

use super::{DetachedView, PollSample};
use crate::config::SyncSettings;
use crate::error::{describe_js, PlayerError};
use crate::sync::web::{from_js, page_origin, to_js};
use crate::sync::{InboundCommand, OutboundMessage};

thread_local! {
    static RUNTIME: RefCell<Option<DetachedRuntime>> = const { RefCell::new(None) };
}

/// Element ids the detached page is expected to provide.
const TITLE_ID: &str = "dp-title";
const ARTIST_ID: &str = "dp-artist";
const ARTWORK_ID: &str = "dp-artwork";
const TIME_ID: &str = "dp-time";
const PROGRESS_ID: &str = "dp-progress";
const REPEAT_ID: &str = "dp-repeat";

struct DetachedRuntime {
    window: Window,
    interval: i32,
    listeners: Vec<(EventTarget, &'static str, Closure<dyn FnMut(Event)>)>,
    _poll: Closure<dyn FnMut()>,
}

impl Drop for DetachedRuntime {
    fn drop(&mut self) {
        self.window.clear_interval_with_handle(self.interval);
        for (target, name, listener) in &self.listeners {
            if let Err(e) = target.remove_event_listener_with_callback(name, listener.as_ref().unchecked_ref()) {
                log::debug!("removing {name} listener: {}", describe_js(&e));
            }
        }
        log::debug!("detached view stopped");
    }
}

/// Wire up the detached page: push messages in, clicks out, and a periodic
/// read of the opener's audio element. Stops itself on `pagehide`.
pub fn run(settings: &SyncSettings) -> Result<(), PlayerError> {
    let js_err = |e: JsValue| PlayerError::Channel(describe_js(&e));
    let window = web_sys::window().ok_or(PlayerError::Unavailable("window"))?;
    let document = window.document().ok_or(PlayerError::Unavailable("document"))?;
    let origin = page_origin(&window).ok_or(PlayerError::Unavailable("location origin"))?;
    let view = Rc::new(RefCell::new(DetachedView::default()));

    let on_message = {
        let view = view.clone();
        let document = document.clone();
        let origin = origin.clone();
        Closure::wrap(Box::new(move |event: Event| {
            let Some(event) = event.dyn_ref::<MessageEvent>() else {
                return;
            };
            if event.origin() != origin {
                return;
            }
            if let Some(message) = from_js::<OutboundMessage>(&event.data()) {
                if view.borrow_mut().apply(message) {
                    render(&document, &view.borrow());
                }
            }
        }) as Box<dyn FnMut(Event)>)
    };
    window
        .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
        .map_err(js_err)?;

    let on_click = {
        let window = window.clone();
        let origin = origin.clone();
        Closure::wrap(Box::new(move |event: Event| {
            let Some(action) = event
                .target()
                .and_then(|t| t.dyn_into::<Element>().ok())
                .and_then(|el| el.closest("[data-action]").ok().flatten())
                .and_then(|el| el.get_attribute("data-action"))
            else {
                return;
            };
            if let Err(e) = forward(&window, &origin, &action) {
                log::warn!("{e}");
            }
        }) as Box<dyn FnMut(Event)>)
    };
    document
        .add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())
        .map_err(js_err)?;

    let poll = {
        let window = window.clone();
        let document = document.clone();
        let view = view.clone();
        let audio_id = settings.audio_element_id.clone();
        Closure::wrap(Box::new(move || {
            let sample = read_opener(&window, &audio_id);
            if view.borrow_mut().apply_poll(sample) {
                render(&document, &view.borrow());
            }
        }) as Box<dyn FnMut()>)
    };
    let interval = window
        .set_interval_with_callback_and_timeout_and_arguments_0(poll.as_ref().unchecked_ref(), settings.poll_ms as i32)
        .map_err(js_err)?;

    let on_pagehide = Closure::once_into_js(move || {
        RUNTIME.with(|runtime| runtime.borrow_mut().take());
    });
    let once = AddEventListenerOptions::new();
    once.set_once(true);
    window
        .add_event_listener_with_callback_and_add_event_listener_options("pagehide", on_pagehide.unchecked_ref(), &once)
        .map_err(js_err)?;

    render(&document, &view.borrow());
    RUNTIME.with(|runtime| {
        *runtime.borrow_mut() = Some(DetachedRuntime {
            listeners: vec![
                (window.clone().into(), "message", on_message),
                (document.into(), "click", on_click),
            ],
            window,
            interval,
            _poll: poll,
        });
    });
    log::info!("detached view running");
    Ok(())
}

fn forward(window: &Window, origin: &str, action: &str) -> Result<(), PlayerError> {
    let command: InboundCommand = serde_json::from_value(serde_json::json!({ "action": action }))?;
    let opener = window
        .opener()
        .ok()
        .filter(|o| !o.is_null() && !o.is_undefined())
        .ok_or(PlayerError::ChannelClosed)?;
    // another realm: an instanceof check would fail
    let opener: Window = opener.unchecked_into();
    opener
        .post_message(&to_js(&command)?, origin)
        .map_err(|e| PlayerError::Channel(describe_js(&e)))
}

/// Same-origin only: any access error means "no sample".
fn read_opener(window: &Window, audio_id: &str) -> Option<PollSample> {
    let opener = window.opener().ok().filter(|o| !o.is_null() && !o.is_undefined())?;
    let document = Reflect::get(&opener, &"document".into()).ok()?;
    let lookup: js_sys::Function = Reflect::get(&document, &"getElementById".into()).ok()?.dyn_into().ok()?;
    let audio = lookup.call1(&document, &audio_id.into()).ok()?;
    if audio.is_null() || audio.is_undefined() {
        return None;
    }
    let number = |key: &str| Reflect::get(&audio, &key.into()).ok().and_then(|v| v.as_f64());
    Some(PollSample {
        current_time: number("currentTime")?,
        duration: number("duration").unwrap_or(f64::NAN),
        paused: Reflect::get(&audio, &"paused".into()).ok()?.as_bool()?,
    })
}

fn render(document: &Document, view: &DetachedView) {
    let set_text = |id: &str, text: &str| {
        if let Some(el) = document.get_element_by_id(id) {
            el.set_text_content(Some(text));
        }
    };
    set_text(TITLE_ID, &view.title);
    set_text(ARTIST_ID, &view.artist);
    set_text(TIME_ID, &view.time_label());
    set_text(REPEAT_ID, view.repeat.label());

    if let Some(img) = document
        .get_element_by_id(ARTWORK_ID)
        .and_then(|el| el.dyn_into::<HtmlImageElement>().ok())
    {
        if img.src() != view.artwork {
            img.set_src(&view.artwork);
        }
    }
    if let Some(bar) = document
        .get_element_by_id(PROGRESS_ID)
        .and_then(|el| el.dyn_into::<HtmlElement>().ok())
    {
        let width = format!("{:.1}%", view.progress() * 100.0);
        if let Err(e) = bar.style().set_property("width", &width) {
            log::debug!("progress width: {}", describe_js(&e));
        }
    }
    if let Some(body) = document.body() {
        if let Err(e) = body.set_attribute("data-playing", if view.playing { "true" } else { "false" }) {
            log::debug!("data-playing: {}", describe_js(&e));
        }
    }
}
