//! Browser media player engine.
//!
//! One page-wide Web Audio graph feeds a spectrum sampler that drives a
//! point-field visualization, while a single playback controller owns the
//! authoritative state and mirrors it onto the OS media session and an
//! optional detached mini-player window.
//!
//! The engine is platform-agnostic and unit-tested on the host; the browser
//! bindings live in `web` submodules compiled only for `wasm32`.

pub mod config;
pub mod error;
pub mod graph;
pub mod history;
pub mod layout;
pub mod playback;
pub mod spectrum;
pub mod sync;
pub mod track;
pub mod visualizer;

#[cfg(target_arch = "wasm32")]
mod app;

pub use config::PlayerConfig;
pub use error::PlayerError;
pub use graph::AudioGraphManager;
pub use layout::WindowLayoutState;
pub use playback::{PlaybackController, RemoteCommand};
pub use spectrum::{SpectrumSampler, SpectrumSnapshot};
pub use sync::SurfaceSynchronizer;
pub use track::{PlaybackState, RepeatMode, Track};
pub use visualizer::VisualizationRenderer;

/// Id of the optional `<script type="application/json">` block holding
/// [`PlayerConfig`] overrides.
pub const CONFIG_ELEMENT_ID: &str = "wave-player-config";

#[cfg(target_arch = "wasm32")]
mod entry {
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;

    use crate::app::PlayerShellApp;
    use crate::config::PlayerConfig;
    use crate::sync::detached;
    use crate::CONFIG_ELEMENT_ID;

    #[wasm_bindgen(start)]
    pub fn init() {
        console_error_panic_hook::set_once();
        // a second init only means a logger is already installed
        let _ = eframe::WebLogger::init(log::LevelFilter::Debug);
    }

    fn load_config() -> PlayerConfig {
        let text = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(CONFIG_ELEMENT_ID))
            .and_then(|el| el.text_content());
        match text {
            Some(text) => PlayerConfig::from_json(&text).unwrap_or_else(|e| {
                log::warn!("ignoring #{CONFIG_ELEMENT_ID}: {e}");
                PlayerConfig::default()
            }),
            None => PlayerConfig::default(),
        }
    }

    /// Mount the player on the canvas with id `canvas_id`.
    #[wasm_bindgen]
    pub async fn start_player(canvas_id: String) -> Result<(), JsValue> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| JsValue::from_str(&format!("no canvas element with id '{canvas_id}'")))?
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .map_err(|_| JsValue::from_str(&format!("element '{canvas_id}' is not a canvas")))?;

        let config = load_config();
        log::info!("starting player on #{canvas_id}");
        eframe::WebRunner::new()
            .start(
                canvas,
                eframe::WebOptions::default(),
                Box::new(move |cc| Ok(Box::new(PlayerShellApp::new(cc, config)?))),
            )
            .await
    }

    /// Entry point of the detached mini-player page.
    #[wasm_bindgen]
    pub fn start_detached() -> Result<(), JsValue> {
        let config = load_config();
        detached::web::run(&config.sync).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
