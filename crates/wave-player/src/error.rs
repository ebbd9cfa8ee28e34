use thiserror::Error;

/// Every failure the engine can observe. None of them is fatal to the page:
/// components log and degrade instead of handing these to their callers.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The media element already feeds a source node (browser `InvalidStateError`).
    #[error("media element already has an audio source node")]
    DuplicateSource,

    #[error("audio graph error: {0}")]
    Graph(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("detached window channel is closed")]
    ChannelClosed,

    #[error("channel error: {0}")]
    Channel(String),

    #[error("play tracking failed: {0}")]
    Tracking(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("{0} is not available in this browser")]
    Unavailable(&'static str),
}

/// Best-effort description of a thrown JS value (`DOMException` name and message
/// when available).
#[cfg(target_arch = "wasm32")]
pub fn describe_js(value: &wasm_bindgen::JsValue) -> String {
    use wasm_bindgen::JsCast;

    if let Some(exception) = value.dyn_ref::<web_sys::DomException>() {
        return format!("{}: {}", exception.name(), exception.message());
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

#[cfg(target_arch = "wasm32")]
pub fn is_invalid_state(value: &wasm_bindgen::JsValue) -> bool {
    use wasm_bindgen::JsCast;

    value
        .dyn_ref::<web_sys::DomException>()
        .is_some_and(|e| e.name() == "InvalidStateError")
}
