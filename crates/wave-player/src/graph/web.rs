use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{AnalyserNode, AudioContext, AudioContextState, HtmlMediaElement, MediaElementAudioSourceNode};

use super::{AudioBackend, FrequencySource};
use crate::config::AnalyserSettings;
use crate::error::{describe_js, is_invalid_state, PlayerError};

impl FrequencySource for AnalyserNode {
    fn bin_count(&self) -> usize {
        self.frequency_bin_count() as usize
    }

    fn read_frequency_bytes(&self, out: &mut [u8]) {
        self.get_byte_frequency_data(out);
    }
}

/// Web Audio implementation of [`AudioBackend`].
#[derive(Default)]
pub struct WebAudioBackend;

impl AudioBackend for WebAudioBackend {
    type Element = HtmlMediaElement;
    type Context = AudioContext;
    type Source = MediaElementAudioSourceNode;
    type Analyser = AnalyserNode;

    fn create_context(&mut self) -> Result<AudioContext, PlayerError> {
        AudioContext::new().map_err(|e| PlayerError::Graph(describe_js(&e)))
    }

    fn is_suspended(&self, context: &AudioContext) -> bool {
        context.state() == AudioContextState::Suspended
    }

    fn resume(&mut self, context: &AudioContext) {
        match context.resume() {
            Ok(promise) => spawn_local(async move {
                match JsFuture::from(promise).await {
                    Ok(_) => log::debug!("audio context resumed"),
                    Err(e) => log::warn!("audio context resume rejected: {}", describe_js(&e)),
                }
            }),
            Err(e) => log::warn!("audio context resume failed: {}", describe_js(&e)),
        }
    }

    fn arm_gesture_resume(&mut self, context: &AudioContext) {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            return;
        };
        let context = context.clone();
        let listener = Closure::once_into_js(move || {
            if context.state() == AudioContextState::Suspended {
                WebAudioBackend.resume(&context);
            }
        });
        let options = web_sys::AddEventListenerOptions::new();
        options.set_once(true);
        if let Err(e) = document.add_event_listener_with_callback_and_add_event_listener_options(
            "click",
            listener.unchecked_ref(),
            &options,
        ) {
            log::warn!("could not arm gesture resume: {}", describe_js(&e));
        }
    }

    fn create_source(
        &mut self,
        context: &AudioContext,
        element: &HtmlMediaElement,
    ) -> Result<MediaElementAudioSourceNode, PlayerError> {
        context.create_media_element_source(element).map_err(|e| {
            if is_invalid_state(&e) {
                PlayerError::DuplicateSource
            } else {
                PlayerError::Graph(describe_js(&e))
            }
        })
    }

    fn create_analyser(
        &mut self,
        context: &AudioContext,
        settings: &AnalyserSettings,
    ) -> Result<AnalyserNode, PlayerError> {
        let analyser = context
            .create_analyser()
            .map_err(|e| PlayerError::Graph(describe_js(&e)))?;
        analyser.set_fft_size(settings.fft_size);
        analyser.set_smoothing_time_constant(settings.smoothing_time_constant);
        Ok(analyser)
    }

    fn connect(
        &mut self,
        context: &AudioContext,
        source: &MediaElementAudioSourceNode,
        analyser: &AnalyserNode,
    ) -> Result<(), PlayerError> {
        let graph_err = |e: JsValue| PlayerError::Graph(describe_js(&e));
        source.connect_with_audio_node(analyser).map_err(graph_err)?;
        analyser
            .connect_with_audio_node(&context.destination())
            .map_err(graph_err)?;
        Ok(())
    }

    fn disconnect(&mut self, source: &MediaElementAudioSourceNode, analyser: &AnalyserNode) {
        if let Err(e) = source.disconnect() {
            log::debug!("source disconnect: {}", describe_js(&e));
        }
        if let Err(e) = analyser.disconnect() {
            log::debug!("analyser disconnect: {}", describe_js(&e));
        }
    }

    fn connect_direct(
        &mut self,
        context: &AudioContext,
        source: &MediaElementAudioSourceNode,
    ) -> Result<(), PlayerError> {
        source
            .connect_with_audio_node(&context.destination())
            .map(|_| ())
            .map_err(|e| PlayerError::Graph(describe_js(&e)))
    }

    fn disconnect_direct(&mut self, source: &MediaElementAudioSourceNode) {
        if let Err(e) = source.disconnect() {
            log::debug!("source disconnect: {}", describe_js(&e));
        }
    }

    fn same_element(a: &HtmlMediaElement, b: &HtmlMediaElement) -> bool {
        a == b
    }
}
