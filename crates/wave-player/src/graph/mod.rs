//! The page-wide Web Audio graph: `source → analyser → destination`.
//!
//! A media element can feed at most one source node for its whole lifetime,
//! so sources are created once per element and kept. Analysers are cheap and
//! are replaced on every attach so a new track never inherits the previous
//! track's frequency bins.

#[cfg(target_arch = "wasm32")]
pub mod web;

use crate::config::AnalyserSettings;
use crate::error::PlayerError;

/// Anything the sampler can read byte frequency data from.
pub trait FrequencySource {
    fn bin_count(&self) -> usize;
    /// Fill `out` with magnitudes in `0..=255`, lowest frequency first.
    fn read_frequency_bytes(&self, out: &mut [u8]);
}

/// Platform operations the graph manager needs.
pub trait AudioBackend {
    type Element: Clone;
    type Context;
    type Source;
    type Analyser: FrequencySource;

    fn create_context(&mut self) -> Result<Self::Context, PlayerError>;
    fn is_suspended(&self, context: &Self::Context) -> bool;
    /// Fire-and-forget; rejections are logged by the backend.
    fn resume(&mut self, context: &Self::Context);
    /// One-shot document gesture listener that resumes the context.
    fn arm_gesture_resume(&mut self, context: &Self::Context);
    fn create_source(
        &mut self,
        context: &Self::Context,
        element: &Self::Element,
    ) -> Result<Self::Source, PlayerError>;
    fn create_analyser(
        &mut self,
        context: &Self::Context,
        settings: &AnalyserSettings,
    ) -> Result<Self::Analyser, PlayerError>;
    fn connect(
        &mut self,
        context: &Self::Context,
        source: &Self::Source,
        analyser: &Self::Analyser,
    ) -> Result<(), PlayerError>;
    fn disconnect(&mut self, source: &Self::Source, analyser: &Self::Analyser);
    /// Route `source` straight to the destination, bypassing any analyser.
    fn connect_direct(&mut self, context: &Self::Context, source: &Self::Source) -> Result<(), PlayerError>;
    fn disconnect_direct(&mut self, source: &Self::Source);
    fn same_element(a: &Self::Element, b: &Self::Element) -> bool;
}

/// The controller's view of the graph, erased over the backend.
pub trait AudioGraph<E> {
    /// Bind `element` and return whether an analyser is available afterwards.
    fn attach(&mut self, element: &E, track_changed: bool) -> bool;
    fn playback_started(&mut self);
}

struct BoundSource<B: AudioBackend> {
    element: B::Element,
    source: B::Source,
}

pub struct AudioGraphManager<B: AudioBackend> {
    backend: B,
    settings: AnalyserSettings,
    context: Option<B::Context>,
    sources: Vec<BoundSource<B>>,
    current: Option<usize>,
    analyser: Option<B::Analyser>,
    /// The current source plays without an analyser in between.
    direct: bool,
    /// A gesture listener is pending for the current suspension.
    gesture_armed: bool,
    attaches: usize,
}

impl<B: AudioBackend> AudioGraphManager<B> {
    pub fn new(backend: B, settings: AnalyserSettings) -> Self {
        Self {
            backend,
            settings,
            context: None,
            sources: Vec::new(),
            current: None,
            analyser: None,
            direct: false,
            gesture_armed: false,
            attaches: 0,
        }
    }

    pub fn analyser(&self) -> Option<&B::Analyser> {
        self.analyser.as_ref()
    }

    pub fn sources_created(&self) -> usize {
        self.sources.len()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bind `element` and wire a fresh analyser. Failures only cost the
    /// visualization; they are logged and `None` is returned.
    pub fn attach_element(&mut self, element: &B::Element, track_changed: bool) -> Option<&B::Analyser> {
        self.attaches += 1;
        if let Err(e) = self.try_attach(element, track_changed) {
            log::warn!("audio graph attach failed, visualization disabled: {e}");
            self.unwire();
            return None;
        }
        self.ensure_running();
        self.analyser.as_ref()
    }

    /// Resume a suspended context once playback begins.
    pub fn on_playback_started(&mut self) {
        self.ensure_running();
    }

    fn try_attach(&mut self, element: &B::Element, track_changed: bool) -> Result<(), PlayerError> {
        if self.context.is_none() {
            let context = self.backend.create_context()?;
            log::info!("audio context created");
            self.context = Some(context);
        }

        let index = match self
            .sources
            .iter()
            .position(|bound| B::same_element(&bound.element, element))
        {
            Some(index) => {
                log::debug!("reusing source node (track changed: {track_changed})");
                index
            }
            None => {
                let context = self.context.as_ref().ok_or(PlayerError::Unavailable("AudioContext"))?;
                let source = self.backend.create_source(context, element)?;
                log::info!("source node created for new media element");
                self.sources.push(BoundSource {
                    element: element.clone(),
                    source,
                });
                self.sources.len() - 1
            }
        };

        self.unwire();
        self.current = Some(index);
        let context = self.context.as_ref().ok_or(PlayerError::Unavailable("AudioContext"))?;
        let source = &self.sources[index].source;
        let wired = match self.backend.create_analyser(context, &self.settings) {
            Ok(analyser) => match self.backend.connect(context, source, &analyser) {
                Ok(()) => Ok(analyser),
                Err(e) => {
                    self.backend.disconnect(source, &analyser);
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };
        match wired {
            Ok(analyser) => self.analyser = Some(analyser),
            // the element only sounds through the graph, so keep it audible
            Err(e) => {
                log::warn!("analyser unavailable, playing without visualization: {e}");
                self.backend.connect_direct(context, source)?;
                self.direct = true;
            }
        }
        Ok(())
    }

    /// Disconnect whatever the current source feeds.
    fn unwire(&mut self) {
        let Some(index) = self.current else {
            return;
        };
        let source = &self.sources[index].source;
        if let Some(old) = self.analyser.take() {
            self.backend.disconnect(source, &old);
        } else if self.direct {
            self.backend.disconnect_direct(source);
        }
        self.direct = false;
    }

    fn ensure_running(&mut self) {
        let Some(context) = &self.context else {
            return;
        };
        if !self.backend.is_suspended(context) {
            self.gesture_armed = false;
            return;
        }
        log::debug!("audio context suspended, resuming");
        self.backend.resume(context);
        if !self.gesture_armed {
            self.backend.arm_gesture_resume(context);
            self.gesture_armed = true;
        }
    }
}

impl<B: AudioBackend> AudioGraph<B::Element> for AudioGraphManager<B> {
    fn attach(&mut self, element: &B::Element, track_changed: bool) -> bool {
        self.attach_element(element, track_changed).is_some()
    }

    fn playback_started(&mut self) {
        self.on_playback_started();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    #[derive(Default)]
    pub struct GraphLog {
        pub contexts: usize,
        pub source_attempts: usize,
        pub analysers: usize,
        pub connects: usize,
        pub disconnects: usize,
        pub resumes: usize,
        pub gesture_arms: usize,
        pub direct_connects: usize,
        pub direct_disconnects: usize,
        pub suspended: bool,
        /// `resume` leaves the context suspended, as without a user gesture.
        pub resume_blocked: bool,
        /// Elements the "browser" already gave a source node.
        pub sourced: HashSet<u32>,
    }

    pub struct FakeAnalyser {
        pub bins: Vec<u8>,
    }

    impl FrequencySource for FakeAnalyser {
        fn bin_count(&self) -> usize {
            self.bins.len()
        }

        fn read_frequency_bytes(&self, out: &mut [u8]) {
            let n = out.len().min(self.bins.len());
            out[..n].copy_from_slice(&self.bins[..n]);
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeBackend {
        pub log: Rc<RefCell<GraphLog>>,
        pub fail_analyser: bool,
    }

    impl AudioBackend for FakeBackend {
        type Element = u32;
        type Context = ();
        type Source = u32;
        type Analyser = FakeAnalyser;

        fn create_context(&mut self) -> Result<(), PlayerError> {
            let mut log = self.log.borrow_mut();
            log.contexts += 1;
            log.suspended = true;
            Ok(())
        }

        fn is_suspended(&self, _: &()) -> bool {
            self.log.borrow().suspended
        }

        fn resume(&mut self, _: &()) {
            let mut log = self.log.borrow_mut();
            log.resumes += 1;
            if !log.resume_blocked {
                log.suspended = false;
            }
        }

        fn arm_gesture_resume(&mut self, _: &()) {
            self.log.borrow_mut().gesture_arms += 1;
        }

        fn create_source(&mut self, _: &(), element: &u32) -> Result<u32, PlayerError> {
            let mut log = self.log.borrow_mut();
            log.source_attempts += 1;
            if log.sourced.insert(*element) {
                Ok(*element)
            } else {
                Err(PlayerError::DuplicateSource)
            }
        }

        fn create_analyser(&mut self, _: &(), settings: &AnalyserSettings) -> Result<FakeAnalyser, PlayerError> {
            if self.fail_analyser {
                return Err(PlayerError::Graph("analyser unavailable".into()));
            }
            self.log.borrow_mut().analysers += 1;
            Ok(FakeAnalyser {
                bins: vec![0; settings.fft_size as usize / 2],
            })
        }

        fn connect(&mut self, _: &(), _: &u32, _: &FakeAnalyser) -> Result<(), PlayerError> {
            self.log.borrow_mut().connects += 1;
            Ok(())
        }

        fn disconnect(&mut self, _: &u32, _: &FakeAnalyser) {
            self.log.borrow_mut().disconnects += 1;
        }

        fn connect_direct(&mut self, _: &(), _: &u32) -> Result<(), PlayerError> {
            self.log.borrow_mut().direct_connects += 1;
            Ok(())
        }

        fn disconnect_direct(&mut self, _: &u32) {
            self.log.borrow_mut().direct_disconnects += 1;
        }

        fn same_element(a: &u32, b: &u32) -> bool {
            a == b
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeBackend;
    use super::*;

    fn manager() -> AudioGraphManager<FakeBackend> {
        AudioGraphManager::new(FakeBackend::default(), AnalyserSettings::default())
    }

    #[test]
    fn same_element_reuses_source_and_refreshes_analyser() {
        let mut graph = manager();
        for _ in 0..5 {
            assert!(graph.attach(&7, true));
        }
        let log = graph.backend().log.borrow();
        assert_eq!(log.contexts, 1);
        assert_eq!(log.source_attempts, 1);
        assert_eq!(graph.sources_created(), 1);
        assert_eq!(log.analysers, 5);
        // every analyser after the first replaces a wired one
        assert_eq!(log.disconnects, 4);
        assert_eq!(log.connects, 5);
    }

    #[test]
    fn different_element_gets_its_own_source_once() {
        let mut graph = manager();
        graph.attach(&1, true);
        graph.attach(&2, true);
        graph.attach(&1, true);
        graph.attach(&2, false);
        assert_eq!(graph.sources_created(), 2);
        assert_eq!(graph.backend().log.borrow().source_attempts, 2);
        assert_eq!(graph.attach_count(), 4);
    }

    #[test]
    fn duplicate_source_is_recoverable() {
        let backend = FakeBackend::default();
        // another graph already claimed element 3
        backend.log.borrow_mut().sourced.insert(3);
        let mut graph = AudioGraphManager::new(backend, AnalyserSettings::default());
        assert!(graph.attach_element(&3, true).is_none());
        assert!(graph.analyser().is_none());
        // a healthy element still works afterwards
        assert!(graph.attach_element(&4, true).is_some());
    }

    #[test]
    fn analyser_failure_degrades_visualization_only() {
        let backend = FakeBackend {
            fail_analyser: true,
            ..Default::default()
        };
        let mut graph = AudioGraphManager::new(backend, AnalyserSettings::default());
        assert!(!graph.attach(&1, true));
        assert_eq!(graph.sources_created(), 1);
        // the element still reaches the speakers
        let log = graph.backend().log.borrow();
        assert_eq!(log.direct_connects, 1);
        assert_eq!(log.connects, 0);
    }

    #[test]
    fn analyser_failure_after_success_keeps_source_routed() {
        let mut graph = manager();
        assert!(graph.attach(&1, true));
        graph.backend.fail_analyser = true;
        assert!(!graph.attach(&1, true));
        {
            let log = graph.backend().log.borrow();
            assert_eq!(log.connects, 1);
            assert_eq!(log.disconnects, 1);
            assert_eq!(log.direct_connects, 1);
        }

        // a later healthy attach swaps the bypass for an analyser
        graph.backend.fail_analyser = false;
        assert!(graph.attach(&1, true));
        let log = graph.backend().log.borrow();
        assert_eq!(log.direct_disconnects, 1);
        assert_eq!(log.connects, 2);
    }

    #[test]
    fn suspended_context_resumes_and_arms_gesture_fallback() {
        let mut graph = manager();
        graph.attach(&1, true);
        {
            let log = graph.backend().log.borrow();
            assert_eq!(log.resumes, 1);
            assert_eq!(log.gesture_arms, 1);
        }
        // running context: nothing to do
        graph.playback_started();
        assert_eq!(graph.backend().log.borrow().resumes, 1);

        graph.backend().log.borrow_mut().suspended = true;
        graph.playback_started();
        assert_eq!(graph.backend().log.borrow().resumes, 2);
        assert_eq!(graph.backend().log.borrow().gesture_arms, 2);
    }

    #[test]
    fn gesture_fallback_is_armed_once_per_suspension() {
        let mut graph = manager();
        graph.backend().log.borrow_mut().resume_blocked = true;
        graph.attach(&1, true);
        graph.playback_started();
        graph.attach(&1, true);
        {
            let log = graph.backend().log.borrow();
            assert_eq!(log.resumes, 3);
            assert_eq!(log.gesture_arms, 1);
        }

        // the gesture lands, then the context is suspended again
        graph.backend().log.borrow_mut().suspended = false;
        graph.playback_started();
        graph.backend().log.borrow_mut().suspended = true;
        graph.playback_started();
        assert_eq!(graph.backend().log.borrow().gesture_arms, 2);
    }

    #[test]
    fn analyser_uses_configured_fft_size() {
        let mut graph = AudioGraphManager::new(
            FakeBackend::default(),
            AnalyserSettings {
                fft_size: 256,
                smoothing_time_constant: 0.8,
            },
        );
        let analyser = graph.attach_element(&1, true).unwrap();
        assert_eq!(analyser.bin_count(), 128);
    }
}
