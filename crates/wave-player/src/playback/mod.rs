//! The playback state machine and its single authoritative [`PlaybackState`].
//!
//! Browser callbacks never touch the controller directly. They push
//! [`PlayerEvent`]s into an [`EventInbox`] which [`PlaybackController::poll`]
//! drains once per frame, together with any deferred work that came due.

mod queue;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use queue::TrackQueue;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

use crate::config::PlaybackTiming;
use crate::error::PlayerError;
use crate::graph::AudioGraph;
use crate::history::PlayHistory;
use crate::track::{known_duration, PlaybackState, PlaybackStatus, RepeatMode, Track, TrackOrigin, PLAYBACK_RATES};

/// Identifies one `play()` request. Settlements carrying an older ticket are stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayTicket {
    pub generation: u64,
    pub request: u64,
}

#[derive(Debug)]
pub enum PlayerEvent {
    TimeUpdate(f64),
    DurationChange(f64),
    Playing,
    Paused,
    Ended,
    PlaySettled {
        ticket: PlayTicket,
        result: Result<(), PlayerError>,
    },
    TrackSaved {
        generation: u64,
        id: Option<String>,
    },
}

impl PlayerEvent {
    /// Raised by the element itself rather than answering a ticketed request.
    fn from_element(&self) -> bool {
        matches!(
            self,
            PlayerEvent::TimeUpdate(_)
                | PlayerEvent::DurationChange(_)
                | PlayerEvent::Playing
                | PlayerEvent::Paused
                | PlayerEvent::Ended
        )
    }
}

/// Events are stamped with the selection the element was bound to when they
/// were queued.
#[derive(Clone, Default)]
pub struct EventInbox {
    queue: Rc<RefCell<VecDeque<(u64, PlayerEvent)>>>,
    generation: Rc<Cell<u64>>,
}

impl EventInbox {
    pub fn push(&self, event: PlayerEvent) {
        self.queue.borrow_mut().push_back((self.generation.get(), event));
    }

    fn set_generation(&self, generation: u64) {
        self.generation.set(generation);
    }

    fn take(&self) -> VecDeque<(u64, PlayerEvent)> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }
}

/// Commands arriving from the OS media session or the detached window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlay,
    Previous,
    Next,
    ToggleRepeat,
    ShowQueue,
}

#[derive(Clone, Default)]
pub struct CommandInbox(Rc<RefCell<VecDeque<RemoteCommand>>>);

impl CommandInbox {
    pub fn push(&self, command: RemoteCommand) {
        self.0.borrow_mut().push_back(command);
    }

    pub fn drain(&self) -> Vec<RemoteCommand> {
        self.0.borrow_mut().drain(..).collect()
    }
}

/// The underlying audio element.
pub trait MediaElement {
    /// What the audio graph binds to.
    type Node;

    fn node(&self) -> &Self::Node;
    fn set_source(&self, uri: &str);
    fn load(&self);
    /// Request playback. The outcome arrives later as [`PlayerEvent::PlaySettled`].
    fn play(&self, ticket: PlayTicket);
    fn pause(&self);
    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64);
    /// `NaN` until metadata is loaded.
    fn duration(&self) -> f64;
    fn set_volume(&self, level: f64);
    fn set_muted(&self, muted: bool);
    fn set_playback_rate(&self, rate: f64);
}

pub type SubscriptionId = u64;
type Subscriber = Box<dyn FnMut(&PlaybackState)>;

pub struct PlaybackController<M: MediaElement> {
    media: M,
    inbox: EventInbox,
    graph: Option<Rc<RefCell<dyn AudioGraph<M::Node>>>>,
    history: Rc<dyn PlayHistory>,
    timing: PlaybackTiming,
    state: PlaybackState,
    queue: TrackQueue,

    generation: u64,
    play_request: u64,
    needs_load: bool,
    pending_play: Option<Instant>,
    dwell_deadline: Option<Instant>,
    // generation whose play was recorded (or whose save is in flight)
    recorded: Option<u64>,

    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
    published: Option<PlaybackState>,
    show_queue: bool,
}

impl<M: MediaElement> PlaybackController<M> {
    pub fn new(
        media: M,
        inbox: EventInbox,
        graph: Option<Rc<RefCell<dyn AudioGraph<M::Node>>>>,
        history: Rc<dyn PlayHistory>,
        timing: PlaybackTiming,
    ) -> Self {
        Self {
            media,
            inbox,
            graph,
            history,
            timing,
            state: PlaybackState::default(),
            queue: TrackQueue::default(),
            generation: 0,
            play_request: 0,
            needs_load: false,
            pending_play: None,
            dwell_deadline: None,
            recorded: None,
            subscribers: Vec::new(),
            next_subscription: 0,
            published: None,
            show_queue: false,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&PlaybackState) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        self.subscribers.push((self.next_subscription, Box::new(subscriber)));
        self.next_subscription
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Make `track` current and start it after the deferred tick.
    pub fn select_track(&mut self, track: Track, now: Instant) {
        let changed = self.state.track.as_ref().map_or(true, |t| !t.same_media(&track));
        self.make_current(track, PlaybackStatus::Loading, changed);
        self.pending_play = Some(now + Duration::from_millis(self.timing.play_defer_ms));
        self.dwell_deadline = Some(now + Duration::from_millis(self.timing.dwell_ms));
        self.publish();
    }

    /// Make `track` current without playing it.
    pub fn cue(&mut self, track: Track) {
        let changed = self.state.track.as_ref().map_or(true, |t| !t.same_media(&track));
        self.make_current(track, PlaybackStatus::Paused, changed);
        self.publish();
    }

    pub fn set_queue(&mut self, tracks: Vec<Track>) {
        log::debug!("queue replaced with {} tracks", tracks.len());
        self.queue.set_tracks(tracks);
    }

    pub fn toggle_play(&mut self, now: Instant) {
        match self.state.status {
            PlaybackStatus::Idle => {}
            PlaybackStatus::Playing | PlaybackStatus::Loading => self.pause(),
            PlaybackStatus::Paused => self.play(now),
        }
    }

    pub fn play(&mut self, now: Instant) {
        if self.state.status != PlaybackStatus::Paused {
            return;
        }
        self.state.status = PlaybackStatus::Loading;
        if self.needs_load {
            self.start_playback();
        } else {
            self.request_play();
        }
        // a play from a cued track starts the dwell clock
        if self.recorded != Some(self.generation) && self.dwell_deadline.is_none() {
            self.dwell_deadline = Some(now + Duration::from_millis(self.timing.dwell_ms));
        }
        self.publish();
    }

    pub fn pause(&mut self) {
        if self.state.status == PlaybackStatus::Idle {
            return;
        }
        self.halt();
        self.publish();
    }

    pub fn next(&mut self, now: Instant) -> bool {
        let Some(track) = self.queue.next_after(self.state.track.as_ref()).cloned() else {
            return false;
        };
        self.select_track(track, now);
        true
    }

    pub fn previous(&mut self, now: Instant) -> bool {
        let Some(track) = self.queue.previous_before(self.state.track.as_ref()).cloned() else {
            return false;
        };
        self.select_track(track, now);
        true
    }

    /// Jump to `fraction` of the duration. Does nothing while the duration is unknown.
    pub fn seek(&mut self, fraction: f64) {
        if self.state.status == PlaybackStatus::Idle || !fraction.is_finite() {
            return;
        }
        let Some(duration) = self.duration() else {
            return;
        };
        self.set_position(fraction.clamp(0.0, 1.0) * duration);
        self.publish();
    }

    pub fn skip(&mut self, seconds: f64) {
        if self.state.status == PlaybackStatus::Idle || !seconds.is_finite() {
            return;
        }
        let target = (self.state.current_time + seconds).max(0.0);
        let target = match self.duration() {
            Some(duration) => target.min(duration),
            None => target,
        };
        self.set_position(target);
        self.publish();
    }

    pub fn set_volume(&mut self, level: f64) {
        if self.state.status == PlaybackStatus::Idle || level.is_nan() {
            return;
        }
        let level = level.clamp(0.0, 1.0);
        self.state.volume = level;
        self.state.muted = level == 0.0;
        self.media.set_volume(level);
        self.media.set_muted(self.state.muted);
        self.publish();
    }

    pub fn toggle_mute(&mut self) {
        if self.state.status == PlaybackStatus::Idle {
            return;
        }
        self.state.muted = !self.state.muted;
        self.media.set_muted(self.state.muted);
        self.publish();
    }

    pub fn toggle_repeat(&mut self) {
        self.state.repeat = self.state.repeat.cycle();
        log::debug!("repeat mode: {:?}", self.state.repeat);
        self.publish();
    }

    pub fn toggle_shuffle(&mut self) {
        self.state.shuffle = !self.state.shuffle;
        self.queue.set_shuffled(self.state.shuffle);
        self.publish();
    }

    pub fn cycle_playback_rate(&mut self) {
        let current = PLAYBACK_RATES
            .iter()
            .position(|r| (r - self.state.playback_rate).abs() < 1e-6)
            .unwrap_or(0);
        let rate = PLAYBACK_RATES[(current + 1) % PLAYBACK_RATES.len()];
        self.state.playback_rate = rate;
        self.media.set_playback_rate(rate);
        self.publish();
    }

    /// Stop audio and hide the surfaces. A pending play record is dropped.
    pub fn close(&mut self) {
        self.dwell_deadline = None;
        if self.state.status != PlaybackStatus::Idle {
            self.halt();
        }
        self.state.visible = false;
        log::info!("player closed");
        self.publish();
    }

    pub fn dispatch(&mut self, command: RemoteCommand, now: Instant) {
        log::debug!("remote command {command:?}");
        match command {
            RemoteCommand::Play => self.play(now),
            RemoteCommand::Pause => self.pause(),
            RemoteCommand::TogglePlay => self.toggle_play(now),
            RemoteCommand::Previous => {
                self.previous(now);
            }
            RemoteCommand::Next => {
                self.next(now);
            }
            RemoteCommand::ToggleRepeat => self.toggle_repeat(),
            RemoteCommand::ShowQueue => self.show_queue = true,
        }
    }

    /// Whether a surface asked for the queue since the last call.
    pub fn take_show_queue(&mut self) -> bool {
        std::mem::take(&mut self.show_queue)
    }

    /// Drain element events and run deferred work that is due at `now`.
    pub fn poll(&mut self, now: Instant) {
        for (stamp, event) in self.inbox.take() {
            if stamp != self.generation && event.from_element() {
                log::debug!("dropping {event:?} left over from a previous selection");
                continue;
            }
            self.handle_event(event, now);
        }
        if self.pending_play.is_some_and(|due| now >= due) {
            self.pending_play = None;
            self.start_playback();
        }
        // only playback that is actually running counts toward the dwell
        if self.dwell_deadline.is_some_and(|due| now >= due) && self.state.status == PlaybackStatus::Playing {
            self.dwell_deadline = None;
            self.record_play();
        }
        self.publish();
    }

    fn handle_event(&mut self, event: PlayerEvent, now: Instant) {
        match event {
            PlayerEvent::TimeUpdate(t) => {
                if self.state.track.is_some() && t.is_finite() {
                    self.state.current_time = t;
                }
            }
            PlayerEvent::DurationChange(d) => {
                if let Some(d) = known_duration(d) {
                    self.state.duration = Some(d);
                }
            }
            PlayerEvent::Playing => {
                if matches!(self.state.status, PlaybackStatus::Loading | PlaybackStatus::Paused)
                    && self.pending_play.is_none()
                {
                    self.state.status = PlaybackStatus::Playing;
                }
            }
            PlayerEvent::Paused => {
                if self.state.status == PlaybackStatus::Playing {
                    self.state.status = PlaybackStatus::Paused;
                }
            }
            PlayerEvent::Ended => self.on_ended(now),
            PlayerEvent::PlaySettled { ticket, result } => {
                if ticket != self.current_ticket() {
                    log::debug!("ignoring stale play settlement {ticket:?}");
                    return;
                }
                match result {
                    Ok(()) => self.state.status = PlaybackStatus::Playing,
                    Err(e) => {
                        log::warn!("{e}");
                        self.state.status = PlaybackStatus::Paused;
                        // a retried play() starts a fresh dwell
                        self.dwell_deadline = None;
                    }
                }
            }
            PlayerEvent::TrackSaved { generation, id } => self.on_track_saved(generation, id),
        }
    }

    fn on_ended(&mut self, now: Instant) {
        let repeat = self.state.repeat;
        match repeat {
            RepeatMode::Single => {
                log::debug!("repeating current track");
                self.set_position(0.0);
                self.state.status = PlaybackStatus::Loading;
                self.request_play();
            }
            RepeatMode::All if self.next(now) => {}
            _ => {
                self.state.status = PlaybackStatus::Paused;
                if let Some(d) = self.duration() {
                    self.state.current_time = d;
                }
            }
        }
    }

    fn on_track_saved(&mut self, generation: u64, id: Option<String>) {
        if generation != self.generation {
            log::debug!("discarding save result for a previous selection");
            return;
        }
        let Some(id) = id else {
            log::warn!("{}", PlayerError::Tracking("external track was not saved".into()));
            return;
        };
        if let Some(track) = self.state.track.as_mut() {
            track.id = Some(id.clone());
            self.queue.assign_id(track, &id);
        }
        log::info!("external track saved as {id}");
        self.history.mark_played(&id);
    }

    fn make_current(&mut self, track: Track, status: PlaybackStatus, changed: bool) {
        self.generation += 1;
        self.inbox.set_generation(self.generation);
        self.pending_play = None;
        self.dwell_deadline = None;
        // supersede any play still in flight
        self.play_request += 1;

        let verb = if status == PlaybackStatus::Loading { "playing" } else { "cued" };
        log::info!("{verb}: {} ({})", track.title, track.artist_label());
        self.media.set_source(&track.media_uri);
        self.needs_load = true;
        self.state.duration = track.duration;
        self.state.track = Some(track);
        self.state.status = status;
        self.state.current_time = 0.0;
        self.state.visible = true;

        if let Some(graph) = &self.graph {
            graph.borrow_mut().attach(self.media.node(), changed);
        }
    }

    fn start_playback(&mut self) {
        self.media.set_volume(self.state.volume);
        self.media.set_muted(self.state.muted);
        self.media.set_playback_rate(self.state.playback_rate);
        self.media.load();
        self.needs_load = false;
        self.request_play();
    }

    fn request_play(&mut self) {
        self.play_request += 1;
        self.media.play(self.current_ticket());
        if let Some(graph) = &self.graph {
            graph.borrow_mut().playback_started();
        }
    }

    fn halt(&mut self) {
        self.pending_play = None;
        self.play_request += 1;
        self.media.pause();
        self.state.status = PlaybackStatus::Paused;
    }

    fn set_position(&mut self, seconds: f64) {
        self.media.set_current_time(seconds);
        self.state.current_time = seconds;
    }

    fn duration(&self) -> Option<f64> {
        self.state.duration.or_else(|| known_duration(self.media.duration()))
    }

    fn current_ticket(&self) -> PlayTicket {
        PlayTicket {
            generation: self.generation,
            request: self.play_request,
        }
    }

    fn record_play(&mut self) {
        if self.recorded == Some(self.generation) {
            return;
        }
        let Some(track) = &self.state.track else {
            return;
        };
        match (&track.id, track.origin) {
            (Some(id), _) => {
                self.recorded = Some(self.generation);
                log::debug!("recording play of {id}");
                self.history.mark_played(id);
            }
            (None, TrackOrigin::External) => {
                self.recorded = Some(self.generation);
                let inbox = self.inbox.clone();
                let generation = self.generation;
                self.history.save_external(
                    track,
                    Box::new(move |id| inbox.push(PlayerEvent::TrackSaved { generation, id })),
                );
            }
            (None, TrackOrigin::Library) => log::debug!("track {:?} has no id, play not recorded", track.title),
        }
    }

    fn publish(&mut self) {
        if self.published.as_ref() == Some(&self.state) {
            return;
        }
        self.published = Some(self.state.clone());
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&self.state);
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    #[derive(Debug, Default)]
    pub struct MediaLog {
        pub sources: Vec<String>,
        pub loads: usize,
        pub plays: Vec<PlayTicket>,
        pub pauses: usize,
        pub seeks: Vec<f64>,
        pub time: f64,
        pub duration: f64,
        pub volume: f64,
        pub muted: bool,
        pub rate: f64,
    }

    #[derive(Clone, Default)]
    pub struct FakeMedia {
        pub node: u32,
        pub log: Rc<RefCell<MediaLog>>,
    }

    impl FakeMedia {
        pub fn last_ticket(&self) -> PlayTicket {
            *self.log.borrow().plays.last().unwrap()
        }
    }

    impl MediaElement for FakeMedia {
        type Node = u32;

        fn node(&self) -> &u32 {
            &self.node
        }

        fn set_source(&self, uri: &str) {
            let mut log = self.log.borrow_mut();
            log.sources.push(uri.to_owned());
            log.time = 0.0;
            log.duration = f64::NAN;
        }

        fn load(&self) {
            self.log.borrow_mut().loads += 1;
        }

        fn play(&self, ticket: PlayTicket) {
            self.log.borrow_mut().plays.push(ticket);
        }

        fn pause(&self) {
            self.log.borrow_mut().pauses += 1;
        }

        fn current_time(&self) -> f64 {
            self.log.borrow().time
        }

        fn set_current_time(&self, seconds: f64) {
            let mut log = self.log.borrow_mut();
            log.seeks.push(seconds);
            log.time = seconds;
        }

        fn duration(&self) -> f64 {
            self.log.borrow().duration
        }

        fn set_volume(&self, level: f64) {
            self.log.borrow_mut().volume = level;
        }

        fn set_muted(&self, muted: bool) {
            self.log.borrow_mut().muted = muted;
        }

        fn set_playback_rate(&self, rate: f64) {
            self.log.borrow_mut().rate = rate;
        }
    }
}
