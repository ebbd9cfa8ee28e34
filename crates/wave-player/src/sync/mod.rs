//! Mirrors the playback state onto secondary surfaces: the OS media session
//! and an optional detached mini-player window.
//!
//! Pushes are fire-and-forget. A detached window may close at any moment, so
//! every send is preceded by a liveness check and a dead channel is simply
//! dropped.

pub mod detached;
#[cfg(target_arch = "wasm32")]
pub mod web;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::config::SyncSettings;
use crate::error::PlayerError;
use crate::playback::{CommandInbox, RemoteCommand};
use crate::track::{PlaybackState, RepeatMode, Track};

/// main → detached
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    SongUpdate { image: String, song: String, artist: String },
    RepeatUpdate { mode: RepeatMode },
}

impl OutboundMessage {
    pub fn song(track: &Track) -> Self {
        OutboundMessage::SongUpdate {
            image: track.artwork_uri.clone(),
            song: track.title.clone(),
            artist: track.artist_label().to_owned(),
        }
    }
}

/// detached → main
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InboundCommand {
    Previous,
    Next,
    ToggleRepeat,
    ShowQueue,
}

impl From<InboundCommand> for RemoteCommand {
    fn from(command: InboundCommand) -> Self {
        match command {
            InboundCommand::Previous => RemoteCommand::Previous,
            InboundCommand::Next => RemoteCommand::Next,
            InboundCommand::ToggleRepeat => RemoteCommand::ToggleRepeat,
            InboundCommand::ShowQueue => RemoteCommand::ShowQueue,
        }
    }
}

/// Media session actions and the commands they map to.
pub const SESSION_ACTIONS: [(&str, RemoteCommand); 4] = [
    ("play", RemoteCommand::Play),
    ("pause", RemoteCommand::Pause),
    ("previoustrack", RemoteCommand::Previous),
    ("nexttrack", RemoteCommand::Next),
];

/// A reference to another browsing context. Only a handle: the window on the
/// other end is owned by the browser.
pub trait SurfaceChannel {
    fn is_closed(&self) -> bool;
    fn post(&self, message: &OutboundMessage) -> Result<(), PlayerError>;
    fn close(&self);
}

pub trait DetachedOpener {
    fn open(&self) -> Result<Box<dyn SurfaceChannel>, PlayerError>;
}

/// The OS-level now-playing surface.
pub trait MediaSessionSurface {
    /// Route the transport actions into `commands`. Called once per surface.
    fn register_handlers(&mut self, commands: CommandInbox) -> Result<(), PlayerError>;
    fn set_metadata(&self, track: &Track) -> Result<(), PlayerError>;
    fn clear(&self);
    fn set_playback_state(&self, playing: bool);
}

/// Optional browser features, probed once at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub media_session: bool,
    pub detached_window: bool,
}

#[derive(Default)]
struct SessionMirror {
    track: Option<String>,
    playing: Option<bool>,
    cleared: bool,
}

pub struct SurfaceSynchronizer {
    capabilities: Capabilities,
    session: Option<Box<dyn MediaSessionSurface>>,
    mirror: SessionMirror,
    opener: Option<Box<dyn DetachedOpener>>,
    channel: Option<Box<dyn SurfaceChannel>>,
    republish: Duration,
    sent_song: Option<OutboundMessage>,
    sent_repeat: Option<RepeatMode>,
    last_sent: Option<Instant>,
    latest: Option<PlaybackState>,
}

impl SurfaceSynchronizer {
    pub fn new(
        capabilities: Capabilities,
        session: Option<Box<dyn MediaSessionSurface>>,
        opener: Option<Box<dyn DetachedOpener>>,
        settings: &SyncSettings,
        commands: CommandInbox,
    ) -> Self {
        let session = session.filter(|_| capabilities.media_session).and_then(|mut session| {
            match session.register_handlers(commands) {
                Ok(()) => Some(session),
                Err(e) => {
                    log::warn!("media session disabled: {e}");
                    None
                }
            }
        });
        Self {
            capabilities,
            session,
            mirror: SessionMirror::default(),
            opener: opener.filter(|_| capabilities.detached_window),
            channel: None,
            republish: Duration::from_millis(settings.republish_ms),
            sent_song: None,
            sent_repeat: None,
            last_sent: None,
            latest: None,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether a detached window is currently reachable.
    pub fn has_detached(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Mirror `state` onto every surface.
    pub fn push(&mut self, state: &PlaybackState, now: Instant) {
        self.sync_session(state);
        if !state.visible && self.channel.is_some() {
            log::debug!("player hidden, closing detached window");
            self.detach();
        }
        self.latest = Some(state.clone());
        self.send_projection(state, false, now);
    }

    /// Periodic re-send of the last projection while a detached window is open.
    pub fn tick(&mut self, now: Instant) {
        if self.channel.is_none() {
            return;
        }
        if self.last_sent.is_some_and(|at| now.saturating_duration_since(at) < self.republish) {
            return;
        }
        if let Some(state) = self.latest.take() {
            self.send_projection(&state, true, now);
            self.latest = Some(state);
        }
    }

    /// Open (or reuse) the detached window and send it the current projection.
    pub fn open_detached(&mut self, now: Instant) -> bool {
        if self.has_detached() {
            return true;
        }
        let Some(opener) = &self.opener else {
            log::warn!("{}", PlayerError::Unavailable("detached window"));
            return false;
        };
        match opener.open() {
            Ok(channel) => {
                log::info!("detached window opened");
                self.channel = Some(channel);
                self.forget_sent();
                if let Some(state) = self.latest.take() {
                    self.send_projection(&state, true, now);
                    self.latest = Some(state);
                }
                true
            }
            Err(e) => {
                log::warn!("could not open detached window: {e}");
                false
            }
        }
    }

    /// Close our reference to the detached window. Later pushes go nowhere.
    pub fn detach(&mut self) {
        if let Some(channel) = self.channel.take() {
            if !channel.is_closed() {
                channel.close();
            }
        }
        self.forget_sent();
    }

    fn sync_session(&mut self, state: &PlaybackState) {
        let Some(session) = &self.session else {
            return;
        };
        match (&state.track, state.visible) {
            (Some(track), true) => {
                if self.mirror.track.as_deref() != Some(track.media_uri.as_str()) {
                    if let Err(e) = session.set_metadata(track) {
                        log::warn!("media session metadata: {e}");
                    }
                    self.mirror.track = Some(track.media_uri.clone());
                }
                let playing = state.is_playing();
                if self.mirror.playing != Some(playing) {
                    session.set_playback_state(playing);
                    self.mirror.playing = Some(playing);
                }
                self.mirror.cleared = false;
            }
            _ => {
                if !self.mirror.cleared {
                    session.clear();
                    self.mirror = SessionMirror {
                        cleared: true,
                        ..Default::default()
                    };
                }
            }
        }
    }

    fn send_projection(&mut self, state: &PlaybackState, force: bool, now: Instant) {
        if let Some(track) = &state.track {
            let song = OutboundMessage::song(track);
            if force || self.sent_song.as_ref() != Some(&song) {
                if self.send(&song, now) {
                    self.sent_song = Some(song);
                }
            }
        }
        if force || self.sent_repeat != Some(state.repeat) {
            let repeat = OutboundMessage::RepeatUpdate { mode: state.repeat };
            if self.send(&repeat, now) {
                self.sent_repeat = Some(state.repeat);
            }
        }
    }

    /// Liveness check, then post. A closed channel is dropped silently.
    fn send(&mut self, message: &OutboundMessage, now: Instant) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        if channel.is_closed() {
            log::debug!("detached window is gone, dropping channel");
            self.channel = None;
            self.forget_sent();
            return false;
        }
        self.last_sent = Some(now);
        match channel.post(message) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{e}");
                false
            }
        }
    }

    fn forget_sent(&mut self) {
        self.sent_song = None;
        self.sent_repeat = None;
        self.last_sent = None;
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    pub struct ChannelLog {
        pub posts: Vec<OutboundMessage>,
        pub closed: bool,
        pub close_calls: usize,
        pub opens: usize,
        pub fail_post: bool,
    }

    #[derive(Clone, Default)]
    pub struct FakeChannel {
        pub log: Rc<RefCell<ChannelLog>>,
    }

    impl SurfaceChannel for FakeChannel {
        fn is_closed(&self) -> bool {
            self.log.borrow().closed
        }

        fn post(&self, message: &OutboundMessage) -> Result<(), PlayerError> {
            let mut log = self.log.borrow_mut();
            if log.closed {
                return Err(PlayerError::ChannelClosed);
            }
            if log.fail_post {
                return Err(PlayerError::Channel("DataCloneError".into()));
            }
            log.posts.push(message.clone());
            Ok(())
        }

        fn close(&self) {
            let mut log = self.log.borrow_mut();
            log.closed = true;
            log.close_calls += 1;
        }
    }

    impl DetachedOpener for FakeChannel {
        fn open(&self) -> Result<Box<dyn SurfaceChannel>, PlayerError> {
            let mut log = self.log.borrow_mut();
            log.opens += 1;
            log.closed = false;
            Ok(Box::new(self.clone()))
        }
    }

    #[derive(Default)]
    pub struct SessionLog {
        pub registrations: usize,
        pub metadata: Vec<String>,
        pub states: Vec<bool>,
        pub clears: usize,
        pub commands: Option<CommandInbox>,
    }

    #[derive(Clone, Default)]
    pub struct FakeSession {
        pub log: Rc<RefCell<SessionLog>>,
    }

    impl MediaSessionSurface for FakeSession {
        fn register_handlers(&mut self, commands: CommandInbox) -> Result<(), PlayerError> {
            let mut log = self.log.borrow_mut();
            log.registrations += 1;
            log.commands = Some(commands);
            Ok(())
        }

        fn set_metadata(&self, track: &Track) -> Result<(), PlayerError> {
            self.log.borrow_mut().metadata.push(track.title.clone());
            Ok(())
        }

        fn clear(&self) {
            self.log.borrow_mut().clears += 1;
        }

        fn set_playback_state(&self, playing: bool) {
            self.log.borrow_mut().states.push(playing);
        }
    }
}
