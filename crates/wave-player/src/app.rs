use std::cell::RefCell;
use std::rc::Rc;

use egui::{Color32, Pos2, Rect, RichText, Sense, Vec2};
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlMediaElement;
use web_time::Instant;

use crate::config::{PlayerConfig, VisualizerStyle};
use crate::error::PlayerError;
use crate::graph::web::WebAudioBackend;
use crate::graph::{AudioGraph, AudioGraphManager, FrequencySource};
use crate::history::web::RestClient;
use crate::history::PlayHistory;
use crate::layout::WindowLayoutState;
use crate::playback::web::WebMediaElement;
use crate::playback::{CommandInbox, EventInbox, PlaybackController};
use crate::spectrum::SpectrumSampler;
use crate::sync::web::{detect_capabilities, CommandListener, WebDetachedOpener, WebMediaSession};
use crate::sync::{MediaSessionSurface, SurfaceSynchronizer};
use crate::track::{format_time, PlaybackState, RepeatMode, Track};
use crate::visualizer::{VisualizationRenderer, Viewport};

type Library = Rc<RefCell<Option<Result<Vec<Track>, PlayerError>>>>;

/// The main page: full-window point field with the floating player on top.
pub struct PlayerShellApp {
    graph: Rc<RefCell<AudioGraphManager<WebAudioBackend>>>,
    controller: PlaybackController<WebMediaElement>,
    sampler: SpectrumSampler,
    renderer: VisualizationRenderer,
    style: VisualizerStyle,
    sync: SurfaceSynchronizer,
    layout: WindowLayoutState,
    commands: CommandInbox,
    changed: Rc<RefCell<Option<PlaybackState>>>,
    library: Library,
    show_queue: bool,
    _command_listener: Option<CommandListener>,
}

impl PlayerShellApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: PlayerConfig) -> Result<Self, PlayerError> {
        let now = Instant::now();
        let screen = Rect::from_min_size(Pos2::ZERO, window_size());

        let graph = Rc::new(RefCell::new(AudioGraphManager::new(
            WebAudioBackend,
            config.analyser.clone(),
        )));
        let erased: Rc<RefCell<dyn AudioGraph<HtmlMediaElement>>> = graph.clone();

        let events = EventInbox::default();
        let media = WebMediaElement::create(&config.sync.audio_element_id, events.clone())?;
        let rest = RestClient::new(config.backend.clone());
        let history: Rc<dyn PlayHistory> = Rc::new(rest.clone());
        let mut controller = PlaybackController::new(media, events, Some(erased), history, config.timing.clone());

        let changed = Rc::new(RefCell::new(None));
        let slot = changed.clone();
        controller.subscribe(move |state: &PlaybackState| *slot.borrow_mut() = Some(state.clone()));

        let commands = CommandInbox::default();
        let capabilities = detect_capabilities();
        let session = WebMediaSession::detect().map(|s| Box::new(s) as Box<dyn MediaSessionSurface>);
        let opener = WebDetachedOpener::new(config.sync.clone());
        let sync = SurfaceSynchronizer::new(
            capabilities,
            session,
            Some(Box::new(opener)),
            &config.sync,
            commands.clone(),
        );
        let command_listener = CommandListener::install(commands.clone())
            .map_err(|e| log::warn!("detached commands disabled: {e}"))
            .ok();

        let mut renderer = VisualizationRenderer::new(config.visualizer.clone(), Viewport::from_rect(screen));
        renderer.start(now);

        let library: Library = Rc::new(RefCell::new(None));
        let sink = library.clone();
        let egui_ctx = cc.egui_ctx.clone();
        spawn_local(async move {
            *sink.borrow_mut() = Some(rest.fetch_tracks().await);
            egui_ctx.request_repaint();
        });

        Ok(Self {
            graph,
            controller,
            sampler: SpectrumSampler::new(config.sampler),
            renderer,
            style: config.visualizer,
            sync,
            layout: WindowLayoutState::new(config.layout, screen.size()),
            commands,
            changed,
            library,
            show_queue: false,
            _command_listener: command_listener,
        })
    }

    fn absorb_library(&mut self) {
        let Some(result) = self.library.borrow_mut().take() else {
            return;
        };
        match result {
            Ok(tracks) => {
                log::info!("library loaded: {} tracks", tracks.len());
                let first = tracks.first().cloned();
                self.controller.set_queue(tracks);
                // restore something to play without starting it
                if let Some(track) = first.filter(|_| self.controller.state().track.is_none()) {
                    self.controller.cue(track);
                }
            }
            Err(e) => log::warn!("library unavailable: {e}"),
        }
    }

    fn player_panel(&mut self, ctx: &egui::Context, now: Instant) {
        let size = self.layout.size();
        egui::Area::new(egui::Id::new("player_panel"))
            .fixed_pos(self.layout.position())
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_width(size.x - 16.0);
                    if self.layout.is_minimized() {
                        self.minimized_controls(ui, now);
                    } else {
                        self.expanded_controls(ui, now);
                    }
                });
            });
    }

    fn header(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let handle = ui.add(egui::Label::new(RichText::new("Now playing").strong()).sense(Sense::drag()));
            if handle.drag_started() {
                if let Some(p) = handle.interact_pointer_pos() {
                    self.layout.begin_drag(p);
                }
            }
            if handle.dragged() {
                if let Some(p) = handle.interact_pointer_pos() {
                    self.layout.drag_to(p);
                }
            }
            if handle.drag_stopped() {
                self.layout.end_drag();
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.small_button("x").on_hover_text("Close").clicked() {
                    self.controller.close();
                }
                let label = if self.layout.is_minimized() { "+" } else { "_" };
                if ui.small_button(label).clicked() {
                    self.layout.toggle_minimized();
                }
            });
        });
    }

    fn minimized_controls(&mut self, ui: &mut egui::Ui, now: Instant) {
        self.header(ui);
        ui.horizontal(|ui| {
            let state = self.controller.state();
            let title = state.track.as_ref().map_or("", |t| t.title.as_str()).to_owned();
            let play_label = if state.is_playing() { "Pause" } else { "Play" };
            if ui.button(play_label).clicked() {
                self.controller.toggle_play(now);
            }
            ui.label(RichText::new(title).color(Color32::WHITE));
        });
    }

    fn expanded_controls(&mut self, ui: &mut egui::Ui, now: Instant) {
        self.header(ui);
        ui.separator();

        let state = self.controller.state().clone();
        if let Some(track) = &state.track {
            ui.label(RichText::new(&track.title).heading().color(Color32::WHITE));
            ui.label(track.artist_label());
        } else {
            ui.label("Nothing selected");
        }
        ui.add_space(6.0);

        let mut fraction = state.progress();
        let slider = egui::Slider::new(&mut fraction, 0.0..=1.0).show_value(false);
        if ui.add_enabled(state.duration.is_some(), slider).changed() {
            self.controller.seek(f64::from(fraction));
        }
        ui.horizontal(|ui| {
            ui.label(format_time(state.current_time));
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format_time(state.duration.unwrap_or(f64::NAN)));
            });
        });

        ui.horizontal(|ui| {
            if ui.button("Prev").clicked() {
                self.controller.previous(now);
            }
            if ui.button("-15s").clicked() {
                self.controller.skip(-15.0);
            }
            let play_label = if state.is_playing() { "Pause" } else { "Play" };
            if ui.button(play_label).clicked() {
                self.controller.toggle_play(now);
            }
            if ui.button("+30s").clicked() {
                self.controller.skip(30.0);
            }
            if ui.button("Next").clicked() {
                self.controller.next(now);
            }
        });

        ui.horizontal(|ui| {
            if ui.selectable_label(state.repeat != RepeatMode::None, state.repeat.label()).clicked() {
                self.controller.toggle_repeat();
            }
            if ui.selectable_label(state.shuffle, "Shuffle").clicked() {
                self.controller.toggle_shuffle();
            }
            if ui.button(format!("{}x", state.playback_rate)).clicked() {
                self.controller.cycle_playback_rate();
            }
        });

        ui.horizontal(|ui| {
            if ui.button(if state.muted { "Unmute" } else { "Mute" }).clicked() {
                self.controller.toggle_mute();
            }
            let mut volume = state.volume;
            if ui.add(egui::Slider::new(&mut volume, 0.0..=1.0).show_value(false)).changed() {
                self.controller.set_volume(volume);
            }
        });

        ui.horizontal(|ui| {
            if ui.button("Queue").clicked() {
                self.show_queue = !self.show_queue;
            }
            let can_detach = self.sync.capabilities().detached_window;
            if ui.add_enabled(can_detach, egui::Button::new("Pop out")).clicked() {
                self.sync.open_detached(now);
            }
        });

        ui.collapsing("Visuals", |ui| {
            ui.add(egui::Slider::new(&mut self.style.point_size, 0.5..=6.0).text("Point size"));
            ui.add(egui::Slider::new(&mut self.style.wave_intensity, 1.0..=20.0).text("Intensity"));
            ui.add(egui::Slider::new(&mut self.style.wave_speed, 0.0..=6.0).text("Speed"));
            let mut color = self.style.color32();
            if ui.color_edit_button_srgba(&mut color).changed() {
                self.style.color = format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b());
            }
        });
        self.renderer.restyle(self.style.clone());
    }

    fn reopen_button(&mut self, ctx: &egui::Context) {
        egui::Area::new(egui::Id::new("queue_button"))
            .anchor(egui::Align2::RIGHT_BOTTOM, Vec2::new(-20.0, -20.0))
            .show(ctx, |ui| {
                if ui.button("Queue").clicked() {
                    self.show_queue = !self.show_queue;
                }
            });
    }

    fn queue_window(&mut self, ctx: &egui::Context, now: Instant) {
        let mut open = self.show_queue;
        let mut picked = None;
        let current = self.controller.state().track.clone();
        egui::Window::new("Queue")
            .open(&mut open)
            .default_width(320.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for track in self.controller.queue().ordered() {
                        let selected = current.as_ref().is_some_and(|c| c.same_media(track));
                        let label = format!("{} - {}", track.title, track.artist_label());
                        if ui.selectable_label(selected, label).clicked() {
                            picked = Some(track.clone());
                        }
                    }
                    if self.controller.queue().is_empty() {
                        ui.label("Queue is empty");
                    }
                });
            });
        self.show_queue = open;
        if let Some(track) = picked {
            self.controller.select_track(track, now);
        }
    }
}

impl eframe::App for PlayerShellApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        self.absorb_library();
        for command in self.commands.drain() {
            self.controller.dispatch(command, now);
        }
        self.controller.poll(now);
        if self.controller.take_show_queue() {
            self.show_queue = true;
        }
        if let Some(state) = self.changed.borrow_mut().take() {
            self.sync.push(&state, now);
        }
        self.sync.tick(now);

        let snapshot = {
            let graph = self.graph.borrow();
            let analyser = graph.analyser().map(|a| a as &dyn FrequencySource);
            self.sampler.sample(analyser, self.controller.is_playing())
        };
        self.renderer.update(now, &snapshot);

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                self.renderer.resize(Viewport::from_rect(rect));
                self.layout.resize_viewport(rect.size());
                self.renderer.paint(ui.painter(), rect);
            });

        if self.controller.state().visible {
            self.player_panel(ctx, now);
        } else {
            self.reopen_button(ctx);
        }
        if self.show_queue {
            self.queue_window(ctx, now);
        }

        if self.renderer.is_running() {
            ctx.request_repaint();
        }
    }
}

impl Drop for PlayerShellApp {
    fn drop(&mut self) {
        self.renderer.stop();
        self.sync.detach();
    }
}

fn window_size() -> Vec2 {
    let Some(window) = web_sys::window() else {
        return Vec2::new(800.0, 600.0);
    };
    let dimension = |v: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>| v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
    Vec2::new(dimension(window.inner_width()), dimension(window.inner_height()))
}
