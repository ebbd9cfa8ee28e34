use egui::{Pos2, Vec2};

use crate::config::LayoutSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelMode {
    Expanded,
    Minimized,
}

/// Placement of the floating player panel. Pure UI state: it never looks at
/// playback or audio.
#[derive(Clone, Debug)]
pub struct WindowLayoutState {
    settings: LayoutSettings,
    viewport: Vec2,
    mode: PanelMode,
    /// Last free-form position, kept while minimized.
    position: Pos2,
    /// Pointer offset from the panel origin while a drag is active.
    drag: Option<Vec2>,
}

impl WindowLayoutState {
    pub fn new(settings: LayoutSettings, viewport: Vec2) -> Self {
        let [ox, oy] = settings.initial_offset;
        let mut layout = Self {
            settings,
            viewport,
            mode: PanelMode::Expanded,
            position: Pos2::new(viewport.x - ox, viewport.y - oy),
            drag: None,
        };
        layout.position = layout.clamp(layout.position);
        layout
    }

    pub fn mode(&self) -> PanelMode {
        self.mode
    }

    pub fn is_minimized(&self) -> bool {
        self.mode == PanelMode::Minimized
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn size(&self) -> Vec2 {
        let [w, h] = match self.mode {
            PanelMode::Expanded => self.settings.expanded_size,
            PanelMode::Minimized => self.settings.minimized_size,
        };
        Vec2::new(w, h)
    }

    /// Where the panel is drawn right now.
    pub fn position(&self) -> Pos2 {
        match self.mode {
            PanelMode::Expanded => self.position,
            PanelMode::Minimized => self.minimized_position(),
        }
    }

    pub fn begin_drag(&mut self, pointer: Pos2) {
        if self.mode == PanelMode::Expanded {
            self.drag = Some(pointer - self.position);
        }
    }

    pub fn drag_to(&mut self, pointer: Pos2) {
        if let Some(offset) = self.drag {
            self.position = self.clamp(pointer - offset);
        }
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    pub fn minimize(&mut self) {
        self.drag = None;
        self.mode = PanelMode::Minimized;
    }

    /// Back to the last free-form position.
    pub fn restore(&mut self) {
        self.mode = PanelMode::Expanded;
        self.position = self.clamp(self.position);
    }

    pub fn toggle_minimized(&mut self) {
        match self.mode {
            PanelMode::Expanded => self.minimize(),
            PanelMode::Minimized => self.restore(),
        }
    }

    pub fn resize_viewport(&mut self, viewport: Vec2) {
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.position = self.clamp(self.position);
    }

    fn minimized_position(&self) -> Pos2 {
        let [w, h] = self.settings.minimized_size;
        let margin = self.settings.margin;
        Pos2::new(
            (self.viewport.x - w - margin).max(0.0),
            (self.viewport.y - h - margin).max(0.0),
        )
    }

    // The clamp uses the configured drag extent rather than the real panel size.
    fn clamp(&self, p: Pos2) -> Pos2 {
        let [ew, eh] = self.settings.drag_extent;
        Pos2::new(
            p.x.clamp(0.0, (self.viewport.x - ew).max(0.0)),
            p.y.clamp(0.0, (self.viewport.y - eh).max(0.0)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> WindowLayoutState {
        WindowLayoutState::new(LayoutSettings::default(), Vec2::new(1280.0, 800.0))
    }

    #[test]
    fn initial_position_is_near_bottom_right() {
        let l = layout();
        assert_eq!(l.position(), Pos2::new(860.0, 280.0));
        assert_eq!(l.size(), Vec2::new(400.0, 520.0));
    }

    #[test]
    fn drag_follows_pointer_within_bounds() {
        let mut l = layout();
        l.begin_drag(Pos2::new(870.0, 290.0));
        assert!(l.is_dragging());
        l.drag_to(Pos2::new(110.0, 60.0));
        assert_eq!(l.position(), Pos2::new(100.0, 50.0));
        l.drag_to(Pos2::new(-500.0, 5000.0));
        assert_eq!(l.position(), Pos2::new(0.0, 300.0));
        l.end_drag();
        l.drag_to(Pos2::new(400.0, 100.0));
        assert_eq!(l.position(), Pos2::new(0.0, 300.0));
    }

    #[test]
    fn minimize_snaps_and_restore_returns() {
        let mut l = layout();
        l.begin_drag(Pos2::new(860.0, 280.0));
        l.drag_to(Pos2::new(200.0, 100.0));
        l.end_drag();
        l.minimize();
        assert!(l.is_minimized());
        assert_eq!(l.position(), Pos2::new(940.0, 716.0));
        assert_eq!(l.size(), Vec2::new(320.0, 64.0));

        // no dragging while minimized
        l.begin_drag(Pos2::new(950.0, 720.0));
        assert!(!l.is_dragging());

        l.restore();
        assert_eq!(l.position(), Pos2::new(200.0, 100.0));
    }

    #[test]
    fn resize_reclamps() {
        let mut l = layout();
        l.resize_viewport(Vec2::new(600.0, 600.0));
        assert_eq!(l.position(), Pos2::new(200.0, 100.0));
        l.resize_viewport(Vec2::new(300.0, 300.0));
        assert_eq!(l.position(), Pos2::new(0.0, 0.0));
    }
}
