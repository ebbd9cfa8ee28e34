//! Spectrum-reactive point field.
//!
//! A static grid of points on the X/Z plane is displaced vertically by two
//! travelling waves and projected through a perspective camera onto the egui
//! painter. Geometry is only (re)built on start or restyle; per-frame work
//! touches the uniforms and the reusable shape buffer.

use std::f32::consts::PI;

use egui::{Color32, Painter, Pos2, Rect, Shape};
use web_time::Instant;

use crate::config::VisualizerStyle;
use crate::spectrum::SpectrumSnapshot;

const CAMERA_Z: f32 = 10.0;
const NEAR: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            width: rect.width(),
            height: rect.height(),
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub aspect: f32,
    focal: f32,
    far: f32,
}

impl Camera {
    pub fn new(fov_deg: f32, viewport: Viewport) -> Self {
        let half = (fov_deg.clamp(1.0, 179.0) / 2.0).to_radians();
        // far plane at twice the distance where the viewport height fills the fov
        let dist = viewport.height.max(1.0) / 2.0 / half.tan();
        Self {
            aspect: viewport.aspect(),
            focal: 1.0 / half.tan(),
            far: dist * 2.0,
        }
    }

    /// Normalized device coordinates, or `None` when clipped.
    pub fn project(&self, p: [f32; 3]) -> Option<[f32; 2]> {
        let depth = CAMERA_Z - p[2];
        if !(NEAR..=self.far).contains(&depth) {
            return None;
        }
        let x = self.focal / self.aspect * p[0] / depth;
        let y = self.focal * p[1] / depth;
        (x.abs() <= 1.05 && y.abs() <= 1.05).then_some([x, y])
    }
}

/// Per-frame shader-style parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uniforms {
    pub time: f32,
    pub bass: f32,
    pub intensity: f32,
}

/// Vertical displacement of a grid point.
pub fn wave_height(x: f32, z: f32, u: &Uniforms, style: &VisualizerStyle) -> f32 {
    let phase = u.time * style.wave_speed;
    let amplitude = 1.0 + u.bass * style.bass_amplitude;
    ((x / PI * u.intensity + phase).cos() + (z / PI * u.intensity + phase).sin()) * amplitude
}

/// Wave frequency multiplier, bounded to `[0.5, 2] × base` while live.
pub fn intensity_for(snapshot: &SpectrumSnapshot, base: f32) -> f32 {
    if snapshot.live {
        (base * (0.5 + snapshot.energy * 1.5)).clamp(base * 0.5, base * 2.0)
    } else {
        base
    }
}

struct PointGeometry {
    positions: Vec<[f32; 3]>,
    color: Color32,
}

impl PointGeometry {
    fn build(style: &VisualizerStyle, viewport: Viewport) -> Self {
        let width = style.grid_width * viewport.aspect();
        let depth = style.grid_depth;
        let spacing = grid_spacing(style, width, depth);

        let columns = (width / spacing).ceil() as usize;
        let rows = (depth / spacing).ceil() as usize;
        let mut positions = Vec::with_capacity(columns * rows);
        for i in 0..columns {
            let x = i as f32 * spacing;
            for j in 0..rows {
                let z = j as f32 * spacing;
                positions.push([-width / 2.0 + x, style.base_height, -depth / 2.0 + z]);
            }
        }
        Self {
            positions,
            color: style.color32(),
        }
    }
}

fn grid_spacing(style: &VisualizerStyle, width: f32, depth: f32) -> f32 {
    let base = style.grid_spacing.max(0.5);
    match style.density_hint {
        Some(hint) if hint > 0 => base.max((width * depth / hint as f32).sqrt()),
        _ => base,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopState {
    Idle,
    Running,
    Stopped,
}

pub struct VisualizationRenderer {
    style: VisualizerStyle,
    viewport: Viewport,
    camera: Camera,
    state: LoopState,
    geometry: Option<PointGeometry>,
    uniforms: Uniforms,
    started_at: Option<Instant>,
    builds: usize,
    shapes: Vec<Shape>,
}

impl VisualizationRenderer {
    pub fn new(style: VisualizerStyle, viewport: Viewport) -> Self {
        let camera = Camera::new(style.fov_deg, viewport);
        let uniforms = Uniforms {
            time: 0.0,
            bass: 0.0,
            intensity: style.wave_intensity,
        };
        Self {
            style,
            viewport,
            camera,
            state: LoopState::Idle,
            geometry: None,
            uniforms,
            started_at: None,
            builds: 0,
            shapes: Vec::new(),
        }
    }

    /// Start the frame loop. Calling it while running does nothing.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state == LoopState::Running {
            return false;
        }
        self.rebuild();
        self.started_at = Some(now);
        self.state = LoopState::Running;
        log::debug!("visualizer started with {} points", self.point_count());
        true
    }

    /// Cancel the loop and release the geometry. Only the first call has an effect.
    pub fn stop(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Stopped;
        self.geometry = None;
        self.shapes = Vec::new();
        log::debug!("visualizer stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Camera and surface only; the point grid is kept.
    pub fn resize(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.camera = Camera::new(self.style.fov_deg, viewport);
    }

    /// A style change disposes and rebuilds the geometry; the loop itself is untouched.
    pub fn restyle(&mut self, style: VisualizerStyle) {
        if style == self.style {
            return;
        }
        self.style = style;
        self.camera = Camera::new(self.style.fov_deg, self.viewport);
        if self.state == LoopState::Running {
            self.rebuild();
        }
    }

    pub fn update(&mut self, now: Instant, snapshot: &SpectrumSnapshot) {
        let Some(started) = self.started_at else {
            return;
        };
        self.uniforms = Uniforms {
            time: now.saturating_duration_since(started).as_secs_f32(),
            bass: snapshot.bass,
            intensity: intensity_for(snapshot, self.style.wave_intensity),
        };
    }

    pub fn paint(&mut self, painter: &Painter, rect: Rect) {
        let Some(geometry) = &self.geometry else {
            return;
        };
        let u = self.uniforms;
        let radius = (self.style.point_size * (1.0 + u.bass * self.style.bass_point_scale) * 0.5).max(0.5);
        let (half_w, half_h) = (rect.width() / 2.0, rect.height() / 2.0);
        let center = rect.center();

        self.shapes.clear();
        for p in &geometry.positions {
            let y = p[1] + wave_height(p[0], p[2], &u, &self.style);
            if let Some([nx, ny]) = self.camera.project([p[0], y, p[2]]) {
                let pos = Pos2::new(center.x + nx * half_w, center.y - ny * half_h);
                self.shapes.push(Shape::circle_filled(pos, radius, geometry.color));
            }
        }
        painter.extend(self.shapes.drain(..));
    }

    pub fn uniforms(&self) -> Uniforms {
        self.uniforms
    }

    pub fn point_count(&self) -> usize {
        self.geometry.as_ref().map_or(0, |g| g.positions.len())
    }

    pub fn build_count(&self) -> usize {
        self.builds
    }

    fn rebuild(&mut self) {
        // drop the old buffers before allocating the new ones
        self.geometry = None;
        self.geometry = Some(PointGeometry::build(&self.style, self.viewport));
        self.builds += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const VIEW: Viewport = Viewport {
        width: 1600.0,
        height: 900.0,
    };

    fn live(bass: f32, energy: f32) -> SpectrumSnapshot {
        SpectrumSnapshot { bass, energy, live: true }
    }

    #[test]
    fn start_is_idempotent_and_stop_releases_geometry_once() {
        let mut r = VisualizationRenderer::new(VisualizerStyle::default(), VIEW);
        let now = Instant::now();
        assert!(r.start(now));
        assert!(!r.start(now));
        assert_eq!(r.build_count(), 1);
        assert!(r.point_count() > 0);

        assert!(r.stop());
        assert!(!r.stop());
        assert_eq!(r.point_count(), 0);
        assert!(!r.is_running());
    }

    #[test]
    fn density_hint_bounds_point_count() {
        let mut r = VisualizationRenderer::new(VisualizerStyle::default(), VIEW);
        r.start(Instant::now());
        let count = r.point_count();
        assert!((4000..=6000).contains(&count), "{count}");

        let dense = VisualizerStyle {
            density_hint: None,
            ..Default::default()
        };
        r.restyle(dense);
        assert!(r.point_count() > count);
    }

    #[test]
    fn resize_keeps_geometry_restyle_rebuilds() {
        let mut r = VisualizationRenderer::new(VisualizerStyle::default(), VIEW);
        r.start(Instant::now());
        let count = r.point_count();
        r.resize(Viewport {
            width: 800.0,
            height: 800.0,
        });
        assert_eq!(r.build_count(), 1);
        assert_eq!(r.point_count(), count);
        assert!(r.is_running());

        r.restyle(VisualizerStyle::default());
        assert_eq!(r.build_count(), 1);
        r.restyle(VisualizerStyle {
            color: "#ff00aa".into(),
            ..Default::default()
        });
        assert_eq!(r.build_count(), 2);
        assert!(r.is_running());
    }

    #[test]
    fn restyle_while_idle_defers_building() {
        let mut r = VisualizationRenderer::new(VisualizerStyle::default(), VIEW);
        r.restyle(VisualizerStyle {
            point_size: 3.0,
            ..Default::default()
        });
        assert_eq!(r.build_count(), 0);
        assert!(!r.is_running());
    }

    #[test]
    fn bass_scales_wave_amplitude() {
        let style = VisualizerStyle::default();
        let quiet = Uniforms {
            time: 0.0,
            bass: 0.0,
            intensity: 8.0,
        };
        let loud = Uniforms { bass: 1.0, ..quiet };
        // cos(0) + sin(0) == 1 at the origin
        assert!((wave_height(0.0, 0.0, &quiet, &style) - 1.0).abs() < 1e-6);
        assert!((wave_height(0.0, 0.0, &loud, &style) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn intensity_is_bounded() {
        let base = 8.0;
        assert_eq!(intensity_for(&live(0.0, 0.0), base), 4.0);
        assert_eq!(intensity_for(&live(0.0, 1.0), base), 16.0);
        assert_eq!(intensity_for(&live(0.0, 5.0), base), 16.0);
        let silent = SpectrumSnapshot {
            energy: 0.7,
            ..Default::default()
        };
        assert_eq!(intensity_for(&silent, base), base);
    }

    #[test]
    fn update_tracks_elapsed_time_and_signals() {
        let mut r = VisualizationRenderer::new(VisualizerStyle::default(), VIEW);
        let t0 = Instant::now();
        r.update(t0, &live(1.0, 1.0));
        assert_eq!(r.uniforms().time, 0.0);
        r.start(t0);
        r.update(t0 + Duration::from_millis(1500), &live(0.5, 0.0));
        let u = r.uniforms();
        assert!((u.time - 1.5).abs() < 1e-3);
        assert_eq!(u.bass, 0.5);
        assert_eq!(u.intensity, 4.0);
    }

    #[test]
    fn camera_clips_points_behind_it() {
        let cam = Camera::new(60.0, VIEW);
        assert!(cam.project([0.0, -30.0, 50.0]).is_none());
        let [x, y] = cam.project([0.0, -30.0, -190.0]).unwrap();
        assert_eq!(x, 0.0);
        assert!(y < 0.0);
    }
}
