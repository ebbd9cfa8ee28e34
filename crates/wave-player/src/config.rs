use egui::Color32;
use serde::{Deserialize, Serialize};

use crate::error::PlayerError;

/// Top-level configuration, usually embedded in the host page as JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub analyser: AnalyserSettings,
    pub sampler: SamplerSettings,
    pub visualizer: VisualizerStyle,
    pub timing: PlaybackTiming,
    pub layout: LayoutSettings,
    pub sync: SyncSettings,
    pub backend: BackendSettings,
}

impl PlayerConfig {
    /// Parse a (possibly partial) JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, PlayerError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserSettings {
    pub fft_size: u32,
    pub smoothing_time_constant: f64,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing_time_constant: 0.7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Lowest bins averaged into the bass level.
    pub bass_bins: usize,
    /// Lowest bins averaged into the broadband energy.
    pub energy_bins: usize,
    /// Exponential smoothing factor applied while live.
    pub alpha: f32,
    /// Per-tick multiplier applied while silent.
    pub decay: f32,
    pub bass_gain: f32,
    /// Decaying values under this floor snap to zero.
    pub floor: f32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            bass_bins: 12,
            energy_bins: 30,
            alpha: 0.3,
            decay: 0.95,
            bass_gain: 1.0,
            floor: 1e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerStyle {
    pub point_size: f32,
    pub wave_speed: f32,
    pub wave_intensity: f32,
    /// `#rrggbb`
    pub color: String,
    pub grid_spacing: f32,
    pub grid_depth: f32,
    /// Grid width for a square viewport; scaled by the aspect ratio.
    pub grid_width: f32,
    pub base_height: f32,
    /// Desired point count. Only ever widens the spacing, never narrows it.
    pub density_hint: Option<u32>,
    pub bass_amplitude: f32,
    pub bass_point_scale: f32,
    pub fov_deg: f32,
}

impl Default for VisualizerStyle {
    fn default() -> Self {
        Self {
            point_size: 1.5,
            wave_speed: 2.0,
            wave_intensity: 8.0,
            color: "#00d9ff".to_owned(),
            grid_spacing: 5.0,
            grid_depth: 400.0,
            grid_width: 400.0,
            base_height: -30.0,
            density_hint: Some(5000),
            bass_amplitude: 3.0,
            bass_point_scale: 0.5,
            fov_deg: 60.0,
        }
    }
}

impl VisualizerStyle {
    pub fn color32(&self) -> Color32 {
        parse_hex_color(&self.color).unwrap_or_else(|| {
            log::warn!("invalid visualizer color {:?}, using default", self.color);
            Color32::from_rgb(0x00, 0xd9, 0xff)
        })
    }
}

/// Parse `#rrggbb` (leading `#` optional).
pub fn parse_hex_color(text: &str) -> Option<Color32> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Color32::from_rgb(channel(0)?, channel(2)?, channel(4)?))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackTiming {
    /// Delay between binding a new source and calling `play()`.
    pub play_defer_ms: u64,
    /// Continuous playback needed before a play is recorded.
    pub dwell_ms: u64,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            play_defer_ms: 50,
            dwell_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub expanded_size: [f32; 2],
    pub minimized_size: [f32; 2],
    /// Drag clamp uses these instead of the real panel size.
    pub drag_extent: [f32; 2],
    /// Offset of the initial position from the bottom-right corner.
    pub initial_offset: [f32; 2],
    pub margin: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            expanded_size: [400.0, 520.0],
            minimized_size: [320.0, 64.0],
            drag_extent: [400.0, 500.0],
            initial_offset: [420.0, 520.0],
            margin: 20.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub republish_ms: u64,
    pub poll_ms: u32,
    pub detached_url: String,
    pub detached_name: String,
    pub detached_features: String,
    /// DOM id of the main page's audio element, read by the detached poll.
    pub audio_element_id: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            republish_ms: 1000,
            poll_ms: 500,
            detached_url: "detached.html".to_owned(),
            detached_name: "wave_player_mini".to_owned(),
            detached_features: "width=360,height=220".to_owned(),
            audio_element_id: "wave_player_audio".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    /// localStorage key holding the bearer token.
    pub token_key: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "https://musicstreamingapp-backend.onrender.com".to_owned(),
            token_key: "authToken".to_owned(),
        }
    }
}
