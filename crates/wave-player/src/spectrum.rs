use crate::config::SamplerSettings;
use crate::graph::FrequencySource;

/// Smoothed signals for one animation frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpectrumSnapshot {
    /// Smoothed low-band level, `0.0..` (above 1 only with gain).
    pub bass: f32,
    /// Smoothed broadband level, `0.0..=1.0`.
    pub energy: f32,
    /// True when derived from analyser data this frame.
    pub live: bool,
}

pub struct SpectrumSampler {
    settings: SamplerSettings,
    // Reused every frame; only reallocated when the analyser's bin count changes.
    buffer: Vec<u8>,
    bass: f32,
    energy: f32,
}

impl SpectrumSampler {
    pub fn new(settings: SamplerSettings) -> Self {
        Self {
            settings,
            buffer: Vec::new(),
            bass: 0.0,
            energy: 0.0,
        }
    }

    /// Sample once per render tick. Without an analyser, or while paused, the
    /// signals decay geometrically instead of cutting out.
    pub fn sample(&mut self, analyser: Option<&dyn FrequencySource>, playing: bool) -> SpectrumSnapshot {
        match analyser {
            Some(source) if playing && source.bin_count() > 0 => self.update_live(source),
            _ => self.decay(),
        }
    }

    pub fn current(&self) -> SpectrumSnapshot {
        SpectrumSnapshot {
            bass: self.bass,
            energy: self.energy,
            live: false,
        }
    }

    fn update_live(&mut self, source: &dyn FrequencySource) -> SpectrumSnapshot {
        let bins = source.bin_count();
        if self.buffer.len() != bins {
            self.buffer.resize(bins, 0);
        }
        source.read_frequency_bytes(&mut self.buffer);

        let raw_bass = band_mean(&self.buffer, self.settings.bass_bins) * self.settings.bass_gain;
        let raw_energy = band_mean(&self.buffer, self.settings.energy_bins);

        let alpha = self.settings.alpha.clamp(0.0, 1.0);
        self.bass += (raw_bass - self.bass) * alpha;
        self.energy += (raw_energy - self.energy) * alpha;

        SpectrumSnapshot {
            bass: self.bass.max(0.0),
            energy: self.energy.max(0.0),
            live: true,
        }
    }

    fn decay(&mut self) -> SpectrumSnapshot {
        let factor = self.settings.decay.clamp(0.0, 1.0);
        let floor = self.settings.floor;
        let fade = |v: f32| {
            let next = v * factor;
            if next < floor {
                0.0
            } else {
                next
            }
        };
        self.bass = fade(self.bass);
        self.energy = fade(self.energy);
        self.current()
    }
}

/// Mean of the lowest `count` bins, normalized to `0.0..=1.0`.
fn band_mean(bins: &[u8], count: usize) -> f32 {
    let band = &bins[..count.min(bins.len())];
    if band.is_empty() {
        return 0.0;
    }
    let sum: u32 = band.iter().map(|&x| u32::from(x)).sum();
    sum as f32 / (band.len() as f32 * 255.0)
}
