//! Sound catalog — the static table of parametric sound definitions.
//!
//! Every sound the sequencer can play is described here; nothing is sampled.
//! The built-in table ships with the crate, and alternative tables can be
//! loaded from JSON (an array of objects with a `name` plus the definition
//! fields, in the same camelCase spelling as the built-ins).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dsp::filter::FilterType;
use crate::dsp::oscillator::Waveform;
use crate::error::InitError;

/// Broad grouping used by the view layer's sound browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Drums,
    Synths,
    Fx,
}

/// Exponential pitch glide across the voice duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub start: f64,
    pub end: f64,
}

/// One immutable sound recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundDefinition {
    pub category: Category,
    /// Base oscillator frequency in Hz.
    pub freq: f64,
    #[serde(rename = "type")]
    pub waveform: Waveform,
    /// Voice length in seconds; derived from the envelope when absent.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Peak gain [0, 1].
    pub gain: f64,
    #[serde(default)]
    pub attack: Option<f64>,
    #[serde(default)]
    pub decay: Option<f64>,
    /// Sustain level as a fraction of the peak.
    #[serde(default)]
    pub sustain: Option<f64>,
    #[serde(default)]
    pub release: Option<f64>,
    /// Mix a white-noise layer into the voice.
    #[serde(default)]
    pub noise: bool,
    #[serde(default)]
    pub noise_gain: Option<f64>,
    #[serde(default)]
    pub sweep: Option<Sweep>,
    #[serde(default)]
    pub filter_type: Option<FilterType>,
    #[serde(default)]
    pub filter_freq: Option<f64>,
    #[serde(default)]
    pub filter_q: Option<f64>,
}

/// Filter settings after defaults and auto-selection are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
}

const DEFAULT_ATTACK: f64 = 0.01;
const DEFAULT_DECAY: f64 = 0.1;
const DEFAULT_RELEASE: f64 = 0.1;
const DEFAULT_NOISE_GAIN: f64 = 0.3;

fn positive_or(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| *v > 0.0).unwrap_or(fallback)
}

impl SoundDefinition {
    pub fn attack(&self) -> f64 {
        positive_or(self.attack, DEFAULT_ATTACK)
    }

    pub fn decay(&self) -> f64 {
        positive_or(self.decay, DEFAULT_DECAY)
    }

    pub fn release(&self) -> f64 {
        positive_or(self.release, DEFAULT_RELEASE)
    }

    /// Seconds from trigger to the end of the final ramp.
    pub fn total_duration(&self) -> f64 {
        positive_or(self.duration, self.attack() + self.decay() + self.release())
    }

    /// Noise layer gain, if the sound has a noise layer.
    pub fn noise_gain(&self) -> Option<f64> {
        self.noise.then(|| positive_or(self.noise_gain, DEFAULT_NOISE_GAIN))
    }

    /// Explicit overrides win; otherwise high tones get a 2 kHz highpass,
    /// sub-bass tones an 800 Hz lowpass, and everything else a wide-open
    /// lowpass.
    pub fn resolved_filter(&self) -> ResolvedFilter {
        let q = positive_or(self.filter_q, 1.0);
        match self.filter_type {
            Some(filter_type) => ResolvedFilter {
                filter_type,
                frequency: positive_or(self.filter_freq, 20000.0),
                q,
            },
            None if self.freq > 2000.0 => ResolvedFilter {
                filter_type: FilterType::Highpass,
                frequency: positive_or(self.filter_freq, 2000.0),
                q,
            },
            None if self.freq < 150.0 => ResolvedFilter {
                filter_type: FilterType::Lowpass,
                frequency: positive_or(self.filter_freq, 800.0),
                q,
            },
            None => ResolvedFilter {
                filter_type: FilterType::Lowpass,
                frequency: positive_or(self.filter_freq, 20000.0),
                q,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(flatten)]
    definition: SoundDefinition,
}

/// Name-keyed, insertion-ordered table of sound definitions.
#[derive(Debug, Clone)]
pub struct SoundCatalog {
    entries: Vec<(String, SoundDefinition)>,
    index: HashMap<String, usize>,
}

impl SoundCatalog {
    /// Build a catalog, rejecting duplicate names.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, SoundDefinition)>,
    ) -> Result<Self, InitError> {
        let mut catalog = SoundCatalog {
            entries: Vec::new(),
            index: HashMap::new(),
        };
        for (name, definition) in entries {
            if catalog.index.contains_key(&name) {
                return Err(InitError::Catalog {
                    reason: format!("duplicate sound name '{name}'"),
                });
            }
            catalog.index.insert(name.clone(), catalog.entries.len());
            catalog.entries.push((name, definition));
        }
        if catalog.entries.is_empty() {
            return Err(InitError::Catalog {
                reason: "catalog has no sounds".to_string(),
            });
        }
        Ok(catalog)
    }

    /// Load a catalog from a JSON array of named definitions.
    pub fn from_json(json: &str) -> Result<Self, InitError> {
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(json).map_err(|e| InitError::Catalog {
                reason: e.to_string(),
            })?;
        Self::from_entries(entries.into_iter().map(|e| (e.name, e.definition)))
    }

    /// The sixteen sounds the sequencer ships with.
    pub fn builtin() -> Self {
        use Category::*;
        use Waveform::*;

        let tone = |category, freq, waveform, duration, gain, attack, decay| SoundDefinition {
            category,
            freq,
            waveform,
            duration: Some(duration),
            gain,
            attack: Some(attack),
            decay: Some(decay),
            sustain: None,
            release: None,
            noise: false,
            noise_gain: None,
            sweep: None,
            filter_type: None,
            filter_freq: None,
            filter_q: None,
        };
        let noisy = |base: SoundDefinition, noise_gain| SoundDefinition {
            noise: true,
            noise_gain: Some(noise_gain),
            ..base
        };
        let filtered = |base: SoundDefinition, filter_type, filter_freq, filter_q| SoundDefinition {
            filter_type,
            filter_freq: Some(filter_freq),
            filter_q,
            ..base
        };
        let sustained = |base: SoundDefinition, sustain| SoundDefinition {
            sustain: Some(sustain),
            ..base
        };
        let swept = |base: SoundDefinition, start, end| SoundDefinition {
            sweep: Some(Sweep { start, end }),
            ..base
        };

        let entries = vec![
            ("kick-01", tone(Drums, 60.0, Sine, 0.5, 0.8, 0.005, 0.3)),
            ("kick-02", tone(Drums, 50.0, Triangle, 0.7, 0.9, 0.01, 0.4)),
            (
                "snare-01",
                filtered(noisy(tone(Drums, 200.0, Sawtooth, 0.2, 0.6, 0.001, 0.15), 0.4), None, 1500.0, Some(1.0)),
            ),
            (
                "snare-02",
                filtered(noisy(tone(Drums, 150.0, Square, 0.3, 0.7, 0.002, 0.2), 0.5), None, 1000.0, Some(0.5)),
            ),
            (
                "clap-01",
                filtered(
                    noisy(tone(Drums, 1000.0, Square, 0.15, 0.5, 0.001, 0.1), 0.6),
                    Some(FilterType::Bandpass),
                    800.0,
                    Some(2.0),
                ),
            ),
            (
                "clap-02",
                filtered(
                    noisy(tone(Drums, 1200.0, Triangle, 0.2, 0.4, 0.005, 0.15), 0.7),
                    Some(FilterType::Bandpass),
                    1000.0,
                    Some(1.5),
                ),
            ),
            (
                "hihat-01",
                filtered(
                    noisy(tone(Drums, 8000.0, Sawtooth, 0.1, 0.3, 0.001, 0.05), 0.8),
                    Some(FilterType::Highpass),
                    5000.0,
                    None,
                ),
            ),
            (
                "hihat-02",
                filtered(
                    noisy(tone(Drums, 9000.0, Square, 0.15, 0.25, 0.002, 0.07), 0.7),
                    Some(FilterType::Highpass),
                    6000.0,
                    None,
                ),
            ),
            ("perc-01", tone(Drums, 400.0, Triangle, 0.3, 0.4, 0.005, 0.2)),
            ("perc-02", tone(Drums, 800.0, Sine, 0.25, 0.35, 0.002, 0.15)),
            ("bass-01", sustained(tone(Synths, 80.0, Square, 0.8, 0.7, 0.01, 0.5), 0.6)),
            ("bass-02", sustained(tone(Synths, 60.0, Sawtooth, 1.0, 0.75, 0.05, 0.7), 0.5)),
            ("synth-01", sustained(tone(Synths, 440.0, Triangle, 1.0, 0.5, 0.1, 0.5), 0.7)),
            ("synth-02", sustained(tone(Synths, 520.0, Sine, 1.2, 0.45, 0.05, 0.6), 0.8)),
            ("fx-01", swept(tone(Fx, 1200.0, Sine, 0.7, 0.4, 0.01, 0.6), 1200.0, 100.0)),
            ("fx-02", swept(tone(Fx, 200.0, Sawtooth, 0.8, 0.35, 0.05, 0.7), 200.0, 1500.0)),
        ];

        let mut catalog = SoundCatalog {
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
        };
        for (name, definition) in entries {
            catalog.index.insert(name.to_string(), catalog.entries.len());
            catalog.entries.push((name.to_string(), definition));
        }
        catalog
    }

    pub fn get(&self, name: &str) -> Option<&SoundDefinition> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All sound names in catalog order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SoundCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
