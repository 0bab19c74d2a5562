//! Sequencer lanes.
//!
//! A [`Track`] is one row of the grid: a sound name, a step pattern, mixing
//! parameters, and the live routing chain those parameters drive.

use serde::{Deserialize, Serialize};

use crate::dsp::buffer::RENDER_QUANTUM;
use crate::dsp::chain::TrackChain;
use crate::dsp::voice::Voice;

/// Step counts a track may use.
pub const STEP_COUNTS: [usize; 3] = [4, 8, 16];

pub const EQ_RANGE_DB: f64 = 12.0;

/// Clamp a parameter into `[min, max]`. Non-finite input yields `None`.
pub(crate) fn clamp_param(value: f64, min: f64, max: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(min, max))
}

/// Mixing parameters for one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackParams {
    pub volume: f64,
    pub pan: f64,
    #[serde(rename = "reverbAmount")]
    pub reverb_send: f64,
    pub eq_low: f64,
    pub eq_high: f64,
}

impl Default for TrackParams {
    fn default() -> Self {
        TrackParams {
            volume: 0.8,
            pan: 0.0,
            reverb_send: 0.0,
            eq_low: 0.0,
            eq_high: 0.0,
        }
    }
}

/// Read-only view of a track for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub sound: String,
    pub step_count: usize,
    pub steps: Vec<bool>,
    #[serde(flatten)]
    pub params: TrackParams,
}

#[derive(Debug, Clone)]
pub struct Track {
    sound: String,
    steps: Vec<bool>,
    params: TrackParams,
    chain: TrackChain,
    voices: Vec<Voice>,
    mix: Vec<f32>,
}

impl Track {
    pub fn new(sound: impl Into<String>, params: TrackParams, sample_rate: f64) -> Self {
        Track {
            sound: sound.into(),
            steps: vec![false; 16],
            chain: TrackChain::new(&params, sample_rate),
            params,
            voices: Vec::new(),
            mix: vec![0.0; RENDER_QUANTUM],
        }
    }

    pub fn sound(&self) -> &str {
        &self.sound
    }

    pub fn set_sound(&mut self, sound: impl Into<String>) {
        self.sound = sound.into();
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[bool] {
        &self.steps
    }

    pub fn params(&self) -> &TrackParams {
        &self.params
    }

    /// Resize the pattern, keeping the overlapping prefix. Counts outside
    /// [`STEP_COUNTS`] are ignored and reported as `false`.
    pub fn set_step_count(&mut self, count: usize) -> bool {
        if !STEP_COUNTS.contains(&count) {
            log::warn!("ignoring unsupported step count {count}");
            return false;
        }
        self.steps.resize(count, false);
        true
    }

    /// Flip step `index` and return its new value. Out-of-range indices are
    /// a no-op returning `false`.
    pub fn toggle_step(&mut self, index: usize) -> bool {
        match self.steps.get_mut(index) {
            Some(step) => {
                *step = !*step;
                *step
            }
            None => {
                log::debug!("step {index} is outside a {}-step pattern", self.steps.len());
                false
            }
        }
    }

    /// Whether this track fires at global step `global`.
    pub fn step_at(&self, global: usize) -> bool {
        self.steps[global % self.steps.len()]
    }

    pub fn clear(&mut self) {
        self.steps.fill(false);
    }

    pub fn set_volume(&mut self, volume: f64) {
        if let Some(v) = clamp_param(volume, 0.0, 1.0) {
            self.params.volume = v;
            self.chain.apply(&self.params);
        }
    }

    pub fn set_pan(&mut self, pan: f64) {
        if let Some(v) = clamp_param(pan, -1.0, 1.0) {
            self.params.pan = v;
            self.chain.apply(&self.params);
        }
    }

    pub fn set_reverb_send(&mut self, amount: f64) {
        if let Some(v) = clamp_param(amount, 0.0, 1.0) {
            self.params.reverb_send = v;
            self.chain.apply(&self.params);
        }
    }

    pub fn set_eq_low(&mut self, gain_db: f64) {
        if let Some(v) = clamp_param(gain_db, -EQ_RANGE_DB, EQ_RANGE_DB) {
            self.params.eq_low = v;
            self.chain.apply(&self.params);
        }
    }

    pub fn set_eq_high(&mut self, gain_db: f64) {
        if let Some(v) = clamp_param(gain_db, -EQ_RANGE_DB, EQ_RANGE_DB) {
            self.params.eq_high = v;
            self.chain.apply(&self.params);
        }
    }

    pub fn data(&self) -> TrackData {
        TrackData {
            sound: self.sound.clone(),
            step_count: self.steps.len(),
            steps: self.steps.clone(),
            params: self.params,
        }
    }

    /// Attach a voice to this track's input.
    pub fn add_voice(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Render this track's voices for one quantum through its chain.
    pub fn render(
        &mut self,
        quantum_start: u64,
        master: (&mut [f32], &mut [f32]),
        reverb: (&mut [f32], &mut [f32]),
    ) {
        if self.voices.is_empty() {
            return;
        }
        let n = master.0.len().min(RENDER_QUANTUM);
        let mix = &mut self.mix[..n];
        mix.fill(0.0);
        for voice in &mut self.voices {
            voice.render_into(quantum_start, mix);
        }
        self.voices.retain(|v| !v.is_finished());
        self.chain.process(mix, master, reverb);
    }
}
