//! DrumEngine — the public face of the sequencer.
//!
//! Owns the sound catalog, the tracks, the master bus and the clock, and
//! exposes every control-surface operation. Audio is pulled with
//! [`DrumEngine::render`]; the clock is advanced against the audio time of
//! each rendered quantum, so ticks land on quantum boundaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::assets::{ImpulseResponse, load_impulse_response};
use crate::catalog::SoundCatalog;
use crate::clock::SequencerClock;
use crate::config::EngineConfig;
use crate::dsp::buffer::{RENDER_QUANTUM, RenderedBuffer};
use crate::dsp::convolver::ReverbKernel;
use crate::dsp::mixer::{MasterParams, MixBus};
use crate::dsp::renderer::{BeatSnapshot, OfflineRenderer, TrackSnapshot};
use crate::dsp::voice::{Voice, VoiceRoute, VoiceSynthesizer};
use crate::dsp::wav;
use crate::error::{AssetError, ExportError, InitError};
use crate::track::{Track, TrackData, TrackParams};

#[derive(Debug)]
pub struct DrumEngine {
    config: EngineConfig,
    catalog: SoundCatalog,
    tracks: Vec<Track>,
    master: MasterParams,
    bus: MixBus,
    clock: SequencerClock,
    synth: VoiceSynthesizer,
    kernel: Option<Arc<ReverbKernel>>,
    auditions: Vec<Voice>,
    audition_mix: Vec<f32>,
    /// Frames produced by the live graph so far; the audio clock.
    frames_rendered: u64,
    out_left: Vec<f32>,
    out_right: Vec<f32>,
    /// Read position inside the last rendered quantum.
    out_pos: usize,
    initialized: bool,
}

impl DrumEngine {
    /// Create an engine that stays silent and inert until [`init`](Self::init)
    /// succeeds.
    pub fn new(config: EngineConfig) -> Self {
        let master = MasterParams::default();
        DrumEngine {
            catalog: SoundCatalog::builtin(),
            tracks: Vec::new(),
            bus: MixBus::new(&master, config.sample_rate as f64, None),
            master,
            clock: SequencerClock::new(config.bpm),
            synth: VoiceSynthesizer::new(config.sample_rate, config.noise_seed),
            kernel: None,
            auditions: Vec::new(),
            audition_mix: vec![0.0; RENDER_QUANTUM],
            frames_rendered: 0,
            out_left: vec![0.0; RENDER_QUANTUM],
            out_right: vec![0.0; RENDER_QUANTUM],
            out_pos: RENDER_QUANTUM,
            initialized: false,
            config,
        }
    }

    /// Build the catalog, tracks and audio graph, then try to load the
    /// impulse response. A missing or unreadable IR leaves the reverb silent
    /// but does not fail initialization.
    pub fn init(&mut self) -> Result<(), InitError> {
        let result = self.build();
        if let Err(e) = &result {
            log::error!("engine init failed: {e}");
            self.initialized = false;
            self.tracks.clear();
            return result;
        }

        if let Some(path) = self.config.impulse_response.clone() {
            if let Err(e) = self.load_impulse_response(&path) {
                log::warn!("reverb disabled: {e}");
            }
        }
        log::info!(
            "engine ready: {} tracks, {} sounds, {} Hz",
            self.tracks.len(),
            self.catalog.len(),
            self.config.sample_rate
        );
        Ok(())
    }

    fn build(&mut self) -> Result<(), InitError> {
        self.config.validate()?;

        let catalog = match &self.config.catalog {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| InitError::Catalog {
                    reason: format!("{}: {e}", path.display()),
                })?;
                SoundCatalog::from_json(&json)?
            }
            None => SoundCatalog::builtin(),
        };

        let sample_rate = self.config.sample_rate as f64;
        let params = TrackParams {
            volume: self.config.default_track_volume.clamp(0.0, 1.0),
            ..TrackParams::default()
        };
        let mut tracks = Vec::with_capacity(self.config.track_count());
        for (index, name) in self.config.default_sounds.iter().enumerate() {
            if !catalog.contains(name) {
                return Err(InitError::UnknownDefaultSound {
                    track: index,
                    name: name.clone(),
                });
            }
            tracks.push(Track::new(name.clone(), params, sample_rate));
        }

        // Rewind in place; the step observer outlives re-initialization.
        self.clock.stop();
        self.clock.set_bpm(self.config.bpm);
        self.catalog = catalog;
        self.tracks = tracks;
        self.master = MasterParams::default();
        self.bus = MixBus::new(&self.master, sample_rate, None);
        self.synth = VoiceSynthesizer::new(self.config.sample_rate, self.config.noise_seed);
        self.kernel = None;
        self.auditions.clear();
        self.frames_rendered = 0;
        self.out_pos = RENDER_QUANTUM;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    // ---- reverb ----

    /// Load an impulse response file and make it the shared reverb.
    pub fn load_impulse_response(&mut self, path: &Path) -> Result<(), AssetError> {
        let ir = load_impulse_response(path)?;
        self.set_impulse_response(&ir)
    }

    /// Install an already-decoded impulse response.
    pub fn set_impulse_response(&mut self, ir: &ImpulseResponse) -> Result<(), AssetError> {
        let kernel = Arc::new(ir.to_kernel(self.config.sample_rate)?);
        self.bus.set_kernel(Some(Arc::clone(&kernel)));
        self.kernel = Some(kernel);
        Ok(())
    }

    pub fn has_reverb(&self) -> bool {
        self.kernel.is_some()
    }

    // ---- transport ----

    pub fn play(&mut self) {
        if !self.initialized {
            log::debug!("play ignored: engine not initialized");
            return;
        }
        self.clock.play();
    }

    pub fn stop(&mut self) {
        self.clock.stop();
    }

    /// Set the tempo (clamped) and return the value applied. Restarts a
    /// running sequence from step 0.
    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        let applied = self.clock.set_bpm(bpm);
        self.config.bpm = applied;
        applied
    }

    pub fn bpm(&self) -> u32 {
        self.clock.bpm()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    pub fn current_step(&self) -> usize {
        self.clock.current_step()
    }

    /// Register the step-advance callback, replacing any previous one. It is
    /// called once per tick with the global step that just played.
    pub fn on_step_advance(&mut self, callback: impl FnMut(usize) + 'static) {
        self.clock.set_observer(Some(Box::new(callback)));
    }

    pub fn clear_step_observer(&mut self) {
        self.clock.set_observer(None);
    }

    // ---- master ----

    pub fn master(&self) -> &MasterParams {
        &self.master
    }

    pub fn set_master_volume(&mut self, volume: f64) {
        self.master.set_volume(volume);
        self.bus.apply(&self.master);
    }

    pub fn set_master_eq_low(&mut self, gain_db: f64) {
        self.master.set_eq_low(gain_db);
        self.bus.apply(&self.master);
    }

    pub fn set_master_eq_high(&mut self, gain_db: f64) {
        self.master.set_eq_high(gain_db);
        self.bus.apply(&self.master);
    }

    pub fn set_reverb_wetness(&mut self, wetness: f64) {
        self.master.set_reverb_wetness(wetness);
        self.bus.apply(&self.master);
    }

    // ---- tracks ----

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        let track = self.tracks.get_mut(index);
        if track.is_none() {
            log::debug!("no track at index {index}");
        }
        track
    }

    pub fn set_track_volume(&mut self, index: usize, volume: f64) {
        if let Some(track) = self.track_mut(index) {
            track.set_volume(volume);
        }
    }

    pub fn set_track_pan(&mut self, index: usize, pan: f64) {
        if let Some(track) = self.track_mut(index) {
            track.set_pan(pan);
        }
    }

    pub fn set_track_reverb_amount(&mut self, index: usize, amount: f64) {
        if let Some(track) = self.track_mut(index) {
            track.set_reverb_send(amount);
        }
    }

    pub fn set_track_eq_low(&mut self, index: usize, gain_db: f64) {
        if let Some(track) = self.track_mut(index) {
            track.set_eq_low(gain_db);
        }
    }

    pub fn set_track_eq_high(&mut self, index: usize, gain_db: f64) {
        if let Some(track) = self.track_mut(index) {
            track.set_eq_high(gain_db);
        }
    }

    /// Returns `false` for an unknown track or a step count outside {4, 8, 16}.
    pub fn set_track_step_count(&mut self, index: usize, count: usize) -> bool {
        self.track_mut(index).is_some_and(|t| t.set_step_count(count))
    }

    /// Assign a catalog sound to a track. Unknown names are rejected.
    pub fn set_track_sound(&mut self, index: usize, name: &str) -> bool {
        if !self.catalog.contains(name) {
            log::warn!("unknown sound '{name}'");
            return false;
        }
        match self.track_mut(index) {
            Some(track) => {
                track.set_sound(name);
                true
            }
            None => false,
        }
    }

    /// Flip one step and return its new value; `false` for any invalid index.
    pub fn toggle_step(&mut self, index: usize, step: usize) -> bool {
        self.track_mut(index).is_some_and(|t| t.toggle_step(step))
    }

    pub fn clear_all(&mut self) {
        for track in &mut self.tracks {
            track.clear();
        }
    }

    pub fn track_data(&self, index: usize) -> Option<TrackData> {
        self.tracks.get(index).map(Track::data)
    }

    pub fn sample_names(&self) -> Vec<String> {
        self.catalog.names().into_iter().map(str::to_string).collect()
    }

    /// Audition a sound at full volume straight into the master input,
    /// bypassing track routing and reverb. Returns `false` if nothing was
    /// scheduled.
    pub fn play_sound(&mut self, name: &str) -> bool {
        if !self.initialized {
            return false;
        }
        let Some(definition) = self.catalog.get(name) else {
            log::warn!("unknown sound '{name}'");
            return false;
        };
        match self
            .synth
            .build_voice(definition, 1.0, self.frames_rendered, VoiceRoute::Master)
        {
            Ok(voice) => {
                self.connect(voice);
                true
            }
            Err(e) => {
                log::warn!("cannot play '{name}': {e}");
                false
            }
        }
    }

    /// Hand a voice to the node its route names.
    fn connect(&mut self, voice: Voice) {
        match voice.route() {
            VoiceRoute::Track(index) => match self.tracks.get_mut(index) {
                Some(track) => track.add_voice(voice),
                None => log::debug!("dropping voice for missing track {index}"),
            },
            VoiceRoute::Master => self.auditions.push(voice),
        }
    }

    // ---- live audio ----

    /// Fill `left`/`right` with the next frames of the live mix. Frames past
    /// the shorter slice are left untouched. An uninitialized engine outputs
    /// silence.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if !self.initialized {
            left[..frames].fill(0.0);
            right[..frames].fill(0.0);
            return;
        }
        let mut written = 0;
        while written < frames {
            if self.out_pos >= RENDER_QUANTUM {
                self.render_quantum();
                self.out_pos = 0;
            }
            let take = (RENDER_QUANTUM - self.out_pos).min(frames - written);
            let src = self.out_pos..self.out_pos + take;
            left[written..written + take].copy_from_slice(&self.out_left[src.clone()]);
            right[written..written + take].copy_from_slice(&self.out_right[src]);
            self.out_pos += take;
            written += take;
        }
    }

    /// Audio time of the next quantum to be rendered.
    pub fn audio_time(&self) -> Duration {
        Duration::from_secs_f64(self.frames_rendered as f64 / self.config.sample_rate as f64)
    }

    fn render_quantum(&mut self) {
        let quantum_start = self.frames_rendered;
        if self.clock.poll(self.audio_time()) {
            self.tick(quantum_start);
        }

        for track in self.tracks.iter_mut() {
            let (master, reverb) = self.bus.track_inputs();
            track.render(quantum_start, master, reverb);
        }

        if !self.auditions.is_empty() {
            self.audition_mix.fill(0.0);
            for voice in &mut self.auditions {
                voice.render_into(quantum_start, &mut self.audition_mix);
            }
            self.auditions.retain(|v| !v.is_finished());
            self.bus.add_direct(&self.audition_mix);
        }

        self.bus.process(&mut self.out_left, &mut self.out_right);
        self.frames_rendered += RENDER_QUANTUM as u64;
    }

    /// Trigger every track whose pattern fires on the current step, then
    /// notify and advance the clock.
    fn tick(&mut self, start_frame: u64) {
        let step = self.clock.current_step();
        let mut triggered = Vec::new();
        for (index, track) in self.tracks.iter().enumerate() {
            if !track.step_at(step) {
                continue;
            }
            let Some(definition) = self.catalog.get(track.sound()) else {
                log::warn!("track {index}: sound '{}' not in catalog", track.sound());
                continue;
            };
            let volume = track.params().volume;
            match self
                .synth
                .build_voice(definition, volume, start_frame, VoiceRoute::Track(index))
            {
                Ok(voice) => triggered.push(voice),
                Err(e) => log::warn!("track {index} step {step}: {e}"),
            }
        }
        for voice in triggered {
            self.connect(voice);
        }
        self.clock.finish_tick();
    }

    // ---- export ----

    /// Freeze the current state for an offline render.
    pub fn snapshot(&self) -> Result<BeatSnapshot, ExportError> {
        if !self.initialized {
            return Err(ExportError::NotInitialized);
        }
        Ok(BeatSnapshot {
            bpm: self.clock.bpm(),
            sample_rate: self.config.sample_rate,
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackSnapshot {
                    definition: self.catalog.get(t.sound()).cloned(),
                    steps: t.steps().to_vec(),
                    params: *t.params(),
                })
                .collect(),
            master: self.master,
            kernel: self.kernel.clone(),
            noise_seed: self.config.noise_seed,
        })
    }

    /// Render one full measure offline.
    pub fn render_beat(&self) -> Result<RenderedBuffer, ExportError> {
        OfflineRenderer::new().render(&self.snapshot()?)
    }

    /// Render one full measure and encode it as WAV.
    pub fn export_beat_wav(&self) -> Result<Vec<u8>, ExportError> {
        Ok(wav::encode(&self.render_beat()?))
    }

    /// Render one full measure and write it to `dir` under the configured
    /// export file name.
    pub fn export_beat_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let buffer = self.render_beat()?;
        let path = dir.join(&self.config.export_file_name);
        wav::write_wav(&path, &buffer)?;
        log::info!("exported {:.2}s to {}", buffer.duration_secs(), path.display());
        Ok(path)
    }
}
