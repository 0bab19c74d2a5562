//! Offline renderer — renders one 16-step measure into a stereo buffer.
//!
//! The render runs on its own graph: a fresh master bus, and for every
//! active (step, track) pair a fresh track chain configured from the
//! snapshot with one voice scheduled on it. Only the reverb kernel is shared
//! with the live engine.

use std::sync::Arc;

use crate::catalog::SoundDefinition;
use crate::clock::GLOBAL_STEP_COUNT;
use crate::error::ExportError;
use crate::track::TrackParams;

use super::buffer::{RENDER_QUANTUM, RenderedBuffer};
use super::chain::TrackChain;
use super::convolver::ReverbKernel;
use super::mixer::{MasterParams, MixBus};
use super::voice::{Voice, VoiceRoute, VoiceSynthesizer};

/// Frozen state of one track at export time.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    /// `None` when the track's sound could not be resolved; the track is
    /// skipped.
    pub definition: Option<SoundDefinition>,
    pub steps: Vec<bool>,
    pub params: TrackParams,
}

/// Everything an export needs, detached from the live engine.
#[derive(Debug, Clone)]
pub struct BeatSnapshot {
    pub bpm: u32,
    pub sample_rate: u32,
    pub tracks: Vec<TrackSnapshot>,
    pub master: MasterParams,
    pub kernel: Option<Arc<ReverbKernel>>,
    pub noise_seed: u64,
}

impl BeatSnapshot {
    /// Length of one sixteenth-note step in seconds.
    pub fn step_duration_secs(&self) -> f64 {
        (60.0 / self.bpm as f64) / 4.0
    }

    /// Frames in one full measure.
    pub fn frame_count(&self) -> usize {
        (GLOBAL_STEP_COUNT as f64 * self.step_duration_secs() * self.sample_rate as f64).round()
            as usize
    }

    /// Absolute start frame of global step `step`.
    pub fn step_frame(&self, step: usize) -> u64 {
        (step as f64 * self.step_duration_secs() * self.sample_rate as f64).round() as u64
    }
}

struct ScheduledVoice {
    /// `None` for voices routed straight to the master input.
    chain: Option<TrackChain>,
    voice: Voice,
}

impl ScheduledVoice {
    /// Give the voice a fresh node for its route. A track route naming a
    /// track outside the snapshot yields `None`.
    fn connect(voice: Voice, snapshot: &BeatSnapshot) -> Option<Self> {
        let chain = match voice.route() {
            VoiceRoute::Track(index) => {
                let track = snapshot.tracks.get(index)?;
                Some(TrackChain::new(&track.params, snapshot.sample_rate as f64))
            }
            VoiceRoute::Master => None,
        };
        Some(ScheduledVoice { chain, voice })
    }
}

/// Renders a [`BeatSnapshot`] synchronously to completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRenderer;

impl OfflineRenderer {
    pub fn new() -> Self {
        OfflineRenderer
    }

    pub fn render(&self, snapshot: &BeatSnapshot) -> Result<RenderedBuffer, ExportError> {
        if snapshot.bpm == 0 {
            return Err(ExportError::Render {
                reason: "tempo is zero".to_string(),
            });
        }
        if snapshot.sample_rate == 0 {
            return Err(ExportError::Render {
                reason: "sample rate is zero".to_string(),
            });
        }

        let sample_rate = snapshot.sample_rate as f64;
        let total = snapshot.frame_count();
        let mut scheduled = schedule(snapshot);
        let mut bus = MixBus::new(&snapshot.master, sample_rate, snapshot.kernel.clone());

        log::info!(
            "rendering {} frames at {} BPM with {} voices",
            total,
            snapshot.bpm,
            scheduled.len()
        );

        let mut left = vec![0.0_f32; total];
        let mut right = vec![0.0_f32; total];
        let mut mix = vec![0.0_f32; RENDER_QUANTUM];

        let mut quantum_start = 0;
        while quantum_start < total {
            let n = (total - quantum_start).min(RENDER_QUANTUM);
            let quantum_end = (quantum_start + n) as u64;

            for sv in scheduled.iter_mut().filter(|sv| sv.voice.start_frame() < quantum_end) {
                let mix = &mut mix[..n];
                mix.fill(0.0);
                sv.voice.render_into(quantum_start as u64, mix);
                match &mut sv.chain {
                    Some(chain) => {
                        let (master, reverb) = bus.track_inputs();
                        chain.process(mix, master, reverb);
                    }
                    None => bus.add_direct(mix),
                }
            }
            scheduled.retain(|sv| !sv.voice.is_finished());

            let range = quantum_start..quantum_start + n;
            bus.process(&mut left[range.clone()], &mut right[range]);
            quantum_start += n;
        }

        Ok(RenderedBuffer::from_channels(vec![left, right], snapshot.sample_rate))
    }
}

fn schedule(snapshot: &BeatSnapshot) -> Vec<ScheduledVoice> {
    let mut synth = VoiceSynthesizer::new(snapshot.sample_rate, snapshot.noise_seed);
    let mut scheduled = Vec::new();

    for step in 0..GLOBAL_STEP_COUNT {
        for (index, track) in snapshot.tracks.iter().enumerate() {
            if track.steps.is_empty() || !track.steps[step % track.steps.len()] {
                continue;
            }
            let Some(definition) = &track.definition else {
                log::warn!("track {index} has no sound; skipping step {step}");
                continue;
            };
            let start = snapshot.step_frame(step);
            match synth.build_voice(definition, track.params.volume, start, VoiceRoute::Track(index)) {
                Ok(voice) => scheduled.extend(ScheduledVoice::connect(voice, snapshot)),
                Err(e) => log::warn!("track {index} step {step}: {e}"),
            }
        }
    }
    scheduled
}
