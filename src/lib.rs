pub mod assets;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
#[cfg(feature = "live")]
pub mod live;
pub mod track;

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::catalog::SoundCatalog;
use crate::clock::GLOBAL_STEP_COUNT;
use crate::config::EngineConfig;
use crate::engine::DrumEngine;
use crate::error::EngineError;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the gridbeat-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: names of the built-in sounds, in catalog order.
#[wasm_bindgen]
pub fn sound_names() -> Result<JsValue, JsValue> {
    to_js(&SoundCatalog::builtin().names())
}

fn to_js<T: serde::Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&format!("{e}")))
}

fn js_err(e: impl Into<EngineError>) -> JsValue {
    JsValue::from_str(&e.into().to_string())
}

const STEP_QUEUE_LIMIT: usize = GLOBAL_STEP_COUNT;

/// WASM-exposed engine handle for an AudioWorklet host.
///
/// The browser has no filesystem, so the impulse response is handed over
/// as bytes and step notifications are queued for the host to drain. The
/// queue holds at most one measure of steps; older entries are dropped.
#[wasm_bindgen]
pub struct WasmEngine {
    inner: DrumEngine,
    steps: Rc<RefCell<Vec<u32>>>,
}

impl WasmEngine {
    fn with_config(config: EngineConfig) -> WasmEngine {
        let mut inner = DrumEngine::new(config);
        let steps = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&steps);
        inner.on_step_advance(move |step| {
            let mut queue = sink.borrow_mut();
            if queue.len() == STEP_QUEUE_LIMIT {
                queue.remove(0);
            }
            queue.push(step as u32);
        });
        WasmEngine { inner, steps }
    }
}

#[wasm_bindgen]
impl WasmEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: u32) -> WasmEngine {
        Self::with_config(EngineConfig {
            sample_rate,
            impulse_response: None,
            ..EngineConfig::default()
        })
    }

    /// Create an engine from a JSON `EngineConfig`.
    #[wasm_bindgen(js_name = fromConfig)]
    pub fn from_config(json: &str) -> Result<WasmEngine, JsValue> {
        let config = EngineConfig::from_json(json).map_err(js_err)?;
        Ok(Self::with_config(config))
    }

    pub fn init(&mut self) -> Result<(), JsValue> {
        self.inner.init().map_err(js_err)
    }

    /// Decode a WAV/MP3 impulse response and install it as the reverb.
    #[wasm_bindgen(js_name = loadImpulseResponse)]
    pub fn load_impulse_response(&mut self, bytes: &[u8], extension: Option<String>) -> Result<(), JsValue> {
        let ir = assets::decode_impulse_response(bytes, extension.as_deref()).map_err(js_err)?;
        self.inner.set_impulse_response(&ir).map_err(js_err)
    }

    pub fn play(&mut self) {
        self.inner.play();
    }

    pub fn stop(&mut self) {
        self.inner.stop();
    }

    #[wasm_bindgen(js_name = setBpm)]
    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        self.inner.set_bpm(bpm)
    }

    #[wasm_bindgen(js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    #[wasm_bindgen(js_name = currentStep)]
    pub fn current_step(&self) -> usize {
        self.inner.current_step()
    }

    #[wasm_bindgen(js_name = setMasterVolume)]
    pub fn set_master_volume(&mut self, volume: f64) {
        self.inner.set_master_volume(volume);
    }

    #[wasm_bindgen(js_name = setMasterEqLow)]
    pub fn set_master_eq_low(&mut self, gain_db: f64) {
        self.inner.set_master_eq_low(gain_db);
    }

    #[wasm_bindgen(js_name = setMasterEqHigh)]
    pub fn set_master_eq_high(&mut self, gain_db: f64) {
        self.inner.set_master_eq_high(gain_db);
    }

    #[wasm_bindgen(js_name = setReverbWetness)]
    pub fn set_reverb_wetness(&mut self, wetness: f64) {
        self.inner.set_reverb_wetness(wetness);
    }

    #[wasm_bindgen(js_name = setTrackVolume)]
    pub fn set_track_volume(&mut self, index: usize, volume: f64) {
        self.inner.set_track_volume(index, volume);
    }

    #[wasm_bindgen(js_name = setTrackPan)]
    pub fn set_track_pan(&mut self, index: usize, pan: f64) {
        self.inner.set_track_pan(index, pan);
    }

    #[wasm_bindgen(js_name = setTrackReverbAmount)]
    pub fn set_track_reverb_amount(&mut self, index: usize, amount: f64) {
        self.inner.set_track_reverb_amount(index, amount);
    }

    #[wasm_bindgen(js_name = setTrackEqLow)]
    pub fn set_track_eq_low(&mut self, index: usize, gain_db: f64) {
        self.inner.set_track_eq_low(index, gain_db);
    }

    #[wasm_bindgen(js_name = setTrackEqHigh)]
    pub fn set_track_eq_high(&mut self, index: usize, gain_db: f64) {
        self.inner.set_track_eq_high(index, gain_db);
    }

    #[wasm_bindgen(js_name = setTrackStepCount)]
    pub fn set_track_step_count(&mut self, index: usize, count: usize) -> bool {
        self.inner.set_track_step_count(index, count)
    }

    #[wasm_bindgen(js_name = setTrackSound)]
    pub fn set_track_sound(&mut self, index: usize, name: &str) -> bool {
        self.inner.set_track_sound(index, name)
    }

    #[wasm_bindgen(js_name = toggleStep)]
    pub fn toggle_step(&mut self, index: usize, step: usize) -> bool {
        self.inner.toggle_step(index, step)
    }

    #[wasm_bindgen(js_name = clearAll)]
    pub fn clear_all(&mut self) {
        self.inner.clear_all();
    }

    #[wasm_bindgen(js_name = playSound)]
    pub fn play_sound(&mut self, name: &str) -> bool {
        self.inner.play_sound(name)
    }

    #[wasm_bindgen(js_name = trackData)]
    pub fn track_data(&self, index: usize) -> Result<JsValue, JsValue> {
        to_js(&self.inner.track_data(index))
    }

    #[wasm_bindgen(js_name = sampleNames)]
    pub fn sample_names(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.sample_names())
    }

    /// Render `frames` frames, interleaved stereo.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut left = vec![0.0_f32; frames];
        let mut right = vec![0.0_f32; frames];
        self.inner.render(&mut left, &mut right);
        left.iter().zip(&right).flat_map(|(&l, &r)| [l, r]).collect()
    }

    /// Render straight into the worklet's output channels.
    #[wasm_bindgen(js_name = renderInto)]
    pub fn render_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.inner.render(left, right);
    }

    /// Steps played since the last call, oldest first.
    #[wasm_bindgen(js_name = drainStepEvents)]
    pub fn drain_step_events(&mut self) -> Vec<u32> {
        std::mem::take(&mut *self.steps.borrow_mut())
    }

    #[wasm_bindgen(js_name = exportBeatWav)]
    pub fn export_beat_wav(&self) -> Result<Vec<u8>, JsValue> {
        self.inner.export_beat_wav().map_err(js_err)
    }
}
