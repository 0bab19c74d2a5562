//! Realtime playback on a tokio timer.
//!
//! The driver pulls fixed-size blocks from a shared [`DrumEngine`] at the
//! pace of a tokio interval and hands them to a sink (an audio device
//! callback queue, a socket, a test). Late wakeups are skipped, never
//! bunched, matching the clock's own overrun policy.

use std::cell::RefCell;
use std::ops::ControlFlow;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};

use crate::assets::decode_impulse_response;
use crate::config::EngineConfig;
use crate::engine::DrumEngine;
use crate::error::{AssetError, InitError};

/// Initialize an engine, reading the impulse response asynchronously.
///
/// IR failures are logged and leave the reverb silent, like
/// [`DrumEngine::init`].
pub async fn init_async(config: EngineConfig) -> Result<DrumEngine, InitError> {
    let ir_path = config.impulse_response.clone();
    let mut engine = DrumEngine::new(EngineConfig {
        impulse_response: None,
        ..config
    });
    engine.init()?;

    if let Some(path) = ir_path {
        if let Err(e) = load_ir_async(&mut engine, &path).await {
            log::warn!("reverb disabled: {e}");
        }
    }
    Ok(engine)
}

async fn load_ir_async(engine: &mut DrumEngine, path: &Path) -> Result<(), AssetError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path.extension().and_then(|e| e.to_str());
    let ir = decode_impulse_response(&bytes, ext)?;
    engine.set_impulse_response(&ir)
}

/// Paces block rendering in real time.
pub struct RealtimeDriver {
    engine: Rc<RefCell<DrumEngine>>,
    block_frames: usize,
}

impl RealtimeDriver {
    pub fn new(engine: Rc<RefCell<DrumEngine>>, block_frames: usize) -> Self {
        RealtimeDriver {
            engine,
            block_frames: block_frames.max(1),
        }
    }

    /// Wall-clock duration of one block.
    pub fn block_period(&self) -> Duration {
        let sample_rate = self.engine.borrow().sample_rate() as f64;
        Duration::from_secs_f64(self.block_frames as f64 / sample_rate)
    }

    /// Render blocks until the sink breaks. Returns the number of blocks
    /// delivered.
    pub async fn run<F>(&self, mut sink: F) -> usize
    where
        F: FnMut(&[f32], &[f32]) -> ControlFlow<()>,
    {
        let mut timer = interval(self.block_period());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut left = vec![0.0_f32; self.block_frames];
        let mut right = vec![0.0_f32; self.block_frames];
        let mut delivered = 0;
        loop {
            timer.tick().await;
            self.engine.borrow_mut().render(&mut left, &mut right);
            delivered += 1;
            if sink(&left, &right).is_break() {
                break;
            }
        }
        log::debug!("realtime driver stopped after {delivered} blocks");
        delivered
    }
}
