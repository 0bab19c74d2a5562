//! DSP — voice synthesis and the routing graph.
//!
//! Everything here processes fixed 128-frame quanta, so the live graph
//! (pulled by an AudioWorklet or the realtime driver) and the offline
//! renderer run exactly the same code.

pub mod buffer;
pub mod chain;
pub mod convolver;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod panner;
pub mod renderer;
pub mod voice;
pub mod wav;
