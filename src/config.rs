//! Engine configuration.
//!
//! Everything here has a sensible default, so an empty JSON object is a
//! valid config.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::InitError;

/// Start-up parameters for a [`crate::engine::DrumEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Output sample rate in Hz, shared by the live graph and exports.
    pub sample_rate: u32,
    /// Initial tempo in beats per minute.
    pub bpm: u32,
    /// One sound name per sequencer lane; its length is the track count.
    pub default_sounds: Vec<String>,
    /// Initial per-track volume.
    pub default_track_volume: f64,
    /// Impulse response for the shared reverb (WAV or MP3).
    pub impulse_response: Option<PathBuf>,
    /// Optional JSON sound table replacing the built-in catalog.
    pub catalog: Option<PathBuf>,
    /// File name used by `export_beat_to`.
    pub export_file_name: String,
    /// Seed for the noise layers, so exports are reproducible.
    pub noise_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            bpm: 120,
            default_sounds: ["kick-01", "snare-01", "hihat-01", "bass-01"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_track_volume: 0.8,
            impulse_response: Some(PathBuf::from("reverb_ir.wav")),
            catalog: None,
            export_file_name: "beat.wav".to_string(),
            noise_seed: 0x5eed_0f_be47,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, InitError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| InitError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn track_count(&self) -> usize {
        self.default_sounds.len()
    }

    /// Reject configurations the audio graph cannot run with.
    pub fn validate(&self) -> Result<(), InitError> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(InitError::InvalidConfig {
                reason: format!("sample rate {} Hz is outside 8000..=192000", self.sample_rate),
            });
        }
        if self.default_sounds.is_empty() {
            return Err(InitError::InvalidConfig {
                reason: "at least one track is required".to_string(),
            });
        }
        if self.export_file_name.is_empty() {
            return Err(InitError::InvalidConfig {
                reason: "export file name is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.track_count(), 4);
        assert_eq!(config.export_file_name, "beat.wav");
    }

    #[test]
    fn partial_override() {
        let config = EngineConfig::from_json(
            r#"{ "sampleRate": 48000, "bpm": 90, "defaultSounds": ["kick-02", "clap-01"], "impulseResponse": null }"#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.bpm, 90);
        assert_eq!(config.track_count(), 2);
        assert_eq!(config.impulse_response, None);
        assert_eq!(config.default_track_volume, 0.8);
    }

    #[test]
    fn rejects_bad_sample_rate() {
        let err = EngineConfig::from_json(r#"{ "sampleRate": 0 }"#);
        assert!(matches!(err, Err(InitError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_zero_tracks() {
        let err = EngineConfig::from_json(r#"{ "defaultSounds": [] }"#);
        assert!(matches!(err, Err(InitError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(EngineConfig::from_json("{ sampleRate: 1 ").is_err());
    }
}
