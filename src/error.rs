use std::fmt;
use std::path::PathBuf;

/// Top-level error for the public engine surface.
#[derive(Debug)]
pub enum EngineError {
    Init(InitError),
    Export(ExportError),
    Asset(AssetError),
}

/// Raised by `DrumEngine::init` when the engine cannot be brought up.
#[derive(Debug)]
pub enum InitError {
    InvalidConfig { reason: String },
    Catalog { reason: String },
    UnknownDefaultSound { track: usize, name: String },
}

/// Raised while reading or decoding the impulse-response asset.
#[derive(Debug)]
pub enum AssetError {
    Io { path: PathBuf, source: std::io::Error },
    Decode { reason: String },
    Unsupported { format: String },
    Empty,
}

/// Raised by the export path.
#[derive(Debug)]
pub enum ExportError {
    NotInitialized,
    Render { reason: String },
    Io { path: PathBuf, source: std::io::Error },
}

/// Raised when a sound definition cannot be turned into a voice.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceError {
    InvalidFrequency(f64),
    InvalidGain(f64),
    InvalidDuration(f64),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Init(e) => write!(f, "Initialization failed: {e}"),
            EngineError::Export(e) => write!(f, "Export failed: {e}"),
            EngineError::Asset(e) => write!(f, "Asset error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Init(e) => Some(e),
            EngineError::Export(e) => Some(e),
            EngineError::Asset(e) => Some(e),
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
            InitError::Catalog { reason } => write!(f, "unusable sound catalog: {reason}"),
            InitError::UnknownDefaultSound { track, name } => {
                write!(f, "default sound '{name}' for track {track} is not in the catalog")
            }
        }
    }
}

impl std::error::Error for InitError {}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::Io { path, source } => write!(f, "cannot read '{}': {source}", path.display()),
            AssetError::Decode { reason } => write!(f, "cannot decode audio: {reason}"),
            AssetError::Unsupported { format } => write!(f, "unsupported audio format '{format}'"),
            AssetError::Empty => write!(f, "audio asset contains no frames"),
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NotInitialized => write!(f, "engine is not initialized"),
            ExportError::Render { reason } => write!(f, "render failed: {reason}"),
            ExportError::Io { path, source } => write!(f, "cannot write '{}': {source}", path.display()),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceError::InvalidFrequency(v) => write!(f, "invalid oscillator frequency {v}"),
            VoiceError::InvalidGain(v) => write!(f, "invalid peak gain {v}"),
            VoiceError::InvalidDuration(v) => write!(f, "invalid voice duration {v}s"),
        }
    }
}

impl std::error::Error for VoiceError {}

impl From<InitError> for EngineError {
    fn from(e: InitError) -> Self {
        EngineError::Init(e)
    }
}

impl From<ExportError> for EngineError {
    fn from(e: ExportError) -> Self {
        EngineError::Export(e)
    }
}

impl From<AssetError> for EngineError {
    fn from(e: AssetError) -> Self {
        EngineError::Asset(e)
    }
}
