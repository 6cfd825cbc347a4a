use std::{error::Error, fmt, io, path::PathBuf};

use reducenet::MlErr;
use safetensors::SafeTensorError;

/// The trainer crate's result type.
pub type Result<T> = std::result::Result<T, TrainerErr>;

/// Training driver failures.
#[derive(Debug)]
pub enum TrainerErr {
    Io(io::Error),
    Ml(MlErr),
    Config(serde_json::Error),
    InvalidConfig(String),
    Dataset { path: PathBuf, msg: String },
    Checkpoint(SafeTensorError),
    MalformedCheckpoint(String),
}

impl fmt::Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainerErr::Io(e) => write!(f, "io error: {e}"),
            TrainerErr::Ml(e) => write!(f, "model error: {e}"),
            TrainerErr::Config(e) => write!(f, "failed to parse the config: {e}"),
            TrainerErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            TrainerErr::Dataset { path, msg } => {
                write!(f, "malformed dataset file {}: {msg}", path.display())
            }
            TrainerErr::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            TrainerErr::MalformedCheckpoint(msg) => write!(f, "malformed checkpoint: {msg}"),
        }
    }
}

impl Error for TrainerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainerErr::Io(e) => Some(e),
            TrainerErr::Ml(e) => Some(e),
            TrainerErr::Config(e) => Some(e),
            TrainerErr::Checkpoint(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for TrainerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<serde_json::Error> for TrainerErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value)
    }
}

impl From<SafeTensorError> for TrainerErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Checkpoint(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainerErr> for io::Error {
    fn from(value: TrainerErr) -> Self {
        match value {
            TrainerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
