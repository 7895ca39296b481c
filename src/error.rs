// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZoneCountError {
    #[error("cannot open input source {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("invalid zone '{0}', expected x1,y1,x2,y2")]
    InvalidZone(String),
    #[error("{path}:{line}: {reason}")]
    DetectionFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("cannot record video {path}: {reason}")]
    Recording { path: PathBuf, reason: String },
}
