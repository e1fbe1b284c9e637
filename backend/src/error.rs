use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    OpenCV(#[from] opencv::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Serial(#[from] SerialError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Startup failures. The process must not enter the dispatch loop with a
/// half-loaded model.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to load model {}: {source}", path.display())]
    Checkpoint {
        path: PathBuf,
        source: opencv::Error,
    },
    #[error("failed to read class names {}: {source}", path.display())]
    Names { path: PathBuf, source: io::Error },
}

/// Recoverable per-tick camera failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera is not connected")]
    NotConnected,
    #[error("captured frame is empty")]
    EmptyFrame,
    #[error(transparent)]
    OpenCV(#[from] opencv::Error),
}

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("ESP is not connected")]
    NotConnected,
    #[error("could not connect to {port}: {source}")]
    Open { port: String, source: io::Error },
    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),
}

/// Queue misuse is a caller bug, not an operational condition. These are
/// propagated out of the loop instead of being turned into a status line.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("refill on a non-empty target queue")]
    NonEmptyRefill,
    #[error("pop from an empty target queue")]
    Empty,
}
