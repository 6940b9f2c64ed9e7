use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{InvalidTransition, ItemId};
use crate::playlist::PlaylistError;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("encoder {program} unavailable: {reason}")]
    EncoderUnavailable { program: PathBuf, reason: String },
    #[error("item {0} has no source media")]
    MissingSource(ItemId),
    #[error("source media {0} does not exist")]
    SourceNotFound(PathBuf),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error("item {0} produced no rendition")]
    NoRenditions(ItemId),
    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),
    #[error("transcode cancelled")]
    Cancelled,
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Why a single rendition was skipped.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to launch encoder: {0}")]
    Launch(#[from] std::io::Error),
    #[error("encoder exited with status {status:?}: {stderr}")]
    Exit { status: Option<i32>, stderr: String },
    #[error("encoder reported success but {0} is missing")]
    MissingOutput(PathBuf),
}
