//! Audio resources behind the playback engine.
//!
//! The engine only talks to [`AudioTrack`] handles opened through an
//! [`AudioBackend`]. `device` plays through the system output with rodio;
//! `offline` keeps silent tracks that follow an engine [`clock::Clock`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub mod clock;
pub mod device;
pub mod offline;
pub mod timing;

/// File extensions the enabled rodio decoders understand.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("cannot open {}: {}", .path.display(), .reason)]
    Open { path: PathBuf, reason: String },
    #[error("cannot decode {}: {}", .path.display(), .reason)]
    Decode { path: PathBuf, reason: String },
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("playback denied: {0}")]
    PlaybackDenied(String),
    #[error("playback interrupted: {0}")]
    Interrupted(String),
}

/// An exclusively owned, seekable audio resource.
///
/// Dropping the handle releases the resource.
pub trait AudioTrack: Send {
    /// Starts or resumes output from the current position.
    fn play(&mut self) -> Result<(), AudioError>;

    /// Pauses output, keeping the position.
    fn pause(&mut self);

    /// Moves the playhead; output continues if the track was playing.
    fn seek(&mut self, position: Duration) -> Result<(), AudioError>;

    /// Elapsed playback position from the start of the file.
    fn position(&self) -> Duration;

    /// Total length, when the decoder can tell.
    fn duration(&self) -> Option<Duration>;

    fn is_playing(&self) -> bool;

    /// The resource's own "ended" signal.
    fn has_ended(&self) -> bool;

    /// Reports (once) an error raised while the track was playing.
    fn take_error(&mut self) -> Option<AudioError> {
        None
    }
}

/// Opens audio files into tracks.
pub trait AudioBackend: Send {
    fn open(&self, path: &Path) -> Result<Box<dyn AudioTrack>, AudioError>;
}

pub fn is_supported_file(path: &Path) -> bool {
    let Some(ext) = path.extension() else { return false };
    let ext = ext.to_string_lossy().to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}
