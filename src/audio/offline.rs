//! Silent tracks for rehearsing a set without an output device.
//!
//! An offline track's playhead follows the engine clock, so with a
//! [`ManualClock`](super::clock::ManualClock) whole performances can be
//! stepped through deterministically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::clock::Clock;
use super::{device, AudioBackend, AudioError, AudioTrack};

#[derive(Debug, Default)]
struct Faults {
    deny_playback: bool,
    interrupt: Option<String>,
}

type FaultTable = Arc<Mutex<HashMap<PathBuf, Faults>>>;

/// Clones share injected faults, so a test can keep one after handing the
/// backend to an engine.
#[derive(Clone)]
pub struct OfflineBackend {
    clock: Arc<dyn Clock>,
    durations: HashMap<PathBuf, Duration>,
    faults: FaultTable,
}

impl OfflineBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            durations: HashMap::new(),
            faults: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a track length so the file never has to exist on disk.
    pub fn with_track(mut self, path: impl Into<PathBuf>, duration: Duration) -> Self {
        self.durations.insert(path.into(), duration);
        self
    }

    /// Makes every later `play` of `path` fail, like a platform refusing output.
    pub fn deny_playback(&self, path: impl Into<PathBuf>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.entry(path.into()).or_default().deny_playback = true;
        }
    }

    /// Raises a one-shot error on the next poll of any open track for `path`.
    pub fn interrupt(&self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.entry(path.into()).or_default().interrupt = Some(reason.into());
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn AudioTrack>, AudioError> {
        let duration = match self.durations.get(path) {
            Some(d) => Some(*d),
            None => device::probe_file(path)?,
        };
        Ok(Box::new(OfflineTrack {
            path: path.to_path_buf(),
            clock: self.clock.clone(),
            faults: self.faults.clone(),
            duration,
            offset: Duration::ZERO,
            started_at: None,
        }))
    }
}

pub struct OfflineTrack {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    faults: FaultTable,
    duration: Option<Duration>,
    offset: Duration,
    started_at: Option<Duration>,
}

impl OfflineTrack {
    fn clamp(&self, position: Duration) -> Duration {
        match self.duration {
            Some(total) => position.min(total),
            None => position,
        }
    }

    fn playback_denied(&self) -> bool {
        self.faults
            .lock()
            .map(|faults| faults.get(&self.path).map_or(false, |f| f.deny_playback))
            .unwrap_or(false)
    }
}

impl AudioTrack for OfflineTrack {
    fn play(&mut self) -> Result<(), AudioError> {
        if self.playback_denied() {
            return Err(AudioError::PlaybackDenied(format!(
                "{} refused by output",
                self.path.display()
            )));
        }
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.offset = self.position();
        self.started_at = None;
    }

    fn seek(&mut self, position: Duration) -> Result<(), AudioError> {
        self.offset = self.clamp(position);
        if self.started_at.is_some() {
            self.started_at = Some(self.clock.now());
        }
        Ok(())
    }

    fn position(&self) -> Duration {
        let position = match self.started_at {
            Some(started) => self.offset + self.clock.now().saturating_sub(started),
            None => self.offset,
        };
        self.clamp(position)
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn has_ended(&self) -> bool {
        match self.duration {
            Some(total) => self.started_at.is_some() && self.position() >= total,
            None => false,
        }
    }

    fn take_error(&mut self) -> Option<AudioError> {
        let mut faults = self.faults.lock().ok()?;
        let reason = faults.get_mut(&self.path)?.interrupt.take()?;
        Some(AudioError::Interrupted(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;

    fn backend(clock: &ManualClock) -> OfflineBackend {
        OfflineBackend::new(Arc::new(clock.clone())).with_track("song.wav", Duration::from_secs(60))
    }

    #[test]
    fn position_follows_clock_while_playing() {
        let clock = ManualClock::new();
        let mut track = backend(&clock).open(Path::new("song.wav")).expect("open");
        track.play().expect("play");
        clock.advance(Duration::from_secs(2));
        assert_eq!(track.position(), Duration::from_secs(2));
        track.pause();
        clock.advance(Duration::from_secs(5));
        assert_eq!(track.position(), Duration::from_secs(2));
    }

    #[test]
    fn seek_while_playing_reanchors() {
        let clock = ManualClock::new();
        let mut track = backend(&clock).open(Path::new("song.wav")).expect("open");
        track.play().expect("play");
        clock.advance(Duration::from_secs(3));
        track.seek(Duration::from_secs(12)).expect("seek");
        clock.advance(Duration::from_millis(500));
        assert_eq!(track.position(), Duration::from_millis(12_500));
    }

    #[test]
    fn ends_at_duration() {
        let clock = ManualClock::new();
        let mut track = backend(&clock).open(Path::new("song.wav")).expect("open");
        track.play().expect("play");
        clock.advance(Duration::from_secs(61));
        assert!(track.has_ended());
        assert_eq!(track.position(), Duration::from_secs(60));
    }

    #[test]
    fn denied_playback_fails_play() {
        let clock = ManualClock::new();
        let backend = backend(&clock);
        backend.deny_playback("song.wav");
        let mut track = backend.open(Path::new("song.wav")).expect("open");
        assert!(matches!(track.play(), Err(AudioError::PlaybackDenied(_))));
        assert!(!track.is_playing());
    }

    #[test]
    fn interrupt_is_reported_once() {
        let clock = ManualClock::new();
        let backend = backend(&clock);
        let mut track = backend.open(Path::new("song.wav")).expect("open");
        backend.interrupt("song.wav", "device unplugged");
        assert!(matches!(track.take_error(), Some(AudioError::Interrupted(_))));
        assert!(track.take_error().is_none());
    }

    #[test]
    fn unknown_missing_file_fails_to_open() {
        let clock = ManualClock::new();
        let result = backend(&clock).open(Path::new("does/not/exist.wav"));
        assert!(matches!(result, Err(AudioError::Open { .. })));
    }
}
