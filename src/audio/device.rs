//! Playback through the system audio output (rodio).

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::{AudioBackend, AudioError, AudioTrack};

/// Opens tracks on the default output device.
///
/// `rodio::OutputStream` cannot leave the thread that created it, so the
/// stream lives on its own thread until the backend is dropped.
pub struct RodioBackend {
    handle: OutputStreamHandle,
    _keepalive: mpsc::Sender<()>,
}

impl RodioBackend {
    pub fn open_default() -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (keep_tx, keep_rx) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("vamp-audio-output".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if ready_tx.send(Ok(handle)).is_err() {
                        return;
                    }
                    // Returns once every sender is gone.
                    let _ = keep_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(AudioError::Output(e.to_string())));
                }
            })
            .map_err(|e| AudioError::Output(e.to_string()))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| AudioError::Output("audio output thread exited".into()))??;
        Ok(Self { handle, _keepalive: keep_tx })
    }
}

impl AudioBackend for RodioBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn AudioTrack>, AudioError> {
        let data = read_file(path)?;
        let duration = probe_duration(&data).map_err(|reason| AudioError::Decode {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(Box::new(RodioTrack {
            handle: self.handle.clone(),
            data,
            duration,
            sink: None,
            offset: Duration::ZERO,
            started_at: None,
        }))
    }
}

/// Reads and decodes a file just far enough to learn its length.
pub fn probe_file(path: &Path) -> Result<Option<Duration>, AudioError> {
    let data = read_file(path)?;
    probe_duration(&data).map_err(|reason| AudioError::Decode {
        path: path.to_path_buf(),
        reason,
    })
}

fn read_file(path: &Path) -> Result<Arc<[u8]>, AudioError> {
    fs::read(path)
        .map(Arc::from)
        .map_err(|e| AudioError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn probe_duration(data: &Arc<[u8]>) -> Result<Option<Duration>, String> {
    let decoder = Decoder::new(Cursor::new(data.clone())).map_err(|e| e.to_string())?;
    if let Some(total) = decoder.total_duration() {
        return Ok(Some(total));
    }
    // Streams without a header length (mp3) are counted sample by sample.
    let rate = decoder.sample_rate() as f64;
    let channels = decoder.channels().max(1) as f64;
    if rate <= 0.0 {
        return Ok(None);
    }
    let samples = decoder.count() as f64;
    Ok(Some(Duration::from_secs_f64(samples / (rate * channels))))
}

/// A decoded file held in memory and played through one sink at a time.
///
/// Seeking rebuilds the sink from the in-memory bytes; the position is a wall
/// clock anchored at the last play or seek.
///
/// Keeps the default `take_error`: a rodio 0.17 sink has no way to report an
/// output failure, so only errors from starting a sink reach the engine.
pub struct RodioTrack {
    handle: OutputStreamHandle,
    data: Arc<[u8]>,
    duration: Option<Duration>,
    sink: Option<Sink>,
    offset: Duration,
    started_at: Option<Instant>,
}

impl RodioTrack {
    fn start_sink(&mut self) -> Result<(), AudioError> {
        self.stop_sink();
        let decoder = Decoder::new(Cursor::new(self.data.clone()))
            .map_err(|e| AudioError::Interrupted(format!("decoder: {}", e)))?;
        let sink = Sink::try_new(&self.handle).map_err(|e| AudioError::PlaybackDenied(e.to_string()))?;
        sink.append(decoder.skip_duration(self.offset));
        sink.play();
        self.sink = Some(sink);
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop_sink(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn clamp(&self, position: Duration) -> Duration {
        match self.duration {
            Some(total) => position.min(total),
            None => position,
        }
    }
}

impl AudioTrack for RodioTrack {
    fn play(&mut self) -> Result<(), AudioError> {
        if self.started_at.is_some() {
            return Ok(());
        }
        self.start_sink()
    }

    fn pause(&mut self) {
        self.offset = self.position();
        self.stop_sink();
        self.started_at = None;
    }

    fn seek(&mut self, position: Duration) -> Result<(), AudioError> {
        self.offset = self.clamp(position);
        if self.started_at.is_some() {
            if let Err(e) = self.start_sink() {
                self.started_at = None;
                return Err(e);
            }
        }
        Ok(())
    }

    fn position(&self) -> Duration {
        let position = match self.started_at {
            Some(started) => self.offset + started.elapsed(),
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
        self.started_at.is_some() && self.sink.as_ref().map_or(true, |sink| sink.empty())
    }
}

impl Drop for RodioTrack {
    fn drop(&mut self) {
        self.stop_sink();
    }
}
