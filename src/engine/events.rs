use std::fmt;

use crate::audio::AudioError;
use crate::model::SlotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator pressed stop.
    Requested,
    /// The track or the last section ran out.
    TrackEnded,
    /// Another slot started while playback is exclusive.
    Preempted,
    /// The slot was reconfigured or its audio removed.
    Reconfigured,
    PlaybackError,
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Requested => "stopped",
            StopReason::TrackEnded => "ended",
            StopReason::Preempted => "preempted",
            StopReason::Reconfigured => "reconfigured",
            StopReason::PlaybackError => "playback error",
            StopReason::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

/// State changes the front ends may want to show, drained with
/// [`Engine::drain_events`](super::Engine::drain_events).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started { slot: SlotId, section: Option<String> },
    SectionChanged { slot: SlotId, current: Option<String>, next: Option<String> },
    MeasureCrossed { slot: SlotId, measure: u32 },
    LoopWrapped { slot: SlotId, section: String, count: u32 },
    Stopped { slot: SlotId, reason: StopReason },
    PlaybackError { slot: SlotId, error: AudioError },
    Configured { slot: SlotId },
}

impl EngineEvent {
    pub fn slot(&self) -> SlotId {
        match self {
            EngineEvent::Started { slot, .. }
            | EngineEvent::SectionChanged { slot, .. }
            | EngineEvent::MeasureCrossed { slot, .. }
            | EngineEvent::LoopWrapped { slot, .. }
            | EngineEvent::Stopped { slot, .. }
            | EngineEvent::PlaybackError { slot, .. }
            | EngineEvent::Configured { slot } => *slot,
        }
    }

    /// Measure ticks are too chatty for a line-oriented console.
    pub fn is_noisy(&self) -> bool {
        matches!(self, EngineEvent::MeasureCrossed { .. })
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::Started { slot, section: Some(name) } => write!(f, "[{slot}] playing from {name}"),
            EngineEvent::Started { slot, section: None } => write!(f, "[{slot}] playing"),
            EngineEvent::SectionChanged { slot, current, next } => {
                write!(f, "[{slot}] now {}", current.as_deref().unwrap_or("-"))?;
                if let Some(next) = next {
                    write!(f, ", next {next}")?;
                }
                Ok(())
            }
            EngineEvent::MeasureCrossed { slot, measure } => write!(f, "[{slot}] measure {measure}"),
            EngineEvent::LoopWrapped { slot, section, count } => write!(f, "[{slot}] {section} x{count}"),
            EngineEvent::Stopped { slot, reason } => write!(f, "[{slot}] {reason}"),
            EngineEvent::PlaybackError { slot, error } => write!(f, "[{slot}] {error}"),
            EngineEvent::Configured { slot } => write!(f, "[{slot}] saved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_change_lists_queued_cue() {
        let e = EngineEvent::SectionChanged {
            slot: SlotId(2),
            current: Some("Verse".into()),
            next: Some("Chorus".into()),
        };
        assert_eq!(e.to_string(), "[2] now Verse, next Chorus");
        assert_eq!(e.slot(), SlotId(2));
    }
}
