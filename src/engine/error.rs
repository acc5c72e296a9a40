use std::path::PathBuf;

use thiserror::Error;

use crate::audio::AudioError;
use crate::model::{SectionError, SlotId};

/// Why a slot configuration was refused. The slot is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("slot name is required")]
    EmptySlotName,
    #[error("invalid BPM {0}: must be greater than zero")]
    InvalidBpm(i64),
    #[error("sections need a tempo; set a BPM first")]
    SectionsWithoutTempo,
    #[error(transparent)]
    Section(#[from] SectionError),
    #[error("section id {0} is used by more than one section")]
    DuplicateSectionId(u32),
    #[error("sections \"{first}\" and \"{second}\" both start at measure {start}")]
    DuplicateStartMeasure { first: String, second: String, start: u32 },
    #[error("loop \"{name}\" ends at measure {end} but the track only has {total} measures")]
    LoopPastTrackEnd { name: String, end: u32, total: u32 },
    #[error("unsupported audio file {}: expected .wav or .mp3", .0.display())]
    UnsupportedAudio(PathBuf),
    #[error("duplicate slot {0} in setlist")]
    DuplicateSlot(SlotId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("slot {slot}: invalid configuration: {source}")]
    SlotConfig { slot: SlotId, source: ConfigError },
    #[error(transparent)]
    Audio(#[from] AudioError),
}
