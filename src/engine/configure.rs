use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{ConfigError, EngineError};
use super::events::{EngineEvent, StopReason};
use super::store::{Slot, SlotSnapshot, SlotStore};
use super::Engine;
use crate::audio::{self, timing, AudioTrack};
use crate::console;
use crate::model::{Section, Setlist, SlotConfig, SlotId};

/// What the operator edits for one slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotConfiguration {
    pub name: String,
    /// A new file to load; `None` keeps the current audio.
    pub audio_file: Option<PathBuf>,
    pub tempo_bpm: Option<u32>,
    pub sections: Vec<Section>,
}

impl SlotConfiguration {
    /// Starts an edit from a slot's current settings.
    pub fn from_snapshot(snapshot: &SlotSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            audio_file: None,
            tempo_bpm: snapshot.tempo_bpm,
            sections: snapshot.sections.clone(),
        }
    }
}

fn validate(name: &str, tempo_bpm: Option<u32>, sections: &[Section]) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptySlotName);
    }
    if tempo_bpm == Some(0) {
        return Err(ConfigError::InvalidBpm(0));
    }
    for section in sections {
        section.validate()?;
    }
    if !sections.is_empty() && tempo_bpm.is_none() {
        return Err(ConfigError::SectionsWithoutTempo);
    }
    let mut ids = HashSet::new();
    let mut starts: HashMap<u32, &str> = HashMap::new();
    for section in sections {
        if !ids.insert(section.id) {
            return Err(ConfigError::DuplicateSectionId(section.id.0));
        }
        if let Some(first) = starts.insert(section.start_measure, &section.name) {
            return Err(ConfigError::DuplicateStartMeasure {
                first: first.to_string(),
                second: section.name.clone(),
                start: section.start_measure,
            });
        }
    }
    Ok(())
}

fn check_loops_fit(
    sections: &[Section],
    tempo_bpm: Option<u32>,
    track: Option<Duration>,
) -> Result<(), ConfigError> {
    let Some(track) = track else { return Ok(()) };
    let Some(total) = timing::total_measures(track, timing::measure_duration(tempo_bpm)) else {
        return Ok(());
    };
    for section in sections {
        if let Some(end) = section.end_measure() {
            if end > total {
                return Err(ConfigError::LoopPastTrackEnd {
                    name: section.name.clone(),
                    end,
                    total,
                });
            }
        }
    }
    Ok(())
}

/// Applies the slot rules that do not need audio to every slot of a setlist.
pub fn check_setlist(setlist: &Setlist) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for config in &setlist.slots {
        if !seen.insert(config.id) {
            return Err(ConfigError::DuplicateSlot(config.id).into());
        }
        validate(&config.name, config.tempo_bpm, &config.sections).map_err(|source| {
            EngineError::SlotConfig {
                slot: config.id,
                source,
            }
        })?;
    }
    Ok(())
}

fn display_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

impl Engine {
    /// Validates and applies a slot edit. On any error the slot is unchanged;
    /// on success a playing slot is stopped first.
    pub fn save_slot_configuration(&mut self, id: SlotId, edit: SlotConfiguration) -> Result<(), EngineError> {
        let Some(existing) = self.store.get(id) else {
            return Ok(());
        };
        validate(&edit.name, edit.tempo_bpm, &edit.sections)?;
        if let Some(path) = &edit.audio_file {
            if !audio::is_supported_file(path) {
                return Err(ConfigError::UnsupportedAudio(path.clone()).into());
            }
        }
        let new_audio = match &edit.audio_file {
            Some(path) => Some(self.backend.open(path)?),
            None => None,
        };
        let track = match &new_audio {
            Some(track) => track.duration(),
            None => existing.track_duration(),
        };
        check_loops_fit(&edit.sections, edit.tempo_bpm, track)?;

        let color = existing.color.clone();
        let (audio_source, file_name) = match &edit.audio_file {
            Some(path) => (Some(path.clone()), display_name(path)),
            None => (existing.audio_source.clone(), existing.file_name.clone()),
        };

        self.teardown_slot(id, StopReason::Reconfigured);
        let audio = match new_audio {
            Some(track) => Some(track),
            None => self.store.get_mut(id).and_then(|s| s.audio.take()),
        };
        let config = SlotConfig {
            id,
            name: edit.name.trim().to_string(),
            audio_source,
            file_name,
            color,
            tempo_bpm: edit.tempo_bpm,
            sections: edit.sections,
        };
        self.store.replace_slot(id, Slot::from_config(config, audio));
        self.events.push(EngineEvent::Configured { slot: id });
        Ok(())
    }

    /// Releases the slot's audio and puts it back to defaults.
    pub fn remove_audio(&mut self, id: SlotId) {
        if self.store.get(id).is_none() {
            return;
        }
        self.teardown_slot(id, StopReason::Reconfigured);
        if self.store.reset_slot(id) {
            self.events.push(EngineEvent::Configured { slot: id });
        }
    }

    /// The board as a persistable setlist.
    pub fn setlist(&self) -> Setlist {
        Setlist {
            slots: self.store.iter().map(Slot::config).collect(),
        }
    }

    /// Replaces the whole board. Nothing changes if any slot is invalid.
    ///
    /// Audio that fails to open is logged and the slot loads without it.
    pub fn load_setlist(&mut self, setlist: Setlist) -> Result<(), EngineError> {
        check_setlist(&setlist)?;
        let slots = setlist
            .slots
            .into_iter()
            .map(|c| self.build_slot(c))
            .collect::<Result<Vec<_>, _>>()?;

        for id in self.store.ids() {
            self.teardown_slot(id, StopReason::Reconfigured);
        }
        self.store = if slots.is_empty() {
            SlotStore::create_default(self.config.slot_count, &mut rand::thread_rng())
        } else {
            SlotStore::from_slots(slots)
        };
        for id in self.store.ids() {
            self.events.push(EngineEvent::Configured { slot: id });
        }
        Ok(())
    }

    /// Applies a changed setlist to slots that are not playing and returns
    /// the ones that changed. Playing slots are left alone until stopped.
    pub fn reload_idle(&mut self, setlist: Setlist) -> Vec<SlotId> {
        let mut changed = Vec::new();
        for config in setlist.slots {
            let id = config.id;
            let Some(slot) = self.store.get(id) else {
                console::warn(format!("setlist names unknown slot {id}; ignored"));
                continue;
            };
            if slot.config() == config {
                continue;
            }
            if slot.playback.is_playing {
                console::info(format!("{} is playing; reload skipped", slot.name));
                continue;
            }
            if let Err(e) = validate(&config.name, config.tempo_bpm, &config.sections) {
                console::warn(format!("slot {id}: {e}"));
                continue;
            }
            let same_audio = slot.audio_source == config.audio_source;
            let fresh = if same_audio { None } else { self.open_audio(&config) };
            let track = if same_audio {
                slot.track_duration()
            } else {
                fresh.as_ref().and_then(|a| a.duration())
            };
            if let Err(e) = check_loops_fit(&config.sections, config.tempo_bpm, track) {
                console::warn(format!("slot {id}: {e}; reload skipped"));
                continue;
            }

            self.teardown_slot(id, StopReason::Reconfigured);
            let audio = if same_audio {
                self.store.get_mut(id).and_then(|s| s.audio.take())
            } else {
                fresh
            };
            self.store.replace_slot(id, Slot::from_config(config, audio));
            self.events.push(EngineEvent::Configured { slot: id });
            changed.push(id);
        }
        changed
    }

    fn open_audio(&self, config: &SlotConfig) -> Option<Box<dyn AudioTrack>> {
        let path = config.audio_source.as_deref()?;
        match self.backend.open(path) {
            Ok(track) => Some(track),
            Err(e) => {
                console::warn(format!("{}: {}", config.name, e));
                None
            }
        }
    }

    fn build_slot(&self, config: SlotConfig) -> Result<Slot, EngineError> {
        let audio = self.open_audio(&config);
        let track = audio.as_ref().and_then(|a| a.duration());
        check_loops_fit(&config.sections, config.tempo_bpm, track)
            .map_err(|source| EngineError::SlotConfig { slot: config.id, source })?;
        Ok(Slot::from_config(config, audio))
    }
}
