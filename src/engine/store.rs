//! The slot table.
//!
//! Every slot owns at most one audio handle. Slots are only ever changed by
//! the engine, and then by replacing a whole slot or a whole field
//! (`slot.playback = ...`), never by patching shared state in place.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use super::scheduler::TickHandle;
use crate::audio::{timing, AudioTrack};
use crate::model::{ColorTag, Section, SectionId, SlotConfig, SlotId};

/// Transient playback state; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_section: Option<SectionId>,
    pub next_section: Option<SectionId>,
    pub last_measure_played: u32,
    pub loops_completed: u32,
}

pub struct Slot {
    pub id: SlotId,
    pub name: String,
    pub color: ColorTag,
    pub tempo_bpm: Option<u32>,
    /// Sorted by start measure.
    pub sections: Vec<Section>,
    pub audio_source: Option<PathBuf>,
    pub file_name: Option<String>,
    pub playback: PlaybackState,
    pub(crate) audio: Option<Box<dyn AudioTrack>>,
    pub(crate) ticker: Option<TickHandle>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tempo_bpm", &self.tempo_bpm)
            .field("sections", &self.sections.len())
            .field("has_audio", &self.audio.is_some())
            .field("playback", &self.playback)
            .finish_non_exhaustive()
    }
}

impl Slot {
    pub fn empty(id: SlotId, color: ColorTag) -> Self {
        Self::from_config(SlotConfig::empty(id, color), None)
    }

    pub fn from_config(config: SlotConfig, audio: Option<Box<dyn AudioTrack>>) -> Self {
        let mut sections = config.sections;
        sections.sort_by_key(|s| s.start_measure);
        Self {
            id: config.id,
            name: config.name,
            color: config.color,
            tempo_bpm: config.tempo_bpm,
            sections,
            audio_source: config.audio_source,
            file_name: config.file_name,
            playback: PlaybackState::default(),
            audio,
            ticker: None,
        }
    }

    pub fn config(&self) -> SlotConfig {
        SlotConfig {
            id: self.id,
            name: self.name.clone(),
            audio_source: self.audio_source.clone(),
            file_name: self.file_name.clone(),
            color: self.color.clone(),
            tempo_bpm: self.tempo_bpm,
            sections: self.sections.clone(),
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn measure_duration(&self) -> f64 {
        timing::measure_duration(self.tempo_bpm)
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Looks a section up by 1-based position or by name (case-insensitive).
    pub fn resolve_section(&self, query: &str) -> Option<&Section> {
        if let Ok(n) = query.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| self.sections.get(i));
        }
        self.sections.iter().find(|s| s.name.eq_ignore_ascii_case(query))
    }

    pub fn track_duration(&self) -> Option<Duration> {
        self.audio.as_ref().and_then(|a| a.duration())
    }

    pub fn total_measures(&self) -> Option<u32> {
        timing::total_measures(self.track_duration()?, self.measure_duration())
    }

    /// Last measure a section covers before the next one begins.
    ///
    /// The final section runs to the end of the track, when its length is known.
    pub fn natural_end(&self, section: &Section) -> Option<u32> {
        match self.sections.iter().find(|s| s.start_measure > section.start_measure) {
            Some(next) => Some(next.start_measure - 1),
            None => self.total_measures(),
        }
    }

    pub fn is_last_section(&self, id: SectionId) -> bool {
        self.sections.last().map_or(false, |s| s.id == id)
    }

    /// The section whose span contains `measure`.
    pub fn section_at(&self, measure: u32) -> Option<&Section> {
        self.sections.iter().rev().find(|s| s.start_measure <= measure)
    }

    pub fn position(&self) -> Option<Duration> {
        self.audio.as_ref().map(|a| a.position())
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        let position = self.position();
        let current_measure = position
            .and_then(|p| timing::measure_at(p.as_secs_f64(), self.measure_duration()))
            .filter(|_| self.playback.is_playing);
        SlotSnapshot {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            file_name: self.file_name.clone(),
            tempo_bpm: self.tempo_bpm,
            sections: self.sections.clone(),
            has_audio: self.has_audio(),
            playback: self.playback.clone(),
            position,
            duration: self.track_duration(),
            current_measure,
        }
    }
}

/// Read-only copy of a slot for front ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSnapshot {
    pub id: SlotId,
    pub name: String,
    pub color: ColorTag,
    pub file_name: Option<String>,
    pub tempo_bpm: Option<u32>,
    pub sections: Vec<Section>,
    pub has_audio: bool,
    pub playback: PlaybackState,
    pub position: Option<Duration>,
    pub duration: Option<Duration>,
    pub current_measure: Option<u32>,
}

impl SlotSnapshot {
    fn section_name(&self, id: Option<SectionId>) -> Option<&str> {
        let id = id?;
        self.sections.iter().find(|s| s.id == id).map(|s| s.name.as_str())
    }

    pub fn current_section_name(&self) -> Option<&str> {
        self.section_name(self.playback.current_section)
    }

    pub fn next_section_name(&self) -> Option<&str> {
        self.section_name(self.playback.next_section)
    }
}

#[derive(Debug, Default)]
pub struct SlotStore {
    slots: Vec<Slot>,
}

impl SlotStore {
    /// `count` empty slots with ids `1..=count`.
    pub fn create_default(count: usize, rng: &mut impl Rng) -> Self {
        let slots = (1..=count as u32)
            .map(|n| Slot::empty(SlotId(n), ColorTag::random(rng)))
            .collect();
        Self { slots }
    }

    pub fn from_slots(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn ids(&self) -> Vec<SlotId> {
        self.slots.iter().map(|s| s.id).collect()
    }

    pub fn get(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Swaps in a new slot under `id`, returning the old one.
    ///
    /// Unknown ids are ignored and `slot` is dropped.
    pub fn replace_slot(&mut self, id: SlotId, mut slot: Slot) -> Option<Slot> {
        let existing = self.get_mut(id)?;
        slot.id = id;
        Some(std::mem::replace(existing, slot))
    }

    /// Puts a slot back to its empty defaults, keeping id and color.
    ///
    /// The old audio handle is released when the replaced slot drops.
    pub fn reset_slot(&mut self, id: SlotId) -> bool {
        let Some(color) = self.get(id).map(|s| s.color.clone()) else {
            return false;
        };
        self.replace_slot(id, Slot::empty(id, color)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn store(n: usize) -> SlotStore {
        SlotStore::create_default(n, &mut StdRng::seed_from_u64(1))
    }

    fn song_slot() -> Slot {
        let mut config = SlotConfig::empty(SlotId(1), ColorTag("#4f46e5".into()));
        config.name = "Oceans".into();
        config.tempo_bpm = Some(80);
        config.sections = vec![
            Section::looped(SectionId(3), "Vamp", 9, 13),
            Section::normal(SectionId(1), "Intro", 1),
            Section::normal(SectionId(2), "Verse", 5),
        ];
        Slot::from_config(config, None)
    }

    #[test]
    fn default_store_has_sequential_ids_and_names() {
        let s = store(5);
        assert_eq!(s.len(), 5);
        assert_eq!(s.ids(), (1..=5).map(SlotId).collect::<Vec<_>>());
        assert_eq!(s.get(SlotId(4)).map(|slot| slot.name.as_str()), Some("Slot 4"));
    }

    #[test]
    fn sections_are_sorted_by_start() {
        let slot = song_slot();
        let starts: Vec<u32> = slot.sections.iter().map(|s| s.start_measure).collect();
        assert_eq!(starts, vec![1, 5, 9]);
    }

    #[test]
    fn natural_end_is_measure_before_next() {
        let slot = song_slot();
        let intro = slot.section(SectionId(1)).cloned().expect("intro");
        assert_eq!(slot.natural_end(&intro), Some(4));
        // Last section without audio: unknown length.
        let vamp = slot.section(SectionId(3)).cloned().expect("vamp");
        assert_eq!(slot.natural_end(&vamp), None);
    }

    #[test]
    fn section_lookup_by_number_or_name() {
        let slot = song_slot();
        assert_eq!(slot.resolve_section("2").map(|s| s.id), Some(SectionId(2)));
        assert_eq!(slot.resolve_section("vamp").map(|s| s.id), Some(SectionId(3)));
        assert!(slot.resolve_section("0").is_none());
        assert!(slot.resolve_section("bridge").is_none());
        assert_eq!(slot.section_at(7).map(|s| s.id), Some(SectionId(2)));
    }

    #[test]
    fn replace_unknown_id_is_noop() {
        let mut s = store(2);
        assert!(s.replace_slot(SlotId(9), song_slot()).is_none());
        assert_eq!(s.len(), 2);
        assert!(s.get(SlotId(9)).is_none());
    }

    #[test]
    fn replace_keeps_the_addressed_id() {
        let mut s = store(2);
        let old = s.replace_slot(SlotId(2), song_slot()).expect("replaced");
        assert_eq!(old.name, "Slot 2");
        let now = s.get(SlotId(2)).expect("slot");
        assert_eq!(now.name, "Oceans");
        assert_eq!(now.id, SlotId(2));
    }

    #[test]
    fn reset_keeps_id_and_color() {
        let mut s = store(3);
        s.replace_slot(SlotId(2), song_slot());
        let color = s.get(SlotId(2)).map(|x| x.color.clone());
        assert!(s.reset_slot(SlotId(2)));
        let slot = s.get(SlotId(2)).expect("slot");
        assert_eq!(slot.name, "Slot 2");
        assert!(slot.sections.is_empty());
        assert!(slot.tempo_bpm.is_none());
        assert_eq!(Some(slot.color.clone()), color);
        assert!(!s.reset_slot(SlotId(7)));
    }
}
