use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::timing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Plays through into whatever follows.
    Normal,
    /// Repeats measures `start..=end_measure` until told otherwise.
    Loop { end_measure: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionError {
    #[error("section name is required")]
    EmptyName,
    #[error("section \"{0}\": start measure must be 1 or greater")]
    StartMeasureZero(String),
    #[error("loop \"{0}\" has no end measure")]
    LoopEndMissing(String),
    #[error("loop \"{name}\": end measure {end} must be after start measure {start}")]
    LoopEndNotAfterStart { name: String, start: u32, end: u32 },
}

/// A named span of a track, addressed in measures (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SectionRecord", into = "SectionRecord")]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub start_measure: u32,
    pub kind: SectionKind,
}

impl Section {
    pub fn normal(id: SectionId, name: impl Into<String>, start_measure: u32) -> Self {
        Self {
            id,
            name: name.into(),
            start_measure,
            kind: SectionKind::Normal,
        }
    }

    pub fn looped(id: SectionId, name: impl Into<String>, start_measure: u32, end_measure: u32) -> Self {
        Self {
            id,
            name: name.into(),
            start_measure,
            kind: SectionKind::Loop { end_measure },
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, SectionKind::Loop { .. })
    }

    /// Inclusive last measure of a loop.
    pub fn end_measure(&self) -> Option<u32> {
        match self.kind {
            SectionKind::Loop { end_measure } => Some(end_measure),
            SectionKind::Normal => None,
        }
    }

    /// Seconds into the track where the section's first measure begins.
    pub fn start_seconds(&self, measure_duration: f64) -> f64 {
        timing::measure_start(self.start_measure, measure_duration)
    }

    pub fn validate(&self) -> Result<(), SectionError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(SectionError::EmptyName);
        }
        if self.start_measure == 0 {
            return Err(SectionError::StartMeasureZero(name.to_string()));
        }
        if let SectionKind::Loop { end_measure } = self.kind {
            if end_measure <= self.start_measure {
                return Err(SectionError::LoopEndNotAfterStart {
                    name: name.to_string(),
                    start: self.start_measure,
                    end: end_measure,
                });
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        match self.kind {
            SectionKind::Normal => format!("{} @{}", self.name, self.start_measure),
            SectionKind::Loop { end_measure } => {
                format!("{} @{}-{} loop", self.name, self.start_measure, end_measure)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindTag {
    #[default]
    Normal,
    Loop,
}

// On-disk shape: a flat record with an optional end measure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionRecord {
    id: SectionId,
    name: String,
    start_measure: u32,
    #[serde(default)]
    kind: KindTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_measure: Option<u32>,
}

impl TryFrom<SectionRecord> for Section {
    type Error = SectionError;

    fn try_from(record: SectionRecord) -> Result<Self, Self::Error> {
        let kind = match (record.kind, record.end_measure) {
            (KindTag::Normal, _) => SectionKind::Normal,
            (KindTag::Loop, Some(end_measure)) => SectionKind::Loop { end_measure },
            (KindTag::Loop, None) => return Err(SectionError::LoopEndMissing(record.name)),
        };
        let section = Section {
            id: record.id,
            name: record.name,
            start_measure: record.start_measure,
            kind,
        };
        section.validate()?;
        Ok(section)
    }
}

impl From<Section> for SectionRecord {
    fn from(section: Section) -> Self {
        let (kind, end_measure) = match section.kind {
            SectionKind::Normal => (KindTag::Normal, None),
            SectionKind::Loop { end_measure } => (KindTag::Loop, Some(end_measure)),
        };
        SectionRecord {
            id: section.id,
            name: section.name,
            start_measure: section.start_measure,
            kind,
            end_measure,
        }
    }
}
