use std::fmt;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::section::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    pub fn default_name(self) -> String {
        format!("Slot {}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Colors handed out to fresh slots.
pub const PALETTE: &[&str] = &[
    "#4f46e5", "#7c3aed", "#8b5cf6", "#a855f7", "#d946ef", "#ec4899", "#f43f5e",
];

/// Cosmetic `#rrggbb` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorTag(pub String);

impl ColorTag {
    pub fn random(rng: &mut impl Rng) -> Self {
        let pick = PALETTE.choose(rng).copied().unwrap_or(PALETTE[0]);
        ColorTag(pick.to_string())
    }

    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        let hex = self.0.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        Some((channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Persisted configuration of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub id: SlotId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub color: ColorTag,
    #[serde(default)]
    pub tempo_bpm: Option<u32>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl SlotConfig {
    pub fn empty(id: SlotId, color: ColorTag) -> Self {
        Self {
            id,
            name: id.default_name(),
            audio_source: None,
            file_name: None,
            color,
            tempo_bpm: None,
            sections: Vec::new(),
        }
    }
}
