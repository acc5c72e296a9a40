use serde::{Deserialize, Serialize};

use super::slot::SlotConfig;

/// Everything needed to restore the slot board.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Setlist {
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
}
