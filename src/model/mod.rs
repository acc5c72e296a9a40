pub mod section;
pub mod setlist;
pub mod slot;

pub use section::{Section, SectionError, SectionId, SectionKind};
pub use setlist::Setlist;
pub use slot::{ColorTag, SlotConfig, SlotId};
