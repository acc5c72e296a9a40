//! Section-synchronized backing-track player.
//!
//! Slots hold one audio file each, cut into bar-addressed sections. The
//! [`engine`] plays them, follows section boundaries, holds vamp loops and
//! hands off to cued sections on the bar line.

pub mod audio;
pub mod config;
pub mod console;
pub mod engine;
pub mod model;
pub mod repl;
pub mod storage;
pub mod tui;
