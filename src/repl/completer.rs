//! Tab completion and usage hints for the vamp REPL.

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;
use std::path::Path;

use crate::audio::is_supported_file;

const SCAN_DEPTH: usize = 3;

/// REPL helper completing commands and audio file paths.
pub struct VampHelper {
    audio_files: Vec<String>,
}

impl VampHelper {
    pub fn new() -> Self {
        Self {
            audio_files: scan_audio_files(Path::new(".")),
        }
    }
}

/// Audio files under `root`, a few directories deep, as relative paths.
fn scan_audio_files(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    collect_audio(root, root, 0, &mut files);
    files.sort();
    files
}

fn collect_audio(root: &Path, dir: &Path, depth: usize, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = path
            .file_name()
            .map_or(false, |n| n.to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            if depth + 1 < SCAN_DEPTH {
                collect_audio(root, &path, depth + 1, out);
            }
        } else if is_supported_file(&path) {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            if let Some(s) = rel.to_str() {
                out.push(s.to_string());
            }
        }
    }
}

/// Commands and their argument shapes, shown as hints.
const COMMANDS: &[(&str, &str)] = &[
    ("list", ""),
    ("status", ""),
    ("sections", " <slot>"),
    ("play", " <slot> [section]"),
    ("stop", " [slot]"),
    ("jump", " <slot> <section>"),
    ("next", " <slot> <section>"),
    ("name", " <slot> \"Name\""),
    ("bpm", " <slot> <bpm|none>"),
    ("audio", " <slot> \"file.wav\""),
    ("section", " add|set|rm <slot> ..."),
    ("remove", " <slot>"),
    ("save", " \"set.yaml\""),
    ("open", " \"set.yaml\""),
];

const META_COMMANDS: &[&str] = &[":help", ":q", ":quit", ":exit"];

impl Completer for VampHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_pos = &line[..pos];

        if line_to_pos.starts_with(':') {
            let matches: Vec<Pair> = META_COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(line_to_pos))
                .map(|cmd| Pair {
                    display: cmd.to_string(),
                    replacement: cmd.to_string(),
                })
                .collect();
            return Ok((0, matches));
        }

        if let Some(start) = find_path_completion_start(line_to_pos) {
            let prefix = line_to_pos[start..].trim_start_matches('"');
            let matches: Vec<Pair> = self
                .audio_files
                .iter()
                .filter(|path| path.starts_with(prefix) || path.contains(prefix))
                .map(|path| Pair {
                    display: path.clone(),
                    replacement: format!("\"{}\"", path),
                })
                .take(20)
                .collect();
            return Ok((start, matches));
        }

        let words: Vec<&str> = line_to_pos.split_whitespace().collect();
        if words.is_empty() || (words.len() == 1 && !line_to_pos.ends_with(' ')) {
            let prefix = words.first().copied().unwrap_or("");
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(prefix))
                .map(|(cmd, _)| Pair {
                    display: cmd.to_string(),
                    replacement: cmd.to_string(),
                })
                .collect();
            return Ok((0, matches));
        }

        Ok((pos, Vec::new()))
    }
}

/// Byte offset of the path argument in `audio <slot> <path>`, if the cursor is in it.
fn find_path_completion_start(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with("audio ") {
        return None;
    }
    let offset = line.len() - trimmed.len();
    // The path is the third word, after the command and the slot number.
    let mut seen_words = 0;
    let mut last_word_start = None;
    let mut prev_ws = true;
    for (i, ch) in trimmed.char_indices() {
        if ch.is_whitespace() {
            prev_ws = true;
        } else if prev_ws {
            prev_ws = false;
            seen_words += 1;
            last_word_start = Some(i);
        }
    }
    match (seen_words, prev_ws) {
        (2, true) => Some(line.len()),
        (3, false) => last_word_start.map(|i| offset + i),
        _ => None,
    }
}

impl Hinter for VampHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }
        COMMANDS
            .iter()
            .find(|(cmd, _)| *cmd == line)
            .filter(|(_, usage)| !usage.is_empty())
            .map(|(_, usage)| usage.to_string())
    }
}

impl Highlighter for VampHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{}\x1b[0m", hint))
    }
}

impl Validator for VampHelper {}

impl Helper for VampHelper {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_finds_only_supported_audio() {
        let dir = tempfile::tempdir().expect("tmp");
        fs::create_dir_all(dir.path().join("set/deep")).expect("mkdir");
        fs::write(dir.path().join("set/oceans.wav"), b"").expect("write");
        fs::write(dir.path().join("set/deep/way.mp3"), b"").expect("write");
        fs::write(dir.path().join("set/notes.txt"), b"").expect("write");

        let files = scan_audio_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("oceans.wav")));
        assert!(files.iter().all(|f| !f.ends_with(".txt")));
    }

    #[test]
    fn path_completion_only_for_audio_argument() {
        assert_eq!(find_path_completion_start("audio 1 "), Some(8));
        assert_eq!(find_path_completion_start("audio 1 \"set/oc"), Some(8));
        assert_eq!(find_path_completion_start("audio 1"), None);
        assert_eq!(find_path_completion_start("bpm 1 80"), None);
    }
}
