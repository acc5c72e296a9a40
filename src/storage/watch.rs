//! Follows a setlist file on disk and hands parsed changes to the engine
//! driver. The engine itself is never touched from these threads.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::setlist;
use crate::console;
use crate::model::Setlist;

const DEBOUNCE: Duration = Duration::from_millis(50);
const POLL_EVERY: Duration = Duration::from_millis(250);

/// Starts watching `path`. Each distinct, parseable version of the file is
/// sent once; unparseable saves are logged and skipped.
pub fn spawn(path: PathBuf) -> Receiver<Setlist> {
    let (tx, rx) = mpsc::channel();
    let last_seen = Arc::new(Mutex::new(fs::read_to_string(&path).ok()));
    start_watcher(path.clone(), tx.clone(), last_seen.clone());
    // Editors that save by atomic rename can slip past the watcher.
    start_polling(path, tx, last_seen);
    rx
}

type LastSeen = Arc<Mutex<Option<String>>>;

fn reload(path: &Path, tx: &Sender<Setlist>, last_seen: &LastSeen) -> bool {
    let Ok(data) = fs::read_to_string(path) else {
        return true;
    };
    let Ok(mut last) = last_seen.lock() else {
        return false;
    };
    if last.as_deref() == Some(data.as_str()) {
        return true;
    }
    *last = Some(data.clone());
    drop(last);

    match setlist::from_str(&data, setlist::Format::for_path(path)) {
        Ok(parsed) => {
            console::info(format!("reloaded: {}", path.display()));
            tx.send(parsed).is_ok()
        }
        Err(e) => {
            console::warn(format!("{} not reloaded: {:#}", path.display(), e));
            true
        }
    }
}

fn start_watcher(path: PathBuf, tx: Sender<Setlist>, last_seen: LastSeen) {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(p) => p.to_path_buf(),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let file_name = path.file_name().map(|s| s.to_os_string());
    thread::spawn(move || {
        let (events_tx, events_rx) = mpsc::channel();
        let mut watcher: RecommendedWatcher = match Watcher::new(events_tx, notify::Config::default()) {
            Ok(w) => w,
            Err(e) => {
                console::warn(format!("file watch disabled: {}", e));
                return;
            }
        };
        if let Err(e) = watcher.watch(parent.as_path(), RecursiveMode::NonRecursive) {
            console::warn(format!("file watch disabled for '{}': {}", parent.display(), e));
            return;
        }
        for event in events_rx {
            let Ok(event) = event else { continue };
            let relevant = event
                .paths
                .iter()
                .any(|p| file_name.as_deref().map_or(false, |f| p.file_name() == Some(f)));
            if !relevant {
                continue;
            }
            thread::sleep(DEBOUNCE);
            if !reload(&path, &tx, &last_seen) {
                break;
            }
        }
    });
}

fn start_polling(path: PathBuf, tx: Sender<Setlist>, last_seen: LastSeen) {
    thread::spawn(move || {
        let mut last_mod: Option<SystemTime> = None;
        loop {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
            if modified.is_some() && modified != last_mod {
                if last_mod.is_some() {
                    thread::sleep(DEBOUNCE);
                    if !reload(&path, &tx, &last_seen) {
                        return;
                    }
                }
                last_mod = modified;
            }
            thread::sleep(POLL_EVERY);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn identical_content_is_sent_once() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(file, "slots: []").expect("write");
        let (tx, rx) = mpsc::channel();
        let last_seen: LastSeen = Arc::new(Mutex::new(None));

        assert!(reload(file.path(), &tx, &last_seen));
        assert!(reload(file.path(), &tx, &last_seen));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn broken_file_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        write!(file, "slots: [ {{ id: nope").expect("write");
        let (tx, rx) = mpsc::channel();
        let last_seen: LastSeen = Arc::new(Mutex::new(None));

        assert!(reload(file.path(), &tx, &last_seen));
        assert!(rx.try_recv().is_err());
    }
}
