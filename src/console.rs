//! Status lines that must not scribble over the stage screen.
//!
//! Engine and watcher code report through `info`/`warn`/`error`. While a
//! front end holds a [`Subscription`] the lines are queued for it to draw;
//! otherwise warnings and errors go to stderr and info is printed unless
//! quiet mode is on.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: Level,
    pub text: String,
}

type Subscribers = Vec<(usize, Sender<LogMessage>)>;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
static QUIET: AtomicBool = AtomicBool::new(false);
static SUBSCRIBERS: Lazy<Mutex<Subscribers>> = Lazy::new(|| Mutex::new(Vec::new()));

// A panicking subscriber must not silence everyone else.
fn subscribers() -> MutexGuard<'static, Subscribers> {
    SUBSCRIBERS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Dropping this value unsubscribes it.
pub struct Subscription {
    id: usize,
    rx: Receiver<LogMessage>,
}

impl Subscription {
    pub fn drain(&self) -> Vec<LogMessage> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        subscribers().retain(|(id, _)| *id != self.id);
    }
}

pub fn subscribe() -> Subscription {
    let (tx, rx) = mpsc::channel();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    subscribers().push((id, tx));
    Subscription { id, rx }
}

/// Drops unsubscribed info lines (`--quiet`).
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn info(msg: impl Into<String>) {
    publish(Level::Info, msg.into());
}

pub fn warn(msg: impl Into<String>) {
    publish(Level::Warn, msg.into());
}

pub fn error(msg: impl Into<String>) {
    publish(Level::Error, msg.into());
}

fn publish(level: Level, text: String) {
    let message = LogMessage { level, text };

    let mut subs = subscribers();
    if subs.is_empty() {
        match message.level {
            Level::Warn | Level::Error => eprintln!("{}: {}", message.level, message.text),
            Level::Info if !QUIET.load(Ordering::Relaxed) => eprintln!("{}", message.text),
            Level::Info => {}
        }
        return;
    }

    subs.retain(|(_, tx)| tx.send(message.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_every_level() {
        let sub = subscribe();
        info("slot 1 ready");
        warn("watch lost");
        error("device gone");

        let msgs = sub.drain();
        assert!(msgs.iter().any(|m| m.level == Level::Info && m.text == "slot 1 ready"));
        assert!(msgs.iter().any(|m| m.level == Level::Warn && m.text == "watch lost"));
        assert!(msgs.iter().any(|m| m.level == Level::Error && m.text == "device gone"));
    }

    #[test]
    fn dropped_subscription_stops_receiving() {
        let sub = subscribe();
        let id = sub.id;
        drop(sub);
        assert!(subscribers().iter().all(|(other, _)| *other != id));
    }
}
