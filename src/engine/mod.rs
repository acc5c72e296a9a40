//! Slot playback engine.
//!
//! One [`Engine`] owns the slot table, the audio handles and the tick timers.
//! Nothing in here spawns threads: a driver calls [`Engine::poll`] often
//! (the stage loop does it every frame, the REPL from a ticker thread) and
//! reads state back through snapshots and drained events.

mod configure;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use crate::audio::clock::Clock;
use crate::audio::{timing, AudioBackend, AudioError};
use crate::config::EngineConfig;
use crate::console;
use crate::model::{SectionId, SlotId};

pub use configure::{check_setlist, SlotConfiguration};
pub use error::{ConfigError, EngineError};
pub use events::{EngineEvent, StopReason};
pub use store::{PlaybackState, Slot, SlotSnapshot, SlotStore};

use scheduler::{TickAction, TickHandle, Timers};

pub struct Engine {
    config: EngineConfig,
    store: SlotStore,
    backend: Box<dyn AudioBackend>,
    clock: Arc<dyn Clock>,
    timers: Timers,
    events: Vec<EngineEvent>,
}

impl Engine {
    pub fn new(config: EngineConfig, backend: Box<dyn AudioBackend>, clock: Arc<dyn Clock>) -> Self {
        let store = SlotStore::create_default(config.slot_count, &mut rand::thread_rng());
        let timers = Timers::new(config.tick_interval);
        Self {
            config,
            store,
            backend,
            clock,
            timers,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn slot_ids(&self) -> Vec<SlotId> {
        self.store.ids()
    }

    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.store.iter().map(Slot::snapshot).collect()
    }

    pub fn slot(&self, id: SlotId) -> Option<SlotSnapshot> {
        self.store.get(id).map(Slot::snapshot)
    }

    pub fn is_playing(&self, id: SlotId) -> bool {
        self.store.get(id).map_or(false, |s| s.playback.is_playing)
    }

    pub fn position(&self, id: SlotId) -> Option<Duration> {
        self.store.get(id).and_then(Slot::position)
    }

    /// Section by 1-based number or name.
    pub fn find_section(&self, id: SlotId, query: &str) -> Option<SectionId> {
        self.store.get(id)?.resolve_section(query).map(|s| s.id)
    }

    /// Number of installed tick timers across all slots.
    pub fn live_timers(&self) -> usize {
        self.timers.live()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Playback controller ---

    pub fn play(&mut self, id: SlotId, section: Option<SectionId>) -> Result<(), EngineError> {
        let Some(slot) = self.store.get(id) else {
            return Ok(());
        };
        if !slot.has_audio() {
            return Ok(());
        }
        let target = match section {
            Some(wanted) => match slot.section(wanted) {
                Some(s) => Some(s.id),
                None => return Ok(()),
            },
            None if slot.playback.is_playing => return Ok(()),
            None => slot
                .playback
                .next_section
                .or(slot.playback.current_section)
                .filter(|sid| slot.section(*sid).is_some())
                .or_else(|| slot.sections.first().map(|s| s.id)),
        };
        self.start(id, target)
    }

    pub fn stop(&mut self, id: SlotId) {
        self.teardown_slot(id, StopReason::Requested);
    }

    pub fn stop_all(&mut self) {
        for id in self.store.ids() {
            self.teardown_slot(id, StopReason::Requested);
        }
    }

    /// Cuts over to `section` now, starting the slot if it was stopped.
    pub fn jump_to_section(&mut self, id: SlotId, section: SectionId) -> Result<(), EngineError> {
        match self.store.get(id) {
            Some(slot) if slot.has_audio() && slot.section(section).is_some() => {}
            _ => return Ok(()),
        }
        self.start(id, Some(section))
    }

    /// Cues `section` for the next bar line (or loop end). On a stopped slot
    /// the cue is where the next `play(id, None)` starts.
    pub fn queue_next_section(&mut self, id: SlotId, section: SectionId) {
        let Some(slot) = self.store.get_mut(id) else {
            return;
        };
        let Some(next) = slot.section(section).map(|s| s.name.clone()) else {
            return;
        };
        if slot.playback.next_section == Some(section) {
            return;
        }
        slot.playback = PlaybackState {
            next_section: Some(section),
            ..slot.playback.clone()
        };
        let current = slot
            .playback
            .current_section
            .and_then(|sid| slot.section(sid))
            .map(|s| s.name.clone());
        self.events.push(EngineEvent::SectionChanged {
            slot: id,
            current,
            next: Some(next),
        });
    }

    /// End of audio: stops like [`Engine::stop`] with [`StopReason::TrackEnded`].
    pub fn on_track_ended(&mut self, id: SlotId) {
        self.teardown_slot(id, StopReason::TrackEnded);
    }

    /// Stops everything and cancels every timer.
    pub fn shutdown(&mut self) {
        for id in self.store.ids() {
            self.teardown_slot(id, StopReason::Shutdown);
        }
        self.timers = Timers::new(self.config.tick_interval);
    }

    // --- Scheduler driver ---

    /// Fires every tick that is due on the engine clock.
    pub fn poll(&mut self) {
        let now = self.clock.now();
        for handle in self.timers.due(now) {
            self.run_tick(handle);
        }
    }

    fn run_tick(&mut self, handle: TickHandle) {
        let id = handle.slot();
        let Some(slot) = self.store.get_mut(id) else {
            self.timers.cancel(handle);
            return;
        };
        if slot.ticker != Some(handle) || !slot.playback.is_playing {
            // Stale timer from an earlier start.
            self.timers.cancel(handle);
            return;
        }
        let Some(audio) = slot.audio.as_mut() else {
            self.on_track_ended(id);
            return;
        };
        if let Some(error) = audio.take_error() {
            self.fail(id, error);
            return;
        }
        let position = audio.position();
        let ended = audio.has_ended();
        let outcome = scheduler::evaluate(slot, position, ended, self.config.lookahead());

        if let Some(measure) = outcome.crossed {
            slot.playback = PlaybackState {
                last_measure_played: measure,
                ..slot.playback.clone()
            };
            self.events.push(EngineEvent::MeasureCrossed { slot: id, measure });
        }

        match outcome.action {
            None => {}
            Some(TickAction::Stop(StopReason::TrackEnded)) => self.on_track_ended(id),
            Some(TickAction::Stop(reason)) => self.teardown_slot(id, reason),
            Some(TickAction::Wrap { to }) => self.wrap_loop(id, to),
            Some(TickAction::HandOff { section, to }) => self.hand_off(id, section, to),
            Some(TickAction::Follow { section }) => self.enter_section(id, section),
        }
    }

    fn wrap_loop(&mut self, id: SlotId, to: Duration) {
        let Some(slot) = self.store.get_mut(id) else {
            return;
        };
        let seek = match slot.audio.as_mut() {
            Some(audio) => audio.seek(to),
            None => return,
        };
        if let Err(error) = seek {
            self.fail(id, error);
            return;
        }
        let measure = timing::measure_at(to.as_secs_f64(), slot.measure_duration()).unwrap_or(0);
        let count = slot.playback.loops_completed + 1;
        slot.playback = PlaybackState {
            last_measure_played: measure,
            loops_completed: count,
            ..slot.playback.clone()
        };
        let section = slot
            .playback
            .current_section
            .and_then(|sid| slot.section(sid))
            .map(|s| s.name.clone())
            .unwrap_or_default();
        self.events.push(EngineEvent::LoopWrapped { slot: id, section, count });
        self.events.push(EngineEvent::MeasureCrossed { slot: id, measure });
    }

    fn hand_off(&mut self, id: SlotId, section: SectionId, to: Duration) {
        let Some(slot) = self.store.get_mut(id) else {
            return;
        };
        let seek = match slot.audio.as_mut() {
            Some(audio) => audio.seek(to),
            None => return,
        };
        if let Err(error) = seek {
            self.fail(id, error);
            return;
        }
        let measure = timing::measure_at(to.as_secs_f64(), slot.measure_duration()).unwrap_or(0);
        slot.playback = PlaybackState {
            last_measure_played: measure,
            ..slot.playback.clone()
        };
        self.enter_section(id, section);
    }

    /// Makes `section` current and clears the cue.
    fn enter_section(&mut self, id: SlotId, section: SectionId) {
        let Some(slot) = self.store.get_mut(id) else {
            return;
        };
        slot.playback = PlaybackState {
            current_section: Some(section),
            next_section: None,
            loops_completed: 0,
            ..slot.playback.clone()
        };
        let current = slot.section(section).map(|s| s.name.clone());
        self.events.push(EngineEvent::SectionChanged {
            slot: id,
            current,
            next: None,
        });
    }

    /// Seeks to `section` (or the top of the track) and starts output with a
    /// fresh tick. Replaces any tick the slot already had.
    fn start(&mut self, id: SlotId, section: Option<SectionId>) -> Result<(), EngineError> {
        if self.config.exclusive_playback {
            let others: Vec<SlotId> = self
                .store
                .iter()
                .filter(|s| s.id != id && s.playback.is_playing)
                .map(|s| s.id)
                .collect();
            for other in others {
                self.teardown_slot(other, StopReason::Preempted);
            }
        }

        let Some(slot) = self.store.get_mut(id) else {
            return Ok(());
        };
        if let Some(old) = slot.ticker.take() {
            self.timers.cancel(old);
        }
        let md = slot.measure_duration();
        let entry = section.and_then(|sid| slot.section(sid)).cloned();
        let start_at = entry.as_ref().map_or(0.0, |s| s.start_seconds(md));

        let Some(audio) = slot.audio.as_mut() else {
            return Ok(());
        };
        let started = match audio.seek(timing::to_duration(start_at)) {
            Ok(()) => audio.play(),
            Err(e) => Err(e),
        };
        if let Err(error) = started {
            self.fail(id, error.clone());
            return Err(error.into());
        }

        let ticker = self.timers.install(id, self.clock.now());
        slot.ticker = Some(ticker);
        slot.playback = PlaybackState {
            is_playing: true,
            current_section: entry.as_ref().map(|s| s.id),
            next_section: None,
            last_measure_played: timing::measure_at(start_at, md).unwrap_or(0),
            loops_completed: 0,
        };
        let name = entry.map(|s| s.name);
        self.events.push(EngineEvent::Started {
            slot: id,
            section: name.clone(),
        });
        if name.is_some() {
            self.events.push(EngineEvent::SectionChanged {
                slot: id,
                current: name,
                next: None,
            });
        }
        Ok(())
    }

    /// Stops a slot after a resource error. No retry.
    fn fail(&mut self, id: SlotId, error: AudioError) {
        self.teardown_slot(id, StopReason::PlaybackError);
        let name = self.store.get(id).map(|s| s.name.clone()).unwrap_or_default();
        console::error(format!("{}: {}", name, error));
        self.events.push(EngineEvent::PlaybackError { slot: id, error });
    }

    /// The one exit path: cancels the tick, pauses audio, clears playback.
    ///
    /// Safe to call on a stopped slot; only an active slot reports `Stopped`.
    fn teardown_slot(&mut self, id: SlotId, reason: StopReason) {
        let Some(slot) = self.store.get_mut(id) else {
            return;
        };
        let was_active = slot.playback.is_playing || slot.ticker.is_some();
        if let Some(handle) = slot.ticker.take() {
            self.timers.cancel(handle);
        }
        if let Some(audio) = slot.audio.as_mut() {
            if audio.is_playing() {
                audio.pause();
            }
        }
        slot.playback = PlaybackState::default();
        if was_active {
            self.events.push(EngineEvent::Stopped { slot: id, reason });
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;
    use crate::audio::offline::OfflineBackend;
    use crate::model::Section;
    use std::path::PathBuf;

    const TICK: Duration = Duration::from_millis(50);

    fn engine(clock: &ManualClock) -> Engine {
        let backend = OfflineBackend::new(Arc::new(clock.clone()))
            .with_track("a.wav", Duration::from_secs(90))
            .with_track("b.wav", Duration::from_secs(90));
        let mut engine = Engine::new(EngineConfig::default(), Box::new(backend), Arc::new(clock.clone()));
        for (id, file) in [(1, "a.wav"), (2, "b.wav")] {
            engine
                .save_slot_configuration(
                    SlotId(id),
                    SlotConfiguration {
                        name: format!("Song {id}"),
                        audio_file: Some(PathBuf::from(file)),
                        tempo_bpm: Some(80),
                        sections: vec![
                            Section::normal(SectionId(1), "Intro", 1),
                            Section::looped(SectionId(2), "Vamp", 5, 8),
                        ],
                    },
                )
                .expect("configure");
        }
        engine.drain_events();
        engine
    }

    fn run(engine: &mut Engine, clock: &ManualClock, for_time: Duration) {
        let mut left = for_time;
        while left > Duration::ZERO {
            let step = left.min(TICK);
            clock.advance(step);
            engine.poll();
            left -= step;
        }
    }

    #[test]
    fn play_without_audio_is_noop() {
        let clock = ManualClock::new();
        let mut e = engine(&clock);
        e.play(SlotId(3), None).expect("play");
        assert!(!e.is_playing(SlotId(3)));
        assert_eq!(e.live_timers(), 0);
    }

    #[test]
    fn exclusive_playback_preempts_other_slot() {
        let clock = ManualClock::new();
        let mut e = engine(&clock);
        e.play(SlotId(1), None).expect("play 1");
        e.play(SlotId(2), None).expect("play 2");
        assert!(!e.is_playing(SlotId(1)));
        assert!(e.is_playing(SlotId(2)));
        assert_eq!(e.live_timers(), 1);
        assert!(e.drain_events().contains(&EngineEvent::Stopped {
            slot: SlotId(1),
            reason: StopReason::Preempted
        }));
    }

    #[test]
    fn stopped_slot_starts_at_cue() {
        let clock = ManualClock::new();
        let mut e = engine(&clock);
        e.queue_next_section(SlotId(1), SectionId(2));
        e.play(SlotId(1), None).expect("play");
        let snap = e.slot(SlotId(1)).expect("slot");
        assert_eq!(snap.playback.current_section, Some(SectionId(2)));
        assert_eq!(snap.position, Some(Duration::from_secs(12)));
    }

    #[test]
    fn play_none_while_playing_keeps_position() {
        let clock = ManualClock::new();
        let mut e = engine(&clock);
        e.play(SlotId(1), None).expect("play");
        run(&mut e, &clock, Duration::from_secs(2));
        e.play(SlotId(1), None).expect("again");
        assert_eq!(e.position(SlotId(1)), Some(Duration::from_secs(2)));
    }

    #[test]
    fn follow_through_into_loop() {
        let clock = ManualClock::new();
        let mut e = engine(&clock);
        e.play(SlotId(1), None).expect("play");
        run(&mut e, &clock, Duration::from_millis(12_100));
        let snap = e.slot(SlotId(1)).expect("slot");
        assert_eq!(snap.current_section_name(), Some("Vamp"));
        assert_eq!(snap.playback.last_measure_played, 5);
    }

    #[test]
    fn stale_tick_does_nothing() {
        let clock = ManualClock::new();
        let mut e = engine(&clock);
        e.play(SlotId(1), None).expect("play");
        let stale = e.store.get(SlotId(1)).and_then(|s| s.ticker).expect("ticker");
        e.jump_to_section(SlotId(1), SectionId(2)).expect("jump");
        assert!(!e.timers.is_live(stale));
        e.run_tick(stale);
        assert!(e.is_playing(SlotId(1)));
        assert_eq!(e.live_timers(), 1);
    }

    #[test]
    fn shutdown_cancels_everything() {
        let clock = ManualClock::new();
        let mut e = engine(&clock);
        e.play(SlotId(1), None).expect("play");
        e.shutdown();
        assert_eq!(e.live_timers(), 0);
        assert!(!e.is_playing(SlotId(1)));
        e.shutdown();
    }
}
