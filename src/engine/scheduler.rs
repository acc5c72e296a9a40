//! Periodic per-slot ticks and what each tick decides.
//!
//! Timers live in a [`Timers`] set owned by the engine. Each installed timer
//! gets a fresh generation, so a handle that was cancelled or replaced can
//! never fire again even if it is still sitting in a due list.

use std::time::Duration;

use super::events::StopReason;
use super::store::Slot;
use crate::audio::timing;
use crate::model::{SectionId, SectionKind, SlotId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle {
    slot: SlotId,
    generation: u64,
}

impl TickHandle {
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

#[derive(Debug)]
struct Timer {
    handle: TickHandle,
    next_due: Duration,
}

#[derive(Debug)]
pub struct Timers {
    interval: Duration,
    next_generation: u64,
    entries: Vec<Timer>,
}

impl Timers {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next_generation: 1,
            entries: Vec::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Installs a timer for `slot`, first due one interval after `now`.
    pub fn install(&mut self, slot: SlotId, now: Duration) -> TickHandle {
        let handle = TickHandle {
            slot,
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.entries.push(Timer {
            handle,
            next_due: now + self.interval,
        });
        handle
    }

    pub fn cancel(&mut self, handle: TickHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|t| t.handle != handle);
        self.entries.len() != before
    }

    pub fn is_live(&self, handle: TickHandle) -> bool {
        self.entries.iter().any(|t| t.handle == handle)
    }

    pub fn live(&self) -> usize {
        self.entries.len()
    }

    /// Handles due at `now`. A timer that fell several intervals behind fires
    /// once and is rescheduled past `now`.
    pub fn due(&mut self, now: Duration) -> Vec<TickHandle> {
        let interval = self.interval;
        let mut fired = Vec::new();
        for timer in self.entries.iter_mut() {
            if timer.next_due > now {
                continue;
            }
            fired.push(timer.handle);
            while timer.next_due <= now {
                timer.next_due += interval;
            }
        }
        fired
    }
}

/// What a tick asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TickAction {
    Stop(StopReason),
    /// Seek back to the loop start.
    Wrap { to: Duration },
    /// Seek into the queued section and make it current.
    HandOff { section: SectionId, to: Duration },
    /// Playback ran into the next section on its own.
    Follow { section: SectionId },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TickOutcome {
    /// Set when the playhead is in a different measure than last tick.
    pub crossed: Option<u32>,
    pub action: Option<TickAction>,
}

/// Decides one tick for a playing slot.
///
/// `lookahead` lets a loop wrap up to that much before the loop end; the
/// overshoot (negative in that case) is carried into the seek target so
/// repeated wraps keep the loop length exact.
pub(crate) fn evaluate(slot: &Slot, position: Duration, ended: bool, lookahead: Duration) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    let md = slot.measure_duration();
    let pos = position.as_secs_f64();

    let measure = match timing::measure_at(pos, md) {
        Some(m) if !slot.sections.is_empty() => m,
        _ => {
            if ended {
                outcome.action = Some(TickAction::Stop(StopReason::TrackEnded));
            }
            return outcome;
        }
    };

    let crossed = measure != slot.playback.last_measure_played;
    if crossed {
        outcome.crossed = Some(measure);
    }

    let queued = slot.playback.next_section.and_then(|id| slot.section(id));
    let current = slot.playback.current_section.and_then(|id| slot.section(id));

    // A queued cue lands on the next bar line, unless a loop is holding it.
    if let Some(next) = queued {
        let held_by_loop = current.map_or(false, |c| c.is_loop());
        if crossed && !held_by_loop {
            let overshoot = pos - timing::measure_start(measure, md);
            outcome.action = Some(TickAction::HandOff {
                section: next.id,
                to: timing::to_duration(next.start_seconds(md) + overshoot),
            });
            return outcome;
        }
    }

    let Some(current) = current else {
        if ended {
            outcome.action = Some(TickAction::Stop(StopReason::TrackEnded));
        }
        return outcome;
    };

    match current.kind {
        SectionKind::Loop { end_measure } => {
            let loop_end = timing::measure_end(end_measure, md);
            if ended || pos + lookahead.as_secs_f64() >= loop_end {
                let overshoot = if ended { 0.0 } else { pos - loop_end };
                outcome.action = Some(match queued {
                    Some(next) => TickAction::HandOff {
                        section: next.id,
                        to: timing::to_duration(next.start_seconds(md) + overshoot),
                    },
                    None => TickAction::Wrap {
                        to: timing::to_duration(current.start_seconds(md) + overshoot),
                    },
                });
            }
        }
        SectionKind::Normal => {
            if ended {
                outcome.action = Some(TickAction::Stop(StopReason::TrackEnded));
            } else if let Some(end) = slot.natural_end(current) {
                if measure > end {
                    outcome.action = if slot.is_last_section(current.id) {
                        Some(TickAction::Stop(StopReason::TrackEnded))
                    } else {
                        slot.section_at(measure)
                            .filter(|s| s.id != current.id)
                            .map(|s| TickAction::Follow { section: s.id })
                    };
                }
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColorTag, Section, SlotConfig};
    use crate::engine::store::PlaybackState;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // Binary fractions keep float positions exact.
    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    // 80 BPM: one measure is 3 s.
    fn slot(current: u32, next: Option<u32>, last: u32) -> Slot {
        let mut config = SlotConfig::empty(SlotId(1), ColorTag("#4f46e5".into()));
        config.tempo_bpm = Some(80);
        config.sections = vec![
            Section::normal(SectionId(1), "Intro", 1),
            Section::normal(SectionId(2), "Verse", 5),
            Section::looped(SectionId(3), "Vamp", 9, 13),
            Section::normal(SectionId(4), "Outro", 14),
        ];
        let mut slot = Slot::from_config(config, None);
        slot.playback = PlaybackState {
            is_playing: true,
            current_section: Some(SectionId(current)),
            next_section: next.map(SectionId),
            last_measure_played: last,
            loops_completed: 0,
        };
        slot
    }

    #[test]
    fn timers_have_unique_generations() {
        let mut timers = Timers::new(ms(50));
        let a = timers.install(SlotId(1), Duration::ZERO);
        let b = timers.install(SlotId(1), Duration::ZERO);
        assert_ne!(a, b);
        assert!(timers.cancel(a));
        assert!(!timers.cancel(a));
        assert!(!timers.is_live(a));
        assert!(timers.is_live(b));
    }

    #[test]
    fn late_timer_fires_once() {
        let mut timers = Timers::new(ms(50));
        let h = timers.install(SlotId(1), Duration::ZERO);
        assert!(timers.due(ms(49)).is_empty());
        assert_eq!(timers.due(ms(260)), vec![h]);
        assert!(timers.due(ms(290)).is_empty());
        assert_eq!(timers.due(ms(300)), vec![h]);
    }

    #[test]
    fn loop_wraps_at_end_of_last_measure() {
        let s = slot(3, None, 13);
        let out = evaluate(&s, ms(38_900), false, ms(25));
        assert_eq!(out.action, None);
        let out = evaluate(&s, secs(39.25), false, ms(25));
        assert_eq!(out.crossed, Some(14));
        assert_eq!(out.action, Some(TickAction::Wrap { to: secs(24.25) }));
    }

    #[test]
    fn loop_wrap_within_lookahead_carries_negative_overshoot() {
        let s = slot(3, None, 13);
        let out = evaluate(&s, secs(38.984375), false, ms(25));
        assert_eq!(out.crossed, None);
        assert_eq!(out.action, Some(TickAction::Wrap { to: secs(23.984375) }));
    }

    #[test]
    fn queued_cue_waits_for_loop_end() {
        let s = slot(3, Some(4), 10);
        // Bar line inside the loop: still looping.
        let out = evaluate(&s, ms(33_010), false, ms(25));
        assert_eq!(out.crossed, Some(12));
        assert_eq!(out.action, None);
        let out = evaluate(&s, ms(39_000), false, ms(25));
        assert_eq!(
            out.action,
            Some(TickAction::HandOff { section: SectionId(4), to: ms(39_000) })
        );
    }

    #[test]
    fn queued_cue_hands_off_on_next_bar_line() {
        let s = slot(1, Some(3), 3);
        assert_eq!(evaluate(&s, ms(8_900), false, ms(25)).action, None);
        let out = evaluate(&s, secs(9.25), false, ms(25));
        assert_eq!(out.crossed, Some(4));
        assert_eq!(
            out.action,
            Some(TickAction::HandOff { section: SectionId(3), to: secs(24.25) })
        );
    }

    #[test]
    fn normal_section_follows_into_next() {
        let s = slot(1, None, 4);
        let out = evaluate(&s, ms(12_010), false, ms(25));
        assert_eq!(out.crossed, Some(5));
        assert_eq!(out.action, Some(TickAction::Follow { section: SectionId(2) }));
    }

    #[test]
    fn ended_resource_stops() {
        let s = slot(4, None, 20);
        let out = evaluate(&s, ms(60_000), true, ms(25));
        assert_eq!(out.action, Some(TickAction::Stop(StopReason::TrackEnded)));
    }

    #[test]
    fn ended_inside_loop_wraps() {
        let s = slot(3, None, 13);
        let out = evaluate(&s, ms(38_500), true, ms(25));
        assert_eq!(out.action, Some(TickAction::Wrap { to: ms(24_000) }));
    }

    #[test]
    fn untimed_slot_only_watches_for_end() {
        let mut s = slot(1, None, 0);
        s.tempo_bpm = None;
        assert_eq!(evaluate(&s, ms(5_000), false, ms(25)), TickOutcome::default());
        assert_eq!(
            evaluate(&s, ms(5_000), true, ms(25)).action,
            Some(TickAction::Stop(StopReason::TrackEnded))
        );
    }
}
