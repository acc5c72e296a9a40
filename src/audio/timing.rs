use std::time::Duration;

// --- Measure clock (pure, testable) ---
// Every tempo calculation in the crate goes through these helpers.

/// Sections are addressed in 4/4.
pub const BEATS_PER_MEASURE: u32 = 4;

// Absorbs float error when a position was itself computed from a measure
// boundary (e.g. 12 * md / md landing on 11.999999...).
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Length of one measure in seconds, or `0.0` when no tempo is set.
pub fn measure_duration(bpm: Option<u32>) -> f64 {
    match bpm {
        Some(bpm) if bpm > 0 => 60.0 / bpm as f64 * BEATS_PER_MEASURE as f64,
        _ => 0.0,
    }
}

/// 1-based measure containing `elapsed` seconds.
///
/// Returns `None` when `measure_duration` is not positive: without a tempo the
/// clock is undefined and callers fall back to untimed playback.
pub fn measure_at(elapsed: f64, measure_duration: f64) -> Option<u32> {
    if measure_duration <= 0.0 || !measure_duration.is_finite() {
        return None;
    }
    let elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };
    let index = (elapsed / measure_duration + BOUNDARY_EPSILON).floor();
    Some(index.min(u32::MAX as f64 - 1.0) as u32 + 1)
}

/// Seconds at which `measure` begins (its downbeat).
pub fn measure_start(measure: u32, measure_duration: f64) -> f64 {
    measure.saturating_sub(1) as f64 * measure_duration.max(0.0)
}

/// Seconds at which `measure` ends, i.e. the downbeat of the following one.
pub fn measure_end(measure: u32, measure_duration: f64) -> f64 {
    measure as f64 * measure_duration.max(0.0)
}

/// Number of measures a track spans; a trailing partial measure counts.
pub fn total_measures(track: Duration, measure_duration: f64) -> Option<u32> {
    if measure_duration <= 0.0 {
        return None;
    }
    let measures = (track.as_secs_f64() / measure_duration - BOUNDARY_EPSILON).ceil();
    Some(measures.max(0.0) as u32)
}

/// Converts a seconds offset into a `Duration`, clamping negatives to zero.
pub fn to_duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_duration_is_four_beats() {
        assert!((measure_duration(Some(80)) - 3.0).abs() < 1e-12);
        assert!((measure_duration(Some(120)) - 2.0).abs() < 1e-12);
        assert_eq!(measure_duration(None), 0.0);
        assert_eq!(measure_duration(Some(0)), 0.0);
    }

    #[test]
    fn first_measure_starts_at_zero() {
        for bpm in [40, 72, 80, 97, 120, 133, 180, 240] {
            let md = measure_duration(Some(bpm));
            assert_eq!(measure_at(0.0, md), Some(1), "bpm {bpm}");
            assert_eq!(measure_at(md, md), Some(2), "bpm {bpm}");
        }
    }

    #[test]
    fn negative_elapsed_clamps_to_first_measure() {
        assert_eq!(measure_at(-4.2, 3.0), Some(1));
    }

    #[test]
    fn clock_undefined_without_tempo() {
        assert_eq!(measure_at(10.0, 0.0), None);
        assert_eq!(measure_at(10.0, measure_duration(None)), None);
    }

    #[test]
    fn boundaries_computed_from_measures_round_trip() {
        let md = measure_duration(Some(97));
        for m in 1..200 {
            assert_eq!(measure_at(measure_start(m, md), md), Some(m));
        }
    }

    #[test]
    fn section_start_at_eighty_bpm() {
        let md = measure_duration(Some(80));
        assert!((measure_start(5, md) - 12.0).abs() < 1e-12);
        assert!((measure_end(13, md) - 39.0).abs() < 1e-12);
    }

    #[test]
    fn total_measures_counts_partial_tail() {
        let md = 3.0;
        assert_eq!(total_measures(Duration::from_secs(30), md), Some(10));
        assert_eq!(total_measures(Duration::from_secs_f64(31.5), md), Some(11));
        assert_eq!(total_measures(Duration::from_secs(30), 0.0), None);
    }

    #[test]
    fn to_duration_clamps_negative() {
        assert_eq!(to_duration(-1.0), Duration::ZERO);
        assert_eq!(to_duration(1.5), Duration::from_millis(1500));
    }
}
