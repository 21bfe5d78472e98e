// Event Materializer - Onsets to absolute-tick drum events
// The timeline decides where a beat lands; this only adds micro-timing and ordering

use serde::{Deserialize, Serialize};

use crate::groove::timing::BarTimeline;
use super::onset::Onset;

/// Default note length in ticks (a 16th at 480 PPQ)
pub const DEFAULT_NOTE_DURATION: u32 = 120;

/// A drum hit ready for playback or export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrumEvent {
    /// Absolute start tick
    pub tick: u64,

    /// General MIDI drum note
    pub note: u8,

    pub velocity: u8,

    /// Length in ticks
    pub duration: u32,
}

/// Convert onsets to events sorted by tick, then note
///
/// Timing offsets shift the start tick; a negative offset never moves an
/// event before tick 0.
pub fn materialize_events(
    onsets: &[Onset],
    timeline: &impl BarTimeline,
    duration: u32,
) -> Vec<DrumEvent> {
    let mut events: Vec<DrumEvent> = onsets
        .iter()
        .map(|onset| {
            let base = timeline.to_tick(onset.bar, onset.beat) as i64;
            let tick = (base + onset.timing_offset_ticks as i64).max(0) as u64;
            DrumEvent {
                tick,
                note: onset.role.midi_note(),
                velocity: onset.velocity.min(127),
                duration,
            }
        })
        .collect();

    events.sort_by_key(|event| (event.tick, event.note));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::roles::DrumRole;
    use crate::groove::grid::TimeSignature;
    use crate::groove::position::BeatPosition;
    use crate::groove::timing::FixedMeterTimeline;

    #[test]
    fn test_ticks_and_notes() {
        let onsets = vec![
            Onset::anchor(DrumRole::Snare, 2, BeatPosition::new(2.0), 100),
            Onset::anchor(DrumRole::ClosedHat, 1, BeatPosition::new(1.0), 80),
            Onset::anchor(DrumRole::Kick, 1, BeatPosition::new(1.0), 100),
        ];
        let events = materialize_events(&onsets, &FixedMeterTimeline::default(), DEFAULT_NOTE_DURATION);

        assert_eq!(
            events,
            vec![
                DrumEvent { tick: 0, note: 36, velocity: 100, duration: 120 },
                DrumEvent { tick: 0, note: 42, velocity: 80, duration: 120 },
                DrumEvent { tick: 2400, note: 38, velocity: 100, duration: 120 },
            ]
        );
    }

    #[test]
    fn test_timing_offset() {
        let onsets = vec![
            Onset::anchor(DrumRole::ClosedHat, 1, BeatPosition::new(1.5), 80).with_timing_offset(12),
            Onset::anchor(DrumRole::Kick, 1, BeatPosition::new(1.0), 100).with_timing_offset(-30),
        ];
        let events = materialize_events(&onsets, &FixedMeterTimeline::default(), 60);

        assert_eq!(events[0].tick, 0);
        assert_eq!(events[1].tick, 252);
        assert_eq!(events[1].duration, 60);
    }

    #[test]
    fn test_three_four_bar_length() {
        let timeline = FixedMeterTimeline::new(TimeSignature::THREE_FOUR, 480);
        let onsets = vec![Onset::anchor(DrumRole::Kick, 3, BeatPosition::new(1.0), 100)];
        let events = materialize_events(&onsets, &timeline, DEFAULT_NOTE_DURATION);
        assert_eq!(events[0].tick, 2880);
    }
}
