// Bar/Tick Timing - Converts bar + beat positions into absolute ticks
// The pipeline only talks to the BarTimeline trait; FixedMeterTimeline is the stock implementation

use serde::{Deserialize, Serialize};

use super::grid::TimeSignature;
use super::position::BeatPosition;

/// Default MIDI resolution (pulses per quarter note)
pub const DEFAULT_TICKS_PER_QUARTER: u32 = 480;

/// Rescale a micro-timing offset given at the default resolution
pub fn scale_offset_ticks(ticks: i32, ticks_per_quarter: u32) -> i32 {
    if ticks_per_quarter == DEFAULT_TICKS_PER_QUARTER {
        return ticks;
    }
    let scaled = ticks as i64 * ticks_per_quarter as i64 / DEFAULT_TICKS_PER_QUARTER as i64;
    scaled.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Bar/beat to tick conversion supplied by the host timeline
pub trait BarTimeline {
    /// Absolute tick of a beat position in a bar (bars and beats are 1-indexed)
    fn to_tick(&self, bar: u32, beat: BeatPosition) -> u64;

    /// Absolute tick where a bar ends (= start of the next bar)
    fn bar_end_tick(&self, bar: u32) -> u64;

    /// Resolution in ticks per quarter note
    fn ticks_per_quarter(&self) -> u32;
}

/// Timeline with a single meter for the whole song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedMeterTimeline {
    pub time_signature: TimeSignature,
    pub ticks_per_quarter: u32,
}

impl FixedMeterTimeline {
    /// Create a timeline for a meter at the given resolution
    pub fn new(time_signature: TimeSignature, ticks_per_quarter: u32) -> Self {
        FixedMeterTimeline {
            time_signature,
            ticks_per_quarter,
        }
    }

    /// Ticks in one bar
    pub fn ticks_per_bar(&self) -> u64 {
        self.time_signature.ticks_per_bar(self.ticks_per_quarter) as u64
    }

    /// Ticks in one beat
    pub fn ticks_per_beat(&self) -> u64 {
        self.time_signature.ticks_per_beat(self.ticks_per_quarter) as u64
    }

    /// Absolute tick where a bar starts
    pub fn bar_start_tick(&self, bar: u32) -> u64 {
        bar.saturating_sub(1) as u64 * self.ticks_per_bar()
    }
}

impl Default for FixedMeterTimeline {
    fn default() -> Self {
        FixedMeterTimeline::new(TimeSignature::FOUR_FOUR, DEFAULT_TICKS_PER_QUARTER)
    }
}

impl BarTimeline for FixedMeterTimeline {
    fn to_tick(&self, bar: u32, beat: BeatPosition) -> u64 {
        let offset = (beat.offset_from_downbeat() * self.ticks_per_beat() as f64).round();
        self.bar_start_tick(bar) + offset.max(0.0) as u64
    }

    fn bar_end_tick(&self, bar: u32) -> u64 {
        bar.max(1) as u64 * self.ticks_per_bar()
    }

    fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_four_ticks() {
        let timeline = FixedMeterTimeline::default();

        assert_eq!(timeline.to_tick(1, BeatPosition::new(1.0)), 0);
        assert_eq!(timeline.to_tick(1, BeatPosition::new(2.0)), 480);
        assert_eq!(timeline.to_tick(1, BeatPosition::new(4.5)), 1680);
        assert_eq!(timeline.to_tick(2, BeatPosition::new(1.0)), 1920);
        assert_eq!(timeline.bar_end_tick(1), 1920);
        assert_eq!(timeline.bar_end_tick(8), 15360);
    }

    #[test]
    fn test_offsets_follow_resolution() {
        assert_eq!(scale_offset_ticks(12, 480), 12);
        assert_eq!(scale_offset_ticks(12, 960), 24);
        assert_eq!(scale_offset_ticks(-4, 960), -8);
        assert_eq!(scale_offset_ticks(12, 96), 2);
    }

    #[test]
    fn test_triplet_ticks_round() {
        let timeline = FixedMeterTimeline::default();
        assert_eq!(timeline.to_tick(1, BeatPosition::new(1.3333333)), 160);
        assert_eq!(timeline.to_tick(1, BeatPosition::new(1.6666667)), 320);
    }

    #[test]
    fn test_three_four_and_six_eight() {
        let waltz = FixedMeterTimeline::new(TimeSignature::THREE_FOUR, 480);
        assert_eq!(waltz.to_tick(2, BeatPosition::new(1.0)), 1440);

        let compound = FixedMeterTimeline::new(TimeSignature::parse("6/8").unwrap(), 480);
        assert_eq!(compound.to_tick(1, BeatPosition::new(2.0)), 240);
        assert_eq!(compound.bar_end_tick(1), 1440);
    }
}
