// MIDI Export - Drum events to a single-track Standard MIDI File via midly
// GM drums on channel 10, with tempo and time-signature meta at tick 0

use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::groove::grid::TimeSignature;
use super::materialize::DrumEvent;

/// Channel 10 (0-indexed = 9) is drums
const DRUM_CHANNEL: u8 = 9;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tempo must be positive, got {0}")]
    InvalidTempo(f64),

    #[error("PPQ {0} does not fit a MIDI header")]
    InvalidResolution(u32),

    #[error("Tick {0} is beyond the MIDI delta-time range")]
    TickOverflow(u64),
}

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiExportOptions {
    /// Pulses per quarter note; must match the timeline that produced the events
    pub ppq: u32,

    pub bpm: f64,

    pub time_signature: TimeSignature,

    /// Include tempo metadata
    pub include_tempo: bool,

    /// Include time signature metadata
    pub include_time_signature: bool,

    pub track_name: Option<String>,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            bpm: 120.0,
            time_signature: TimeSignature::FOUR_FOUR,
            include_tempo: true,
            include_time_signature: true,
            track_name: Some("DRUMS".to_string()),
        }
    }
}

/// Export drum events to MIDI file bytes
pub fn export_drum_midi(
    events: &[DrumEvent],
    options: &MidiExportOptions,
) -> Result<Vec<u8>, ExportError> {
    if !options.bpm.is_finite() || options.bpm <= 0.0 {
        return Err(ExportError::InvalidTempo(options.bpm));
    }
    let ppq = u16::try_from(options.ppq)
        .ok()
        .filter(|ppq| *ppq > 0 && *ppq < 0x8000)
        .ok_or(ExportError::InvalidResolution(options.ppq))?;

    let header = Header {
        format: midly::Format::SingleTrack,
        timing: Timing::Metrical(ppq.into()),
    };

    let smf = Smf {
        header,
        tracks: vec![create_drum_track(events, options)?],
    };

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;

    log::info!("Exported {} drum events to MIDI ({} bytes)", events.len(), bytes.len());
    Ok(bytes)
}

/// Export and write to disk
pub fn write_drum_midi(
    path: impl AsRef<Path>,
    events: &[DrumEvent],
    options: &MidiExportOptions,
) -> Result<(), ExportError> {
    let bytes = export_drum_midi(events, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn create_drum_track<'a>(
    events: &[DrumEvent],
    options: &'a MidiExportOptions,
) -> Result<Track<'a>, ExportError> {
    let mut track = Track::new();

    if let Some(name) = &options.track_name {
        add_meta(&mut track, MetaMessage::TrackName(name.as_bytes()));
    }
    if options.include_tempo {
        add_tempo(&mut track, options.bpm);
    }
    if options.include_time_signature {
        add_time_signature(&mut track, &options.time_signature);
    }

    // Note-offs sort before note-ons at the same tick so repeated notes retrigger
    let mut timed: Vec<(u64, bool, TrackEventKind<'a>)> = Vec::with_capacity(events.len() * 2);
    for event in events {
        timed.push((
            event.tick,
            true,
            TrackEventKind::Midi {
                channel: DRUM_CHANNEL.into(),
                message: MidiMessage::NoteOn {
                    key: event.note.into(),
                    vel: event.velocity.min(127).into(),
                },
            },
        ));
        timed.push((
            event.tick + event.duration as u64,
            false,
            TrackEventKind::Midi {
                channel: DRUM_CHANNEL.into(),
                message: MidiMessage::NoteOff {
                    key: event.note.into(),
                    vel: 0.into(),
                },
            },
        ));
    }
    timed.sort_by_key(|(tick, is_on, _)| (*tick, *is_on));

    let mut last_tick = 0u64;
    for (tick, _, kind) in timed {
        let delta = u32::try_from(tick - last_tick)
            .ok()
            .filter(|delta| *delta < (1 << 28))
            .ok_or(ExportError::TickOverflow(tick))?;
        track.push(TrackEvent {
            delta: delta.into(),
            kind,
        });
        last_tick = tick;
    }

    add_meta(&mut track, MetaMessage::EndOfTrack);
    Ok(track)
}

fn add_meta<'a>(track: &mut Track<'a>, message: MetaMessage<'a>) {
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(message),
    });
}

/// Add tempo meta message
fn add_tempo(track: &mut Track<'_>, bpm: f64) {
    // Microseconds per quarter note, 24 bits
    let us_per_quarter = ((60_000_000.0 / bpm).round() as u32).min(0x00FF_FFFF);
    add_meta(track, MetaMessage::Tempo(us_per_quarter.into()));
}

/// Add time signature meta message
fn add_time_signature(track: &mut Track<'_>, time_signature: &TimeSignature) {
    let numerator = time_signature.beats_per_bar().min(255) as u8;
    // Denominator is stored as a power of two
    let denominator = time_signature.beat_unit().trailing_zeros() as u8;
    add_meta(track, MetaMessage::TimeSignature(numerator, denominator, 24, 8));
}
