// Fingerprints - SHA256 of a generated event table
// Two runs with equal fingerprints produced identical events

use sha2::{Digest, Sha256};

use crate::arranger::materialize::DrumEvent;

/// Calculate SHA256 hash of data
fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of the event table, one `tick,note,velocity,duration` row per event
pub fn fingerprint_events(events: &[DrumEvent]) -> String {
    let table: String = events
        .iter()
        .map(|event| {
            format!(
                "{},{},{},{}\n",
                event.tick, event.note, event.velocity, event.duration
            )
        })
        .collect();
    calculate_sha256(table.as_bytes())
}
