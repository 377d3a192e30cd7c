//! Standard MIDI File format 1 output.
//!
//! Track 0 carries the tempo map merged with the first chunk's events.
//! Notes are expanded back into NoteOn/NoteOff pairs.

use crate::model::{Chunk, Event, Sequence, TempoMap, TimedEvent, Timing};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Options for SMF export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Omit repeated channel status bytes. Default: false.
    pub running_status: bool,
}

/// Serialize `sequence` and write it to `path`.
pub fn write(sequence: &Sequence, path: &Path, options: &WriteOptions) -> Result<()> {
    let bytes = to_smf_bytes(sequence, options);
    std::fs::write(path, &bytes).map_err(|e| Error::io(path, e))?;
    info!(
        "wrote {} ({} tracks, {} bytes)",
        path.display(),
        sequence.chunks.len().max(1),
        bytes.len()
    );
    Ok(())
}

/// Serialize `sequence` to SMF format 1 bytes.
pub fn to_smf_bytes(sequence: &Sequence, options: &WriteOptions) -> Vec<u8> {
    let mut tracks: Vec<Vec<u8>> = Vec::with_capacity(sequence.chunks.len().max(1));

    match sequence.chunks.split_first() {
        Some((first, rest)) => {
            tracks.push(build_track(first, Some(&sequence.tempo_map), options));
            for chunk in rest {
                tracks.push(build_track(chunk, None, options));
            }
        }
        None => tracks.push(build_track(&Chunk::new(), Some(&sequence.tempo_map), options)),
    }

    build_midi_file(sequence.timing, &tracks)
}

/// Order among events on the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    Meta,
    NoteOff,
    Other,
    NoteOn,
    /// Off event of a zero-length note; must follow its own on.
    TrailingOff,
}

fn build_track(chunk: &Chunk, tempo_map: Option<&TempoMap>, options: &WriteOptions) -> Vec<u8> {
    let mut events: Vec<(u64, Priority, Vec<u8>)> = Vec::new();

    if let Some(tempo_map) = tempo_map {
        for tc in &tempo_map.tempo_changes {
            let usec = tc.microseconds_per_beat;
            events.push((
                tc.tick,
                Priority::Meta,
                vec![0xFF, 0x51, 0x03, (usec >> 16) as u8, (usec >> 8) as u8, usec as u8],
            ));
        }
        for ts in &tempo_map.time_signatures {
            events.push((
                ts.tick,
                Priority::Meta,
                vec![
                    0xFF,
                    0x58,
                    0x04,
                    ts.numerator,
                    ts.denominator_pow,
                    ts.clocks_per_click,
                    ts.thirty_seconds_per_quarter,
                ],
            ));
        }
    }

    for timed in &chunk.events {
        push_event(&mut events, timed);
    }

    // Stable: same-tick events of equal priority keep their chunk order
    events.sort_by_key(|(tick, priority, _)| (*tick, *priority));

    let mut track_data = Vec::new();
    let mut last_tick = 0u64;
    let mut running: Option<u8> = None;

    for (tick, _, data) in events {
        let mut delta = tick.saturating_sub(last_tick);
        // Gaps past the VLQ range are bridged with empty text metas
        while delta > u64::from(MAX_VLQ) {
            write_vlq(&mut track_data, MAX_VLQ);
            track_data.extend_from_slice(&[0xFF, 0x01, 0x00]);
            running = None;
            delta -= u64::from(MAX_VLQ);
        }
        write_vlq(&mut track_data, delta as u32);

        let status = data[0];
        if status < 0xF0 {
            if options.running_status && running == Some(status) {
                track_data.extend_from_slice(&data[1..]);
            } else {
                track_data.extend_from_slice(&data);
            }
            running = Some(status);
        } else {
            // Meta and sysex cancel running status
            track_data.extend_from_slice(&data);
            running = None;
        }
        last_tick = tick;
    }

    // End of track
    write_vlq(&mut track_data, 0);
    track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    track_data
}

fn push_event(events: &mut Vec<(u64, Priority, Vec<u8>)>, timed: &TimedEvent) {
    match &timed.event {
        Event::TrackName(name) => {
            let name_bytes = name.as_bytes();
            let mut data = vec![0xFF, 0x03];
            write_vlq(&mut data, name_bytes.len() as u32);
            data.extend_from_slice(name_bytes);
            events.push((timed.tick, Priority::Meta, data));
        }
        Event::ProgramChange { channel, program } => {
            events.push((
                timed.tick,
                Priority::Other,
                vec![0xC0 | channel.nibble(), program & 0x7F],
            ));
        }
        Event::Note {
            channel,
            pitch,
            velocity,
            duration,
        } => {
            let ch = channel.nibble();
            events.push((
                timed.tick,
                Priority::NoteOn,
                vec![0x90 | ch, pitch & 0x7F, (*velocity).clamp(1, 127)],
            ));
            let off_priority = if *duration == 0 {
                Priority::TrailingOff
            } else {
                Priority::NoteOff
            };
            events.push((
                timed.tick.saturating_add(*duration),
                off_priority,
                vec![0x80 | ch, pitch & 0x7F, 0],
            ));
        }
        Event::Other(raw) => {
            if raw.bytes.is_empty() {
                return;
            }
            let priority = if raw.bytes[0] >= 0xF0 {
                Priority::Meta
            } else {
                Priority::Other
            };
            events.push((timed.tick, priority, raw.bytes.clone()));
        }
    }
}

/// Largest delta a VLQ can carry.
const MAX_VLQ: u32 = 0x0FFF_FFFF;

/// Assemble a complete MIDI file from track data blobs.
fn build_midi_file(timing: Timing, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();

    let division: u16 = match timing {
        Timing::Metrical(ppq) => ppq & 0x7FFF,
        Timing::Timecode { fps, subframes } => {
            (u16::from((-(fps as i8)) as u8) << 8) | u16::from(subframes)
        }
    };

    // MThd header
    buf.extend_from_slice(b"MThd");
    buf.extend_from_slice(&6u32.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // format 1
    buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    buf.extend_from_slice(&division.to_be_bytes());

    // MTrk chunks
    for track_data in tracks {
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(track_data);
    }

    buf
}

/// Write a variable-length quantity to a byte buffer.
pub(crate) fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
    if value == 0 {
        buf.push(0);
        return;
    }

    let mut bytes = Vec::new();
    bytes.push((value & 0x7F) as u8);
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buf.extend_from_slice(&bytes);
}
