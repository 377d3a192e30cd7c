//! Standard MIDI File parsing into a [`Sequence`].

use crate::model::{
    Channel, Chunk, Event, RawEvent, Sequence, TempoChange, TempoMap, TimeSignature, TimedEvent,
    Timing,
};
use crate::writer::write_vlq;
use crate::{Error, Result};
use midly::{Fps, MetaMessage, MidiMessage, Smf, TrackEvent, TrackEventKind};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Read and parse a MIDI file from disk.
pub fn load(path: &Path) -> Result<Sequence> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let sequence = parse(&bytes)?;
    info!(
        "loaded {}: {} tracks, channels {:?}",
        path.display(),
        sequence.chunks.len(),
        sequence.channels().iter().map(|c| c.as_u8()).collect::<Vec<_>>()
    );
    Ok(sequence)
}

/// Parse SMF bytes.
pub fn parse(bytes: &[u8]) -> Result<Sequence> {
    let smf = Smf::parse(bytes).map_err(|e| Error::MidiParse(e.to_string()))?;
    Ok(from_smf(&smf))
}

/// Convert an already-parsed midly file.
pub fn from_smf(smf: &Smf) -> Sequence {
    let timing = match smf.header.timing {
        midly::Timing::Metrical(ticks) => Timing::Metrical(ticks.as_int()),
        midly::Timing::Timecode(fps, subframes) => Timing::Timecode {
            fps: fps_value(fps),
            subframes,
        },
    };

    let mut tempo_map = TempoMap::default();
    let chunks = smf
        .tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let chunk = read_track(track, &mut tempo_map);
            debug!(
                "track {}: {} events, channels {:?}",
                index,
                chunk.events.len(),
                chunk.channels()
            );
            chunk
        })
        .collect();

    tempo_map.tempo_changes.sort_by_key(|t| t.tick);
    tempo_map.time_signatures.sort_by_key(|t| t.tick);

    Sequence {
        timing,
        tempo_map,
        chunks,
    }
}

fn read_track(track: &[TrackEvent], tempo_map: &mut TempoMap) -> Chunk {
    let mut events: Vec<TimedEvent> = Vec::with_capacity(track.len());
    // (channel, key) -> indices of sounding notes in `events`
    let mut pending: HashMap<(u8, u8), Vec<usize>> = HashMap::new();
    let mut tick: u64 = 0;

    for event in track {
        tick += event.delta.as_int() as u64;

        match event.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                tempo_map.tempo_changes.push(TempoChange {
                    tick,
                    microseconds_per_beat: tempo.as_int(),
                });
            }
            TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_pow, clocks, notes)) => {
                tempo_map.time_signatures.push(TimeSignature {
                    tick,
                    numerator: num,
                    denominator_pow: denom_pow,
                    clocks_per_click: clocks,
                    thirty_seconds_per_quarter: notes,
                });
            }
            TrackEventKind::Meta(MetaMessage::EndOfTrack) => {}
            TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                events.push(TimedEvent::track_name(
                    tick,
                    String::from_utf8_lossy(name).into_owned(),
                ));
            }
            TrackEventKind::Midi { channel, message } => {
                let ch = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        pending
                            .entry((ch, key.as_int()))
                            .or_default()
                            .push(events.len());
                        events.push(TimedEvent::new(
                            tick,
                            Event::Note {
                                channel: Channel(ch),
                                pitch: key.as_int(),
                                velocity: vel.as_int(),
                                duration: 0,
                            },
                        ));
                    }
                    // vel=0 NoteOn is NoteOff
                    MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                        match pending.get_mut(&(ch, key.as_int())).and_then(Vec::pop) {
                            Some(idx) => close_note(&mut events[idx], tick),
                            None => debug!(
                                "unmatched note-off ch{} key {} at {}",
                                ch,
                                key.as_int(),
                                tick
                            ),
                        }
                    }
                    MidiMessage::ProgramChange { program } => {
                        events.push(TimedEvent::program_change(
                            tick,
                            Channel(ch),
                            program.as_int(),
                        ));
                    }
                    other => events.push(TimedEvent::new(
                        tick,
                        Event::Other(RawEvent {
                            channel: Some(Channel(ch)),
                            bytes: channel_message_bytes(ch, other),
                        }),
                    )),
                }
            }
            TrackEventKind::Meta(meta) => events.push(TimedEvent::new(
                tick,
                Event::Other(RawEvent {
                    channel: None,
                    bytes: meta_bytes(meta),
                }),
            )),
            TrackEventKind::SysEx(data) => events.push(TimedEvent::new(
                tick,
                Event::Other(RawEvent {
                    channel: None,
                    bytes: length_prefixed(0xF0, data),
                }),
            )),
            TrackEventKind::Escape(data) => events.push(TimedEvent::new(
                tick,
                Event::Other(RawEvent {
                    channel: None,
                    bytes: length_prefixed(0xF7, data),
                }),
            )),
        }
    }

    // Close any unclosed notes at the track's final tick
    for idx in pending.into_values().flatten() {
        close_note(&mut events[idx], tick);
    }

    Chunk::from_events(events)
}

fn close_note(event: &mut TimedEvent, off_tick: u64) {
    let start = event.tick;
    if let Event::Note { duration, .. } = &mut event.event {
        *duration = off_tick.saturating_sub(start);
    }
}

fn fps_value(fps: Fps) -> u8 {
    match fps {
        Fps::Fps24 => 24,
        Fps::Fps25 => 25,
        Fps::Fps29 => 29,
        Fps::Fps30 => 30,
    }
}

fn channel_message_bytes(channel: u8, message: MidiMessage) -> Vec<u8> {
    let ch = channel & 0x0F;
    match message {
        MidiMessage::NoteOff { key, vel } => vec![0x80 | ch, key.as_int(), vel.as_int()],
        MidiMessage::NoteOn { key, vel } => vec![0x90 | ch, key.as_int(), vel.as_int()],
        MidiMessage::Aftertouch { key, vel } => vec![0xA0 | ch, key.as_int(), vel.as_int()],
        MidiMessage::Controller { controller, value } => {
            vec![0xB0 | ch, controller.as_int(), value.as_int()]
        }
        MidiMessage::ProgramChange { program } => vec![0xC0 | ch, program.as_int()],
        MidiMessage::ChannelAftertouch { vel } => vec![0xD0 | ch, vel.as_int()],
        MidiMessage::PitchBend { bend } => {
            let value = bend.0.as_int();
            vec![0xE0 | ch, (value & 0x7F) as u8, (value >> 7) as u8]
        }
    }
}

fn meta_bytes(meta: MetaMessage) -> Vec<u8> {
    let (kind, data): (u8, Vec<u8>) = match meta {
        MetaMessage::TrackNumber(number) => (
            0x00,
            number.map(|n| n.to_be_bytes().to_vec()).unwrap_or_default(),
        ),
        MetaMessage::Text(d) => (0x01, d.to_vec()),
        MetaMessage::Copyright(d) => (0x02, d.to_vec()),
        MetaMessage::TrackName(d) => (0x03, d.to_vec()),
        MetaMessage::InstrumentName(d) => (0x04, d.to_vec()),
        MetaMessage::Lyric(d) => (0x05, d.to_vec()),
        MetaMessage::Marker(d) => (0x06, d.to_vec()),
        MetaMessage::CuePoint(d) => (0x07, d.to_vec()),
        MetaMessage::ProgramName(d) => (0x08, d.to_vec()),
        MetaMessage::DeviceName(d) => (0x09, d.to_vec()),
        MetaMessage::MidiChannel(ch) => (0x20, vec![ch.as_int()]),
        MetaMessage::MidiPort(port) => (0x21, vec![port.as_int()]),
        MetaMessage::EndOfTrack => (0x2F, Vec::new()),
        MetaMessage::Tempo(t) => {
            let usec = t.as_int();
            (0x51, vec![(usec >> 16) as u8, (usec >> 8) as u8, usec as u8])
        }
        MetaMessage::SmpteOffset(time) => {
            let rate = match time.fps() {
                Fps::Fps24 => 0u8,
                Fps::Fps25 => 1,
                Fps::Fps29 => 2,
                Fps::Fps30 => 3,
            };
            (
                0x54,
                vec![
                    (rate << 5) | time.hour(),
                    time.minute(),
                    time.second(),
                    time.frame(),
                    time.subframe(),
                ],
            )
        }
        MetaMessage::TimeSignature(a, b, c, d) => (0x58, vec![a, b, c, d]),
        MetaMessage::KeySignature(sharps, minor) => (0x59, vec![sharps as u8, minor as u8]),
        MetaMessage::SequencerSpecific(d) => (0x7F, d.to_vec()),
        MetaMessage::Unknown(kind, d) => (kind, d.to_vec()),
    };

    let mut bytes = vec![0xFF, kind];
    write_vlq(&mut bytes, data.len() as u32);
    bytes.extend_from_slice(&data);
    bytes
}

fn length_prefixed(status: u8, data: &[u8]) -> Vec<u8> {
    let mut bytes = vec![status];
    write_vlq(&mut bytes, data.len() as u32);
    bytes.extend_from_slice(data);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Build a format-1 file from raw MTrk payloads.
    fn smf(tracks: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        buf.extend_from_slice(&480u16.to_be_bytes());
        for track in tracks {
            buf.extend_from_slice(b"MTrk");
            buf.extend_from_slice(&(track.len() as u32).to_be_bytes());
            buf.extend_from_slice(track);
        }
        buf
    }

    #[test]
    fn pairs_notes_and_collects_tempo() {
        let header: &[u8] = &[
            0x00, 0xFF, 0x03, 0x04, b'S', b'o', b'n', b'g', // name
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo 500000
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let content: &[u8] = &[
            0x00, 0xC5, 0x21, // program change ch5
            0x00, 0x95, 0x3C, 0x64, // note on
            0x83, 0x60, 0x85, 0x3C, 0x00, // note off after 480
            0x00, 0x95, 0x3E, 0x50, // note on, never closed
            0x81, 0x70, 0xB5, 0x07, 0x64, // controller after 240
            0x00, 0xFF, 0x2F, 0x00,
        ];

        let sequence = parse(&smf(&[header, content])).unwrap();

        assert_eq!(sequence.timing, Timing::Metrical(480));
        assert_eq!(
            sequence.tempo_map.tempo_changes,
            vec![TempoChange {
                tick: 0,
                microseconds_per_beat: 500_000
            }]
        );
        assert_eq!(
            sequence.chunks[0].events,
            vec![TimedEvent::track_name(0, "Song")]
        );

        let notes = sequence.chunks[1].notes();
        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].pitch, notes[0].duration), (0x3C, 480));
        assert_eq!((notes[1].start, notes[1].duration), (480, 240));
        assert_eq!(sequence.chunks[1].channels(), vec![Channel(5)]);

        let other = sequence.chunks[1]
            .events
            .iter()
            .find_map(|e| match &e.event {
                Event::Other(raw) => Some(raw.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(other.bytes, vec![0xB5, 0x07, 0x64]);
    }

    #[test]
    fn zero_velocity_note_on_closes_note() {
        let track: &[u8] = &[
            0x00, 0x90, 0x40, 0x40, //
            0x60, 0x90, 0x40, 0x00, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let sequence = parse(&smf(&[track])).unwrap();
        let notes = sequence.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].duration, 0x60);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse(b"not midi"), Err(Error::MidiParse(_))));
    }
}
