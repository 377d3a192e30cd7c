//! In-memory sequence model shared by the loader, reorganizer and writer.
//!
//! A [`Sequence`] is an ordered list of [`Chunk`]s (one per SMF track) plus the
//! file-wide [`TempoMap`]. Chunks carry no channel of their own; channel
//! membership is derived from the events inside them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A MIDI channel id (0-15 in SMF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Channel(pub u8);

impl Channel {
    /// Highest channel an SMF status byte can address.
    pub const MAX_MIDI: u8 = 15;

    /// Number of channels an SMF file can address.
    pub const COUNT: usize = 16;

    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Low nibble as it appears in a channel status byte.
    pub fn nibble(self) -> u8 {
        self.0 & 0x0F
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

impl From<u8> for Channel {
    fn from(value: u8) -> Self {
        Channel(value)
    }
}

/// A matched note-on/note-off pair with absolute tick timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub channel: Channel,
    pub pitch: u8,
    pub velocity: u8,
    pub start: u64,
    pub duration: u64,
}

impl Note {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.duration)
    }
}

/// An event kind the engine does not classify, kept as SMF wire bytes
/// (status byte onwards, no delta time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Set for channel voice messages, `None` for meta and sysex.
    pub channel: Option<Channel>,
    pub bytes: Vec<u8>,
}

/// Event payload. Closed set; every consumer matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Event {
    TrackName(String),
    ProgramChange {
        channel: Channel,
        program: u8,
    },
    Note {
        channel: Channel,
        pitch: u8,
        velocity: u8,
        duration: u64,
    },
    Other(RawEvent),
}

impl Event {
    pub fn channel(&self) -> Option<Channel> {
        match self {
            Event::TrackName(_) => None,
            Event::ProgramChange { channel, .. } | Event::Note { channel, .. } => Some(*channel),
            Event::Other(raw) => raw.channel,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Event::Note { .. })
    }
}

/// An event at an absolute tick position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub tick: u64,
    pub event: Event,
}

impl TimedEvent {
    pub fn new(tick: u64, event: Event) -> Self {
        Self { tick, event }
    }

    pub fn track_name(tick: u64, name: impl Into<String>) -> Self {
        Self::new(tick, Event::TrackName(name.into()))
    }

    pub fn program_change(tick: u64, channel: Channel, program: u8) -> Self {
        Self::new(tick, Event::ProgramChange { channel, program })
    }

    /// Materialize the note view of this event, if it is a note.
    pub fn as_note(&self) -> Option<Note> {
        match self.event {
            Event::Note {
                channel,
                pitch,
                velocity,
                duration,
            } => Some(Note {
                channel,
                pitch,
                velocity,
                start: self.tick,
                duration,
            }),
            _ => None,
        }
    }
}

/// One track's ordered event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub events: Vec<TimedEvent>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<TimedEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: TimedEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.events.iter().filter_map(TimedEvent::as_note).collect()
    }

    pub fn has_notes(&self) -> bool {
        self.events.iter().any(|e| e.event.is_note())
    }

    pub fn track_names(&self) -> impl Iterator<Item = &TimedEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e.event, Event::TrackName(_)))
    }

    /// Channels referenced by any channel-bearing event, sorted and unique.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> =
            self.events.iter().filter_map(|e| e.event.channel()).collect();
        channels.sort_unstable();
        channels.dedup();
        channels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub microseconds_per_beat: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub tick: u64,
    pub numerator: u8,
    /// Power of two, as stored in the SMF meta event.
    pub denominator_pow: u8,
    pub clocks_per_click: u8,
    pub thirty_seconds_per_quarter: u8,
}

/// File-wide tempo and meter changes. The reorganizer never looks inside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoMap {
    pub tempo_changes: Vec<TempoChange>,
    pub time_signatures: Vec<TimeSignature>,
}

/// SMF header time division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timing {
    Metrical(u16),
    Timecode { fps: u8, subframes: u8 },
}

impl Default for Timing {
    fn default() -> Self {
        Timing::Metrical(480)
    }
}

/// A whole parsed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub timing: Timing,
    pub tempo_map: TempoMap,
    pub chunks: Vec<Chunk>,
}

impl Sequence {
    pub fn new(timing: Timing, tempo_map: TempoMap, chunks: Vec<Chunk>) -> Self {
        Self {
            timing,
            tempo_map,
            chunks,
        }
    }

    pub fn notes(&self) -> Vec<Note> {
        self.chunks.iter().flat_map(Chunk::notes).collect()
    }

    pub fn notes_on(&self, channel: Channel) -> Vec<Note> {
        self.notes()
            .into_iter()
            .filter(|n| n.channel == channel)
            .collect()
    }

    /// Channels in use anywhere in the file, sorted and unique.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.chunks.iter().flat_map(Chunk::channels).collect();
        channels.sort_unstable();
        channels.dedup();
        channels
    }
}
