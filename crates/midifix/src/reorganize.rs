//! Track reorganization: one output track per channel behind a title track.
//!
//! Output layout is always `[header] + content`. The header holds at most one
//! track name and never any notes. Under the default
//! [`GroupingStrategy::TrackPosition`], content track `k` carries only channel
//! `k`, whatever channels the source track used.

use crate::model::{Channel, Chunk, Event, Sequence, TimedEvent};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// How content tracks are formed from the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    /// Each non-header source track becomes one output track, channel = position.
    #[default]
    TrackPosition,
    /// Notes are gathered across all tracks by their existing channel id.
    ChannelUnion,
}

/// What to do when there are more content tracks than MIDI channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail with [`Error::ChannelOverflow`].
    #[default]
    Reject,
    /// Put every track past the last channel on channel 15.
    Clamp,
}

impl GroupingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupingStrategy::TrackPosition => "track_position",
            GroupingStrategy::ChannelUnion => "channel_union",
        }
    }
}

impl FromStr for GroupingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "track_position" => Ok(GroupingStrategy::TrackPosition),
            "channel_union" => Ok(GroupingStrategy::ChannelUnion),
            other => Err(format!(
                "unknown strategy {:?} (expected track_position or channel_union)",
                other
            )),
        }
    }
}

impl OverflowPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            OverflowPolicy::Reject => "reject",
            OverflowPolicy::Clamp => "clamp",
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "reject" => Ok(OverflowPolicy::Reject),
            "clamp" => Ok(OverflowPolicy::Clamp),
            other => Err(format!(
                "unknown overflow policy {:?} (expected reject or clamp)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorganizeOptions {
    pub strategy: GroupingStrategy,
    pub overflow: OverflowPolicy,
}

/// Reorganize with default options.
pub fn reorganize(source: &Sequence) -> Result<Sequence> {
    Reorganizer::default().run(source)
}

#[derive(Debug, Clone, Default)]
pub struct Reorganizer {
    options: ReorganizeOptions,
}

impl Reorganizer {
    pub fn new(options: ReorganizeOptions) -> Self {
        Self { options }
    }

    /// Build a fixed copy of `source`. The source is never modified.
    pub fn run(&self, source: &Sequence) -> Result<Sequence> {
        let chunks = match self.options.strategy {
            GroupingStrategy::TrackPosition => self.by_track_position(source)?,
            GroupingStrategy::ChannelUnion => by_channel_union(source),
        };

        Ok(Sequence {
            timing: source.timing,
            tempo_map: source.tempo_map.clone(),
            chunks,
        })
    }

    fn by_track_position(&self, source: &Sequence) -> Result<Vec<Chunk>> {
        let (header, content) = match source.chunks.split_first() {
            Some((first, rest)) if !first.has_notes() => (header_from(first), rest),
            _ => (Chunk::new(), source.chunks.as_slice()),
        };

        let mut chunks = Vec::with_capacity(content.len() + 1);
        chunks.push(header);

        for (position, chunk) in content.iter().enumerate() {
            let channel = self.output_channel(position, content.len())?;
            let remapped = remap_chunk(chunk, channel);
            debug!(
                "track {} {:?} -> {} ({} events kept of {})",
                position,
                chunk.channels(),
                channel,
                remapped.events.len(),
                chunk.events.len()
            );
            chunks.push(remapped);
        }

        Ok(chunks)
    }

    fn output_channel(&self, position: usize, content_chunks: usize) -> Result<Channel> {
        match u8::try_from(position) {
            Ok(ch) if ch <= Channel::MAX_MIDI => Ok(Channel(ch)),
            _ => match self.options.overflow {
                OverflowPolicy::Reject => Err(Error::ChannelOverflow { content_chunks }),
                OverflowPolicy::Clamp => {
                    warn!(
                        "track {} has no free channel, clamping to {}",
                        position,
                        Channel::MAX_MIDI
                    );
                    Ok(Channel(Channel::MAX_MIDI))
                }
            },
        }
    }
}

/// The header keeps the candidate's track name only if it is unambiguous.
fn header_from(candidate: &Chunk) -> Chunk {
    let names: Vec<&TimedEvent> = candidate.track_names().collect();
    match names.as_slice() {
        [name] => Chunk::from_events(vec![(*name).clone()]),
        [] => Chunk::new(),
        many => {
            warn!("header track has {} names, dropping title", many.len());
            Chunk::new()
        }
    }
}

/// Copy the events that survive a fix, moved onto `channel`.
fn remap_chunk(chunk: &Chunk, channel: Channel) -> Chunk {
    let events = chunk
        .events
        .iter()
        .filter_map(|timed| {
            let event = match &timed.event {
                Event::TrackName(name) => Event::TrackName(name.clone()),
                Event::ProgramChange { program, .. } => Event::ProgramChange {
                    channel,
                    program: *program,
                },
                Event::Note {
                    pitch,
                    velocity,
                    duration,
                    ..
                } => Event::Note {
                    channel,
                    pitch: *pitch,
                    velocity: *velocity,
                    duration: *duration,
                },
                Event::Other(_) => return None,
            };
            Some(TimedEvent::new(timed.tick, event))
        })
        .collect();

    Chunk::from_events(events)
}

/// Earlier grouping policy: one track per channel id in use, ids unchanged.
fn by_channel_union(source: &Sequence) -> Vec<Chunk> {
    let header = source
        .chunks
        .first()
        .and_then(|first| first.track_names().next().cloned())
        .map(|name| Chunk::from_events(vec![name]))
        .unwrap_or_default();

    let mut by_channel: BTreeMap<Channel, Vec<TimedEvent>> = BTreeMap::new();
    for chunk in &source.chunks {
        for timed in &chunk.events {
            match &timed.event {
                Event::Note { channel, .. } | Event::ProgramChange { channel, .. } => {
                    by_channel.entry(*channel).or_default().push(timed.clone());
                }
                Event::TrackName(_) | Event::Other(_) => {}
            }
        }
    }

    // Track names follow every channel whose notes live in the same source track.
    for chunk in &source.chunks {
        let names: Vec<&TimedEvent> = chunk.track_names().collect();
        if names.is_empty() {
            continue;
        }
        for channel in chunk.channels() {
            if let Some(events) = by_channel.get_mut(&channel) {
                events.extend(names.iter().map(|e| (*e).clone()));
            }
        }
    }

    let mut chunks = vec![header];
    for (channel, mut events) in by_channel {
        if !events.iter().any(|e| e.event.is_note()) {
            debug!("{} has no notes, skipping", channel);
            continue;
        }
        events.sort_by_key(|e| e.tick);
        chunks.push(Chunk::from_events(events));
    }
    chunks
}
