//! Track repair for malformed multi-channel MIDI and MML files.
//!
//! Two independent pipelines share one goal: give every logical channel its
//! own output track, numbered sequentially, behind a single title track.
//!
//! - [`reorganize`] regroups the tracks of a parsed [`Sequence`].
//! - [`mml`] reorders the comma-delimited channels of `MML@...;` macro text.
//!
//! [`loader`] and [`writer`] move sequences to and from Standard MIDI Files,
//! and [`pipeline`] wires a whole fix operation together.

pub mod loader;
pub mod mml;
pub mod model;
pub mod pipeline;
pub mod reorganize;
pub mod writer;

pub use mml::{split, ChannelBlock, MacroText, PrefixPolicy, SplitOptions, Splitter};
pub use model::{
    Channel, Chunk, Event, Note, RawEvent, Sequence, TempoChange, TempoMap, TimeSignature,
    TimedEvent, Timing,
};
pub use pipeline::{fix_file, FixOptions, FixReport, InputFormat};
pub use reorganize::{
    reorganize, GroupingStrategy, OverflowPolicy, ReorganizeOptions, Reorganizer,
};
pub use writer::WriteOptions;

use std::path::PathBuf;

/// Errors from loading, fixing and writing files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("unrecognized input format: {0}")]
    UnknownFormat(PathBuf),

    #[error("macro text does not start with {expected:?}")]
    MissingPrefix { expected: String },

    #[error("{content_chunks} content tracks exceed the {max} addressable MIDI channels", max = Channel::COUNT)]
    ChannelOverflow { content_chunks: usize },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
