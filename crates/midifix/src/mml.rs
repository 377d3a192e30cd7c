//! MML macro text splitting.
//!
//! Macro text looks like `MML@<ch>,<ch>,...;`, where every comma-delimited
//! segment is one channel. The splitter reverses the segment order and labels
//! each with a 1-based `[Channel{k}]` header.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Leading marker of the macro envelope.
pub const MACRO_PREFIX: &str = "MML@";

const TERMINATOR: char = ';';
const SEPARATOR: char = ',';

/// How the leading [`MACRO_PREFIX`] is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixPolicy {
    /// Drop the first four characters without looking at them.
    #[default]
    Strip,
    /// Fail with [`Error::MissingPrefix`] when the marker is absent.
    Require,
    /// Drop the marker only when it is there.
    IfPresent,
}

impl PrefixPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            PrefixPolicy::Strip => "strip",
            PrefixPolicy::Require => "require",
            PrefixPolicy::IfPresent => "if_present",
        }
    }
}

impl FromStr for PrefixPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "strip" => Ok(PrefixPolicy::Strip),
            "require" => Ok(PrefixPolicy::Require),
            "if_present" => Ok(PrefixPolicy::IfPresent),
            other => Err(format!(
                "unknown prefix policy {:?} (expected strip, require or if_present)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOptions {
    pub prefix_policy: PrefixPolicy,
}

/// One labeled output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelBlock {
    /// 1-based label.
    pub channel: usize,
    pub body: String,
}

/// Result of a split, in output order (`Channel1` first).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroText {
    pub blocks: Vec<ChannelBlock>,
}

impl MacroText {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bodies in output order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.body.as_str())
    }

    /// Rebuild the envelope in output order, e.g. `MML@c,b,a;`.
    pub fn reconstruct(&self) -> String {
        let body: Vec<&str> = self.segments().collect();
        format!("{}{}{}", MACRO_PREFIX, body.join(","), TERMINATOR)
    }
}

impl fmt::Display for MacroText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "[Channel{}]", block.channel)?;
            writeln!(f, "{}", block.body)?;
        }
        Ok(())
    }
}

/// Split with the legacy prefix handling. Never fails.
pub fn split(raw: &str) -> MacroText {
    relabel(strip_chars(raw, MACRO_PREFIX.chars().count()))
}

#[derive(Debug, Clone, Default)]
pub struct Splitter {
    options: SplitOptions,
}

impl Splitter {
    pub fn new(options: SplitOptions) -> Self {
        Self { options }
    }

    pub fn split(&self, raw: &str) -> Result<MacroText> {
        let has_prefix = raw.starts_with(MACRO_PREFIX);
        let body = match self.options.prefix_policy {
            PrefixPolicy::Strip => {
                if !has_prefix {
                    warn!("macro text lacks {}, stripping anyway", MACRO_PREFIX);
                }
                strip_chars(raw, MACRO_PREFIX.chars().count())
            }
            PrefixPolicy::Require => raw.strip_prefix(MACRO_PREFIX).ok_or_else(|| {
                Error::MissingPrefix {
                    expected: MACRO_PREFIX.to_string(),
                }
            })?,
            PrefixPolicy::IfPresent => raw.strip_prefix(MACRO_PREFIX).unwrap_or(raw),
        };
        Ok(relabel(body))
    }
}

/// Drop the first `count` characters, respecting char boundaries.
fn strip_chars(raw: &str, count: usize) -> &str {
    match raw.char_indices().nth(count) {
        Some((idx, _)) => &raw[idx..],
        None => "",
    }
}

fn relabel(body: &str) -> MacroText {
    let body = body.trim_end().trim_matches(TERMINATOR);
    let segments: Vec<&str> = body.split(SEPARATOR).collect();
    debug!("macro body has {} channels", segments.len());

    let blocks = segments
        .iter()
        .rev()
        .enumerate()
        .map(|(idx, segment)| ChannelBlock {
            channel: idx + 1,
            body: (*segment).to_string(),
        })
        .collect();

    MacroText { blocks }
}

/// Write the rendered split to `path`.
pub fn write_macro(text: &MacroText, path: &Path) -> Result<()> {
    std::fs::write(path, text.to_string()).map_err(|e| Error::io(path, e))
}
