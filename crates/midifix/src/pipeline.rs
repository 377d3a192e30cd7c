//! One fix operation: detect format, load, transform, write.

use crate::mml::{self, SplitOptions, Splitter, MACRO_PREFIX};
use crate::reorganize::{ReorganizeOptions, Reorganizer};
use crate::writer::{self, WriteOptions};
use crate::{loader, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

/// Suffix appended to the input file stem.
pub const DEFAULT_SUFFIX: &str = "_fix";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Midi,
    Macro,
}

impl InputFormat {
    pub fn output_extension(self) -> &'static str {
        match self {
            InputFormat::Midi => "mid",
            InputFormat::Macro => "mml",
        }
    }
}

/// Classify by extension, falling back to the leading magic.
pub fn detect_format(path: &Path, contents: &[u8]) -> Result<InputFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mid") | Some("midi") | Some("smf") => return Ok(InputFormat::Midi),
        Some("mml") => return Ok(InputFormat::Macro),
        _ => {}
    }

    if contents.starts_with(b"MThd") {
        Ok(InputFormat::Midi)
    } else if contents.starts_with(MACRO_PREFIX.as_bytes()) {
        Ok(InputFormat::Macro)
    } else {
        Err(Error::UnknownFormat(path.to_path_buf()))
    }
}

/// `<out_dir>/<stem><suffix>.<ext>`. MIDI keeps the input extension.
pub fn output_path(input: &Path, format: InputFormat, out_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let ext = match format {
        InputFormat::Midi => input
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| format.output_extension().to_string()),
        InputFormat::Macro => format.output_extension().to_string(),
    };

    out_dir.join(format!("{}{}.{}", stem, suffix, ext))
}

/// Everything a fix operation needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOptions {
    pub reorganize: ReorganizeOptions,
    pub split: SplitOptions,
    pub write: WriteOptions,
    pub out_dir: PathBuf,
    pub suffix: String,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            reorganize: ReorganizeOptions::default(),
            split: SplitOptions::default(),
            write: WriteOptions::default(),
            out_dir: PathBuf::from("."),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

/// What a fix produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: InputFormat,
    /// Output tracks (MIDI) or labeled blocks (macro), header excluded.
    pub channels: usize,
}

/// Fix one file and write the result into `options.out_dir`.
pub fn fix_file(path: &Path, options: &FixOptions) -> Result<FixReport> {
    let span = info_span!("fix_file", path = %path.display());
    let _guard = span.enter();

    let contents = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let format = detect_format(path, &contents)?;
    let output = output_path(path, format, &options.out_dir, &options.suffix);

    let channels = match format {
        InputFormat::Midi => {
            let source = loader::parse(&contents)?;
            info!(
                "{} tracks in, channels {:?}",
                source.chunks.len(),
                source.channels()
            );
            let fixed = Reorganizer::new(options.reorganize).run(&source)?;
            writer::write(&fixed, &output, &options.write)?;
            fixed.chunks.len().saturating_sub(1)
        }
        InputFormat::Macro => {
            let raw = String::from_utf8_lossy(&contents);
            let text = Splitter::new(options.split).split(&raw)?;
            mml::write_macro(&text, &output)?;
            text.len()
        }
    };

    info!("wrote {} ({} channels)", output.display(), channels);

    Ok(FixReport {
        input: path.to_path_buf(),
        output,
        format,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_by_extension_then_magic() {
        assert_eq!(
            detect_format(Path::new("a.MID"), b"").unwrap(),
            InputFormat::Midi
        );
        assert_eq!(
            detect_format(Path::new("a.mml"), b"").unwrap(),
            InputFormat::Macro
        );
        assert_eq!(
            detect_format(Path::new("a.txt"), b"MML@a;").unwrap(),
            InputFormat::Macro
        );
        assert_eq!(
            detect_format(Path::new("song"), b"MThd\0\0\0\x06").unwrap(),
            InputFormat::Midi
        );
        assert!(matches!(
            detect_format(Path::new("a.txt"), b"hello"),
            Err(Error::UnknownFormat(_))
        ));
    }

    #[test]
    fn output_path_uses_stem_suffix_and_out_dir() {
        assert_eq!(
            output_path(
                Path::new("/music/song.mid"),
                InputFormat::Midi,
                Path::new("."),
                "_fix"
            ),
            PathBuf::from("./song_fix.mid")
        );
        assert_eq!(
            output_path(
                Path::new("/music/tune.txt"),
                InputFormat::Macro,
                Path::new("/out"),
                "_fix"
            ),
            PathBuf::from("/out/tune_fix.mml")
        );
    }
}
