//! Config sections. Every field has a compiled default.

use midifix::pipeline::DEFAULT_SUFFIX;
use midifix::{GroupingStrategy, OverflowPolicy, PrefixPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how fixed files are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory.
    /// Default: current working directory
    #[serde(default = "OutputConfig::default_dir")]
    pub dir: PathBuf,

    /// Appended to the input file stem.
    /// Default: _fix
    #[serde(default = "OutputConfig::default_suffix")]
    pub suffix: String,

    /// Use running status when writing MIDI.
    /// Default: false
    #[serde(default)]
    pub running_status: bool,
}

impl OutputConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from(".")
    }

    fn default_suffix() -> String {
        DEFAULT_SUFFIX.to_string()
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            suffix: Self::default_suffix(),
            running_status: false,
        }
    }
}

/// MIDI track regrouping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorganizeConfig {
    #[serde(default)]
    pub strategy: GroupingStrategy,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

/// MML macro splitting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroConfig {
    #[serde(default)]
    pub prefix_policy: PrefixPolicy,
}

/// Logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
