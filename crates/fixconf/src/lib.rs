//! Layered configuration for midifix.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `~/.config/midifix/config.toml` (user)
//! 2. `./midifix.toml` (local override, or the `--config` path)
//! 3. Environment variables (`MIDIFIX_*`)
//!
//! # Example Config
//!
//! ```toml
//! [output]
//! dir = "~/fixed"
//! suffix = "_fix"
//! running_status = false
//!
//! [reorganize]
//! strategy = "track_position"
//! overflow = "reject"
//!
//! [macro]
//! prefix_policy = "strip"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{MacroConfig, OutputConfig, ReorganizeConfig, TelemetryConfig};

use midifix::pipeline::FixOptions;
use midifix::{ReorganizeOptions, SplitOptions, WriteOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete midifix configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub reorganize: ReorganizeConfig,
    #[serde(default, rename = "macro")]
    pub macro_text: MacroConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl FixConfig {
    /// Load with `config_path` standing in for `./midifix.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report where values came from.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = FixConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_into(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Options for one fix operation.
    pub fn fix_options(&self) -> FixOptions {
        FixOptions {
            reorganize: ReorganizeOptions {
                strategy: self.reorganize.strategy,
                overflow: self.reorganize.overflow,
            },
            split: SplitOptions {
                prefix_policy: self.macro_text.prefix_policy,
            },
            write: WriteOptions {
                running_status: self.output.running_status,
            },
            out_dir: self.output.dir.clone(),
            suffix: self.output.suffix.clone(),
        }
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# midifix configuration\n\n");

        output.push_str("[output]\n");
        output.push_str(&format!("dir = \"{}\"\n", self.output.dir.display()));
        output.push_str(&format!("suffix = \"{}\"\n", self.output.suffix));
        output.push_str(&format!(
            "running_status = {}\n",
            self.output.running_status
        ));

        output.push_str("\n[reorganize]\n");
        output.push_str(&format!(
            "strategy = \"{}\"\n",
            self.reorganize.strategy.as_str()
        ));
        output.push_str(&format!(
            "overflow = \"{}\"\n",
            self.reorganize.overflow.as_str()
        ));

        output.push_str("\n[macro]\n");
        output.push_str(&format!(
            "prefix_policy = \"{}\"\n",
            self.macro_text.prefix_policy.as_str()
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.telemetry.log_level
        ));

        output
    }
}
