//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, FixConfig};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (user, local/cli). Only existing files are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("midifix/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("midifix.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Layer a TOML file over `config`.
pub fn load_into(config: &mut FixConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Parse config from TOML string. Unset keys keep their defaults.
pub fn parse_toml(contents: &str, path: &Path) -> Result<FixConfig, ConfigError> {
    let mut config = FixConfig::default();
    apply_toml(&mut config, contents, path)?;
    Ok(config)
}

/// Overwrite exactly the keys present in `contents`, even when a key is set
/// to its default value.
pub fn apply_toml(config: &mut FixConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(output) = table.get("output").and_then(|v| v.as_table()) {
        if let Some(v) = output.get("dir").and_then(|v| v.as_str()) {
            config.output.dir = expand_path(v);
        }
        if let Some(v) = output.get("suffix").and_then(|v| v.as_str()) {
            config.output.suffix = v.to_string();
        }
        if let Some(v) = output.get("running_status").and_then(|v| v.as_bool()) {
            config.output.running_status = v;
        }
    }

    if let Some(reorganize) = table.get("reorganize").and_then(|v| v.as_table()) {
        if let Some(v) = reorganize.get("strategy").and_then(|v| v.as_str()) {
            config.reorganize.strategy = parse_value(v, path)?;
        }
        if let Some(v) = reorganize.get("overflow").and_then(|v| v.as_str()) {
            config.reorganize.overflow = parse_value(v, path)?;
        }
    }

    if let Some(macro_text) = table.get("macro").and_then(|v| v.as_table()) {
        if let Some(v) = macro_text.get("prefix_policy").and_then(|v| v.as_str()) {
            config.macro_text.prefix_policy = parse_value(v, path)?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

fn parse_value<T: FromStr<Err = String>>(value: &str, path: &Path) -> Result<T, ConfigError> {
    value.parse().map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Apply environment variable overrides to config.
///
/// Values that don't parse are ignored.
pub fn apply_env_overrides(config: &mut FixConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("MIDIFIX_OUTPUT_DIR") {
        config.output.dir = expand_path(&v);
        sources.env_overrides.push("MIDIFIX_OUTPUT_DIR".to_string());
    }
    if let Ok(v) = env::var("MIDIFIX_SUFFIX") {
        config.output.suffix = v;
        sources.env_overrides.push("MIDIFIX_SUFFIX".to_string());
    }
    if let Ok(v) = env::var("MIDIFIX_RUNNING_STATUS") {
        if let Ok(flag) = v.parse() {
            config.output.running_status = flag;
            sources.env_overrides.push("MIDIFIX_RUNNING_STATUS".to_string());
        }
    }

    if let Ok(v) = env::var("MIDIFIX_STRATEGY") {
        if let Ok(strategy) = v.parse() {
            config.reorganize.strategy = strategy;
            sources.env_overrides.push("MIDIFIX_STRATEGY".to_string());
        }
    }
    if let Ok(v) = env::var("MIDIFIX_OVERFLOW") {
        if let Ok(overflow) = v.parse() {
            config.reorganize.overflow = overflow;
            sources.env_overrides.push("MIDIFIX_OVERFLOW".to_string());
        }
    }

    if let Ok(v) = env::var("MIDIFIX_PREFIX_POLICY") {
        if let Ok(policy) = v.parse() {
            config.macro_text.prefix_policy = policy;
            sources.env_overrides.push("MIDIFIX_PREFIX_POLICY".to_string());
        }
    }

    if let Ok(v) = env::var("MIDIFIX_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("MIDIFIX_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|value| PathBuf::from(value).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}
