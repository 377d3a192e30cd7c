//! Subcommand implementations.

use anyhow::{Context, Result};
use fixconf::{ConfigSources, FixConfig};
use midifix::pipeline::{fix_file, FixOptions};
use std::path::PathBuf;
use tracing::{error, info};

/// Fix every file in order. Returns how many failed.
pub fn fix(files: &[PathBuf], options: &FixOptions) -> Result<usize> {
    std::fs::create_dir_all(&options.out_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            options.out_dir.display()
        )
    })?;

    let mut failed = 0;
    for path in files {
        match fix_file(path, options) {
            Ok(report) => {
                info!(format = ?report.format, "fixed {}", path.display());
                println!(
                    "{} -> {} ({} channels)",
                    report.input.display(),
                    report.output.display(),
                    report.channels
                );
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    Ok(failed)
}

/// Print the effective config with its sources as comments.
pub fn show_config(config: &FixConfig, sources: &ConfigSources) {
    for file in &sources.files {
        println!("# loaded: {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# env: {}", var);
    }
    print!("{}", config.to_toml());
}
