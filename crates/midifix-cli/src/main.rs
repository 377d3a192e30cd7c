//! midifix - renumber MIDI tracks and split MML macros
//!
//! Subcommands:
//! - `midifix fix <files>...` - Write a fixed copy of each file
//! - `midifix config` - Print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixconf::FixConfig;
use midifix::{GroupingStrategy, OverflowPolicy, PrefixPolicy};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod telemetry;

#[derive(Parser)]
#[command(name = "midifix")]
#[command(about = "Renumber MIDI tracks to sequential channels and split MML macros")]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of ./midifix.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fix MIDI (.mid, .midi, .smf) and macro (.mml) files
    Fix {
        /// Input files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Appended to each output file stem
        #[arg(long)]
        suffix: Option<String>,

        /// track-position or channel-union
        #[arg(long)]
        strategy: Option<GroupingStrategy>,

        /// reject or clamp when content tracks exceed 16
        #[arg(long)]
        overflow: Option<OverflowPolicy>,

        /// strip, require or if-present
        #[arg(long)]
        prefix_policy: Option<PrefixPolicy>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (mut config, sources) = FixConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    telemetry::init(&config.telemetry.log_level, cli.verbose)?;
    tracing::debug!(
        "config files {:?}, env overrides {:?}",
        sources.files,
        sources.env_overrides
    );

    match cli.command {
        Commands::Fix {
            files,
            out_dir,
            suffix,
            strategy,
            overflow,
            prefix_policy,
        } => {
            if let Some(dir) = out_dir {
                config.output.dir = dir;
            }
            if let Some(suffix) = suffix {
                config.output.suffix = suffix;
            }
            if let Some(strategy) = strategy {
                config.reorganize.strategy = strategy;
            }
            if let Some(overflow) = overflow {
                config.reorganize.overflow = overflow;
            }
            if let Some(policy) = prefix_policy {
                config.macro_text.prefix_policy = policy;
            }

            let failed = commands::fix(&files, &config.fix_options())?;
            if failed > 0 {
                tracing::error!("{} of {} files failed", failed, files.len());
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Config => {
            commands::show_config(&config, &sources);
        }
    }

    Ok(ExitCode::SUCCESS)
}
