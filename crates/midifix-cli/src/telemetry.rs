//! Log subscriber setup. Logs go to stderr so stdout stays machine-readable.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `verbose` overrides the configured level.
pub fn init(log_level: &str, verbose: u8) -> Result<()> {
    let directive = match verbose {
        0 => log_level,
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_new(directive)
        .with_context(|| format!("Invalid log level {:?}", directive))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
