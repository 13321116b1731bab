//! Tracing subscriber setup for the `sgw` binary.
//!
//! `[logging].level` is an `EnvFilter` directive string (`"info"`,
//! `"search_gateway=debug,reqwest=warn"`). The same parse backs
//! configuration validation and subscriber installation.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// The filter described by `[logging].level`.
pub fn configured_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let level = config.level.trim();
    if level.is_empty() {
        anyhow::bail!("logging.level must not be empty");
    }
    EnvFilter::try_new(level).map_err(|e| anyhow!("logging.level '{}' is invalid: {}", level, e))
}

/// Install the global subscriber on stderr. A parseable `RUST_LOG` wins
/// over the configured filter.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(config)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(s: &str) -> LoggingConfig {
        LoggingConfig { level: s.to_string() }
    }

    #[test]
    fn directive_lists_are_accepted() {
        for ok in ["warn", "search_gateway=debug,info", "search_gateway_core=trace,reqwest=off"] {
            assert!(configured_filter(&level(ok)).is_ok(), "{}", ok);
        }
    }

    #[test]
    fn bad_levels_inside_directives_are_rejected() {
        for bad in ["search_gateway=verbose", "info,reqwest=loud", "  "] {
            assert!(configured_filter(&level(bad)).is_err(), "{}", bad);
        }
    }
}
