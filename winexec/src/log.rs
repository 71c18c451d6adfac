use std::io;

use anyhow::Context as _;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Conf;

/// Parses a comma-separated list of filtering directives, in the RUST_LOG form.
pub fn parse_directives(directives: &str) -> anyhow::Result<Vec<Directive>> {
    directives
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .map(|directive| {
            directive
                .parse::<Directive>()
                .with_context(|| format!("invalid log directive `{directive}`"))
        })
        .collect()
}

/// Builds the filter: verbosity profile first, then the debug directives, then RUST_LOG.
pub fn build_filter(conf: &Conf, rust_log: Option<&str>) -> anyhow::Result<EnvFilter> {
    let env_filter = EnvFilter::try_new(conf.verbosity_profile.to_log_filter())
        .context("invalid built-in filtering directives (this is a bug)")?;

    let debug_directives = parse_directives(conf.debug.log_directives.as_deref().unwrap_or_default())?;
    let env_directives = parse_directives(rust_log.unwrap_or_default()).context("invalid RUST_LOG")?;

    let env_filter = debug_directives
        .into_iter()
        .chain(env_directives)
        .fold(env_filter, EnvFilter::add_directive);

    Ok(env_filter)
}

/// Installs the global subscriber. Logs go to stderr, stdout carries the result document.
pub fn init_log(conf: &Conf) -> anyhow::Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(conf, rust_log.as_deref())?;

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_ansi(false);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(env_filter)
        .try_init()
        .context("failed to install the tracing subscriber")
}
