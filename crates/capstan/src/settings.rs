//! Layered configuration: flags > environment > config file > defaults.
//!
//! Environment variables ride in through clap's `env` attribute, so by
//! the time [`resolve`] runs there are only two layers left to merge: the
//! parsed command line and the optional TOML file. File values apply only
//! when the file actually defines them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use capstan_core::{LogLevel, MirrorConfig, Rule};
use serde::Deserialize;

use crate::cli::Cli;

pub const CONFIG_FILE_NAME: &str = ".capstan.toml";

/// On-disk configuration. Every field is optional so that merging can
/// tell "absent" from "set to the default".
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub local: Option<PathBuf>,
    pub remote: Option<String>,
    pub force: Option<bool>,
    pub offline: Option<bool>,
    pub exact_mirror: Option<bool>,
    pub skip_cleanup: Option<bool>,
    pub ignore_source_control: Option<bool>,
    pub skip_perl: Option<bool>,
    pub path_filters: Option<Vec<String>>,
    pub module_filters: Option<Vec<String>>,
    pub also_mirror: Option<Vec<String>>,
    /// Octal permission bits for created directories, e.g. "0711".
    pub dir_mode: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout: Option<u64>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Load the config file.
    ///
    /// An explicitly named file must exist and parse; the default
    /// `~/.capstan.toml` is optional, and so is the home directory
    /// itself.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match home::home_dir() {
                Some(dir) => {
                    let path = dir.join(CONFIG_FILE_NAME);
                    if !path.exists() {
                        return Ok(Self::default());
                    }
                    path
                }
                None => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("cannot parse config file {}", path.display()))
    }
}

/// Merge flags over file values over defaults into the engine config.
pub fn resolve(cli: &Cli, file: &ConfigFile) -> anyhow::Result<MirrorConfig> {
    let local = cli
        .local
        .clone()
        .or_else(|| file.local.clone())
        .context("no local mirror directory configured (use --local or the config file)")?;
    let remote = cli
        .remote
        .clone()
        .or_else(|| file.remote.clone())
        .context("no remote repository URL configured (use --remote or the config file)")?;

    let mut config = MirrorConfig::new(local, remote)?;

    config.force = cli.force || file.force.unwrap_or(false);
    config.offline = cli.offline || file.offline.unwrap_or(false);
    config.exact_mirror = cli.exact || file.exact_mirror.unwrap_or(false);
    config.skip_cleanup = cli.skip_cleanup || file.skip_cleanup.unwrap_or(false);
    config.ignore_source_control =
        cli.ignore_source_control || file.ignore_source_control.unwrap_or(false);
    config.skip_perl = if cli.include_perl {
        false
    } else {
        file.skip_perl.unwrap_or(config.skip_perl)
    };
    if let Some(patterns) = &file.path_filters {
        config.path_filters = compile_rules(patterns)?;
    }
    if let Some(patterns) = &file.module_filters {
        config.module_filters = compile_rules(patterns)?;
    }
    if let Some(extra) = &file.also_mirror {
        config.also_mirror = extra.clone();
    }
    if let Some(mode) = &file.dir_mode {
        config.dir_mode = Some(parse_dir_mode(mode)?);
    }
    config.timeout = cli.timeout.or(file.timeout).map(Duration::from_secs);

    let mut level = match &file.log_level {
        Some(value) => value.parse::<LogLevel>()?,
        None => LogLevel::default(),
    };
    for _ in 0..cli.quiet {
        level = level.quieter();
    }
    for _ in 0..cli.verbose {
        level = level.louder();
    }
    config.log_level = level;

    Ok(config)
}

/// Whether the user chose a verbosity anywhere; if not, `RUST_LOG` may.
pub fn verbosity_is_explicit(cli: &Cli, file: &ConfigFile) -> bool {
    cli.quiet > 0 || cli.verbose > 0 || file.log_level.is_some()
}

fn compile_rules(patterns: &[String]) -> anyhow::Result<Vec<Rule>> {
    patterns
        .iter()
        .map(|pattern| Rule::pattern(pattern).map_err(anyhow::Error::from))
        .collect()
}

fn parse_dir_mode(mode: &str) -> anyhow::Result<u32> {
    u32::from_str_radix(mode.trim_start_matches("0o"), 8)
        .with_context(|| format!("invalid dir_mode {mode:?} (expected octal digits like \"0711\")"))
}
