use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filter::Rule;

/// Verbosity of a run. Parsed from configuration; an unknown value is a
/// configuration error, raised before any I/O happens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// One step less output, clamped at [`LogLevel::Error`].
    pub fn quieter(self) -> Self {
        match self {
            LogLevel::Error | LogLevel::Warn => LogLevel::Error,
            LogLevel::Info => LogLevel::Warn,
            LogLevel::Debug => LogLevel::Info,
            LogLevel::Trace => LogLevel::Debug,
        }
    }

    /// One step more output, clamped at [`LogLevel::Trace`].
    pub fn louder(self) -> Self {
        match self {
            LogLevel::Error => LogLevel::Warn,
            LogLevel::Warn => LogLevel::Info,
            LogLevel::Info => LogLevel::Debug,
            LogLevel::Debug | LogLevel::Trace => LogLevel::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(Error::UnknownLogLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved configuration for one mirror session. Immutable once the
/// session starts.
///
/// Construction validates the required settings; layering flags over a
/// config file over defaults is the caller's concern and happens before
/// this type exists.
#[derive(Clone, Debug)]
pub struct MirrorConfig {
    /// Local mirror root. Must be (or become) a writable directory.
    pub local: PathBuf,
    /// Remote base URL, normalized to end with a slash.
    pub remote: String,
    /// Re-verify archives even when a local copy exists.
    pub force: bool,
    /// Skip the entire run without touching the network.
    pub offline: bool,
    /// Treat every local file as wanted; disables cleanup filtering.
    pub exact_mirror: bool,
    /// Skip the reconciliation pass.
    pub skip_cleanup: bool,
    /// Leave source-control metadata alone during reconciliation.
    pub ignore_source_control: bool,
    /// Exclude the perl language distributions themselves.
    pub skip_perl: bool,
    /// Skip rules evaluated against archive paths.
    pub path_filters: Vec<Rule>,
    /// Skip rules evaluated against module names.
    pub module_filters: Vec<Rule>,
    /// Extra relative paths mirrored unconditionally, outside filtering.
    pub also_mirror: Vec<String>,
    /// Permission bits applied to directories the engine creates.
    pub dir_mode: Option<u32>,
    /// Per-request timeout; `None` lets requests block indefinitely.
    pub timeout: Option<Duration>,
    /// Effective verbosity, resolved by the configuration layer.
    pub log_level: LogLevel,
}

impl MirrorConfig {
    /// Build a config with the two required settings and defaults for
    /// everything else.
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Result<Self> {
        let local = local.into();
        if local.as_os_str().is_empty() {
            return Err(Error::MissingSetting("local"));
        }
        let remote = normalize_remote(remote.into())?;
        Ok(Self {
            local,
            remote,
            force: false,
            offline: false,
            exact_mirror: false,
            skip_cleanup: false,
            ignore_source_control: false,
            skip_perl: true,
            path_filters: Vec::new(),
            module_filters: Vec::new(),
            also_mirror: Vec::new(),
            dir_mode: default_dir_mode(),
            timeout: None,
            log_level: LogLevel::default(),
        })
    }
}

fn normalize_remote(remote: String) -> Result<String> {
    if remote.is_empty() {
        return Err(Error::MissingSetting("remote"));
    }
    if !remote.starts_with("http://") && !remote.starts_with("https://") {
        return Err(Error::InvalidRemote(remote));
    }
    Ok(if remote.ends_with('/') {
        remote
    } else {
        format!("{remote}/")
    })
}

#[cfg(unix)]
fn default_dir_mode() -> Option<u32> {
    Some(0o711)
}

#[cfg(not(unix))]
fn default_dir_mode() -> Option<u32> {
    None
}
