//! The fatal error taxonomy for a mirror run.
//!
//! Everything here aborts the run. Per-file trouble (a failed fetch, an
//! undeletable stale file) is handled where it occurs and logged; it
//! never appears as a variant of this enum.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration, raised before any I/O.
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("remote base URL {0:?} is not an http(s) URL")]
    InvalidRemote(String),

    #[error("unknown log level {0:?}")]
    UnknownLogLevel(String),

    #[error("invalid filter pattern {pattern:?}: {source}")]
    FilterPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // Session setup.
    #[error("local root {0} is not a directory")]
    LocalRootNotDir(PathBuf),

    #[error("local root {path} is not usable: {source}")]
    LocalRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create staging directory: {0}")]
    Scratch(#[source] io::Error),

    // Mirroring.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: capstan_fs::Error,
    },

    #[error("failed to stage index {path}: {source}")]
    StageIndex {
        path: PathBuf,
        #[source]
        source: capstan_fs::Error,
    },

    #[error("index {0} could not be obtained from the remote or a previous run")]
    IndexUnavailable(String),

    #[error("failed to open package index {path}: {source}")]
    IndexOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read package index {path}: {source}")]
    IndexRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("package index {path} does not declare itself as {expected:?}")]
    IndexHeader {
        path: PathBuf,
        expected: &'static str,
    },

    #[error("malformed package index line: {0:?}")]
    IndexLine(String),

    #[error("failed to install index {path}: {source}")]
    InstallIndex {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write change manifest {path}: {source}")]
    WriteRecent {
        path: PathBuf,
        #[source]
        source: capstan_fs::Error,
    },

    #[error(transparent)]
    Fetch(#[from] capstan_fetch::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
