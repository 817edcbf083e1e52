//! Error types for capstan-fetch.
//!
//! Only local failures surface as `Err` here. Remote-side problems
//! (unreachable host, non-success status) are ordinary values of
//! [`MirrorOutcome`](crate::MirrorOutcome): a mirror run tolerates them
//! per file, so they must not unwind the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] capstan_fs::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to construct HTTP client: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, Error>;
