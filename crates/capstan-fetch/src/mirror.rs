use std::fs;
use std::path::Path;

use filetime::FileTime;
use tracing::trace;

use crate::client::HttpClient;
use crate::error::{Error, Result};

/// Result of one conditional mirror attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// The remote copy was newer; the local file was (re)written.
    Updated,
    /// The server answered `304`; the local file is already current.
    NotModified,
    /// No usable response. The local file, if any, is untouched.
    Failed(MirrorFailure),
}

/// Why a mirror attempt produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MirrorFailure {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("{0}")]
    Transport(String),
}

/// Fetch-if-changed against a local file, preserving remote timestamps.
///
/// The wire semantics are a conditional GET keyed on the local file's
/// modification time. A fresh body is written atomically and then stamped
/// with the server's `Last-Modified`, so the next run's precondition
/// compares against the remote's own clock rather than ours.
pub struct MirrorFetcher<C> {
    client: C,
}

impl<C: HttpClient> MirrorFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Mirror `url` onto `local`.
    ///
    /// With `refresh_mtime` the freshly written file keeps a current
    /// timestamp instead of the remote one; the engine uses this for
    /// staged index copies.
    ///
    /// Remote-side failures come back as [`MirrorOutcome::Failed`];
    /// `Err` is reserved for local filesystem trouble.
    pub async fn mirror(
        &self,
        url: &str,
        local: &Path,
        refresh_mtime: bool,
    ) -> Result<MirrorOutcome> {
        let since = fs::metadata(local).ok().and_then(|m| m.modified().ok());
        trace!(url, conditional = since.is_some(), "mirror request");

        let response = match self.client.get(url, since).await {
            Ok(response) => response,
            Err(e) => return Ok(MirrorOutcome::Failed(MirrorFailure::Transport(e.to_string()))),
        };

        match response.status {
            200 => {
                capstan_fs::atomic_write(local, &response.body)?;
                let stamp = if refresh_mtime {
                    Some(FileTime::now())
                } else {
                    response.last_modified.map(FileTime::from_system_time)
                };
                if let Some(stamp) = stamp {
                    filetime::set_file_mtime(local, stamp).map_err(|source| Error::Io {
                        path: local.to_path_buf(),
                        source,
                    })?;
                }
                Ok(MirrorOutcome::Updated)
            }
            304 => Ok(MirrorOutcome::NotModified),
            status => Ok(MirrorOutcome::Failed(MirrorFailure::Status(status))),
        }
    }
}
