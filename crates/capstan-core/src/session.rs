//! The per-run mirror session: mark tracking, the file mirroring
//! primitive, and the `update_mirror` orchestration.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use capstan_fetch::{HttpClient, MirrorFetcher, MirrorOutcome};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::clean::Reconciler;
use crate::config::MirrorConfig;
use crate::error::{Error, Result};
use crate::filter::Filters;
use crate::index::{self, FIXED_INDICES, PACKAGE_INDEX};

/// Name of the change manifest written at the local root after any run
/// that updated something.
pub const RECENT_FILE: &str = "RECENT";

/// Per-file state for one run.
///
/// `Checked` means the file is known present and acceptable; `Fetched`
/// means it was verified against the remote this run. A path's mark only
/// ever moves upward within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MirrorMark {
    Checked = 1,
    Fetched = 2,
}

/// Options for a single [`MirrorSession::mirror_file`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct MirrorFileOptions {
    /// Resolve the local path under the staging area instead of the
    /// local root.
    pub to_scratch: bool,
    /// Stamp a freshly written file with the current time instead of
    /// the remote's `Last-Modified`.
    pub update_times: bool,
}

/// What one `mirror_one` call did, driving the checksum cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileState {
    /// Fast path: trusted an existing copy, or already fetched this run.
    Skipped,
    /// Remote content written locally.
    Updated,
    /// Conditional fetch answered not-modified.
    Unchanged,
    /// Soft failure; the file stays unmirrored this run.
    Failed,
}

/// Anything that can bring a local mirror up to date.
///
/// The engine is injected through this seam so the binary (and tests)
/// can swap implementations without touching call sites.
pub trait Mirror {
    fn update_mirror(&mut self) -> impl Future<Output = Result<u32>> + Send;
}

/// State for exactly one synchronization run.
///
/// Owns the scratch staging directory (destroyed on drop), the per-file
/// mark map consulted by the reconciler, and the set of paths actually
/// updated, which becomes the `RECENT` manifest.
pub struct MirrorSession<C: HttpClient> {
    config: MirrorConfig,
    fetcher: MirrorFetcher<C>,
    filters: Filters,
    scratch: TempDir,
    mirrored: HashMap<PathBuf, MirrorMark>,
    recent: BTreeSet<String>,
    changes: u32,
}

impl<C: HttpClient> MirrorSession<C> {
    /// Set up a session: the local root must exist (it is created on
    /// demand) as a writable directory, and a private scratch directory
    /// is claimed for the session's lifetime.
    pub fn new(mut config: MirrorConfig, client: C) -> Result<Self> {
        capstan_fs::create_dir_all_mode(&config.local, config.dir_mode).map_err(
            |capstan_fs::Error::Io { source, .. }| Error::LocalRoot {
                path: config.local.clone(),
                source,
            },
        )?;
        let meta = fs::metadata(&config.local).map_err(|source| Error::LocalRoot {
            path: config.local.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(Error::LocalRootNotDir(config.local));
        }
        // Canonical root keeps the mark map and the cleanup walk keyed
        // identically however the root was spelled.
        config.local = fs::canonicalize(&config.local).map_err(|source| Error::LocalRoot {
            path: config.local.clone(),
            source,
        })?;

        let probe = config.local.join(".capstan-write-probe");
        fs::write(&probe, b"")
            .and_then(|()| fs::remove_file(&probe))
            .map_err(|source| Error::LocalRoot {
                path: config.local.clone(),
                source,
            })?;

        let scratch = tempfile::Builder::new()
            .prefix("capstan-")
            .tempdir()
            .map_err(Error::Scratch)?;

        let filters = Filters {
            skip_perl: config.skip_perl,
            path_rules: config.path_filters.clone(),
            module_rules: config.module_filters.clone(),
        };

        Ok(Self {
            fetcher: MirrorFetcher::new(client),
            filters,
            scratch,
            mirrored: HashMap::new(),
            recent: BTreeSet::new(),
            changes: 0,
            config,
        })
    }

    /// Number of files actually updated so far this run.
    pub fn changes(&self) -> u32 {
        self.changes
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Run one full synchronization pass.
    ///
    /// Returns the number of files updated; 0 means upstream published
    /// nothing new (or the session is offline). Soft per-file failures
    /// are logged, never returned.
    pub async fn update_mirror(&mut self) -> Result<u32> {
        if self.config.offline {
            info!("offline: mirror left as-is");
            return Ok(0);
        }
        self.mirror_indices().await?;
        if !self.config.force && self.changes == 0 {
            debug!("indices unchanged; mirror is current");
            return Ok(0);
        }
        self.mirror_extras().await?;
        self.mirror_archives().await?;
        self.install_indices()?;
        self.write_recent()?;
        if !self.config.skip_cleanup {
            let removed = self.clean_unmirrored();
            if removed > 0 {
                info!("{removed} stale file(s) removed");
            }
        }
        Ok(self.changes)
    }

    /// Mirror one file, then its sibling `CHECKSUMS` when the path lies
    /// under `authors/id/`.
    ///
    /// `skip_if_present` is the trust-existing-archive fast path: a file
    /// already on disk is promoted to [`MirrorMark::Checked`] without
    /// contacting the remote. Archives are immutable by upstream
    /// convention, so this trusts even a truncated local copy; only an
    /// upstream change (or `force`) heals such a file.
    ///
    /// The checksum file is re-fetched whenever the archive itself
    /// changed, and merely trusted otherwise. The cascade is one bounded
    /// step: a `CHECKSUMS` path is its own sibling and never cascades.
    pub async fn mirror_file(
        &mut self,
        path: &str,
        skip_if_present: bool,
        options: MirrorFileOptions,
    ) -> Result<()> {
        let state = self.mirror_one(path, skip_if_present, options).await?;
        if state == FileState::Failed {
            return Ok(());
        }
        if let Some(checksums) = checksum_sibling(path) {
            if checksums != path {
                let checksums_current = state != FileState::Updated;
                self.mirror_one(&checksums, checksums_current, options).await?;
            }
        }
        Ok(())
    }

    /// The single-file transition function.
    async fn mirror_one(
        &mut self,
        path: &str,
        skip_if_present: bool,
        options: MirrorFileOptions,
    ) -> Result<FileState> {
        let root = if options.to_scratch {
            self.scratch.path().to_path_buf()
        } else {
            self.config.local.clone()
        };
        let local_file = resolve(&root, path);

        if skip_if_present && local_file.is_file() {
            self.mirrored
                .entry(local_file)
                .or_insert(MirrorMark::Checked);
            return Ok(FileState::Skipped);
        }
        if self.mirrored.get(&local_file) == Some(&MirrorMark::Fetched) {
            return Ok(FileState::Skipped);
        }
        // Marked before the fetch: a later call for the same path this
        // run must not retry, even if this attempt fails.
        self.mirrored.insert(local_file.clone(), MirrorMark::Fetched);

        if let Some(parent) = local_file.parent() {
            capstan_fs::create_dir_all_mode(parent, self.config.dir_mode).map_err(|source| {
                Error::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }

        let url = format!("{}{}", self.config.remote, path);
        match self
            .fetcher
            .mirror(&url, &local_file, options.update_times)
            .await?
        {
            MirrorOutcome::Updated => {
                info!("{path} ... updated");
                self.recent.insert(path.to_string());
                self.changes += 1;
                Ok(FileState::Updated)
            }
            MirrorOutcome::NotModified => {
                debug!("{path} ... up to date");
                Ok(FileState::Unchanged)
            }
            MirrorOutcome::Failed(failure) => {
                warn!("{path}: {failure}");
                Ok(FileState::Failed)
            }
        }
    }

    /// Stage the three fixed indices in the scratch area.
    ///
    /// Any local copy is carried over first, with its timestamp, so the
    /// conditional fetch diffs against the previous run even when the
    /// remote is unreachable; whatever is freshest then sits staged. The
    /// local root's own indices stay untouched until
    /// [`Self::install_indices`].
    async fn mirror_indices(&mut self) -> Result<()> {
        for path in FIXED_INDICES {
            let scratch_file = resolve(self.scratch.path(), path);
            if let Some(parent) = scratch_file.parent() {
                capstan_fs::create_dir_all_mode(parent, self.config.dir_mode).map_err(
                    |source| Error::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    },
                )?;
            }
            let local_file = resolve(&self.config.local, path);
            if local_file.is_file() {
                capstan_fs::copy_with_mtime(&local_file, &scratch_file).map_err(|source| {
                    Error::StageIndex {
                        path: local_file.clone(),
                        source,
                    }
                })?;
            }
            self.mirror_file(
                path,
                false,
                MirrorFileOptions {
                    to_scratch: true,
                    update_times: false,
                },
            )
            .await?;
            // Neither the remote nor a previous run produced this index:
            // the mirror is unusable, which is fatal.
            if !scratch_file.is_file() {
                return Err(Error::IndexUnavailable(path.to_string()));
            }
        }
        Ok(())
    }

    /// Extra always-mirror paths from the configuration; not subject to
    /// filtering.
    async fn mirror_extras(&mut self) -> Result<()> {
        for path in self.config.also_mirror.clone() {
            self.mirror_file(&path, !self.config.force, MirrorFileOptions::default())
                .await?;
        }
        Ok(())
    }

    /// Mirror every archive the freshly staged package index calls for.
    async fn mirror_archives(&mut self) -> Result<()> {
        let package_index = index::PackageIndex::open(&resolve(self.scratch.path(), PACKAGE_INDEX))?;
        let wanted = index::mirror_list(package_index, &self.filters)?;
        info!("{} archive(s) in mirror list", wanted.len());
        for path in wanted {
            self.mirror_file(&path, !self.config.force, MirrorFileOptions::default())
                .await?;
        }
        Ok(())
    }

    /// Promote the staged indices into the local root, delete-then-copy
    /// per file.
    ///
    /// Deliberately the last mirroring step: a run killed before this
    /// point leaves the old indices in place, so the next run's decision
    /// gate still sees them as changed and re-enters the archive phase
    /// instead of silently skipping it.
    fn install_indices(&mut self) -> Result<()> {
        for path in FIXED_INDICES {
            let scratch_file = resolve(self.scratch.path(), path);
            let local_file = resolve(&self.config.local, path);
            if let Some(parent) = local_file.parent() {
                capstan_fs::create_dir_all_mode(parent, self.config.dir_mode).map_err(
                    |source| Error::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    },
                )?;
            }
            if local_file.exists() {
                fs::remove_file(&local_file).map_err(|source| Error::InstallIndex {
                    path: local_file.clone(),
                    source,
                })?;
            }
            // The timestamp travels with the copy so the next run's
            // conditional fetch still compares against the remote clock.
            capstan_fs::copy_with_mtime(&scratch_file, &local_file).map_err(
                |capstan_fs::Error::Io { path, source }| Error::InstallIndex { path, source },
            )?;
            self.mirrored.insert(local_file, MirrorMark::Fetched);
        }
        Ok(())
    }

    /// Persist the sorted set of paths updated this run; skipped when
    /// nothing changed.
    fn write_recent(&self) -> Result<()> {
        if self.recent.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for path in &self.recent {
            body.push_str(path);
            body.push('\n');
        }
        let manifest = self.config.local.join(RECENT_FILE);
        capstan_fs::atomic_write(&manifest, body.as_bytes()).map_err(|source| {
            Error::WriteRecent {
                path: manifest.clone(),
                source,
            }
        })?;
        Ok(())
    }

    fn clean_unmirrored(&self) -> u64 {
        Reconciler {
            mirrored: &self.mirrored,
            exact_mirror: self.config.exact_mirror,
            ignore_source_control: self.config.ignore_source_control,
            manifest_name: RECENT_FILE,
        }
        .clean(&self.config.local)
    }
}

impl<C: HttpClient> Mirror for MirrorSession<C> {
    fn update_mirror(&mut self) -> impl Future<Output = Result<u32>> + Send {
        MirrorSession::update_mirror(self)
    }
}

/// Join a slash-separated relative path under `root`, one segment at a
/// time, so the separator convention of the index never leaks into the
/// local filesystem.
fn resolve(root: &Path, rel: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(rel.split('/').filter(|segment| !segment.is_empty()));
    path
}

/// Sibling `CHECKSUMS` path for files under the archive tree.
fn checksum_sibling(path: &str) -> Option<String> {
    if !path.starts_with("authors/id/") {
        return None;
    }
    let (dir, _) = path.rsplit_once('/')?;
    Some(format!("{dir}/CHECKSUMS"))
}
