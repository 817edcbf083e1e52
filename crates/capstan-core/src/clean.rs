//! Reconciliation: deleting local files the current index no longer wants.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::session::MirrorMark;

/// Source-control metadata names pruned from the walk when configured.
/// Pruned means neither deleted nor descended into; the dot-file rule
/// alone would not cover `CVS`.
const SOURCE_CONTROL_NAMES: [&str; 4] = [".git", ".svn", ".hg", "CVS"];

/// Walks the local root after a sync and removes every regular file that
/// was neither marked this run nor explicitly allowed.
///
/// This pass never fails the run: unreadable directories and undeletable
/// files are logged and left behind.
pub(crate) struct Reconciler<'a> {
    pub mirrored: &'a HashMap<PathBuf, MirrorMark>,
    pub exact_mirror: bool,
    pub ignore_source_control: bool,
    pub manifest_name: &'static str,
}

impl Reconciler<'_> {
    /// Returns the number of files removed.
    pub fn clean(&self, root: &Path) -> u64 {
        let mut removed = 0;
        self.walk(root, &mut removed);
        removed
    }

    fn walk(&self, dir: &Path, removed: &mut u64) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot read {}: {e}", dir.display());
                return;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("cannot read entry in {}: {e}", dir.display());
                    continue;
                }
            };
            let path = entry.path();
            if self.ignore_source_control
                && SOURCE_CONTROL_NAMES.iter().any(|name| entry.file_name() == *name)
            {
                debug!("leaving source-control entry {} alone", path.display());
                continue;
            }
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!("cannot stat {}: {e}", path.display());
                    continue;
                }
            };
            if file_type.is_dir() {
                self.walk(&path, removed);
            } else if file_type.is_file()
                && !self.mirrored.contains_key(&path)
                && !self.file_allowed(&path)
            {
                self.clean_file(&path, removed);
            }
            // Symlinks and other oddities are not ours to manage.
        }
    }

    /// Whether an unmirrored file escapes deletion: everything does under
    /// `exact_mirror`, the change manifest always does, and hidden
    /// (dot-prefixed) files do.
    fn file_allowed(&self, path: &Path) -> bool {
        if self.exact_mirror {
            return true;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name == self.manifest_name || name.starts_with('.')
    }

    fn clean_file(&self, path: &Path, removed: &mut u64) {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("cleaning {} ... done", path.display());
                *removed += 1;
            }
            Err(e) => warn!("cannot remove {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn reconciler<'a>(mirrored: &'a HashMap<PathBuf, MirrorMark>) -> Reconciler<'a> {
        Reconciler {
            mirrored,
            exact_mirror: false,
            ignore_source_control: false,
            manifest_name: "RECENT",
        }
    }

    #[test]
    fn deletes_unmirrored_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("authors/id/X/XY/XYZZY/Old-0.9.tar.gz");
        touch(&stale);

        let mirrored = HashMap::new();
        let removed = reconciler(&mirrored).clean(dir.path());

        assert_eq!(removed, 1);
        assert!(!stale.exists());
    }

    #[test]
    fn keeps_marked_files_at_either_mark() {
        let dir = tempfile::tempdir().unwrap();
        let checked = dir.path().join("authors/id/X/XY/XYZZY/A-1.0.tar.gz");
        let fetched = dir.path().join("authors/id/X/XY/XYZZY/CHECKSUMS");
        touch(&checked);
        touch(&fetched);

        let mirrored = HashMap::from([
            (checked.clone(), MirrorMark::Checked),
            (fetched.clone(), MirrorMark::Fetched),
        ]);
        let removed = reconciler(&mirrored).clean(dir.path());

        assert_eq!(removed, 0);
        assert!(checked.exists());
        assert!(fetched.exists());
    }

    #[test]
    fn keeps_dot_files_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = dir.path().join("authors/.keepme");
        let manifest = dir.path().join("RECENT");
        touch(&hidden);
        touch(&manifest);

        let mirrored = HashMap::new();
        let removed = reconciler(&mirrored).clean(dir.path());

        assert_eq!(removed, 0);
        assert!(hidden.exists());
        assert!(manifest.exists());
    }

    #[test]
    fn exact_mirror_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("authors/id/X/XY/XYZZY/Old-0.9.tar.gz");
        touch(&stale);

        let mirrored = HashMap::new();
        let mut r = reconciler(&mirrored);
        r.exact_mirror = true;
        let removed = r.clean(dir.path());

        assert_eq!(removed, 0);
        assert!(stale.exists());
    }

    #[test]
    fn prunes_source_control_trees_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let tracked = dir.path().join(".git/objects/ab/cdef");
        let cvs = dir.path().join("authors/CVS/Entries");
        touch(&tracked);
        touch(&cvs);

        let mirrored = HashMap::new();
        let mut r = reconciler(&mirrored);
        r.ignore_source_control = true;
        let removed = r.clean(dir.path());

        assert_eq!(removed, 0);
        assert!(tracked.exists());
        assert!(cvs.exists());
    }

    #[test]
    fn without_the_flag_source_control_contents_are_fair_game() {
        let dir = tempfile::tempdir().unwrap();
        let cvs = dir.path().join("authors/CVS/Entries");
        touch(&cvs);

        let mirrored = HashMap::new();
        let removed = reconciler(&mirrored).clean(dir.path());

        assert_eq!(removed, 1);
        assert!(!cvs.exists());
    }
}
