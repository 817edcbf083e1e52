//! Atomic filesystem primitives used by the capstan mirror engine.
//!
//! Every write into the mirror tree goes through [`atomic_write`] so that a
//! killed process never leaves a half-written archive behind, and every
//! directory the engine creates goes through [`create_dir_all_mode`] so the
//! configured permission bits apply uniformly.

mod error;

pub use error::{Error, Result};

use std::fs;
use std::path::Path;

use error::io_at;
use filetime::FileTime;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Write `content` to `path` through a temporary sibling file and a rename.
///
/// The temporary file lives in the destination directory (`.name.tmp`), so
/// the final rename never crosses a filesystem boundary.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or(Path::new(""));
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp_path = parent.join(format!(".{file_name}.tmp"));

    fs::write(&tmp_path, content).map_err(io_at(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(io_at(path))?;

    Ok(())
}

/// Create `path` and any missing ancestors, applying `mode` to every
/// directory this call creates.
///
/// Existing directories are left untouched, including their permissions.
/// Idempotent: calling it on an existing tree is a no-op.
pub fn create_dir_all_mode(path: impl AsRef<Path>, mode: Option<u32>) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        create_dir_all_mode(parent, mode)?;
    }
    match fs::create_dir(path) {
        Ok(()) => {}
        // A concurrent creator or a symlinked component may beat us here.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(()),
        Err(e) => return Err(io_at(path)(e)),
    }
    set_dir_mode(path, mode)?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(io_at(path))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

/// Copy `src` to `dst`, carrying the source's modification time over.
///
/// The mirror engine stages the previous run's index files this way so a
/// conditional fetch can still diff against them even when the local root
/// was never updated.
pub fn copy_with_mtime(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    fs::copy(src, dst).map_err(io_at(src))?;
    let meta = fs::metadata(src).map_err(io_at(src))?;
    filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&meta))
        .map_err(io_at(dst))?;
    Ok(())
}
