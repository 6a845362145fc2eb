//! Staged copies and replacing moves.
//!
//! A copy is built under a hidden sibling of the destination and renamed
//! into place only once complete, so a failed copy never leaves a partial
//! destination behind. A move that replaces a directory parks the old tree
//! under such a sibling and only removes it once the move has landed.

use std::fs::{self, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::Sandbox;
use crate::error::FsError;
use crate::ops::EntryKind;

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

fn staging_path(to: &Path) -> PathBuf {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    to.with_file_name(format!(".{name}.stage-{}-{seq}", std::process::id()))
}

/// Copy `from` to `to`, replacing `to` if present. Blocking.
pub(crate) fn copy_staged(
    sandbox: &Sandbox,
    from: &Path,
    to: &Path,
    kind: EntryKind,
) -> Result<(), FsError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = staging_path(to);

    let copied = match kind {
        EntryKind::Directory => {
            let mut ancestors = vec![from.to_path_buf()];
            copy_dir(sandbox, from, &staging, &mut ancestors)
        }
        _ => copy_file(from, &staging),
    };
    if let Err(e) = copied {
        remove_quietly(&staging);
        return Err(e);
    }

    if let Err(e) = replace(&staging, to) {
        remove_quietly(&staging);
        return Err(e);
    }
    Ok(())
}

/// Move `from` to `to`, replacing `to` if present. Blocking.
pub(crate) fn move_replacing(from: &Path, to: &Path) -> Result<(), FsError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    replace(from, to)
}

/// Rename `from` over `to`. The previous `to`, if any, survives a failed
/// rename.
fn replace(from: &Path, to: &Path) -> Result<(), FsError> {
    let existing = match fs::symlink_metadata(to) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let from_is_dir = fs::symlink_metadata(from)?.is_dir();

    match existing {
        // rename(2) replaces a non-directory atomically.
        None => fs::rename(from, to)?,
        Some(meta) if !meta.is_dir() && !from_is_dir => fs::rename(from, to)?,
        Some(_) => {
            let parked = staging_path(to);
            fs::rename(to, &parked)?;
            if let Err(e) = fs::rename(from, to) {
                if let Err(restore) = fs::rename(&parked, to) {
                    tracing::error!(
                        path = %to.display(),
                        parked = %parked.display(),
                        error = %restore,
                        "could not restore replaced destination"
                    );
                }
                return Err(e.into());
            }
            remove_quietly(&parked);
        }
    }
    Ok(())
}

/// `ancestors` holds the canonical directories on the current branch.
fn copy_dir(
    sandbox: &Sandbox,
    from: &Path,
    to: &Path,
    ancestors: &mut Vec<PathBuf>,
) -> Result<(), FsError> {
    fs::create_dir(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let src = entry.path();
        let dst = to.join(entry.file_name());

        let mut src_real = src.clone();
        let mut meta = fs::symlink_metadata(&src)?;
        if meta.file_type().is_symlink() {
            src_real = fs::canonicalize(&src)?;
            if !src_real.starts_with(sandbox.root()) {
                let rel = sandbox.relative(&src);
                tracing::warn!(path = %rel, "refusing to copy symlink leaving the sandbox");
                return Err(FsError::PathOutsideBase(rel));
            }
            meta = fs::metadata(&src_real)?;
        }

        if meta.is_dir() {
            if ancestors.contains(&src_real) {
                return Err(FsError::InvalidArgument(format!(
                    "symlink cycle at {}",
                    sandbox.relative(&src)
                )));
            }
            ancestors.push(src_real.clone());
            copy_dir(sandbox, &src_real, &dst, ancestors)?;
            ancestors.pop();
        } else {
            copy_file(&src_real, &dst)?;
        }
    }
    copy_times(from, to);
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<(), FsError> {
    fs::copy(from, to)?;
    copy_times(from, to);
    Ok(())
}

/// Best effort: carry access and modification times over to `to`.
fn copy_times(from: &Path, to: &Path) {
    let result = fs::metadata(from).and_then(|meta| {
        let mut times = FileTimes::new().set_modified(meta.modified()?);
        if let Ok(accessed) = meta.accessed() {
            times = times.set_accessed(accessed);
        }
        fs::File::options().write(!meta.is_dir()).read(true).open(to)?.set_times(times)
    });
    if let Err(e) = result {
        tracing::debug!(path = %to.display(), error = %e, "could not preserve timestamps");
    }
}

fn remove_quietly(path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "could not remove staged entry");
    }
}
