//! Path confinement.
//!
//! Every filesystem operation goes through [`Sandbox::resolve`], which turns
//! a caller-supplied path into a canonical absolute path and refuses anything
//! that does not stay under the sandbox root.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::FsError;

/// Symlink expansions allowed in one resolution (matches Linux `MAXSYMLINKS`).
const MAX_SYMLINK_HOPS: usize = 40;

/// A directory tree all operations are confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: Arc<PathBuf>,
}

impl Sandbox {
    /// Canonicalize `root` once; it must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let given = root.as_ref();
        let root = given.canonicalize().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(given.display().to_string()),
            _ => FsError::Io(e),
        })?;
        if !root.is_dir() {
            return Err(FsError::NotADirectory(given.display().to_string()));
        }
        Ok(Self {
            root: Arc::new(root),
        })
    }

    /// The canonical sandbox root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the root.
    ///
    /// The result is canonical (no `.`/`..`, existing symlinks expanded) and
    /// always lies under the root; anything else is
    /// [`FsError::PathOutsideBase`]. Components that do not exist yet are
    /// kept as given, so targets of write/mkdir/move resolve too.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, FsError> {
        if relative.contains('\0') {
            return Err(FsError::InvalidArgument("path contains null byte".into()));
        }
        let joined = self.root.join(relative);
        let resolved = canonicalize_lenient(&joined)?;
        if !resolved.starts_with(&*self.root) {
            tracing::warn!(path = relative, "rejected path outside sandbox root");
            return Err(FsError::PathOutsideBase(relative.to_string()));
        }
        Ok(resolved)
    }

    /// [`resolve`](Self::resolve) on the blocking pool.
    pub async fn resolve_async(&self, relative: &str) -> Result<PathBuf, FsError> {
        let sandbox = self.clone();
        let relative = relative.to_string();
        tokio::task::spawn_blocking(move || sandbox.resolve(&relative))
            .await
            .map_err(FsError::join)?
    }

    /// Root-relative, `/`-separated form of a resolved path; `.` for the root.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&*self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.display().to_string(),
        }
    }

    pub(crate) fn is_root(&self, path: &Path) -> bool {
        path == self.root.as_path()
    }
}

enum Step {
    Root(OsString),
    Parent,
    Name(OsString),
}

fn steps(path: &Path) -> impl Iterator<Item = Step> + '_ {
    path.components().filter_map(|c| match c {
        Component::Prefix(p) => Some(Step::Root(p.as_os_str().to_owned())),
        Component::RootDir => Some(Step::Root(c.as_os_str().to_owned())),
        Component::CurDir => None,
        Component::ParentDir => Some(Step::Parent),
        Component::Normal(name) => Some(Step::Name(name.to_owned())),
    })
}

/// `realpath` without requiring the path to exist.
///
/// Walks component by component so that `..` always applies to an already
/// physical prefix and every existing symlink is expanded, including ones
/// reached after passing through a missing directory and back.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, FsError> {
    let mut pending: VecDeque<Step> = steps(path).collect();
    let mut resolved = PathBuf::new();
    let mut hops = 0;

    while let Some(step) = pending.pop_front() {
        match step {
            Step::Root(root) => resolved.push(root),
            Step::Parent => {
                resolved.pop();
            }
            Step::Name(name) => {
                let candidate = resolved.join(&name);
                let is_link = std::fs::symlink_metadata(&candidate)
                    .map(|m| m.file_type().is_symlink())
                    .unwrap_or(false);
                if !is_link {
                    resolved = candidate;
                    continue;
                }

                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(FsError::InvalidArgument(
                        "too many levels of symbolic links".into(),
                    ));
                }
                // Relative targets continue from the link's directory,
                // absolute ones restart at their own root.
                let target = std::fs::read_link(&candidate)?;
                for step in steps(&target).collect::<Vec<_>>().into_iter().rev() {
                    pending.push_front(step);
                }
            }
        }
    }
    Ok(resolved)
}
