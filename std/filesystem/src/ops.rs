//! Sandboxed filesystem operations.
//!
//! Each operation resolves every path argument through
//! [`Sandbox::resolve`](crate::Sandbox::resolve) before touching storage and
//! reports failures as [`FsError`]. Results serialize to the JSON shapes
//! returned to MCP callers.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::Sandbox;
use crate::content::{self, ContentMode};
use crate::error::FsError;
use crate::transfer;

/// Kind of a filesystem entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    pub(crate) fn of(meta: &Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// One directory entry returned by [`Sandbox::list`].
#[derive(Debug, Serialize)]
pub struct Entry {
    pub name: String,
    /// Root-relative path.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Listing {
    pub path: String,
    pub exists: bool,
    pub items: Vec<Entry>,
}

#[derive(Debug, Serialize)]
pub struct Stat {
    pub path: String,
    pub exists: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadResult {
    pub path: String,
    pub mode: ContentMode,
    /// Encoding used for text mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub size: u64,
    /// Text mode only: some bytes could not be decoded and were replaced.
    pub lossy: bool,
    pub content: String,
}

/// Options for [`Sandbox::write`].
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    pub mode: ContentMode,
    /// WHATWG encoding label for text mode; UTF-8 when unset.
    pub encoding: Option<String>,
    pub append: bool,
}

#[derive(Debug, Serialize)]
pub struct WriteResult {
    pub path: String,
    pub bytes_written: u64,
    pub appended: bool,
    /// Text mode only: some characters were not representable.
    pub lossy: bool,
}

#[derive(Debug, Serialize)]
pub struct MkdirResult {
    pub path: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub path: String,
    /// `false` when there was nothing to delete.
    pub deleted: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
}

/// Result of a move or copy.
#[derive(Debug, Serialize)]
pub struct TransferResult {
    pub source: String,
    pub destination: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// An existing destination was replaced.
    pub overwritten: bool,
}

pub(crate) fn modified_rfc3339(meta: &Metadata) -> Option<String> {
    meta.modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
}

/// `metadata` that maps "does not exist" to `None`.
pub(crate) async fn metadata_opt(path: &Path) -> Result<Option<Metadata>, FsError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Sandbox {
    /// Non-recursive listing of the entries of `path` matching the glob
    /// `pattern`, sorted by name.
    pub async fn list(&self, path: &str, pattern: &str) -> Result<Listing, FsError> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| FsError::InvalidArgument(format!("invalid pattern {pattern:?}: {e}")))?;
        let dir = self.resolve_async(path).await?;
        let rel = self.relative(&dir);

        let Some(meta) = metadata_opt(&dir).await? else {
            return Ok(Listing {
                path: rel,
                exists: false,
                items: Vec::new(),
            });
        };
        if !meta.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        let mut items = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !pattern.matches(&name) {
                continue;
            }
            // Entries are reported as they are; symlinks are not followed.
            let meta = tokio::fs::symlink_metadata(entry.path()).await?;
            let kind = EntryKind::of(&meta);
            items.push(Entry {
                path: self.relative(&entry.path()),
                size: (kind == EntryKind::File).then(|| meta.len()),
                modified: modified_rfc3339(&meta),
                kind,
                name,
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Listing {
            path: rel,
            exists: true,
            items,
        })
    }

    /// Existence, type, size (files only) and modification time of `path`.
    pub async fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let target = self.resolve_async(path).await?;
        let rel = self.relative(&target);
        Ok(match metadata_opt(&target).await? {
            None => Stat {
                path: rel,
                exists: false,
                kind: None,
                size: None,
                modified: None,
            },
            Some(meta) => {
                let kind = EntryKind::of(&meta);
                Stat {
                    path: rel,
                    exists: true,
                    kind: Some(kind),
                    size: (kind == EntryKind::File).then(|| meta.len()),
                    modified: modified_rfc3339(&meta),
                }
            }
        })
    }

    /// Read a regular file as text (lossy, in `encoding`) or base64.
    pub async fn read(
        &self,
        path: &str,
        mode: ContentMode,
        encoding: Option<&str>,
    ) -> Result<ReadResult, FsError> {
        let encoding = match mode {
            ContentMode::Text => Some(content::encoding_for(encoding)?),
            ContentMode::Binary => None,
        };
        let target = self.resolve_async(path).await?;
        match metadata_opt(&target).await? {
            Some(meta) if meta.is_file() => {}
            _ => return Err(FsError::NotFound(path.to_string())),
        }

        let bytes = tokio::fs::read(&target).await?;
        let size = bytes.len() as u64;
        let (content, lossy) = match encoding {
            Some(encoding) => content::decode_text(&bytes, encoding),
            None => (content::encode_binary(&bytes), false),
        };
        if lossy {
            tracing::debug!(path, "replaced undecodable bytes");
        }

        Ok(ReadResult {
            path: self.relative(&target),
            mode,
            encoding: encoding.map(|e| e.name().to_string()),
            size,
            lossy,
            content,
        })
    }

    /// Write `data` to `path`, creating parent directories.
    pub async fn write(
        &self,
        path: &str,
        data: &str,
        options: &WriteOptions,
    ) -> Result<WriteResult, FsError> {
        let target = self.resolve_async(path).await?;
        if self.is_root(&target) {
            return Err(FsError::InvalidArgument("cannot write to the sandbox root".into()));
        }
        // Encode before touching storage so bad input writes nothing.
        let (bytes, lossy) = match options.mode {
            ContentMode::Text => {
                let encoding = content::encoding_for(options.encoding.as_deref())?;
                content::encode_text(data, encoding)
            }
            ContentMode::Binary => (content::decode_binary(data)?, false),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(options.append)
            .truncate(!options.append)
            .open(&target)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        tracing::debug!(path, bytes = bytes.len(), append = options.append, "wrote file");
        Ok(WriteResult {
            path: self.relative(&target),
            bytes_written: bytes.len() as u64,
            appended: options.append,
            lossy,
        })
    }

    /// Create `path` and all missing parents.
    pub async fn mkdir(&self, path: &str, exist_ok: bool) -> Result<MkdirResult, FsError> {
        let target = self.resolve_async(path).await?;
        let rel = self.relative(&target);
        match metadata_opt(&target).await? {
            Some(meta) if meta.is_dir() && exist_ok => Ok(MkdirResult {
                path: rel,
                created: false,
            }),
            Some(_) => Err(FsError::AlreadyExists(path.to_string())),
            None => {
                tokio::fs::create_dir_all(&target).await?;
                Ok(MkdirResult {
                    path: rel,
                    created: true,
                })
            }
        }
    }

    /// Delete a file or directory.
    ///
    /// Directories must be empty unless `recursive`. A missing path is not
    /// an error and reports `deleted: false`.
    pub async fn delete(&self, path: &str, recursive: bool) -> Result<DeleteResult, FsError> {
        let target = self.resolve_async(path).await?;
        if self.is_root(&target) {
            return Err(FsError::InvalidArgument("cannot delete the sandbox root".into()));
        }
        let rel = self.relative(&target);
        let Some(meta) = metadata_opt(&target).await? else {
            return Ok(DeleteResult {
                path: rel,
                deleted: false,
                kind: None,
            });
        };

        let kind = EntryKind::of(&meta);
        if meta.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(&target).await?;
            } else {
                let mut entries = tokio::fs::read_dir(&target).await?;
                if entries.next_entry().await?.is_some() {
                    return Err(FsError::DirectoryNotEmpty(path.to_string()));
                }
                tokio::fs::remove_dir(&target).await?;
            }
        } else {
            tokio::fs::remove_file(&target).await?;
        }

        tracing::info!(path = %rel, recursive, "deleted");
        Ok(DeleteResult {
            path: rel,
            deleted: true,
            kind: Some(kind),
        })
    }

    /// Move `source` to `destination`.
    pub async fn move_path(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<TransferResult, FsError> {
        let plan = self.plan_transfer(source, destination, overwrite).await?;

        let (from, to) = (plan.from.clone(), plan.to.clone());
        tokio::task::spawn_blocking(move || transfer::move_replacing(&from, &to))
            .await
            .map_err(FsError::join)??;

        tracing::info!(source, destination, overwritten = plan.overwritten, "moved");
        Ok(self.transfer_result(&plan))
    }

    /// Copy `source` to `destination`; directories are copied recursively.
    pub async fn copy(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<TransferResult, FsError> {
        let plan = self.plan_transfer(source, destination, overwrite).await?;

        let sandbox = self.clone();
        let (from, to, kind) = (plan.from.clone(), plan.to.clone(), plan.kind);
        tokio::task::spawn_blocking(move || transfer::copy_staged(&sandbox, &from, &to, kind))
            .await
            .map_err(FsError::join)??;

        tracing::info!(source, destination, overwritten = plan.overwritten, "copied");
        Ok(self.transfer_result(&plan))
    }

    /// Resolve and check both endpoints of a move or copy.
    async fn plan_transfer(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<TransferPlan, FsError> {
        let from = self.resolve_async(source).await?;
        let to = self.resolve_async(destination).await?;

        if self.is_root(&from) || self.is_root(&to) {
            return Err(FsError::InvalidArgument(
                "the sandbox root cannot be moved, copied or replaced".into(),
            ));
        }
        let Some(meta) = metadata_opt(&from).await? else {
            return Err(FsError::NotFound(source.to_string()));
        };
        if to.starts_with(&from) {
            return Err(FsError::InvalidArgument(format!(
                "cannot transfer {source:?} into itself"
            )));
        }
        if from.starts_with(&to) {
            return Err(FsError::InvalidArgument(format!(
                "cannot replace {destination:?} with an entry inside it"
            )));
        }

        let overwritten = metadata_opt(&to).await?.is_some();
        if overwritten && !overwrite {
            return Err(FsError::DestinationExists(destination.to_string()));
        }

        Ok(TransferPlan {
            kind: EntryKind::of(&meta),
            from,
            to,
            overwritten,
        })
    }

    fn transfer_result(&self, plan: &TransferPlan) -> TransferResult {
        TransferResult {
            source: self.relative(&plan.from),
            destination: self.relative(&plan.to),
            kind: plan.kind,
            overwritten: plan.overwritten,
        }
    }
}

struct TransferPlan {
    from: PathBuf,
    to: PathBuf,
    kind: EntryKind,
    overwritten: bool,
}
