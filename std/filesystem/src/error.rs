use thiserror::Error;

/// Errors from sandboxed filesystem operations.
///
/// Paths in messages are the caller's own (root-relative) arguments, never
/// host paths.
#[derive(Error, Debug)]
pub enum FsError {
    /// The path resolves outside the sandbox root.
    #[error("path is outside the sandbox root: {0}")]
    PathOutsideBase(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Move/copy target present without overwrite permission.
    #[error("destination already exists: {0}")]
    DestinationExists(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Stable error code for protocol-level mapping.
    pub fn code(&self) -> &'static str {
        match self {
            FsError::PathOutsideBase(_) => "path_outside_base",
            FsError::NotFound(_) => "not_found",
            FsError::DestinationExists(_) => "destination_exists",
            FsError::AlreadyExists(_) => "already_exists",
            FsError::NotADirectory(_) => "not_a_directory",
            FsError::DirectoryNotEmpty(_) => "directory_not_empty",
            FsError::InvalidArgument(_) => "invalid_argument",
            FsError::Io(_) => "io_error",
        }
    }

    pub(crate) fn join(err: tokio::task::JoinError) -> Self {
        FsError::Io(std::io::Error::other(err))
    }
}
