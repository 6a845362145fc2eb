//! Filesystem operations confined to a sandbox root.
//!
//! A [`Sandbox`] is created once from a configured root directory. Every
//! operation resolves its path arguments against that root and refuses
//! anything that escapes it, including through symlinks, before touching
//! storage.

mod content;
mod error;
mod ops;
mod sandbox;
mod transfer;

pub use content::ContentMode;
pub use error::FsError;
pub use ops::{
    DeleteResult, Entry, EntryKind, Listing, MkdirResult, ReadResult, Stat, TransferResult,
    WriteOptions, WriteResult,
};
pub use sandbox::Sandbox;
