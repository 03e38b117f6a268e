//! Blob-object storage shared by the installation and state stores.
//!
//! Both stores talk to storage only through the [`ObjectStore`] trait: a flat,
//! container-scoped key space with four primitives.
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │ BlobInstallationStore│   │   BlobStateStore     │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            │   upload / download / delete / list
//!            ↓                          ↓
//! ┌─────────────────────────────────────────────────┐
//! │ ObjectStore (memory | filesystem | sqlite)       │
//! │  - one container per store                       │
//! │  - container created lazily on first use         │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Keys are `/`-separated strings such as `app1/E1-T1/installer-latest`.
//! No ordering is promised by [`ObjectStore::list`].

mod filesystem;
mod memory;
mod sqlite;

pub use filesystem::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use sqlite::SqliteObjectStore;

/// Result alias for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Lazily produced sequence of keys returned by [`ObjectStore::list`].
pub type KeyIter<'a> = Box<dyn Iterator<Item = StoreResult<String>> + Send + 'a>;

/// Errors produced by object store backends.
///
/// A missing object is not an error: [`ObjectStore::download`] returns
/// `Ok(None)`. Every variant here means the store failed or held garbage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key cannot be mapped onto the backend's namespace.
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend service failure (database error, unreachable service).
    #[error("backend error: {0}")]
    Backend(String),

    /// The object exists but its payload could not be decoded.
    #[error("corrupt object {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Container-scoped blob storage.
///
/// Implementations must create their container on first use when it does not
/// exist yet, so constructing a store never touches the backend.
pub trait ObjectStore: Send + Sync {
    /// Writes `data` under `key`, replacing any previous object.
    fn upload(&self, key: &str, data: &[u8]) -> StoreResult<()>;

    /// Reads the object stored under `key`.
    ///
    /// Returns `Ok(None)` when the key does not exist.
    fn download(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Removes the object under `key`. Removing a missing key is a no-op.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Lists keys starting with `prefix`. An empty prefix lists the container.
    fn list(&self, prefix: &str) -> StoreResult<KeyIter<'_>>;
}
