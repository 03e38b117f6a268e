//! Filesystem object store.
//!
//! Each container is a directory under a base path and each object is a file.
//! A `/` in a key maps to a sub-directory, so
//! `app1/E1-T1/installer-latest` lands at
//! `{base}/{container}/app1/E1-T1/installer-latest`.
//!
//! Writes are atomic: each write goes to its own hidden `.{name}.XXXXXX.tmp`
//! file, is fsynced, then renamed over the final path. Readers never observe
//! a partial object and concurrent writers to one key do not share a temp
//! file, so the last rename wins.
//!
//! With compression enabled payloads are gzipped. Reads detect the gzip
//! header, so a container may mix compressed and plain objects.

use super::{KeyIter, ObjectStore, StoreError, StoreResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, ReadDir};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Object store backed by a directory tree.
pub struct FsObjectStore {
    root: PathBuf,
    compress: bool,
    container_ready: AtomicBool,
}

impl FsObjectStore {
    /// Creates a store for `container` under `base_dir`.
    ///
    /// Nothing is created on disk until the first operation.
    ///
    /// # Returns
    /// * `Err(StoreError::InvalidKey)` - If `container` is not a single path segment
    pub fn new<P: AsRef<Path>>(base_dir: P, container: &str) -> StoreResult<Self> {
        validate_segment(container).map_err(|reason| StoreError::InvalidKey {
            key: container.to_string(),
            reason,
        })?;

        Ok(Self {
            root: base_dir.as_ref().join(container),
            compress: false,
            container_ready: AtomicBool::new(false),
        })
    }

    /// Enables or disables gzip compression for new writes.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Directory holding this container's objects.
    pub fn container_path(&self) -> &Path {
        &self.root
    }

    fn ensure_container(&self) -> StoreResult<()> {
        if self.container_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        if !self.root.is_dir() {
            fs::create_dir_all(&self.root)?;
            info!(path = %self.root.display(), "Created object store container");
        }

        self.container_ready.store(true, Ordering::Release);
        Ok(())
    }

    fn object_path(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key is empty",
            });
        }

        let mut path = self.root.clone();
        for segment in key.split('/') {
            validate_segment(segment).map_err(|reason| StoreError::InvalidKey {
                key: key.to_string(),
                reason,
            })?;
            path.push(segment);
        }
        Ok(path)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        let parent = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Dropped (and removed) on any error before persist.
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(parent)?;

        let file = if self.compress {
            let mut encoder = GzEncoder::new(tmp, Compression::default());
            encoder.write_all(data)?;
            encoder.finish()?
        } else {
            let mut tmp = tmp;
            tmp.write_all(data)?;
            tmp
        };
        file.as_file().sync_all()?;

        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn upload(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        self.ensure_container()?;
        let path = self.object_path(key)?;
        self.write_atomic(&path, data)?;
        debug!(key = %key, bytes = data.len(), compressed = self.compress, "Uploaded object");
        Ok(())
    }

    fn download(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_container()?;
        let path = self.object_path(key)?;

        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !raw.starts_with(&GZIP_MAGIC) {
            return Ok(Some(raw));
        }

        let mut data = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut data)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("failed to decompress: {}", e),
            })?;
        Ok(Some(data))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_container()?;
        let path = self.object_path(key)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<KeyIter<'_>> {
        self.ensure_container()?;

        let (dir_part, name_filter) = match prefix.rfind('/') {
            Some(idx) => (&prefix[..idx], &prefix[idx + 1..]),
            None => ("", prefix),
        };

        let mut dir = self.root.clone();
        if !dir_part.is_empty() {
            for segment in dir_part.split('/') {
                if validate_segment(segment).is_err() {
                    // No stored key can contain this segment.
                    return Ok(Box::new(std::iter::empty::<StoreResult<String>>()));
                }
                dir.push(segment);
            }
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty::<StoreResult<String>>()));
            }
            Err(e) => return Err(e.into()),
        };

        let key_prefix = if dir_part.is_empty() {
            String::new()
        } else {
            format!("{}/", dir_part)
        };

        Ok(Box::new(KeyWalker {
            frames: vec![Frame {
                entries,
                key_prefix,
                name_filter: name_filter.to_string(),
            }],
        }))
    }
}

fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty path segment");
    }
    if segment.starts_with('.') {
        return Err("segment starts with '.'");
    }
    if segment.contains(|c: char| c == '\\' || c == '\0') {
        return Err("segment contains a reserved character");
    }
    Ok(())
}

struct Frame {
    entries: ReadDir,
    key_prefix: String,
    name_filter: String,
}

/// Depth-first directory walk yielding object keys one at a time.
struct KeyWalker {
    frames: Vec<Frame>,
}

impl Iterator for KeyWalker {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.frames.last_mut()?;
            let entry = match frame.entries.next() {
                None => {
                    self.frames.pop();
                    continue;
                }
                Some(Err(e)) => return Some(Err(e.into())),
                Some(Ok(entry)) => entry,
            };

            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(frame.name_filter.as_str()) {
                continue;
            }
            let key = format!("{}{}", frame.key_prefix, name);

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => return Some(Err(e.into())),
            };

            if file_type.is_file() {
                return Some(Ok(key));
            }

            if file_type.is_dir() {
                match fs::read_dir(entry.path()) {
                    Ok(entries) => self.frames.push(Frame {
                        entries,
                        key_prefix: format!("{}/", key),
                        name_filter: String::new(),
                    }),
                    // Removed between readdir and open.
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Some(Err(e.into())),
                }
            }
        }
    }
}
