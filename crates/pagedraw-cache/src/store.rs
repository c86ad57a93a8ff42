//! Durable key-value persistence for the boundary cache.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pagedraw_error::{DrawError, Result};
use parking_lot::Mutex;
use tracing::debug;

use crate::BoundaryCache;

/// Synchronous durable storage. `save` must be durable when it returns.
pub trait CacheStore: Send {
    /// Load the cache stored under `key`, or `None` if nothing was saved yet.
    fn load(&self, key: &str) -> Result<Option<BoundaryCache>>;

    fn save(&self, key: &str, cache: &BoundaryCache) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(DrawError::InvalidKey {
            key: key.to_owned(),
        });
    }
    Ok(())
}

fn encode(cache: &BoundaryCache) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(cache).map_err(|source| DrawError::Serialize {
        what: "boundary cache",
        source,
    })
}

fn decode(bytes: &[u8]) -> Result<BoundaryCache> {
    serde_json::from_slice(bytes).map_err(|err| DrawError::Deserialize {
        what: "boundary cache",
        detail: err.to_string(),
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|err| DrawError::io(path, err))?;
    file.write_all(bytes).map_err(|err| DrawError::io(path, err))?;
    file.sync_all().map_err(|err| DrawError::io(path, err))
}

/// Persist the rename itself. Directories cannot be opened for syncing on
/// every platform, so this is a no-op off unix.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|err| DrawError::io(dir, err))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// One JSON file per key inside a directory.
///
/// Writes go to a sibling temp file that is fsynced and then renamed into
/// place, so a crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<BoundaryCache>> {
        validate_key(key)?;
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(DrawError::io(path, err)),
        };
        let cache = decode(&bytes)?;
        debug!(path = %path.display(), entries = cache.len(), "boundary cache loaded");
        Ok(Some(cache))
    }

    fn save(&self, key: &str, cache: &BoundaryCache) -> Result<()> {
        validate_key(key)?;
        fs::create_dir_all(&self.dir).map_err(|err| DrawError::io(&self.dir, err))?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        let bytes = encode(cache)?;
        write_synced(&tmp, &bytes)?;
        fs::rename(&tmp, &path).map_err(|err| DrawError::io(&path, err))?;
        sync_dir(&self.dir)?;
        debug!(path = %path.display(), entries = cache.len(), "boundary cache flushed");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    blobs: HashMap<String, Vec<u8>>,
    saves: u64,
    fail_saves: bool,
}

/// In-memory store. Clones share the same backing map, so a test can keep a
/// handle while a controller owns another and observe every flush.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.inner.lock().saves
    }

    /// Make subsequent saves fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.inner.lock().fail_saves = fail;
    }

    /// Decode whatever is currently stored under `key`.
    pub fn snapshot(&self, key: &str) -> Result<Option<BoundaryCache>> {
        self.load(key)
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<BoundaryCache>> {
        validate_key(key)?;
        let inner = self.inner.lock();
        inner.blobs.get(key).map(|bytes| decode(bytes)).transpose()
    }

    fn save(&self, key: &str, cache: &BoundaryCache) -> Result<()> {
        validate_key(key)?;
        let bytes = encode(cache)?;
        let mut inner = self.inner.lock();
        if inner.fail_saves {
            return Err(DrawError::io(
                format!("memory://{key}"),
                std::io::Error::other("injected save failure"),
            ));
        }
        inner.blobs.insert(key.to_owned(), bytes);
        inner.saves += 1;
        Ok(())
    }
}
