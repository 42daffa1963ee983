//! Key-value storage behind the pool
//!
//! The pool persists flat typed entries (`key_count`, `api_key_0_key`, ...)
//! through the `KeyValueStore` trait. `FileStore` keeps them in a JSON file
//! written atomically (temp file + rename, 0600) and serializes writers with a
//! tokio Mutex. `MemoryStore` is the ephemeral backend used in tests.
//!
//! `write_batch` merges a batch into the existing entries and leaves other
//! keys alone. `replace_prefix` also drops every existing key under a prefix
//! that the batch does not rewrite, so shrinking collections leave nothing
//! stale behind.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A typed value in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl StoredValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StoredValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoredValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// All entries of a store, ordered by key.
pub type Entries = BTreeMap<String, StoredValue>;

/// Durable key-value storage.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn KeyValueStore>`).
pub trait KeyValueStore: Send + Sync {
    /// Snapshot of every entry.
    fn read_all(&self) -> Pin<Box<dyn Future<Output = Result<Entries>> + Send + '_>>;

    /// Merge `batch` into the store and persist it as one write.
    fn write_batch(
        &self,
        batch: Vec<(String, StoredValue)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Drop every key starting with `prefix`, then merge `batch`, as one write.
    fn replace_prefix<'a>(
        &'a self,
        prefix: &'a str,
        batch: Vec<(String, StoredValue)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

fn apply(state: &mut Entries, prefix: Option<&str>, batch: Vec<(String, StoredValue)>) {
    if let Some(prefix) = prefix {
        state.retain(|key, _| !key.starts_with(prefix));
    }
    state.extend(batch);
}

/// JSON-file backed store.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<Entries>,
}

impl FileStore {
    /// Load entries from `path`.
    ///
    /// A missing file is a cold start: the store begins empty and the file is
    /// created as `{}` so later loads take the normal path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Store(format!("reading store file: {e}")))?;
            let entries: Entries = serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("parsing store file: {e}")))?;
            info!(path = %path.display(), entries = entries.len(), "loaded key store");
            entries
        } else {
            info!(path = %path.display(), "key store not found, starting empty");
            let entries = Entries::new();
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Store(format!("creating store directory: {e}")))?;
            }
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn read_all(&self) -> Pin<Box<dyn Future<Output = Result<Entries>> + Send + '_>> {
        Box::pin(async move { Ok(self.state.lock().await.clone()) })
    }

    fn write_batch(
        &self,
        batch: Vec<(String, StoredValue)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.write(None, batch).await })
    }

    fn replace_prefix<'a>(
        &'a self,
        prefix: &'a str,
        batch: Vec<(String, StoredValue)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.write(Some(prefix), batch).await })
    }
}

impl FileStore {
    /// Apply the change to a copy and swap it in only once the file is written.
    async fn write(&self, prefix: Option<&str>, batch: Vec<(String, StoredValue)>) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        apply(&mut next, prefix, batch);
        write_atomic(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

/// Write entries to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. The file holds API keys, so it is created 0600 on unix.
async fn write_atomic(path: &Path, entries: &Entries) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| Error::Store(format!("serializing store: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store");
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Store(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), entries = entries.len(), "persisted key store");
    Ok(())
}

/// In-memory store that counts writes and can be told to fail them.
#[derive(Default)]
pub struct MemoryStore {
    state: std::sync::Mutex<Entries>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing entries.
    pub fn with_entries(entries: Entries) -> Self {
        Self {
            state: std::sync::Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Number of successful `write_batch` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail (simulated storage fault).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn write(&self, prefix: Option<&str>, batch: Vec<(String, StoredValue)>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("simulated write failure".into()));
        }
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut state, prefix, batch);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot(&self) -> Entries {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn read_all(&self) -> Pin<Box<dyn Future<Output = Result<Entries>> + Send + '_>> {
        let entries = self.snapshot();
        Box::pin(async move { Ok(entries) })
    }

    fn write_batch(
        &self,
        batch: Vec<(String, StoredValue)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let result = self.write(None, batch);
        Box::pin(async move { result })
    }

    fn replace_prefix<'a>(
        &'a self,
        prefix: &'a str,
        batch: Vec<(String, StoredValue)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let result = self.write(Some(prefix), batch);
        Box::pin(async move { result })
    }
}
