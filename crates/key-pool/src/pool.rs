//! Credential pool state and round-robin key selection
//!
//! The pool keeps its keys in insertion order together with a rotation
//! cursor, both behind one tokio Mutex. Each mutation updates memory and
//! writes the whole pool through to the store before the lock is released,
//! so callers never observe a half-applied change.
//!
//! Selection takes `active[cursor % active.len()]` and bumps the cursor. The
//! cursor is never reset, so when keys are quarantined or re-enabled between
//! calls the effective position shifts. This is lightweight rotation, not
//! strict fairness across membership changes.

use std::sync::Arc;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{Entries, KeyValueStore, StoredValue};

/// Maximum number of keys in one pool.
pub const MAX_KEYS: usize = 5;

const KEY_PREFIX: &str = "api_key_";
const KEY_COUNT: &str = "key_count";

/// One API key with its usage statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub secret: Secret<String>,
    pub label: String,
    pub active: bool,
    pub usage_count: u64,
    /// Unix timestamp in milliseconds
    pub last_used_at: u64,
}

impl Credential {
    fn new(secret: String, label: String) -> Self {
        Self {
            secret: Secret::new(secret),
            label,
            active: true,
            usage_count: 0,
            last_used_at: now_millis(),
        }
    }
}

struct PoolState {
    entries: Vec<Credential>,
    cursor: usize,
}

/// Bounded, persisted set of API keys with round-robin selection.
pub struct CredentialPool {
    state: Mutex<PoolState>,
    store: Arc<dyn KeyValueStore>,
}

impl CredentialPool {
    /// Build a pool from whatever the store already holds.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let entries = decode(&store.read_all().await?);
        info!(keys = entries.len(), "key pool loaded");
        record_active_gauge(&entries);
        Ok(Self {
            state: Mutex::new(PoolState { entries, cursor: 0 }),
            store,
        })
    }

    /// Append a key. Returns false if the pool is full or the key is already present.
    pub async fn add(&self, secret: impl Into<String>, label: impl Into<String>) -> Result<bool> {
        let secret = secret.into();
        let label = label.into();
        let mut state = self.state.lock().await;

        if state.entries.len() >= MAX_KEYS {
            warn!(max = MAX_KEYS, "key pool is full");
            return Ok(false);
        }
        if state.entries.iter().any(|c| c.secret.expose() == &secret) {
            warn!(label, "key already in pool");
            return Ok(false);
        }

        state.entries.push(Credential::new(secret, label.clone()));
        self.persist(&state.entries).await?;
        info!(label, keys = state.entries.len(), "added key");
        Ok(true)
    }

    /// Remove the key at `index`. Returns false if out of range.
    pub async fn remove(&self, index: usize) -> Result<bool> {
        let mut state = self.state.lock().await;
        if index >= state.entries.len() {
            return Ok(false);
        }

        let removed = state.entries.remove(index);
        self.persist(&state.entries).await?;
        info!(label = removed.label, index, "removed key");
        Ok(true)
    }

    /// Replace label and active flag at `index`; usage stats stay as they are.
    pub async fn update(&self, index: usize, label: impl Into<String>, active: bool) -> Result<bool> {
        let label = label.into();
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.get_mut(index) else {
            return Ok(false);
        };

        entry.label = label.clone();
        entry.active = active;
        self.persist(&state.entries).await?;
        info!(label, index, active, "updated key");
        Ok(true)
    }

    /// Pick the next active key round-robin and record its use.
    ///
    /// Returns `None` without touching the store when no key is active.
    pub async fn next_credential(&self) -> Result<Option<Secret<String>>> {
        let mut state = self.state.lock().await;

        let active: Vec<&Credential> = state.entries.iter().filter(|c| c.active).collect();
        if active.is_empty() {
            warn!("no active keys available");
            return Ok(None);
        }

        let picked = active[state.cursor % active.len()].secret.clone();
        state.cursor = state.cursor.wrapping_add(1);

        let Some(entry) = state.entries.iter_mut().find(|c| c.secret == picked) else {
            return Ok(Some(picked));
        };
        entry.usage_count += 1;
        entry.last_used_at = now_millis();
        let (label, usage) = (entry.label.clone(), entry.usage_count);

        self.persist(&state.entries).await?;
        metrics::counter!("key_pool_selections_total").increment(1);
        debug!(label, usage, "selected key");
        Ok(Some(picked))
    }

    /// Take a key out of rotation. Unknown keys are ignored.
    pub async fn mark_failed(&self, secret: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.iter_mut().find(|c| c.secret.expose() == secret) else {
            debug!("mark_failed for unknown key ignored");
            return Ok(());
        };

        entry.active = false;
        let label = entry.label.clone();
        self.persist(&state.entries).await?;
        metrics::counter!("key_pool_failures_total").increment(1);
        warn!(label, "marked key as failed");
        Ok(())
    }

    /// Return every quarantined key to rotation. Writes only if something changed.
    pub async fn reset_failed(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut changed = 0usize;
        for entry in state.entries.iter_mut().filter(|c| !c.active) {
            entry.active = true;
            changed += 1;
        }

        if changed > 0 {
            self.persist(&state.entries).await?;
            info!(reset = changed, "reset failed keys");
        }
        Ok(())
    }

    /// Snapshot of every key in insertion order.
    pub async fn list_all(&self) -> Vec<Credential> {
        self.state.lock().await.entries.clone()
    }

    /// Snapshot of the active keys in insertion order.
    pub async fn list_active(&self) -> Vec<Credential> {
        let state = self.state.lock().await;
        state.entries.iter().filter(|c| c.active).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Pool summary for status output. Never includes key material.
    ///
    /// Status mapping: all active → healthy, some active → degraded,
    /// none active (or empty) → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let state = self.state.lock().await;
        let total = state.entries.len();
        let active = state.entries.iter().filter(|c| c.active).count();

        let keys: Vec<serde_json::Value> = state
            .entries
            .iter()
            .enumerate()
            .map(|(index, c)| {
                serde_json::json!({
                    "index": index,
                    "label": c.label,
                    "hint": c.secret.hint(),
                    "active": c.active,
                    "usage_count": c.usage_count,
                    "last_used_at": c.last_used_at,
                })
            })
            .collect();

        let status = if active == total && total > 0 {
            "healthy"
        } else if active > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "keys_total": total,
            "keys_active": active,
            "keys_failed": total - active,
            "keys": keys,
        })
    }

    async fn persist(&self, entries: &[Credential]) -> Result<()> {
        record_active_gauge(entries);
        self.store.replace_prefix(KEY_PREFIX, encode(entries)).await
    }
}

fn record_active_gauge(entries: &[Credential]) {
    let active = entries.iter().filter(|c| c.active).count();
    metrics::gauge!("key_pool_active_keys").set(active as f64);
}

fn field(index: usize, name: &str) -> String {
    format!("{KEY_PREFIX}{index}_{name}")
}

/// Flatten the pool into store entries.
fn encode(entries: &[Credential]) -> Vec<(String, StoredValue)> {
    let mut batch = Vec::with_capacity(1 + entries.len() * 5);
    batch.push((KEY_COUNT.to_string(), StoredValue::Int(entries.len() as i64)));
    for (i, c) in entries.iter().enumerate() {
        batch.push((field(i, "key"), StoredValue::Str(c.secret.expose().clone())));
        batch.push((field(i, "name"), StoredValue::Str(c.label.clone())));
        batch.push((field(i, "active"), StoredValue::Bool(c.active)));
        batch.push((field(i, "usage"), StoredValue::Int(c.usage_count as i64)));
        batch.push((field(i, "last_used"), StoredValue::Int(c.last_used_at as i64)));
    }
    batch
}

/// Rebuild the pool from store entries.
///
/// Iterates `0..key_count`; indices without a stored key are skipped, other
/// missing fields take their defaults. Duplicate keys keep the first copy.
/// Nothing past `MAX_KEYS` is read.
fn decode(entries: &Entries) -> Vec<Credential> {
    let stored_count = entries
        .get(KEY_COUNT)
        .and_then(StoredValue::as_int)
        .unwrap_or(0)
        .max(0);
    if stored_count > MAX_KEYS as i64 {
        warn!(stored_count, max = MAX_KEYS, "key count in store exceeds pool limit, truncating");
    }
    let count = stored_count.min(MAX_KEYS as i64) as usize;

    let mut credentials: Vec<Credential> = Vec::with_capacity(count);
    for i in 0..count {
        let Some(secret) = entries.get(&field(i, "key")).and_then(StoredValue::as_str) else {
            continue;
        };
        if credentials.iter().any(|c| c.secret.expose() == secret) {
            warn!(index = i, "duplicate key in store, skipping");
            continue;
        }

        let label = entries
            .get(&field(i, "name"))
            .and_then(StoredValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("API Key {}", i + 1));
        let active = entries
            .get(&field(i, "active"))
            .and_then(StoredValue::as_bool)
            .unwrap_or(true);
        let usage_count = entries
            .get(&field(i, "usage"))
            .and_then(StoredValue::as_int)
            .unwrap_or(0)
            .max(0) as u64;
        let last_used_at = entries
            .get(&field(i, "last_used"))
            .and_then(StoredValue::as_int)
            .map(|t| t.max(0) as u64)
            .unwrap_or_else(now_millis);

        credentials.push(Credential {
            secret: Secret::new(secret.to_string()),
            label,
            active,
            usage_count,
            last_used_at,
        });
    }
    credentials
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use std::collections::HashMap;

    async fn memory_pool() -> (CredentialPool, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pool = CredentialPool::load(store.clone()).await.unwrap();
        (pool, store)
    }

    async fn pool_with(keys: &[&str]) -> (CredentialPool, Arc<MemoryStore>) {
        let (pool, store) = memory_pool().await;
        for (i, key) in keys.iter().enumerate() {
            assert!(pool.add(*key, format!("API Key {}", i + 1)).await.unwrap());
        }
        (pool, store)
    }

    fn secrets(list: &[Credential]) -> Vec<String> {
        list.iter().map(|c| c.secret.expose().clone()).collect()
    }

    async fn next(pool: &CredentialPool) -> String {
        pool.next_credential()
            .await
            .unwrap()
            .expect("an active key")
            .expose()
            .clone()
    }

    #[tokio::test]
    async fn add_preserves_insertion_order_and_fields() {
        let (pool, _store) = pool_with(&["k-a", "k-b", "k-c"]).await;

        let all = pool.list_all().await;
        assert_eq!(secrets(&all), vec!["k-a", "k-b", "k-c"]);
        assert_eq!(all[1].label, "API Key 2");
        assert!(all.iter().all(|c| c.active && c.usage_count == 0));
        assert!(all.iter().all(|c| c.last_used_at > 0));
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected_without_change() {
        let (pool, store) = pool_with(&["k-a"]).await;
        let writes = store.writes();

        assert!(!pool.add("k-a", "again").await.unwrap());
        assert_eq!(pool.len().await, 1);
        assert_eq!(pool.list_all().await[0].label, "API Key 1");
        assert_eq!(store.writes(), writes);
    }

    #[tokio::test]
    async fn sixth_key_is_rejected() {
        let (pool, _store) = pool_with(&["k1", "k2", "k3", "k4", "k5"]).await;
        assert!(!pool.add("k6", "sixth").await.unwrap());
        assert_eq!(pool.len().await, MAX_KEYS);
    }

    #[tokio::test]
    async fn remove_and_update_check_bounds() {
        let (pool, _store) = pool_with(&["k-a", "k-b"]).await;

        assert!(!pool.remove(2).await.unwrap());
        assert!(!pool.update(5, "x", true).await.unwrap());

        pool.next_credential().await.unwrap();
        assert!(pool.update(0, "renamed", false).await.unwrap());
        let first = &pool.list_all().await[0];
        assert_eq!(first.label, "renamed");
        assert!(!first.active);
        assert_eq!(first.usage_count, 1, "update must keep usage stats");

        assert!(pool.remove(0).await.unwrap());
        assert_eq!(secrets(&pool.list_all().await), vec!["k-b"]);
    }

    #[tokio::test]
    async fn mark_failed_then_reset_restores_visibility() {
        let (pool, _store) = pool_with(&["k-a", "k-b"]).await;

        pool.mark_failed("k-a").await.unwrap();
        assert_eq!(secrets(&pool.list_active().await), vec!["k-b"]);

        pool.reset_failed().await.unwrap();
        assert_eq!(secrets(&pool.list_active().await), vec!["k-a", "k-b"]);
    }

    #[tokio::test]
    async fn mark_failed_unknown_key_does_not_write() {
        let (pool, store) = pool_with(&["k-a"]).await;
        let writes = store.writes();
        pool.mark_failed("nope").await.unwrap();
        assert_eq!(store.writes(), writes);
        assert_eq!(pool.list_active().await.len(), 1);
    }

    #[tokio::test]
    async fn reset_failed_writes_once_only_when_needed() {
        let (pool, store) = pool_with(&["k-a", "k-b"]).await;
        let writes = store.writes();

        pool.reset_failed().await.unwrap();
        assert_eq!(store.writes(), writes);

        pool.mark_failed("k-a").await.unwrap();
        pool.mark_failed("k-b").await.unwrap();
        let writes = store.writes();
        pool.reset_failed().await.unwrap();
        assert_eq!(store.writes(), writes + 1);
    }

    #[tokio::test]
    async fn round_robin_visits_each_active_key_fairly() {
        let (pool, _store) = pool_with(&["k-a", "k-b", "k-c"]).await;

        let n = 10;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..n {
            *counts.entry(next(&pool).await).or_default() += 1;
        }
        for key in ["k-a", "k-b", "k-c"] {
            assert!(counts[key] >= n / 3, "{key} visited {} times", counts[key]);
        }

        let usage: u64 = pool.list_all().await.iter().map(|c| c.usage_count).sum();
        assert_eq!(usage, n as u64);
    }

    #[tokio::test]
    async fn cursor_drifts_when_active_set_changes() {
        let (pool, _store) = pool_with(&["k-a", "k-b", "k-c"]).await;

        assert_eq!(next(&pool).await, "k-a"); // cursor 0
        pool.mark_failed("k-a").await.unwrap();
        // active = [k-b, k-c], cursor 1 → k-c
        assert_eq!(next(&pool).await, "k-c");
        // cursor 2 → k-b
        assert_eq!(next(&pool).await, "k-b");
    }

    #[tokio::test]
    async fn empty_active_set_returns_none_without_writing() {
        let (pool, store) = pool_with(&["k-a"]).await;
        pool.mark_failed("k-a").await.unwrap();
        let writes = store.writes();

        assert!(pool.next_credential().await.unwrap().is_none());
        assert_eq!(store.writes(), writes);

        let (empty, store) = memory_pool().await;
        assert!(empty.next_credential().await.unwrap().is_none());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn roundtrip_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let store = Arc::new(FileStore::load(path.clone()).await.unwrap());
        let pool = CredentialPool::load(store).await.unwrap();
        pool.add("k-a", "first").await.unwrap();
        pool.add("k-b", "second").await.unwrap();
        pool.add("k-c", "third").await.unwrap();
        pool.next_credential().await.unwrap();
        pool.mark_failed("k-c").await.unwrap();
        let before = pool.list_all().await;

        let reopened = Arc::new(FileStore::load(path).await.unwrap());
        let fresh = CredentialPool::load(reopened).await.unwrap();
        assert_eq!(fresh.list_all().await, before);
    }

    #[tokio::test]
    async fn load_skips_holes_and_applies_defaults() {
        let mut entries = Entries::new();
        entries.insert(KEY_COUNT.into(), StoredValue::Int(3));
        entries.insert(field(0, "key"), StoredValue::Str("k-a".into()));
        entries.insert(field(0, "active"), StoredValue::Bool(false));
        // index 1 has no key
        entries.insert(field(1, "name"), StoredValue::Str("orphan".into()));
        entries.insert(field(2, "key"), StoredValue::Str("k-c".into()));
        entries.insert(field(2, "usage"), StoredValue::Int(9));

        let pool = CredentialPool::load(Arc::new(MemoryStore::with_entries(entries)))
            .await
            .unwrap();
        let all = pool.list_all().await;
        assert_eq!(secrets(&all), vec!["k-a", "k-c"]);
        assert_eq!(all[0].label, "API Key 1");
        assert!(!all[0].active);
        assert_eq!(all[1].label, "API Key 3");
        assert_eq!(all[1].usage_count, 9);
    }

    #[tokio::test]
    async fn removed_key_is_erased_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let store = Arc::new(FileStore::load(path.clone()).await.unwrap());
        let pool = CredentialPool::load(store).await.unwrap();
        pool.add("gsk_keep", "keep").await.unwrap();
        pool.add("gsk_compromised", "leaked").await.unwrap();
        assert!(pool.remove(1).await.unwrap());

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!raw.contains("gsk_compromised"), "{raw}");
        assert!(!raw.contains("api_key_1_"), "{raw}");
        assert!(raw.contains("gsk_keep"));

        let reopened = Arc::new(FileStore::load(path).await.unwrap());
        let fresh = CredentialPool::load(reopened).await.unwrap();
        assert_eq!(secrets(&fresh.list_all().await), vec!["gsk_keep"]);
    }

    #[tokio::test]
    async fn oversized_key_count_is_truncated() {
        let mut entries = Entries::new();
        entries.insert(KEY_COUNT.into(), StoredValue::Int(i64::MAX));
        for i in 0..7 {
            entries.insert(field(i, "key"), StoredValue::Str(format!("k-{i}")));
        }

        let pool = CredentialPool::load(Arc::new(MemoryStore::with_entries(entries)))
            .await
            .unwrap();
        let all = pool.list_all().await;
        assert_eq!(all.len(), MAX_KEYS);
        assert_eq!(secrets(&all), vec!["k-0", "k-1", "k-2", "k-3", "k-4"]);
        assert!(!pool.add("k-new", "extra").await.unwrap());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let (pool, store) = pool_with(&["k-a"]).await;
        store.set_failing(true);
        assert!(pool.add("k-b", "second").await.is_err());
        assert!(pool.next_credential().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_selection_counts_every_use() {
        let (pool, _store) = pool_with(&["k-a", "k-b"]).await;
        let pool = Arc::new(pool);

        let mut handles = vec![];
        for _ in 0..20 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.next_credential().await.unwrap().unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let all = pool.list_all().await;
        assert_eq!(all[0].usage_count, 10);
        assert_eq!(all[1].usage_count, 10);
    }

    #[tokio::test]
    async fn health_reports_status_without_secrets() {
        let (pool, _store) = pool_with(&["gsk_secret_value_1234", "gsk_secret_value_5678"]).await;
        assert_eq!(pool.health().await["status"], "healthy");

        pool.mark_failed("gsk_secret_value_1234").await.unwrap();
        let health = pool.health().await;
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["keys_failed"], 1);
        assert_eq!(health["keys"][1]["hint"], "****5678");
        assert!(!health.to_string().contains("gsk_secret_value"));

        pool.mark_failed("gsk_secret_value_5678").await.unwrap();
        assert_eq!(pool.health().await["status"], "unhealthy");
    }
}
