//! In-process connection store
//!
//! Mirrors the Redis data model closely enough for single-node deployments
//! and tests: hashes and sets with per-key TTLs, empty sets disappear, and
//! writes to an existing key keep its TTL. Expiry uses `tokio::time` so tests
//! can drive it with a paused clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{ConnectionStore, DomainError, StoreResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
enum Value {
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Connection store held entirely in process memory
#[derive(Debug)]
pub struct MemoryConnectionStore {
    entries: Mutex<HashMap<String, Entry>>,
    available: AtomicBool,
}

impl Default for MemoryConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnectionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: while unavailable every operation fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DomainError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }

    /// Run `f` against the live entry for `key`, purging it first if expired
    fn with_entries<T>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .is_some_and(|e| e.is_expired(Instant::now()))
        {
            entries.remove(key);
        }
        f(&mut entries)
    }
}

fn wrong_type(key: &str) -> DomainError {
    DomainError::InternalError(format!("key `{key}` holds the wrong kind of value"))
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        self.check()?;
        self.with_entries(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Hash(hash) => {
                    for (field, value) in fields {
                        hash.insert((*field).to_string(), value.clone());
                    }
                    Ok(())
                }
                Value::Set(_) => Err(wrong_type(key)),
            }
        })
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.check()?;
        self.with_entries(key, |entries| match entries.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.check()?;
        self.with_entries(key, |entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        Ok(self.with_entries(key, |entries| entries.remove(key).is_some()))
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        self.check()?;
        self.with_entries(key, |entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Set(set) => {
                    set.insert(member.to_string());
                    Ok(())
                }
                Value::Hash(_) => Err(wrong_type(key)),
            }
        })
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        self.check()?;
        self.with_entries(key, |entries| {
            let now_empty = match entries.get_mut(key) {
                None => return Ok(()),
                Some(Entry {
                    value: Value::Set(set),
                    ..
                }) => {
                    set.remove(member);
                    set.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if now_empty {
                entries.remove(key);
            }
            Ok(())
        })
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        self.with_entries(key, |entries| match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check()?;
        Ok(self.with_entries(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }))
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.check()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| !e.is_expired(now));

        let keys = match pattern.strip_suffix('*') {
            Some(prefix) => entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => entries
                .keys()
                .filter(|k| k.as_str() == pattern)
                .cloned()
                .collect(),
        };
        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }
}
