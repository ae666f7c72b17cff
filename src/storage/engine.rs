//! Embedded multi-database storage engine.
//!
//! Holds the five Redis value types with per-key expiry, split across
//! [`NUM_DATABASES`] logical databases. Each database keeps its keys in a
//! `BTreeMap` behind one `RwLock`: ordered keys give `SCAN` a resumption
//! point that stays valid while other clients write.
//!
//! Expiry is lazy. Readers skip expired entries, writers drop them before
//! touching the key.
//!
//! ```
//! use keyscope::storage::StorageEngine;
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//! engine.set(0, Bytes::from("name"), Bytes::from("Ariz"), None).unwrap();
//! assert_eq!(engine.get(0, b"name").unwrap(), Some(Bytes::from("Ariz")));
//! assert_eq!(engine.key_type(1, b"name").unwrap(), "none");
//! ```

use crate::storage::glob::GlobPattern;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Number of logical databases, same default as Redis.
pub const NUM_DATABASES: usize = 16;

/// Errors reported by the engine. The messages are the store's error text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR DB index is out of range")]
    DbOutOfRange,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(BTreeSet<Bytes>),
    Hash(BTreeMap<Bytes, Bytes>),
    /// Member to score. Ordering by score happens on read.
    ZSet(BTreeMap<Bytes, f64>),
}

impl Value {
    /// The name `TYPE` reports for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::ZSet(_) => "zset",
        }
    }

    fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }
}

/// A value plus its optional deadline.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }

    /// Remaining lifetime in milliseconds, or None if the key never expires.
    pub fn ttl_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()).as_millis() as u64)
    }
}

/// One step of a `SCAN` over a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStep {
    /// Matching keys among those examined.
    pub keys: Vec<Bytes>,
    /// Last key examined, or None when the iteration is complete.
    pub resume_after: Option<Bytes>,
}

type Keyspace = BTreeMap<Bytes, Entry>;

#[derive(Debug, Default)]
struct Database {
    entries: RwLock<Keyspace>,
}

impl Database {
    fn read(&self) -> RwLockReadGuard<'_, Keyspace> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Keyspace> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The embedded store shared by every [`MemoryClient`](crate::backend::MemoryClient).
#[derive(Debug)]
pub struct StorageEngine {
    databases: Vec<Database>,
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self::with_databases(NUM_DATABASES)
    }

    pub fn with_databases(count: usize) -> Self {
        Self {
            databases: (0..count.max(1)).map(|_| Database::default()).collect(),
        }
    }

    /// Number of logical databases (what `CONFIG GET databases` reports).
    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    fn database(&self, db: usize) -> StorageResult<&Database> {
        self.databases.get(db).ok_or(StorageError::DbOutOfRange)
    }

    pub fn check_db(&self, db: usize) -> StorageResult<()> {
        self.database(db).map(|_| ())
    }

    /// Runs `f` against the live (non-expired) value at `key`, if any.
    fn read_value<T>(
        &self,
        db: usize,
        key: &[u8],
        f: impl FnOnce(Option<&Value>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let entries = self.database(db)?.read();
        let value = entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| &entry.value);
        f(value)
    }

    /// Runs `f` against the value at `key`, creating it with `empty` first.
    /// Keys left holding an empty collection are removed, like Redis does.
    fn write_value<T>(
        &self,
        db: usize,
        key: Bytes,
        empty: fn() -> Value,
        f: impl FnOnce(&mut Value) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut entries = self.database(db)?.write();
        if entries.get(&key).is_some_and(Entry::is_expired) {
            entries.remove(&key);
        }

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(empty()));
        let result = f(&mut entry.value);
        if entry.value.is_empty_collection() {
            entries.remove(&key);
        }
        result
    }

    // ========================================================================
    // Keyspace
    // ========================================================================

    /// Deletes keys, returning how many existed.
    pub fn delete(&self, db: usize, keys: &[Bytes]) -> StorageResult<u64> {
        let mut entries = self.database(db)?.write();
        let mut deleted = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired() {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    /// Counts how many of the given keys exist.
    pub fn exists(&self, db: usize, keys: &[Bytes]) -> StorageResult<u64> {
        let entries = self.database(db)?.read();
        Ok(keys
            .iter()
            .filter(|key| entries.get(*key).is_some_and(|e| !e.is_expired()))
            .count() as u64)
    }

    /// Type name of the key, `"none"` when absent.
    pub fn key_type(&self, db: usize, key: &[u8]) -> StorageResult<&'static str> {
        self.read_value(db, key, |value| Ok(value.map_or("none", Value::type_name)))
    }

    /// Remaining lifetime in milliseconds: `-2` absent, `-1` no expiry.
    pub fn pttl(&self, db: usize, key: &[u8]) -> StorageResult<i64> {
        let entries = self.database(db)?.read();
        Ok(match entries.get(key).filter(|e| !e.is_expired()) {
            None => -2,
            Some(entry) => entry.ttl_ms().map_or(-1, |ms| ms as i64),
        })
    }

    /// Remaining lifetime in seconds, rounded to nearest like Redis.
    pub fn ttl(&self, db: usize, key: &[u8]) -> StorageResult<i64> {
        let ms = self.pttl(db, key)?;
        Ok(if ms < 0 { ms } else { (ms + 500) / 1000 })
    }

    /// Sets a deadline on an existing key. Returns false if the key is absent.
    pub fn expire(&self, db: usize, key: &[u8], ttl: Duration) -> StorageResult<bool> {
        let mut entries = self.database(db)?.write();
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
        }
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes the deadline of a key. Returns false if there was none.
    pub fn persist(&self, db: usize, key: &[u8]) -> StorageResult<bool> {
        let mut entries = self.database(db)?.write();
        Ok(match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => entry.expires_at.take().is_some(),
            _ => false,
        })
    }

    /// All live keys matching `pattern`, in key order.
    ///
    /// This walks the whole database under one lock. `scan` is the
    /// incremental alternative.
    pub fn keys(&self, db: usize, pattern: &str) -> StorageResult<Vec<Bytes>> {
        let pattern = GlobPattern::new(pattern);
        let entries = self.database(db)?.read();
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    /// Examines up to `count` keys strictly after `after` (or from the start)
    /// and returns those matching `pattern`.
    ///
    /// A key present for the whole iteration is returned exactly once.
    pub fn scan(
        &self,
        db: usize,
        after: Option<&[u8]>,
        count: usize,
        pattern: Option<&GlobPattern>,
    ) -> StorageResult<ScanStep> {
        let entries = self.database(db)?.read();
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut examined = entries.range::<[u8], _>((lower, Bound::Unbounded));
        let mut keys = Vec::new();
        let mut last = None;
        for (key, entry) in examined.by_ref().take(count.max(1)) {
            last = Some(key.clone());
            if entry.is_expired() {
                continue;
            }
            if pattern.map_or(true, |p| p.matches(key)) {
                keys.push(key.clone());
            }
        }

        let more = examined.next().is_some();
        Ok(ScanStep {
            keys,
            resume_after: if more { last } else { None },
        })
    }

    /// Number of live keys in a database.
    pub fn len(&self, db: usize) -> StorageResult<usize> {
        let entries = self.database(db)?.read();
        Ok(entries.values().filter(|e| !e.is_expired()).count())
    }

    pub fn flush(&self, db: usize) -> StorageResult<()> {
        self.database(db)?.write().clear();
        Ok(())
    }

    pub fn flush_all(&self) {
        for database in &self.databases {
            database.write().clear();
        }
    }

    // ========================================================================
    // Strings
    // ========================================================================

    /// Stores a string, replacing any value and deadline the key had.
    pub fn set(
        &self,
        db: usize,
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        let mut entries = self.database(db)?.write();
        entries.insert(
            key,
            Entry {
                value: Value::String(value),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    pub fn get(&self, db: usize, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.read_value(db, key, |value| match value {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    // ========================================================================
    // Lists
    // ========================================================================

    /// Pushes values at the head (`front`) or tail. Returns the new length.
    pub fn push(
        &self,
        db: usize,
        key: Bytes,
        values: Vec<Bytes>,
        front: bool,
    ) -> StorageResult<usize> {
        self.write_value(db, key, || Value::List(VecDeque::new()), |value| {
            let Value::List(list) = value else {
                return Err(StorageError::WrongType);
            };
            for v in values {
                if front {
                    list.push_front(v);
                } else {
                    list.push_back(v);
                }
            }
            Ok(list.len())
        })
    }

    /// Elements between `start` and `stop` inclusive; negative indices count
    /// from the end.
    pub fn lrange(&self, db: usize, key: &[u8], start: i64, stop: i64) -> StorageResult<Vec<Bytes>> {
        self.read_value(db, key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(match clamp_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    pub fn llen(&self, db: usize, key: &[u8]) -> StorageResult<usize> {
        self.read_value(db, key, |value| match value {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len()),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    // ========================================================================
    // Sets
    // ========================================================================

    /// Adds members, returning how many were new.
    pub fn sadd(&self, db: usize, key: Bytes, members: Vec<Bytes>) -> StorageResult<usize> {
        self.write_value(db, key, || Value::Set(BTreeSet::new()), |value| {
            let Value::Set(set) = value else {
                return Err(StorageError::WrongType);
            };
            Ok(members.into_iter().filter(|m| set.insert(m.clone())).count())
        })
    }

    pub fn smembers(&self, db: usize, key: &[u8]) -> StorageResult<Vec<Bytes>> {
        self.read_value(db, key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    pub fn scard(&self, db: usize, key: &[u8]) -> StorageResult<usize> {
        self.read_value(db, key, |value| match value {
            None => Ok(0),
            Some(Value::Set(set)) => Ok(set.len()),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    // ========================================================================
    // Hashes
    // ========================================================================

    /// Sets fields, returning how many were new.
    pub fn hset(&self, db: usize, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> StorageResult<usize> {
        self.write_value(db, key, || Value::Hash(BTreeMap::new()), |value| {
            let Value::Hash(hash) = value else {
                return Err(StorageError::WrongType);
            };
            Ok(pairs
                .into_iter()
                .filter(|(field, v)| hash.insert(field.clone(), v.clone()).is_none())
                .count())
        })
    }

    pub fn hget(&self, db: usize, key: &[u8], field: &[u8]) -> StorageResult<Option<Bytes>> {
        self.read_value(db, key, |value| match value {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    pub fn hgetall(&self, db: usize, key: &[u8]) -> StorageResult<Vec<(Bytes, Bytes)>> {
        self.read_value(db, key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::Hash(hash)) => Ok(hash
                .iter()
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect()),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    pub fn hlen(&self, db: usize, key: &[u8]) -> StorageResult<usize> {
        self.read_value(db, key, |value| match value {
            None => Ok(0),
            Some(Value::Hash(hash)) => Ok(hash.len()),
            Some(_) => Err(StorageError::WrongType),
        })
    }

    // ========================================================================
    // Sorted sets
    // ========================================================================

    /// Adds or re-scores members, returning how many were new.
    pub fn zadd(&self, db: usize, key: Bytes, members: Vec<(f64, Bytes)>) -> StorageResult<usize> {
        self.write_value(db, key, || Value::ZSet(BTreeMap::new()), |value| {
            let Value::ZSet(zset) = value else {
                return Err(StorageError::WrongType);
            };
            Ok(members
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
                .count())
        })
    }

    /// Members by rank (ascending score, ties by member bytes).
    pub fn zrange(
        &self,
        db: usize,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> StorageResult<Vec<(Bytes, f64)>> {
        self.read_value(db, key, |value| match value {
            None => Ok(Vec::new()),
            Some(Value::ZSet(zset)) => {
                let mut ranked: Vec<(Bytes, f64)> =
                    zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
                ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                Ok(match clamp_range(ranked.len(), start, stop) {
                    Some((from, to)) => ranked.drain(from..=to).collect(),
                    None => Vec::new(),
                })
            }
            Some(_) => Err(StorageError::WrongType),
        })
    }

    pub fn zcard(&self, db: usize, key: &[u8]) -> StorageResult<usize> {
        self.read_value(db, key, |value| match value {
            None => Ok(0),
            Some(Value::ZSet(zset)) => Ok(zset.len()),
            Some(_) => Err(StorageError::WrongType),
        })
    }
}

/// Resolves an inclusive Redis index range against a collection length.
fn clamp_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}
