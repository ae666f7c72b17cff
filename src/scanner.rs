//! Keyspace scanner.
//!
//! Lists keys in pages with `SCAN` so the store is never asked for its whole
//! keyspace at once, and attaches the type and TTL of every key. The
//! metadata of a page is fetched in one pipelined round trip.
//!
//! A lookup that fails for a single key does not fail the page: that key
//! gets the type `unknown` and/or the TTL `-2`, and a warning is logged.

use crate::backend::{StoreClient, StoreError};
use crate::codec::ValueType;
use crate::protocol::RespValue;
use crate::session::Session;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// TTL of a key that does not expire.
pub const TTL_PERSISTENT: i64 = -1;

/// TTL of a key that is gone, or whose TTL could not be read.
pub const TTL_MISSING: i64 = -2;

/// Keys per `KEYS`-based metadata round trip in [`full_listing`].
const LISTING_CHUNK: usize = 1000;

/// Type of a listed key. Anything the codec cannot handle is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    List,
    Set,
    Hash,
    #[serde(rename = "zset")]
    ZSet,
    Unknown,
}

impl KeyType {
    pub fn from_store_name(name: &str) -> Self {
        match name.parse::<ValueType>() {
            Ok(value_type) => value_type.into(),
            Err(_) => KeyType::Unknown,
        }
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            KeyType::String => Some(ValueType::String),
            KeyType::List => Some(ValueType::List),
            KeyType::Set => Some(ValueType::Set),
            KeyType::Hash => Some(ValueType::Hash),
            KeyType::ZSet => Some(ValueType::ZSet),
            KeyType::Unknown => None,
        }
    }
}

impl From<ValueType> for KeyType {
    fn from(value_type: ValueType) -> Self {
        match value_type {
            ValueType::String => KeyType::String,
            ValueType::List => KeyType::List,
            ValueType::Set => KeyType::Set,
            ValueType::Hash => KeyType::Hash,
            ValueType::ZSet => KeyType::ZSet,
        }
    }
}

/// One listed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    /// Seconds left, [`TTL_PERSISTENT`], or [`TTL_MISSING`].
    pub ttl: i64,
}

impl KeyDescriptor {
    pub fn new(name: impl Into<String>, key_type: KeyType, ttl: i64) -> Self {
        Self {
            name: name.into(),
            key_type,
            ttl,
        }
    }
}

/// Opaque position in a scan. `"0"` is both the start and the end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCursor(String);

impl ScanCursor {
    pub fn start() -> Self {
        ScanCursor("0".to_string())
    }

    pub fn new(token: impl Into<String>) -> Self {
        ScanCursor(token.into())
    }

    /// True for `"0"`: a fresh scan when sent, a finished one when returned.
    pub fn is_start(&self) -> bool {
        self.0 == "0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ScanCursor {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScanCursor {
    fn from(token: &str) -> Self {
        ScanCursor::new(token)
    }
}

/// One page of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPage {
    pub keys: Vec<KeyDescriptor>,
    pub next_cursor: ScanCursor,
    pub has_more: bool,
}

/// Runs one `SCAN` step from `cursor` and describes the keys it returned.
///
/// `batch_size` is a hint to the store; a page may hold more or fewer keys,
/// including none while `has_more` is still true.
pub async fn scan<C: StoreClient>(
    session: &mut Session<'_, C>,
    cursor: &ScanCursor,
    batch_size: usize,
    pattern: Option<&str>,
) -> Result<ScanPage, StoreError> {
    let pattern = pattern.filter(|p| !p.is_empty());
    let (next, names) = session.scan(cursor.as_str(), batch_size, pattern).await?;
    let keys = describe(session, names).await?;
    let next_cursor = ScanCursor::new(next);

    debug!(
        db = session.db(),
        cursor = %cursor,
        next = %next_cursor,
        keys = keys.len(),
        "Scanned page"
    );
    Ok(ScanPage {
        has_more: !next_cursor.is_start(),
        keys,
        next_cursor,
    })
}

/// Follows the cursor until the scan completes and returns every key.
pub async fn scan_all<C: StoreClient>(
    session: &mut Session<'_, C>,
    batch_size: usize,
    pattern: Option<&str>,
) -> Result<Vec<KeyDescriptor>, StoreError> {
    let mut cursor = ScanCursor::start();
    let mut keys = Vec::new();
    loop {
        let page = scan(session, &cursor, batch_size, pattern).await?;
        keys.extend(page.keys);
        if !page.has_more {
            return Ok(keys);
        }
        cursor = page.next_cursor;
    }
}

/// Lists every matching key with one `KEYS` call.
///
/// `KEYS` blocks the store for a time linear in its total key count. It is
/// here for small stores and for stores that lack `SCAN`; prefer [`scan`].
pub async fn full_listing<C: StoreClient>(
    session: &mut Session<'_, C>,
    pattern: &str,
) -> Result<Vec<KeyDescriptor>, StoreError> {
    let names = session.keys(pattern).await?;
    warn!(db = session.db(), keys = names.len(), "Listed keyspace with KEYS");

    let mut keys = Vec::with_capacity(names.len());
    let mut names = names.into_iter().peekable();
    while names.peek().is_some() {
        let chunk: Vec<Bytes> = names.by_ref().take(LISTING_CHUNK).collect();
        keys.extend(describe(session, chunk).await?);
    }
    Ok(keys)
}

/// Fetches `TYPE` and `TTL` for every key in one pipeline.
async fn describe<C: StoreClient>(
    session: &mut Session<'_, C>,
    names: Vec<Bytes>,
) -> Result<Vec<KeyDescriptor>, StoreError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let commands = names
        .iter()
        .flat_map(|name| {
            [
                vec![Bytes::from("TYPE"), name.clone()],
                vec![Bytes::from("TTL"), name.clone()],
            ]
        })
        .collect();
    let replies = session.pipeline(commands).await?;
    if replies.len() != names.len() * 2 {
        return Err(StoreError::unexpected(
            "TYPE/TTL",
            RespValue::integer(replies.len() as i64),
        ));
    }

    let mut replies = replies.into_iter();
    let mut keys = Vec::with_capacity(names.len());
    for name in names {
        let name = match String::from_utf8(name.to_vec()) {
            Ok(name) => name,
            Err(_) => {
                let lossy = String::from_utf8_lossy(&name).into_owned();
                warn!(key = %lossy, raw = ?name, "Key name is not UTF-8 and cannot be addressed by name");
                lossy
            }
        };
        let (Some(type_reply), Some(ttl_reply)) = (replies.next(), replies.next()) else {
            break;
        };
        let key_type = key_type_from_reply(&name, type_reply);
        let ttl = ttl_from_reply(&name, ttl_reply);
        keys.push(KeyDescriptor { name, key_type, ttl });
    }
    Ok(keys)
}

fn key_type_from_reply(name: &str, reply: RespValue) -> KeyType {
    match reply.as_str() {
        Some(type_name) => KeyType::from_store_name(type_name),
        _ => {
            warn!(key = name, reply = ?reply, "Type lookup failed, marking key unknown");
            KeyType::Unknown
        }
    }
}

fn ttl_from_reply(name: &str, reply: RespValue) -> i64 {
    match reply {
        RespValue::Integer(ttl) => ttl,
        other => {
            warn!(key = name, reply = ?other, "TTL lookup failed, using sentinel");
            TTL_MISSING
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryClient;
    use crate::storage::StorageEngine;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn populated(count: usize) -> (Arc<StorageEngine>, Mutex<MemoryClient>) {
        let storage = Arc::new(StorageEngine::new());
        for i in 0..count {
            storage.set(0, b(&format!("key:{:03}", i)), b("v"), None).unwrap();
        }
        let client = MemoryClient::new(Arc::clone(&storage));
        (storage, Mutex::new(client))
    }

    /// Replies in-band with errors for TYPE/TTL of keys named `bad*`.
    struct FlakyMetadata(MemoryClient);

    impl StoreClient for FlakyMetadata {
        async fn call(&mut self, argv: Vec<Bytes>) -> Result<RespValue, StoreError> {
            if argv.len() == 2 && argv[1].starts_with(b"bad") {
                if argv[0].as_ref() == b"TTL" {
                    return Ok(RespValue::error("ERR ttl unavailable"));
                }
                if argv[0].as_ref() == b"TYPE" {
                    return Ok(RespValue::integer(7));
                }
            }
            self.0.call(argv).await
        }
    }

    /// Fails at the transport level once SCAN has been answered.
    struct DropsAfterScan {
        inner: MemoryClient,
        scanned: bool,
    }

    impl StoreClient for DropsAfterScan {
        async fn call(&mut self, argv: Vec<Bytes>) -> Result<RespValue, StoreError> {
            if self.scanned {
                return Err(StoreError::Closed);
            }
            self.scanned = argv[0].as_ref() == b"SCAN";
            self.inner.call(argv).await
        }
    }

    #[tokio::test]
    async fn test_scan_visits_every_key_once() {
        let (_, handle) = populated(95);
        let mut session = Session::open(&handle, 0).await.unwrap();

        let mut cursor = ScanCursor::start();
        let mut seen = HashSet::new();
        let mut pages = 0;
        loop {
            let page = scan(&mut session, &cursor, 10, None).await.unwrap();
            pages += 1;
            for key in page.keys {
                assert!(seen.insert(key.name), "key delivered twice");
            }
            if !page.has_more {
                assert!(page.next_cursor.is_start());
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(seen.len(), 95);
        assert!(pages >= 10);
    }

    #[tokio::test]
    async fn test_resuming_a_cursor_continues() {
        let (_, handle) = populated(30);
        let mut session = Session::open(&handle, 0).await.unwrap();

        let first = scan(&mut session, &ScanCursor::start(), 10, None).await.unwrap();
        assert!(first.has_more);
        let replayed = scan(&mut session, &first.next_cursor, 10, None).await.unwrap();
        let again = scan(&mut session, &first.next_cursor, 10, None).await.unwrap();

        assert_eq!(replayed, again);
        let first_names: HashSet<_> = first.keys.iter().map(|k| &k.name).collect();
        assert!(replayed.keys.iter().all(|k| !first_names.contains(&k.name)));
    }

    #[tokio::test]
    async fn test_descriptors_carry_type_and_ttl() {
        let storage = Arc::new(StorageEngine::new());
        storage.set(0, b("s"), b("v"), None).unwrap();
        storage.push(0, b("l"), vec![b("a")], false).unwrap();
        storage.zadd(0, b("z"), vec![(1.0, b("m"))]).unwrap();
        storage.expire(0, b"z", Duration::from_secs(300)).unwrap();
        let handle = Mutex::new(MemoryClient::new(storage));
        let mut session = Session::open(&handle, 0).await.unwrap();

        let page = scan(&mut session, &ScanCursor::start(), 100, None).await.unwrap();
        assert!(!page.has_more);
        assert_eq!(
            page.keys,
            vec![
                KeyDescriptor::new("l", KeyType::List, TTL_PERSISTENT),
                KeyDescriptor::new("s", KeyType::String, TTL_PERSISTENT),
                KeyDescriptor::new("z", KeyType::ZSet, 300),
            ]
        );
    }

    #[tokio::test]
    async fn test_pattern_filters_keys() {
        let (storage, handle) = populated(5);
        storage.set(0, b("other"), b("v"), None).unwrap();
        let mut session = Session::open(&handle, 0).await.unwrap();

        let keys = scan_all(&mut session, 2, Some("key:*")).await.unwrap();
        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|k| k.name.starts_with("key:")));
    }

    #[tokio::test]
    async fn test_failed_lookups_become_sentinels() {
        let storage = Arc::new(StorageEngine::new());
        storage.set(0, b("bad:1"), b("v"), None).unwrap();
        storage.set(0, b("good"), b("v"), None).unwrap();
        let handle = Mutex::new(FlakyMetadata(MemoryClient::new(storage)));
        let mut session = Session::open(&handle, 0).await.unwrap();

        let page = scan(&mut session, &ScanCursor::start(), 10, None).await.unwrap();
        assert_eq!(
            page.keys,
            vec![
                KeyDescriptor::new("bad:1", KeyType::Unknown, TTL_MISSING),
                KeyDescriptor::new("good", KeyType::String, TTL_PERSISTENT),
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_page() {
        let (_, handle) = populated(3);
        let handle = Mutex::new(DropsAfterScan {
            inner: handle.into_inner(),
            scanned: false,
        });
        let mut session = Session::open(&handle, 0).await.unwrap();

        let err = scan(&mut session, &ScanCursor::start(), 10, None).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_full_listing_matches_scan() {
        let (_, handle) = populated(40);
        let mut session = Session::open(&handle, 0).await.unwrap();

        let listed = full_listing(&mut session, "*").await.unwrap();
        let scanned = scan_all(&mut session, 7, None).await.unwrap();
        assert_eq!(listed.len(), 40);
        assert_eq!(listed, scanned);
    }

    #[test]
    fn test_page_wire_shape() {
        let page = ScanPage {
            keys: vec![KeyDescriptor::new("a", KeyType::Hash, -1)],
            next_cursor: ScanCursor::new("17"),
            has_more: true,
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            serde_json::json!({
                "keys": [{"name": "a", "type": "hash", "ttl": -1}],
                "nextCursor": "17",
                "hasMore": true,
            })
        );
    }

    #[test]
    fn test_key_type_names() {
        assert_eq!(KeyType::from_store_name("zset"), KeyType::ZSet);
        assert_eq!(KeyType::from_store_name("stream"), KeyType::Unknown);
        assert_eq!(KeyType::from_store_name("none"), KeyType::Unknown);
        assert_eq!(KeyType::Unknown.value_type(), None);
    }
}
