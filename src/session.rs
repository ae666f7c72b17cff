//! Select-then-operate sessions.
//!
//! The logical database is connection state in the store, so "select db 3,
//! then read a key" is only correct if nothing else runs on that connection
//! in between. A [`Session`] makes the ordering structural: it is created by
//! locking the client and sending `SELECT`, and every operation borrows the
//! session, so the lock is held from the select until the session drops.

use crate::backend::{argv, StoreClient, StoreError};
use crate::codec::{parse_score, RawValue, ValueType};
use crate::protocol::RespValue;
use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A locked client with a selected logical database.
pub struct Session<'a, C> {
    client: MutexGuard<'a, C>,
    db: u32,
}

impl<'a, C: StoreClient> Session<'a, C> {
    /// Locks `handle` and selects `db` on it.
    pub async fn open(handle: &'a Mutex<C>, db: u32) -> Result<Self, StoreError> {
        let mut client = handle.lock().await;
        let reply = client
            .call(argv(["SELECT".to_string(), db.to_string()]))
            .await?;
        match reply {
            RespValue::SimpleString(s) if s == "OK" => {}
            RespValue::Error(message) => return Err(StoreError::Reply(message)),
            // Anything else answers some other request.
            other => {
                return Err(StoreError::OutOfSync(format!(
                    "SELECT answered with {:?}",
                    other
                )))
            }
        }
        debug!(db, "Selected database");
        Ok(Self { client, db })
    }

    pub fn db(&self) -> u32 {
        self.db
    }

    /// Sends a command and returns the reply as-is, error replies included.
    pub async fn raw(&mut self, argv: Vec<Bytes>) -> Result<RespValue, StoreError> {
        self.client.call(argv).await
    }

    /// Sends a batch of commands; error replies stay in-band per command.
    pub async fn pipeline(&mut self, commands: Vec<Vec<Bytes>>) -> Result<Vec<RespValue>, StoreError> {
        self.client.pipeline(commands).await
    }

    /// Sends a command, turning an error reply into [`StoreError::Reply`].
    pub async fn command(&mut self, argv: Vec<Bytes>) -> Result<RespValue, StoreError> {
        match self.client.call(argv).await? {
            RespValue::Error(message) => Err(StoreError::Reply(message)),
            reply => Ok(reply),
        }
    }

    /// One `SCAN` step. Returns the next cursor and the keys of this step.
    pub async fn scan(
        &mut self,
        cursor: &str,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<(String, Vec<Bytes>), StoreError> {
        let mut cmd = argv(["SCAN".to_string(), cursor.to_string()]);
        if let Some(pattern) = pattern {
            cmd.push(Bytes::from("MATCH"));
            cmd.push(Bytes::from(pattern.to_string()));
        }
        cmd.push(Bytes::from("COUNT"));
        cmd.push(Bytes::from(count.max(1).to_string()));

        let reply = self.command(cmd).await?;
        let unexpected = |reply| StoreError::unexpected("SCAN", reply);
        let mut parts = match reply {
            RespValue::Array(parts) if parts.len() == 2 => parts.into_iter(),
            other => return Err(unexpected(other)),
        };
        let (Some(next), Some(keys)) = (parts.next(), parts.next()) else {
            return Err(StoreError::unexpected("SCAN", RespValue::Null));
        };
        let next = match next.as_str() {
            Some(cursor) => cursor.to_string(),
            None => return Err(unexpected(next)),
        };
        Ok((next, bulk_list("SCAN", keys)?))
    }

    /// `KEYS pattern`. Walks the whole keyspace in one blocking call.
    pub async fn keys(&mut self, pattern: &str) -> Result<Vec<Bytes>, StoreError> {
        let reply = self.command(argv(["KEYS".to_string(), pattern.to_string()])).await?;
        bulk_list("KEYS", reply)
    }

    /// `TYPE key`; `"none"` for a missing key.
    pub async fn key_type(&mut self, key: &Bytes) -> Result<String, StoreError> {
        match self.command(vec![Bytes::from("TYPE"), key.clone()]).await? {
            RespValue::SimpleString(name) => Ok(name),
            other => other
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| StoreError::unexpected("TYPE", other)),
        }
    }

    /// `TTL key`, with the store's `-1`/`-2` sentinels.
    pub async fn ttl(&mut self, key: &Bytes) -> Result<i64, StoreError> {
        match self.command(vec![Bytes::from("TTL"), key.clone()]).await? {
            RespValue::Integer(ttl) => Ok(ttl),
            other => Err(StoreError::unexpected("TTL", other)),
        }
    }

    /// Reads the whole value of a key of a known type.
    pub async fn read_value(&mut self, value_type: ValueType, key: &Bytes) -> Result<RawValue, StoreError> {
        let key = key.clone();
        Ok(match value_type {
            ValueType::String => {
                match self.command(vec![Bytes::from("GET"), key]).await? {
                    RespValue::BulkString(body) => RawValue::String(body),
                    // Deleted between TYPE and GET.
                    RespValue::Null => RawValue::String(Bytes::new()),
                    other => return Err(StoreError::unexpected("GET", other)),
                }
            }
            ValueType::List => {
                let reply = self
                    .command(vec![Bytes::from("LRANGE"), key, Bytes::from("0"), Bytes::from("-1")])
                    .await?;
                RawValue::List(bulk_list("LRANGE", reply)?)
            }
            ValueType::Set => {
                let reply = self.command(vec![Bytes::from("SMEMBERS"), key]).await?;
                RawValue::Set(bulk_list("SMEMBERS", reply)?)
            }
            ValueType::Hash => {
                let reply = self.command(vec![Bytes::from("HGETALL"), key]).await?;
                RawValue::Hash(pairs("HGETALL", bulk_list("HGETALL", reply)?)?)
            }
            ValueType::ZSet => {
                let reply = self
                    .command(vec![
                        Bytes::from("ZRANGE"),
                        key,
                        Bytes::from("0"),
                        Bytes::from("-1"),
                        Bytes::from("WITHSCORES"),
                    ])
                    .await?;
                let mut entries = Vec::new();
                for (member, score) in pairs("ZRANGE", bulk_list("ZRANGE", reply)?)? {
                    let parsed = std::str::from_utf8(&score).ok().and_then(parse_score);
                    match parsed {
                        Some(score) => entries.push((member, score)),
                        None => {
                            return Err(StoreError::unexpected(
                                "ZRANGE",
                                RespValue::BulkString(score),
                            ))
                        }
                    }
                }
                RawValue::ZSet(entries)
            }
        })
    }

    /// `DEL key`; returns how many keys were removed.
    pub async fn delete(&mut self, key: &Bytes) -> Result<i64, StoreError> {
        match self.command(vec![Bytes::from("DEL"), key.clone()]).await? {
            RespValue::Integer(n) => Ok(n),
            other => Err(StoreError::unexpected("DEL", other)),
        }
    }

    /// `EXPIRE key seconds`; false when the key does not exist.
    pub async fn expire(&mut self, key: &Bytes, seconds: u64) -> Result<bool, StoreError> {
        let cmd = vec![Bytes::from("EXPIRE"), key.clone(), Bytes::from(seconds.to_string())];
        match self.command(cmd).await? {
            RespValue::Integer(n) => Ok(n == 1),
            other => Err(StoreError::unexpected("EXPIRE", other)),
        }
    }

    /// `CONFIG GET parameter` as name/value pairs.
    pub async fn config_get(&mut self, parameter: &str) -> Result<Vec<(String, String)>, StoreError> {
        let reply = self
            .command(argv(["CONFIG".to_string(), "GET".to_string(), parameter.to_string()]))
            .await?;
        Ok(pairs("CONFIG", bulk_list("CONFIG", reply)?)?
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}

/// An array reply whose elements are all strings.
fn bulk_list(command: &str, reply: RespValue) -> Result<Vec<Bytes>, StoreError> {
    let items = match reply {
        RespValue::Array(items) => items,
        other => return Err(StoreError::unexpected(command, other)),
    };
    items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(b) => Ok(b),
            RespValue::SimpleString(s) => Ok(Bytes::from(s)),
            other => Err(StoreError::unexpected(command, other)),
        })
        .collect()
}

/// Groups a flat `[a, b, c, d]` list into `[(a, b), (c, d)]`.
fn pairs(command: &str, flat: Vec<Bytes>) -> Result<Vec<(Bytes, Bytes)>, StoreError> {
    if flat.len() % 2 != 0 {
        return Err(StoreError::unexpected(
            command,
            RespValue::array(flat.into_iter().map(RespValue::BulkString).collect()),
        ));
    }
    let mut items = flat.into_iter();
    let mut grouped = Vec::with_capacity(items.len() / 2);
    while let (Some(first), Some(second)) = (items.next(), items.next()) {
        grouped.push((first, second));
    }
    Ok(grouped)
}
