//! Command dispatcher for the embedded store.
//!
//! Takes a request frame (an array of bulk strings), runs it against the
//! [`StorageEngine`] in the handler's selected database, and produces the
//! reply a Redis server would send.
//!
//! ## Supported Commands
//!
//! - Connection: `PING`, `ECHO`, `SELECT`, `AUTH`
//! - Server: `DBSIZE`, `FLUSHDB`, `FLUSHALL`, `CONFIG GET databases`
//! - Keys: `DEL`, `EXISTS`, `TYPE`, `TTL`, `PTTL`, `EXPIRE`, `PERSIST`, `KEYS`,
//!   `SCAN cursor [MATCH pattern] [COUNT n]`
//! - Strings: `GET`, `SET key value [EX s | PX ms]`
//! - Lists: `LPUSH`, `RPUSH`, `LRANGE`, `LLEN`
//! - Sets: `SADD`, `SMEMBERS`, `SCARD`
//! - Hashes: `HSET`, `HGET`, `HGETALL`, `HLEN`
//! - Sorted sets: `ZADD`, `ZRANGE key start stop [WITHSCORES]`, `ZCARD`
//!
//! `SCAN` cursors are `"0"` for start/end and otherwise encode the last key
//! examined, so a cursor stays meaningful while other clients write.

use crate::protocol::RespValue;
use crate::storage::{GlobPattern, StorageEngine, StorageError};
use bytes::Bytes;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default `COUNT` for `SCAN`, as in Redis.
const DEFAULT_SCAN_COUNT: usize = 10;

/// Failure of a single command; rendered as the error reply text.
#[derive(Debug, Error)]
enum CommandError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("ERR wrong number of arguments for '{0}' command")]
    Arity(String),

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR invalid cursor")]
    InvalidCursor,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpire(String),

    #[error("ERR unknown command '{0}'")]
    Unknown(String),
}

type Reply = Result<RespValue, CommandError>;

/// Per-client command handler. Cheap to clone; clones share the engine but
/// each keeps its own selected database.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    db: usize,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage, db: 0 }
    }

    /// The currently selected logical database.
    pub fn selected_db(&self) -> usize {
        self.db
    }

    /// Executes one request frame and returns the reply.
    pub fn execute(&mut self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) if !args.is_empty() => args,
            RespValue::Array(_) => return RespValue::error("ERR empty command"),
            _ => return RespValue::error("ERR invalid command format"),
        };

        let mut argv = Vec::with_capacity(args.len());
        for arg in args {
            match arg.into_bytes() {
                Some(bytes) => argv.push(bytes),
                None => return RespValue::error("ERR invalid argument type"),
            }
        }

        let name = String::from_utf8_lossy(&argv[0]).to_uppercase();
        match self.dispatch(&name, &argv[1..]) {
            Ok(reply) => reply,
            Err(e) => RespValue::error(e.to_string()),
        }
    }

    fn dispatch(&mut self, cmd: &str, args: &[Bytes]) -> Reply {
        match cmd {
            // Connection and server
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SELECT" => self.cmd_select(args),
            "AUTH" => Ok(RespValue::ok()),
            "DBSIZE" => Ok(RespValue::integer(self.storage.len(self.db)? as i64)),
            "FLUSHDB" => {
                self.storage.flush(self.db)?;
                Ok(RespValue::ok())
            }
            "FLUSHALL" => {
                self.storage.flush_all();
                Ok(RespValue::ok())
            }
            "CONFIG" => self.cmd_config(args),

            // Keys
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "TYPE" => self.cmd_type(args),
            "TTL" => self.cmd_ttl(args, false),
            "PTTL" => self.cmd_ttl(args, true),
            "EXPIRE" => self.cmd_expire(args),
            "PERSIST" => self.cmd_persist(args),
            "KEYS" => self.cmd_keys(args),
            "SCAN" => self.cmd_scan(args),

            // Strings
            "GET" => self.cmd_get(args),
            "SET" => self.cmd_set(args),

            // Lists
            "LPUSH" => self.cmd_push(args, "lpush", true),
            "RPUSH" => self.cmd_push(args, "rpush", false),
            "LRANGE" => self.cmd_lrange(args),
            "LLEN" => self.cmd_len(args, "llen", StorageEngine::llen),

            // Sets
            "SADD" => self.cmd_sadd(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SCARD" => self.cmd_len(args, "scard", StorageEngine::scard),

            // Hashes
            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HLEN" => self.cmd_len(args, "hlen", StorageEngine::hlen),

            // Sorted sets
            "ZADD" => self.cmd_zadd(args),
            "ZRANGE" => self.cmd_zrange(args),
            "ZCARD" => self.cmd_len(args, "zcard", StorageEngine::zcard),

            _ => Err(CommandError::Unknown(cmd.to_lowercase())),
        }
    }

    // ========================================================================
    // Connection and server
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        match args {
            [] => Ok(RespValue::simple_string("PONG")),
            [msg] => Ok(RespValue::bulk_string(msg.clone())),
            _ => Err(arity("ping")),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> Reply {
        let [msg] = args else {
            return Err(arity("echo"));
        };
        Ok(RespValue::bulk_string(msg.clone()))
    }

    /// SELECT index
    fn cmd_select(&mut self, args: &[Bytes]) -> Reply {
        let [index] = args else {
            return Err(arity("select"));
        };
        let index = usize::try_from(parse_int(index)?).map_err(|_| StorageError::DbOutOfRange)?;
        self.storage.check_db(index)?;
        self.db = index;
        Ok(RespValue::ok())
    }

    /// CONFIG GET parameter. Only `databases` is answered.
    fn cmd_config(&self, args: &[Bytes]) -> Reply {
        let [sub, param] = args else {
            return Err(arity("config"));
        };
        if !sub.eq_ignore_ascii_case(b"GET") {
            return Err(CommandError::Syntax);
        }
        if GlobPattern::new(param.to_ascii_lowercase()).matches(b"databases") {
            Ok(RespValue::array(vec![
                RespValue::bulk_string("databases"),
                RespValue::bulk_string(self.storage.database_count().to_string()),
            ]))
        } else {
            Ok(RespValue::array(vec![]))
        }
    }

    // ========================================================================
    // Keys
    // ========================================================================

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Err(arity("del"));
        }
        Ok(RespValue::integer(self.storage.delete(self.db, args)? as i64))
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Err(arity("exists"));
        }
        Ok(RespValue::integer(self.storage.exists(self.db, args)? as i64))
    }

    /// TYPE key
    fn cmd_type(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Err(arity("type"));
        };
        Ok(RespValue::simple_string(self.storage.key_type(self.db, key)?))
    }

    /// TTL key / PTTL key
    fn cmd_ttl(&self, args: &[Bytes], millis: bool) -> Reply {
        let [key] = args else {
            return Err(arity(if millis { "pttl" } else { "ttl" }));
        };
        let ttl = if millis {
            self.storage.pttl(self.db, key)?
        } else {
            self.storage.ttl(self.db, key)?
        };
        Ok(RespValue::integer(ttl))
    }

    /// EXPIRE key seconds. A non-positive TTL deletes the key.
    fn cmd_expire(&self, args: &[Bytes]) -> Reply {
        let [key, seconds] = args else {
            return Err(arity("expire"));
        };
        let seconds = parse_int(seconds)?;
        let applied = if seconds <= 0 {
            self.storage.delete(self.db, std::slice::from_ref(key))? > 0
        } else {
            self.storage
                .expire(self.db, key, Duration::from_secs(seconds as u64))?
        };
        Ok(RespValue::integer(applied as i64))
    }

    /// PERSIST key
    fn cmd_persist(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Err(arity("persist"));
        };
        Ok(RespValue::integer(self.storage.persist(self.db, key)? as i64))
    }

    /// KEYS pattern
    fn cmd_keys(&self, args: &[Bytes]) -> Reply {
        let [pattern] = args else {
            return Err(arity("keys"));
        };
        let keys = self
            .storage
            .keys(self.db, &String::from_utf8_lossy(pattern))?;
        Ok(RespValue::array(
            keys.into_iter().map(RespValue::bulk_string).collect(),
        ))
    }

    /// SCAN cursor [MATCH pattern] [COUNT count]
    fn cmd_scan(&self, args: &[Bytes]) -> Reply {
        let Some((cursor, options)) = args.split_first() else {
            return Err(arity("scan"));
        };
        let after = decode_cursor(cursor)?;

        let mut pattern = None;
        let mut count = DEFAULT_SCAN_COUNT;
        let mut rest = options.iter();
        while let Some(option) = rest.next() {
            let value = rest.next().ok_or(CommandError::Syntax)?;
            if option.eq_ignore_ascii_case(b"MATCH") {
                pattern = Some(GlobPattern::new(value)).filter(|p| !p.is_match_all());
            } else if option.eq_ignore_ascii_case(b"COUNT") {
                count = usize::try_from(parse_int(value)?)
                    .ok()
                    .filter(|c| *c > 0)
                    .ok_or(CommandError::Syntax)?;
            } else {
                return Err(CommandError::Syntax);
            }
        }

        let step = self
            .storage
            .scan(self.db, after.as_deref(), count, pattern.as_ref())?;
        let next = match step.resume_after {
            Some(key) => encode_cursor(&key),
            None => "0".to_string(),
        };
        Ok(RespValue::array(vec![
            RespValue::bulk_string(next),
            RespValue::array(step.keys.into_iter().map(RespValue::bulk_string).collect()),
        ]))
    }

    // ========================================================================
    // Strings
    // ========================================================================

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Err(arity("get"));
        };
        Ok(match self.storage.get(self.db, key)? {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        let [key, value, options @ ..] = args else {
            return Err(arity("set"));
        };

        let ttl = match options {
            [] => None,
            [unit, amount] => {
                let amount = parse_int(amount)?;
                if amount <= 0 {
                    return Err(CommandError::InvalidExpire("set".to_string()));
                }
                if unit.eq_ignore_ascii_case(b"EX") {
                    Some(Duration::from_secs(amount as u64))
                } else if unit.eq_ignore_ascii_case(b"PX") {
                    Some(Duration::from_millis(amount as u64))
                } else {
                    return Err(CommandError::Syntax);
                }
            }
            _ => return Err(CommandError::Syntax),
        };

        self.storage.set(self.db, key.clone(), value.clone(), ttl)?;
        Ok(RespValue::ok())
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// LPUSH / RPUSH key element [element ...]
    fn cmd_push(&self, args: &[Bytes], name: &str, front: bool) -> Reply {
        let [key, values @ ..] = args else {
            return Err(arity(name));
        };
        if values.is_empty() {
            return Err(arity(name));
        }
        let len = self
            .storage
            .push(self.db, key.clone(), values.to_vec(), front)?;
        Ok(RespValue::integer(len as i64))
    }

    /// LRANGE key start stop
    fn cmd_lrange(&self, args: &[Bytes]) -> Reply {
        let [key, start, stop] = args else {
            return Err(arity("lrange"));
        };
        let items = self
            .storage
            .lrange(self.db, key, parse_int(start)?, parse_int(stop)?)?;
        Ok(RespValue::array(
            items.into_iter().map(RespValue::bulk_string).collect(),
        ))
    }

    /// LLEN / SCARD / HLEN / ZCARD key
    fn cmd_len(
        &self,
        args: &[Bytes],
        name: &str,
        len: fn(&StorageEngine, usize, &[u8]) -> Result<usize, StorageError>,
    ) -> Reply {
        let [key] = args else {
            return Err(arity(name));
        };
        Ok(RespValue::integer(len(&self.storage, self.db, key)? as i64))
    }

    /// SADD key member [member ...]
    fn cmd_sadd(&self, args: &[Bytes]) -> Reply {
        let [key, members @ ..] = args else {
            return Err(arity("sadd"));
        };
        if members.is_empty() {
            return Err(arity("sadd"));
        }
        let added = self.storage.sadd(self.db, key.clone(), members.to_vec())?;
        Ok(RespValue::integer(added as i64))
    }

    /// SMEMBERS key
    fn cmd_smembers(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Err(arity("smembers"));
        };
        let members = self.storage.smembers(self.db, key)?;
        Ok(RespValue::array(
            members.into_iter().map(RespValue::bulk_string).collect(),
        ))
    }

    /// HSET key field value [field value ...]
    fn cmd_hset(&self, args: &[Bytes]) -> Reply {
        let [key, pairs @ ..] = args else {
            return Err(arity("hset"));
        };
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(arity("hset"));
        }
        let pairs = pairs
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();
        let added = self.storage.hset(self.db, key.clone(), pairs)?;
        Ok(RespValue::integer(added as i64))
    }

    /// HGET key field
    fn cmd_hget(&self, args: &[Bytes]) -> Reply {
        let [key, field] = args else {
            return Err(arity("hget"));
        };
        Ok(match self.storage.hget(self.db, key, field)? {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// HGETALL key, as a flat field/value array
    fn cmd_hgetall(&self, args: &[Bytes]) -> Reply {
        let [key] = args else {
            return Err(arity("hgetall"));
        };
        let flat = self
            .storage
            .hgetall(self.db, key)?
            .into_iter()
            .flat_map(|(field, value)| [RespValue::bulk_string(field), RespValue::bulk_string(value)])
            .collect();
        Ok(RespValue::array(flat))
    }

    /// ZADD key score member [score member ...]
    fn cmd_zadd(&self, args: &[Bytes]) -> Reply {
        let [key, pairs @ ..] = args else {
            return Err(arity("zadd"));
        };
        if pairs.is_empty() || pairs.len() % 2 != 0 {
            return Err(CommandError::Syntax);
        }
        let mut members = Vec::with_capacity(pairs.len() / 2);
        for pair in pairs.chunks_exact(2) {
            members.push((parse_float(&pair[0])?, pair[1].clone()));
        }
        let added = self.storage.zadd(self.db, key.clone(), members)?;
        Ok(RespValue::integer(added as i64))
    }

    /// ZRANGE key start stop [WITHSCORES]
    fn cmd_zrange(&self, args: &[Bytes]) -> Reply {
        let (key, start, stop, with_scores) = match args {
            [key, start, stop] => (key, start, stop, false),
            [key, start, stop, flag] if flag.eq_ignore_ascii_case(b"WITHSCORES") => {
                (key, start, stop, true)
            }
            [_, _, _, _] => return Err(CommandError::Syntax),
            _ => return Err(arity("zrange")),
        };

        let ranked = self
            .storage
            .zrange(self.db, key, parse_int(start)?, parse_int(stop)?)?;
        let mut reply = Vec::with_capacity(ranked.len() * if with_scores { 2 } else { 1 });
        for (member, score) in ranked {
            reply.push(RespValue::bulk_string(member));
            if with_scores {
                reply.push(RespValue::bulk_string(score.to_string()));
            }
        }
        Ok(RespValue::array(reply))
    }
}

fn arity(name: &str) -> CommandError {
    CommandError::Arity(name.to_string())
}

fn parse_int(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotInteger)
}

/// Accepts what Redis accepts for scores, including `inf`/`-inf`; rejects NaN.
fn parse_float(arg: &[u8]) -> Result<f64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(CommandError::NotFloat)
}

/// `"1"` followed by the hex of the resume key; never equal to `"0"`.
fn encode_cursor(key: &[u8]) -> String {
    let mut cursor = String::with_capacity(1 + key.len() * 2);
    cursor.push('1');
    for byte in key {
        let _ = write!(cursor, "{:02x}", byte);
    }
    cursor
}

fn decode_cursor(cursor: &[u8]) -> Result<Option<Bytes>, CommandError> {
    if cursor == b"0" {
        return Ok(None);
    }
    let hex = cursor
        .strip_prefix(b"1")
        .filter(|hex| hex.len() % 2 == 0)
        .ok_or(CommandError::InvalidCursor)?;
    let key = hex
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
        })
        .collect::<Option<Vec<u8>>>()
        .ok_or(CommandError::InvalidCursor)?;
    Ok(Some(Bytes::from(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    fn make_command(args: &[&str]) -> RespValue {
        RespValue::command(args.iter().map(|s| Bytes::from(s.to_string())))
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_ping() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["PING"])),
            RespValue::simple_string("PONG")
        );
        assert_eq!(handler.execute(make_command(&["ping", "hi"])), bulk("hi"));
    }

    #[test]
    fn test_set_get() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["SET", "key", "value"])),
            RespValue::ok()
        );
        assert_eq!(handler.execute(make_command(&["GET", "key"])), bulk("value"));
        assert_eq!(
            handler.execute(make_command(&["GET", "missing"])),
            RespValue::null()
        );
    }

    #[test]
    fn test_set_with_expiry() {
        let mut handler = create_handler();
        handler.execute(make_command(&["SET", "k", "v", "EX", "100"]));
        let ttl = handler.execute(make_command(&["TTL", "k"])).as_integer().unwrap();
        assert!(ttl > 95 && ttl <= 100);

        assert!(handler
            .execute(make_command(&["SET", "k", "v", "EX", "0"]))
            .is_error());
        assert!(handler
            .execute(make_command(&["SET", "k", "v", "NX"]))
            .is_error());
    }

    #[test]
    fn test_select_switches_database() {
        let mut handler = create_handler();
        handler.execute(make_command(&["SET", "k", "db0"]));
        assert_eq!(handler.execute(make_command(&["SELECT", "2"])), RespValue::ok());
        assert_eq!(handler.selected_db(), 2);
        assert_eq!(handler.execute(make_command(&["GET", "k"])), RespValue::null());

        assert_eq!(
            handler.execute(make_command(&["SELECT", "16"])),
            RespValue::error("ERR DB index is out of range")
        );
        assert_eq!(
            handler.execute(make_command(&["SELECT", "x"])),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(handler.selected_db(), 2);
    }

    #[test]
    fn test_clones_keep_their_own_database() {
        let mut first = create_handler();
        let mut second = first.clone();
        first.execute(make_command(&["SELECT", "5"]));
        assert_eq!(first.selected_db(), 5);
        assert_eq!(second.selected_db(), 0);

        first.execute(make_command(&["SET", "shared", "yes"]));
        second.execute(make_command(&["SELECT", "5"]));
        assert_eq!(second.execute(make_command(&["GET", "shared"])), bulk("yes"));
    }

    #[test]
    fn test_type_and_ttl() {
        let mut handler = create_handler();
        handler.execute(make_command(&["RPUSH", "l", "a"]));
        handler.execute(make_command(&["SADD", "s", "a"]));
        handler.execute(make_command(&["HSET", "h", "f", "v"]));
        handler.execute(make_command(&["ZADD", "z", "1", "a"]));
        handler.execute(make_command(&["SET", "str", "v"]));

        for (key, ty) in [("l", "list"), ("s", "set"), ("h", "hash"), ("z", "zset"), ("str", "string"), ("nope", "none")] {
            assert_eq!(
                handler.execute(make_command(&["TYPE", key])),
                RespValue::simple_string(ty)
            );
        }
        assert_eq!(handler.execute(make_command(&["TTL", "l"])), RespValue::integer(-1));
        assert_eq!(handler.execute(make_command(&["TTL", "nope"])), RespValue::integer(-2));

        assert_eq!(handler.execute(make_command(&["EXPIRE", "l", "30"])), RespValue::integer(1));
        assert_eq!(handler.execute(make_command(&["TTL", "l"])), RespValue::integer(30));
        assert_eq!(handler.execute(make_command(&["PERSIST", "l"])), RespValue::integer(1));
    }

    #[test]
    fn test_wrongtype_reply() {
        let mut handler = create_handler();
        handler.execute(make_command(&["SET", "k", "v"]));
        assert_eq!(
            handler.execute(make_command(&["LRANGE", "k", "0", "-1"])),
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
    }

    #[test]
    fn test_del_and_exists() {
        let mut handler = create_handler();
        handler.execute(make_command(&["SET", "key1", "value1"]));
        handler.execute(make_command(&["RPUSH", "key2", "a", "b"]));
        assert_eq!(
            handler.execute(make_command(&["EXISTS", "key1", "key2", "key3"])),
            RespValue::integer(2)
        );
        assert_eq!(
            handler.execute(make_command(&["DEL", "key1", "key2", "key3"])),
            RespValue::integer(2)
        );
        assert_eq!(handler.execute(make_command(&["DBSIZE"])), RespValue::integer(0));
    }

    #[test]
    fn test_list_commands() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["RPUSH", "l", "a", "b", "c"])),
            RespValue::integer(3)
        );
        handler.execute(make_command(&["LPUSH", "l", "z"]));
        assert_eq!(
            handler.execute(make_command(&["LRANGE", "l", "0", "-1"])),
            RespValue::array(vec![bulk("z"), bulk("a"), bulk("b"), bulk("c")])
        );
        assert_eq!(handler.execute(make_command(&["LLEN", "l"])), RespValue::integer(4));
    }

    #[test]
    fn test_hash_commands() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["HSET", "h", "b", "2", "a", "1"])),
            RespValue::integer(2)
        );
        assert_eq!(handler.execute(make_command(&["HGET", "h", "a"])), bulk("1"));
        assert_eq!(
            handler.execute(make_command(&["HGETALL", "h"])),
            RespValue::array(vec![bulk("a"), bulk("1"), bulk("b"), bulk("2")])
        );
        assert!(handler
            .execute(make_command(&["HSET", "h", "dangling"]))
            .is_error());
    }

    #[test]
    fn test_zset_commands() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["ZADD", "z", "2.5", "b", "-1", "a", "inf", "c"])),
            RespValue::integer(3)
        );
        assert_eq!(
            handler.execute(make_command(&["ZRANGE", "z", "0", "-1", "WITHSCORES"])),
            RespValue::array(vec![
                bulk("a"),
                bulk("-1"),
                bulk("b"),
                bulk("2.5"),
                bulk("c"),
                bulk("inf"),
            ])
        );
        assert_eq!(
            handler.execute(make_command(&["ZRANGE", "z", "0", "0"])),
            RespValue::array(vec![bulk("a")])
        );
        assert_eq!(
            handler.execute(make_command(&["ZADD", "z", "nan", "d"])),
            RespValue::error("ERR value is not a valid float")
        );
    }

    #[test]
    fn test_scan_cursor_walk() {
        let mut handler = create_handler();
        for i in 0..30 {
            handler.execute(make_command(&["SET", &format!("key:{}", i), "v"]));
        }

        let mut cursor = "0".to_string();
        let mut seen = Vec::new();
        loop {
            let reply = handler
                .execute(make_command(&["SCAN", &cursor, "COUNT", "7"]))
                .into_array()
                .unwrap();
            let mut parts = reply.into_iter();
            cursor = parts.next().unwrap().as_str().unwrap().to_string();
            let keys = parts.next().unwrap().into_array().unwrap();
            assert!(keys.len() <= 7);
            seen.extend(keys);
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen.len(), 30);
    }

    #[test]
    fn test_scan_match() {
        let mut handler = create_handler();
        handler.execute(make_command(&["SET", "user:1", "v"]));
        handler.execute(make_command(&["SET", "user:2", "v"]));
        handler.execute(make_command(&["SET", "order:1", "v"]));

        let reply = handler.execute(make_command(&["SCAN", "0", "MATCH", "user:*", "COUNT", "100"]));
        assert_eq!(
            reply,
            RespValue::array(vec![
                bulk("0"),
                RespValue::array(vec![bulk("user:1"), bulk("user:2")]),
            ])
        );
    }

    #[test]
    fn test_scan_rejects_bad_input() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["SCAN", "zzz"])),
            RespValue::error("ERR invalid cursor")
        );
        assert_eq!(
            handler.execute(make_command(&["SCAN", "0", "COUNT"])),
            RespValue::error("ERR syntax error")
        );
        assert_eq!(
            handler.execute(make_command(&["SCAN", "0", "COUNT", "0"])),
            RespValue::error("ERR syntax error")
        );
    }

    #[test]
    fn test_cursor_encoding() {
        assert_eq!(encode_cursor(b"ab"), "16162");
        assert_eq!(encode_cursor(b""), "1");
        assert_eq!(
            decode_cursor(encode_cursor(b"\x00\xffk").as_bytes()).unwrap(),
            Some(Bytes::from(&b"\x00\xffk"[..]))
        );
        assert_eq!(decode_cursor(b"0").unwrap(), None);
        assert!(decode_cursor(b"1abc").is_err());
    }

    #[test]
    fn test_config_get_databases() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET", "databases"])),
            RespValue::array(vec![bulk("databases"), bulk("16")])
        );
        assert_eq!(
            handler.execute(make_command(&["CONFIG", "GET", "maxmemory"])),
            RespValue::array(vec![])
        );
    }

    #[test]
    fn test_flushdb() {
        let mut handler = create_handler();
        handler.execute(make_command(&["SET", "key1", "value1"]));
        handler.execute(make_command(&["SET", "key2", "value2"]));
        assert_eq!(handler.execute(make_command(&["FLUSHDB"])), RespValue::ok());
        assert_eq!(handler.execute(make_command(&["DBSIZE"])), RespValue::integer(0));
    }

    #[test]
    fn test_unknown_command() {
        let mut handler = create_handler();
        assert_eq!(
            handler.execute(make_command(&["FROBNICATE", "x"])),
            RespValue::error("ERR unknown command 'frobnicate'")
        );
        assert!(handler.execute(RespValue::array(vec![])).is_error());
        assert!(handler.execute(RespValue::integer(1)).is_error());
    }
}
