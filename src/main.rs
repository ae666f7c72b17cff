//! keyscope - interactive keyspace console
//!
//! Connects to a Redis-compatible store (or an embedded one with `--memory`)
//! and reads console commands from stdin. Results are printed as JSON on
//! stdout; logs go to stderr.

use anyhow::Context;
use clap::Parser;
use keyscope::backend::{ConnectionConfig, MemoryClient, RespConnection, StoreClient};
use keyscope::codec::SetKeyRequest;
use keyscope::scanner::ScanCursor;
use keyscope::storage::StorageEngine;
use keyscope::Console;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Connection id used for the embedded store.
const MEMORY_ID: &str = "memory";

#[derive(Debug, Parser)]
#[command(name = "keyscope", version, about = "Browse and edit a Redis-compatible keyspace")]
struct Cli {
    /// Store host
    #[arg(long, env = "KEYSCOPE_HOST", default_value = keyscope::DEFAULT_HOST)]
    host: String,

    /// Store port
    #[arg(short, long, env = "KEYSCOPE_PORT", default_value_t = keyscope::DEFAULT_PORT)]
    port: u16,

    /// Password sent with AUTH on connect
    #[arg(long, env = "KEYSCOPE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database selected at startup
    #[arg(short = 'n', long, env = "KEYSCOPE_DB", default_value_t = 0)]
    db: u32,

    /// Keys fetched per scan page
    #[arg(long, default_value_t = 100)]
    batch: usize,

    /// Use an empty embedded store instead of connecting
    #[arg(long)]
    memory: bool,
}

impl Cli {
    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
            db: self.db,
        }
    }
}

/// One line typed at the prompt.
#[derive(Debug, PartialEq)]
enum Input {
    Help,
    Quit,
    Databases,
    Select(u32),
    Keys(String),
    All(Option<String>),
    Scan(Option<String>),
    Next,
    Tree(Option<String>),
    Get(String),
    Set { key: String, request: SetKeyRequest },
    Del(String),
    Exec { command: String, args: Vec<String> },
}

impl Input {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();
        let one = |what: &str| match rest.as_slice() {
            [value] => Ok(value.to_string()),
            _ => Err(format!("usage: {} <{}>", verb, what)),
        };
        let optional = || rest.first().map(|s| s.to_string());

        let input = match verb.to_ascii_lowercase().as_str() {
            "help" | "?" => Input::Help,
            "quit" | "exit" => Input::Quit,
            "dbs" => Input::Databases,
            "select" => Input::Select(
                one("db")?
                    .parse()
                    .map_err(|_| "database must be a non-negative integer".to_string())?,
            ),
            "keys" => Input::Keys(optional().unwrap_or_else(|| "*".to_string())),
            "all" => Input::All(optional()),
            "scan" => Input::Scan(optional()),
            "next" => Input::Next,
            "tree" => Input::Tree(optional()),
            "get" => Input::Get(one("key")?),
            "del" => Input::Del(one("key")?),
            "set" => Self::parse_set(line)?,
            "exec" => match rest.split_first() {
                Some((command, args)) => Input::Exec {
                    command: command.to_string(),
                    args: args.iter().map(|s| s.to_string()).collect(),
                },
                None => return Err("usage: exec <command> [args...]".to_string()),
            },
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(Some(input))
    }

    /// `set <key> <type> <ttl> <json>`; the JSON runs to the end of the line.
    fn parse_set(line: &str) -> Result<Self, String> {
        const USAGE: &str = "usage: set <key> <type> <ttl> <json>";
        let mut words = [""; 4];
        let mut rest = line.trim();
        for word in words.iter_mut() {
            let (head, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            *word = head;
            rest = tail.trim_start();
        }
        let [_, key, value_type, ttl] = words;
        let json = rest;
        if key.is_empty() || value_type.is_empty() || ttl.is_empty() || json.is_empty() {
            return Err(USAGE.to_string());
        }
        let ttl: f64 = ttl.parse().map_err(|_| format!("bad ttl '{}'", ttl))?;
        let value = serde_json::from_str(json).map_err(|e| format!("bad JSON value: {}", e))?;
        Ok(Input::Set {
            key: key.to_string(),
            request: SetKeyRequest::new(value_type, value, ttl),
        })
    }
}

const HELP: &str = r#"
  dbs                               list databases
  select <db>                       switch database
  keys [pattern]                    every key (uses KEYS)
  all [pattern]                     every key (follows the scan cursor)
  scan [pattern]                    first page of keys
  next                              next page of the last scan
  tree [pattern]                    first page as a namespace tree
  get <key>                         read a value
  set <key> <type> <ttl> <json>     replace a value, ttl 0 for none
  del <key>                         delete a key
  exec <command> [args...]          run a raw command
  quit
"#;

/// Paging state carried between `scan` and `next`.
#[derive(Default)]
struct Paging {
    cursor: ScanCursor,
    pattern: Option<String>,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("Cannot render result: {}", e),
    }
}

async fn repl<C: StoreClient>(
    console: &Console<C>,
    id: &str,
    mut db: u32,
    batch: usize,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut paging = Paging::default();

    loop {
        print!("{}[{}]> ", id, db);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = match Input::parse(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        let outcome = match input {
            Input::Help => {
                println!("{}", HELP.trim_start_matches('\n'));
                Ok(())
            }
            Input::Quit => break,
            Input::Databases => console.list_databases(id).await.map(|dbs| print_json(&dbs)),
            Input::Select(next) => {
                db = next;
                paging = Paging::default();
                Ok(())
            }
            Input::Keys(pattern) => console
                .list_all_keys(id, db, &pattern)
                .await
                .map(|keys| print_json(&keys)),
            Input::All(pattern) => console
                .scan_all_keys(id, db, batch, pattern.as_deref())
                .await
                .map(|keys| print_json(&keys)),
            Input::Scan(pattern) => {
                paging = Paging {
                    cursor: ScanCursor::start(),
                    pattern,
                };
                scan_page(console, id, db, batch, &mut paging).await
            }
            Input::Next if paging.cursor.is_start() => {
                eprintln!("no scan in progress");
                Ok(())
            }
            Input::Next => scan_page(console, id, db, batch, &mut paging).await,
            Input::Tree(pattern) => console
                .key_tree(id, db, &ScanCursor::start(), batch, pattern.as_deref())
                .await
                .map(|tree| print_json(&tree)),
            Input::Get(key) => console.get_key(id, db, &key).await.map(|value| print_json(&value)),
            Input::Set { key, request } => console
                .set_key(id, db, &key, &request)
                .await
                .map(|()| println!("OK")),
            Input::Del(key) => console.delete_key(id, db, &key).await.map(|()| println!("OK")),
            Input::Exec { command, args } => console
                .execute_command(id, db, &command, &args)
                .await
                .map(|reply| print_json(&reply)),
        };

        if let Err(err) = outcome {
            if err.is_terminal() {
                return Err(err).context("connection lost");
            }
            eprintln!("(error) {}", err);
        }
    }

    Ok(())
}

async fn scan_page<C: StoreClient>(
    console: &Console<C>,
    id: &str,
    db: u32,
    batch: usize,
    paging: &mut Paging,
) -> Result<(), keyscope::ConsoleError> {
    let page = console
        .list_keys(id, db, &paging.cursor, batch, paging.pattern.as_deref())
        .await?;
    print_json(&page);
    paging.cursor = page.next_cursor;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("keyscope v{}", keyscope::VERSION);

    if cli.memory {
        let console = Console::<MemoryClient>::new();
        console.register(MEMORY_ID, MemoryClient::new(Arc::new(StorageEngine::new())));
        repl(&console, MEMORY_ID, cli.db, cli.batch).await
    } else {
        let console = Console::<RespConnection<TcpStream>>::new();
        let config = cli.connection_config();
        let id = console
            .connect(&config)
            .await
            .with_context(|| format!("cannot connect to {}", config.id()))?;
        repl(&console, &id, cli.db, cli.batch).await
    }
}
