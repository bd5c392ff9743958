//! A small RESP server over `MemoryStore`, for driving `RespStore` end to end.
//!
//! It answers exactly the commands the accessor sends. `SCAN` pages through
//! the sorted key list and repeats the last key of each step at the start of
//! the next, like a server rehashing mid-scan.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use keydeck::config::StoreConfig;
use keydeck::protocol::{decode, RespValue};
use keydeck::store::{MemoryStore, RespStore, StoreError};
use keydeck::Shape;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub password: Option<String>,
    /// Answer `MEMORY USAGE`; otherwise reply with an unknown-command error.
    pub memory_command: bool,
}

pub struct TestServer {
    pub addr: String,
    pub store: Arc<MemoryStore>,
    /// Commands received, across all connections
    pub commands: Arc<AtomicUsize>,
    /// Connections accepted
    pub connections: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn config(&self) -> StoreConfig {
        StoreConfig::new(self.addr.clone())
    }

    pub async fn connect(&self) -> RespStore {
        RespStore::connect(self.config()).await.unwrap()
    }
}

pub async fn start_server(options: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let store = Arc::new(MemoryStore::new());
    let commands = Arc::new(AtomicUsize::new(0));
    let connections = Arc::new(AtomicUsize::new(0));

    let server = TestServer {
        addr,
        store: Arc::clone(&store),
        commands: Arc::clone(&commands),
        connections: Arc::clone(&connections),
    };

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            connections.fetch_add(1, Ordering::SeqCst);
            let session = Session {
                store: Arc::clone(&store),
                options: options.clone(),
                commands: Arc::clone(&commands),
                authenticated: options.password.is_none(),
            };
            tokio::spawn(session.run(stream));
        }
    });

    server
}

pub async fn start_default() -> TestServer {
    start_server(ServerOptions {
        memory_command: true,
        ..Default::default()
    })
    .await
}

struct Session {
    store: Arc<MemoryStore>,
    options: ServerOptions,
    commands: Arc<AtomicUsize>,
    authenticated: bool,
}

impl Session {
    async fn run(mut self, mut stream: TcpStream) {
        let mut buffer = BytesMut::with_capacity(4096);
        let mut out = BytesMut::new();

        loop {
            while let Ok(Some((frame, consumed))) = decode(&buffer) {
                let _ = buffer.split_to(consumed);
                self.execute(frame).write_to(&mut out);
            }
            if !out.is_empty() && stream.write_all(&out.split()).await.is_err() {
                return;
            }

            match stream.read_buf(&mut buffer).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }

    fn execute(&mut self, frame: RespValue) -> RespValue {
        self.commands.fetch_add(1, Ordering::SeqCst);

        let args: Vec<Bytes> = match frame.into_array() {
            Some(items) => items.into_iter().filter_map(RespValue::into_bytes).collect(),
            None => return RespValue::error("ERR invalid command format"),
        };
        let Some(name) = args.first().map(|n| String::from_utf8_lossy(n).to_uppercase()) else {
            return RespValue::error("ERR empty command");
        };

        if name == "AUTH" {
            return self.cmd_auth(&args[1..]);
        }
        if !self.authenticated {
            return RespValue::error("NOAUTH Authentication required.");
        }

        match self.dispatch(&name, &args[1..]) {
            Ok(reply) => reply,
            Err(StoreError::WrongType(_)) => RespValue::error(
                "WRONGTYPE Operation against a key holding the wrong kind of value",
            ),
            Err(e) => RespValue::error(format!("ERR {}", e)),
        }
    }

    fn cmd_auth(&mut self, args: &[Bytes]) -> RespValue {
        let given = args.first().map(|p| String::from_utf8_lossy(p).into_owned());
        if given.is_some() && given == self.options.password {
            self.authenticated = true;
            RespValue::ok()
        } else {
            RespValue::error("WRONGPASS invalid username-password pair or user is disabled.")
        }
    }

    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> Result<RespValue, StoreError> {
        let store = &self.store;
        let key = || text(args.first());

        let reply = match cmd {
            "PING" => RespValue::simple_string("PONG"),
            "SELECT" => RespValue::ok(),
            "EXISTS" => RespValue::integer(
                args.iter().filter(|k| store.exists(&lossy(k))).count() as i64,
            ),
            "TYPE" => RespValue::simple_string(match store.key_type(&key()) {
                None => "none",
                Some(Shape::String) => "string",
                Some(Shape::List) => "list",
                Some(Shape::Set) => "set",
                Some(Shape::Hash) => "hash",
                Some(Shape::SortedSet) => "zset",
                Some(Shape::Unknown(_)) => "stream",
            }),
            "PTTL" => {
                let key = key();
                RespValue::integer(match (store.exists(&key), store.ttl(&key)) {
                    (false, _) => -2,
                    (true, None) => -1,
                    (true, Some(ttl)) => ttl.as_millis() as i64,
                })
            }
            "GET" => match store.get(&key())? {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            },
            "SET" => {
                store.set(&key(), args.get(1).cloned().unwrap_or_default());
                RespValue::ok()
            }
            "LLEN" => RespValue::integer(store.llen(&key())? as i64),
            "LRANGE" => bulk_array(store.lrange(&key(), int(args.get(1)), int(args.get(2)))?),
            "RPUSH" => RespValue::integer(store.rpush(&key(), args[1..].to_vec())? as i64),
            "SMEMBERS" => bulk_array(store.smembers(&key())?),
            "SCARD" => RespValue::integer(store.scard(&key())? as i64),
            "SADD" => RespValue::integer(store.sadd(&key(), args[1..].to_vec())? as i64),
            "HGETALL" => bulk_array(
                store
                    .hgetall(&key())?
                    .into_iter()
                    .flat_map(|(f, v)| [f, v])
                    .collect(),
            ),
            "HSET" => {
                let fields = args[1..]
                    .chunks(2)
                    .filter(|pair| pair.len() == 2)
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                RespValue::integer(store.hset(&key(), fields)? as i64)
            }
            "ZRANGE" => bulk_array(
                store
                    .zrange_withscores(&key(), int(args.get(1)), int(args.get(2)))?
                    .into_iter()
                    .flat_map(|(m, s)| [m, Bytes::from(s.to_string())])
                    .collect(),
            ),
            "ZADD" => {
                // ZADD key CH score member [score member ...]
                let members = args[2..]
                    .chunks(2)
                    .filter(|pair| pair.len() == 2)
                    .map(|pair| (pair[1].clone(), text(Some(&pair[0])).parse().unwrap_or(0.0)))
                    .collect();
                RespValue::integer(store.zadd(&key(), members)? as i64)
            }
            "PEXPIRE" => {
                let ms = int(args.get(1)).max(0) as u64;
                RespValue::integer(store.expire(&key(), Duration::from_millis(ms))? as i64)
            }
            "PERSIST" => RespValue::integer(store.persist(&key()) as i64),
            "DEL" => {
                let keys: Vec<String> = args.iter().map(|k| lossy(k)).collect();
                RespValue::integer(store.del(&keys) as i64)
            }
            "SCAN" => self.cmd_scan(args),
            "MEMORY" if self.options.memory_command => match store.memory_usage(&text(args.get(1))) {
                Some(bytes) => RespValue::integer(bytes as i64),
                None => RespValue::null(),
            },
            _ => RespValue::error(format!(
                "ERR unknown command '{}', with args beginning with: ",
                cmd
            )),
        };
        Ok(reply)
    }

    /// SCAN cursor MATCH pattern COUNT n
    fn cmd_scan(&self, args: &[Bytes]) -> RespValue {
        let cursor = int(args.first()).max(0) as usize;
        let pattern = text(args.get(2));
        let count = int(args.get(4)).max(1) as usize;

        let keys = self.store.keys(&pattern);
        let start = cursor.saturating_sub(1).min(keys.len());
        let end = (cursor + count).min(keys.len());
        let next = if end >= keys.len() { 0 } else { end };

        RespValue::array(vec![
            RespValue::bulk_string(next.to_string()),
            bulk_array(keys[start..end].iter().map(|k| Bytes::from(k.clone())).collect()),
        ])
    }
}

fn lossy(bytes: &Bytes) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn text(arg: Option<&Bytes>) -> String {
    arg.map(lossy).unwrap_or_default()
}

fn int(arg: Option<&Bytes>) -> i64 {
    text(arg).parse().unwrap_or(0)
}

fn bulk_array(items: Vec<Bytes>) -> RespValue {
    RespValue::array(items.into_iter().map(RespValue::bulk_string).collect())
}
