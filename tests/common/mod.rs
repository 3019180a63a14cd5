//! In-process RESP server for integration tests.
//!
//! Speaks just enough of the protocol for the client tests: PING, ECHO,
//! SET, GET, DEL, INCR, AUTH, SELECT, plus two test hooks:
//! `SLEEP <ms>` delays its reply and `CLOSE` drops the connection without
//! replying. A silent server reads commands but never answers.

#![allow(dead_code)]

use anyhow::{anyhow, bail};
use bytes::{Bytes, BytesMut};
use flashkv_client::protocol::RespParser;
use flashkv_client::{Endpoint, RespValue};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct ServerState {
    password: Mutex<Option<String>>,
    data: Mutex<HashMap<(u32, Bytes), Bytes>>,
    connections: AtomicU64,
    silent: AtomicBool,
}

pub struct TestServer {
    pub addr: SocketAddr,
    state: Arc<ServerState>,
    kill_tx: broadcast::Sender<()>,
    accept_task: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_password(None).await
    }

    pub async fn start_with_password(password: Option<&str>) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        *state.password.lock().unwrap() = password.map(str::to_string);
        let (kill_tx, _) = broadcast::channel(4);

        let mut server = Self {
            addr,
            state,
            kill_tx,
            accept_task: None,
        };
        server.accept_task = Some(server.spawn_accept_loop(listener));
        server
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> u64 {
        self.state.connections.load(Ordering::Relaxed)
    }

    pub fn set_password(&self, password: Option<&str>) {
        *self.state.password.lock().unwrap() = password.map(str::to_string);
    }

    /// Stops (or resumes) answering commands on every connection.
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::Relaxed);
    }

    /// Closes every open client connection. The listener keeps running.
    pub fn drop_clients(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Stops accepting and closes every open connection.
    pub fn stop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        self.drop_clients();
    }

    /// Listens again on the same address after `stop`.
    pub async fn restart(&mut self) {
        let listener = TcpListener::bind(self.addr).await.unwrap();
        self.accept_task = Some(self.spawn_accept_loop(listener));
    }

    fn spawn_accept_loop(&self, listener: TcpListener) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let kill_tx = self.kill_tx.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                state.connections.fetch_add(1, Ordering::Relaxed);
                let state = Arc::clone(&state);
                let kill_rx = kill_tx.subscribe();
                tokio::spawn(async move {
                    let _ = serve(stream, state, kill_rx).await;
                });
            }
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ConnState {
    authed: bool,
    db: u32,
}

async fn serve(
    mut stream: TcpStream,
    state: Arc<ServerState>,
    mut kill_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut parser = RespParser::new();
    let mut conn = ConnState {
        authed: state.password.lock().unwrap().is_none(),
        db: 0,
    };

    loop {
        while let Some((value, consumed)) = parser.parse(&buffer)? {
            let _ = buffer.split_to(consumed);
            let args = into_args(value)?;
            if state.silent.load(Ordering::Relaxed) {
                continue;
            }
            match execute(&state, &mut conn, &args).await {
                Some(reply) => stream.write_all(&reply.serialize()).await?,
                None => return Ok(()),
            }
        }

        tokio::select! {
            n = stream.read_buf(&mut buffer) => {
                if n? == 0 {
                    return Ok(());
                }
            }
            _ = kill_rx.recv() => return Ok(()),
        }
    }
}

fn into_args(value: RespValue) -> anyhow::Result<Vec<Bytes>> {
    let items = value
        .into_array()
        .ok_or_else(|| anyhow!("command is not an array"))?;
    items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(b) => Ok(b),
            other => bail!("unexpected argument: {other:?}"),
        })
        .collect()
}

/// Returns `None` when the connection should be closed without a reply.
async fn execute(state: &ServerState, conn: &mut ConnState, args: &[Bytes]) -> Option<RespValue> {
    let name = String::from_utf8_lossy(&args[0]).to_uppercase();

    if name == "AUTH" {
        let expected = state.password.lock().unwrap().clone();
        let given = args.last().map(|p| String::from_utf8_lossy(p).to_string());
        return Some(match expected {
            Some(pw) if given.as_deref() == Some(pw.as_str()) => {
                conn.authed = true;
                RespValue::ok()
            }
            Some(_) => RespValue::error("WRONGPASS invalid username-password pair"),
            None => RespValue::error("ERR AUTH called without any password configured"),
        });
    }
    if !conn.authed {
        return Some(RespValue::error("NOAUTH Authentication required."));
    }

    if name == "SLEEP" && args.len() == 2 {
        let millis = String::from_utf8_lossy(&args[1]).parse::<u64>().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        return Some(RespValue::ok());
    }

    let reply = match (name.as_str(), args.len()) {
        ("PING", 1) => RespValue::simple_string("PONG"),
        ("ECHO", 2) => RespValue::BulkString(args[1].clone()),
        ("SELECT", 2) => match String::from_utf8_lossy(&args[1]).parse::<u32>() {
            Ok(db) if db < 16 => {
                conn.db = db;
                RespValue::ok()
            }
            _ => RespValue::error("ERR DB index is out of range"),
        },
        ("SET", 3) => {
            let key = (conn.db, args[1].clone());
            state.data.lock().unwrap().insert(key, args[2].clone());
            RespValue::ok()
        }
        ("GET", 2) => {
            let key = (conn.db, args[1].clone());
            match state.data.lock().unwrap().get(&key) {
                Some(value) => RespValue::BulkString(value.clone()),
                None => RespValue::Null,
            }
        }
        ("DEL", 2) => {
            let key = (conn.db, args[1].clone());
            let removed = state.data.lock().unwrap().remove(&key).is_some();
            RespValue::integer(removed as i64)
        }
        ("INCR", 2) => {
            let key = (conn.db, args[1].clone());
            let mut data = state.data.lock().unwrap();
            let current = data
                .get(&key)
                .map(|v| String::from_utf8_lossy(v).parse::<i64>());
            match current {
                Some(Err(_)) => RespValue::error("ERR value is not an integer or out of range"),
                Some(Ok(n)) => {
                    data.insert(key, Bytes::from((n + 1).to_string()));
                    RespValue::integer(n + 1)
                }
                None => {
                    data.insert(key, Bytes::from("1"));
                    RespValue::integer(1)
                }
            }
        }
        ("CLOSE", 1) => return None,
        _ => RespValue::error(format!("ERR unknown command '{}'", name)),
    };
    Some(reply)
}
