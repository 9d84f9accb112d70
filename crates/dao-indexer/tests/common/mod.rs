//! Common helpers for integration tests: a scriptable in-memory log source and a canned
//! JSON-RPC HTTP endpoint.
//! Some helpers are only used by specific test binaries; allow dead_code to avoid per-binary warnings.
#![allow(dead_code)]

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use dao_indexer::{
    DaoEvent, DecodedLog, EventKind, IndexerConfig, LogSource, ProposalCreatedEvent,
    ProposalExecutedEvent, SourceError, VotedEvent,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn test_config(start_block: u64, poll_interval_ms: u64) -> IndexerConfig {
    let mut config = IndexerConfig::new("http://127.0.0.1:8545", Address::repeat_byte(0xda));
    config.start_block = start_block;
    config.poll_interval = Duration::from_millis(poll_interval_ms);
    config
}

#[derive(Default)]
struct Script {
    height: u64,
    logs: Vec<DecodedLog>,
    fail_height: usize,
    fail_kind: Option<(EventKind, usize)>,
}

/// In-memory chain: a settable head and a list of logs; failures and latency can be injected.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<Script>,
    delay: Mutex<Duration>,
    next_tx: AtomicUsize,
    pub height_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(height: u64) -> Self {
        let s = Self::default();
        s.set_height(height);
        s
    }

    pub fn set_height(&self, height: u64) {
        self.script.lock().unwrap().height = height;
    }

    /// Latency added to every `current_height` call (the start of a cycle).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Fail the next `n` `current_height` calls.
    pub fn fail_height(&self, n: usize) {
        self.script.lock().unwrap().fail_height = n;
    }

    /// Fail the next `n` `query_logs` calls for `kind`.
    pub fn fail_kind(&self, kind: EventKind, n: usize) {
        self.script.lock().unwrap().fail_kind = Some((kind, n));
    }

    fn push(&self, event: DaoEvent, block_number: u64) {
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let mut tx = [0u8; 32];
        tx[24..].copy_from_slice(&n.to_be_bytes());
        self.script.lock().unwrap().logs.push(DecodedLog {
            event,
            block_number,
            tx_hash: B256::from(tx),
            log_index: 0,
        });
    }

    pub fn created(&self, id: u64, description: &str, block_number: u64) {
        self.push(
            DaoEvent::Created(ProposalCreatedEvent {
                id,
                creator: Address::repeat_byte(0xc0),
                description: description.to_string(),
                block_number,
            }),
            block_number,
        );
    }

    pub fn voted(&self, id: u64, voter: Address, support: bool, block_number: u64) {
        self.push(
            DaoEvent::Voted(VotedEvent {
                id,
                voter,
                support,
                block_number,
            }),
            block_number,
        );
    }

    pub fn executed(&self, id: u64, block_number: u64) {
        self.push(
            DaoEvent::Executed(ProposalExecutedEvent {
                id,
                executor: Address::repeat_byte(0xee),
                block_number,
            }),
            block_number,
        );
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogSource for ScriptedSource {
    async fn current_height(&self) -> Result<u64, SourceError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script.lock().unwrap();
        if script.fail_height > 0 {
            script.fail_height -= 1;
            return Err(SourceError::Rpc("scripted height failure".into()));
        }
        Ok(script.height)
    }

    async fn query_logs(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DecodedLog>, SourceError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if let Some((k, n)) = script.fail_kind.as_mut() {
            if *k == kind && *n > 0 {
                *n -= 1;
                return Err(SourceError::Rpc(format!("scripted {} failure", kind)));
            }
        }
        let mut out: Vec<DecodedLog> = script
            .logs
            .iter()
            .filter(|l| l.event.kind() == kind)
            .filter(|l| l.block_number >= from_block && l.block_number <= to_block)
            .cloned()
            .collect();
        out.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(out)
    }
}

/// Local HTTP endpoint answering each JSON-RPC request from a handler. The handler returns
/// the reply object without `jsonrpc`/`id`, e.g. `{"result": ..}` or `{"error": ..}`.
pub struct CannedRpc {
    pub url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl CannedRpc {
    pub async fn serve<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);
        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    answer(stream, handler.as_ref(), &seen).await;
                });
            }
        });
        Self { url, requests }
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["method"] == method)
            .collect()
    }
}

async fn answer<F>(mut stream: TcpStream, handler: &F, seen: &Mutex<Vec<Value>>)
where
    F: Fn(&str, &Value) -> Value,
{
    let Some(body) = read_request_body(&mut stream).await else {
        return;
    };
    let request: Value = serde_json::from_slice(&body).unwrap();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let mut reply = handler(&method, &request["params"]);
    reply["jsonrpc"] = json!("2.0");
    reply["id"] = request["id"].clone();
    seen.lock().unwrap().push(request);

    let body = reply.to_string();
    let head = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(body.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request_body(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = end + 4;
            while buf.len() < start + len {
                let n = stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(buf[start..start + len].to_vec());
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
