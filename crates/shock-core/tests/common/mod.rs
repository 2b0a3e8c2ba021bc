//! In-process stand-in for the remote engine.
//!
//! Speaks just enough HTTP/1.1 keep-alive for reqwest, and counts requests
//! plus opened and closed connections so tests can check connection reuse
//! and release.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

pub enum Action {
    Respond { status: u16, body: String },
    /// Read the request and never answer; wait for the client to give up.
    Hang,
}

impl Action {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Action::Respond {
            status,
            body: body.into(),
        }
    }
}

type Handler = Arc<dyn Fn(&Request) -> Action + Send + Sync>;

#[derive(Default)]
pub struct Counters {
    pub requests: AtomicU64,
    pub opened: AtomicU64,
    pub closed: AtomicU64,
    pub seen: Mutex<Vec<Request>>,
}

pub struct MockEngine {
    pub addr: SocketAddr,
    pub counters: Arc<Counters>,
    accept_loop: JoinHandle<()>,
}

impl MockEngine {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Action + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(Counters::default());
        let handler: Handler = Arc::new(handler);

        let accept_loop = {
            let counters = counters.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    counters.opened.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_connection(stream, handler.clone(), counters.clone()));
                }
            })
        };

        Self {
            addr,
            counters,
            accept_loop,
        }
    }

    pub fn base_url(&self) -> url::Url {
        url::Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub fn url(&self, path: &str) -> url::Url {
        self.base_url().join(path).unwrap()
    }

    pub fn requests(&self) -> u64 {
        self.counters.requests.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> u64 {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Request> {
        self.counters.seen.lock().unwrap().clone()
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// A local address nothing is listening on.
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

async fn serve_connection(stream: TcpStream, handler: Handler, counters: Arc<Counters>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    while let Ok(Some(request)) = read_request(&mut reader).await {
        counters.requests.fetch_add(1, Ordering::SeqCst);
        counters.seen.lock().unwrap().push(request.clone());

        match handler(&request) {
            Action::Respond { status, body } => {
                let response = format!(
                    "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
                    if status < 400 { "OK" } else { "ERR" },
                    body.len()
                );
                if write.write_all(response.as_bytes()).await.is_err() {
                    break;
                }
            }
            Action::Hang => {
                let mut sink = [0u8; 1024];
                while let Ok(n) = reader.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
                break;
            }
        }
    }

    counters.closed.fetch_add(1, Ordering::SeqCst);
}

async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Request>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(Some(Request { method, path, body }))
}
