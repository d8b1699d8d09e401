//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluegreen_proxy::config::{BackendConfig, ProxyConfig};
use bluegreen_proxy::lifecycle::Shutdown;
use bluegreen_proxy::{HttpServer, PoolRegistry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What a mock backend answers for one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// 200 carrying the pool and release headers the way the app does.
    pub fn from_pool(pool: &str, release: &str) -> Self {
        Self::new(200, format!("hello from {pool}"))
            .header("X-App-Pool", pool)
            .header("X-Release-Id", release)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request as the mock backend saw it.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: String,
    pub target: String,
    pub head: String,
    pub body: Vec<u8>,
}

impl Received {
    /// Case-insensitive header lookup on the raw request head.
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Handle to a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicU32>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl MockBackend {
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `reply` gets the zero-based index of the request it is answering.
pub async fn start_backend<F>(reply: F) -> MockBackend
where
    F: Fn(u32) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let backend = MockBackend {
        addr,
        hits: Arc::new(AtomicU32::new(0)),
        received: Arc::new(Mutex::new(Vec::new())),
    };
    let reply = Arc::new(reply);

    let handle = backend.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let reply = reply.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                let _ = serve_one(socket, reply.as_ref(), &handle).await;
            });
        }
    });

    backend
}

/// Mock backend that always gives the same answer.
pub async fn start_fixed_backend(reply: Reply) -> MockBackend {
    start_backend(move |_| reply.clone()).await
}

async fn serve_one<F>(mut socket: TcpStream, reply: &F, backend: &MockBackend) -> std::io::Result<()>
where
    F: Fn(u32) -> Reply,
{
    let received = read_request(&mut socket).await?;
    let index = backend.hits.fetch_add(1, Ordering::SeqCst);
    backend.received.lock().unwrap().push(received);

    let reply = reply(index);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let mut response = format!("HTTP/1.1 {} {}\r\n", reply.status, reason(reply.status));
    for (name, value) in &reply.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.body.len(),
        reply.body
    ));

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut body = buf[head_end + 4..].to_vec();

    let request_line = head.lines().next().unwrap_or_default().to_string();
    let mut words = request_line.split_whitespace();
    let method = words.next().unwrap_or_default().to_string();
    let target = words.next().unwrap_or_default().to_string();

    let mut received = Received {
        method,
        target,
        head,
        body: Vec::new(),
    };

    let length = received
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while body.len() < length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    received.body = body;
    Ok(received)
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// An address nothing listens on: connections to it are refused.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Proxy config pointing blue and green at the given addresses, blue active.
pub fn proxy_config(blue: SocketAddr, green: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backends = vec![
        BackendConfig {
            name: "blue".into(),
            address: blue.to_string(),
        },
        BackendConfig {
            name: "green".into(),
            address: green.to_string(),
        },
    ];
    config.upstream.active_pool = "blue".into();
    config.upstream.backup_pool = Some("green".into());
    config.timeouts.connect_secs = 1;
    config.timeouts.read_secs = 1;
    config
}

/// A proxy running in the background until `shutdown` fires.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub registry: Arc<PoolRegistry>,
    pub shutdown: Shutdown,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let server = HttpServer::new(config).unwrap();
    let registry = server.registry().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    RunningProxy {
        addr,
        registry,
        shutdown,
    }
}

/// Client that opens a fresh connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
