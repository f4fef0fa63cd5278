use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Interval, interval, interval_at};

use wsassess::connection::{accept, read_head};
use wsassess::protocol::HandshakeRequest;
use wsassess::{Config, Coordinate, Limits, Message};

pub const DEFAULT_PAGE: &str = "<!doctype html>\n<title>coordinates</title>\n<canvas id=\"c\"></canvas>\n";

/// What the hub broadcasts each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// A fresh in-range coordinate every tick, shared by all clients.
    Ticks,
    /// Text that is not JSON.
    Garbage,
    /// JSON with `x` past 100.
    OutOfBounds,
    /// The same coordinate every tick.
    Repeat,
    /// Each client gets its own unrelated sequence.
    Independent,
    /// Nothing at all.
    Silent,
}

#[derive(Debug, Clone)]
pub struct Behavior {
    pub interval: Duration,
    pub feed: Feed,
    /// Body for `GET /`; `None` answers 404.
    pub page: Option<String>,
    pub content_type: &'static str,
    /// Upgrades past this many are answered with 503.
    pub max_clients: Option<usize>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            feed: Feed::Ticks,
            page: Some(DEFAULT_PAGE.to_string()),
            content_type: "text/html; charset=utf-8",
            max_clients: None,
        }
    }
}

impl Behavior {
    pub fn feed(feed: Feed) -> Self {
        Self {
            feed,
            ..Default::default()
        }
    }
}

fn coordinate(n: u64) -> String {
    let c = Coordinate::new((n * 37 % 101) as f64, (n * 53 % 101) as f64);
    serde_json::to_string(&c).unwrap()
}

fn shared_payload(feed: Feed, n: u64) -> Option<String> {
    match feed {
        Feed::Ticks => Some(coordinate(n)),
        Feed::Garbage => Some(format!("not json {}", n)),
        Feed::OutOfBounds => Some(format!(r#"{{"x":{},"y":10}}"#, 150 + n)),
        Feed::Repeat => Some(coordinate(1)),
        Feed::Independent | Feed::Silent => None,
    }
}

async fn own_tick(own: &mut Option<Interval>) {
    match own {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// The broadcasting half of a target, independent of transport.
#[derive(Clone)]
pub struct Hub {
    behavior: Arc<Behavior>,
    ticks: broadcast::Sender<String>,
    clients: Arc<AtomicUsize>,
}

impl Hub {
    /// Start ticking. Ticks begin immediately, whether or not anyone listens.
    pub fn start(behavior: Behavior) -> (Hub, JoinHandle<()>) {
        let (ticks, _) = broadcast::channel(64);
        let hub = Hub {
            behavior: Arc::new(behavior),
            ticks: ticks.clone(),
            clients: Arc::new(AtomicUsize::new(0)),
        };

        let feed = hub.behavior.feed;
        let period = hub.behavior.interval;
        let ticker = tokio::spawn(async move {
            let mut interval = interval(period);
            let mut n = 0;
            loop {
                interval.tick().await;
                n += 1;
                if let Some(payload) = shared_payload(feed, n) {
                    let _ = ticks.send(payload);
                }
            }
        });
        (hub, ticker)
    }

    /// Upgrades accepted so far.
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Handle one incoming stream: WebSocket upgrade or plain GET.
    pub async fn serve<T>(self, mut io: T)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::new();
        let Ok(head) = read_head(&mut io, &mut buf, &Limits::default()).await else {
            return;
        };
        match HandshakeRequest::parse(&head) {
            Ok(request) => self.upgrade(io, request, buf).await,
            Err(_) => self.serve_http(io, &head).await,
        }
    }

    async fn upgrade<T>(self, mut io: T, request: HandshakeRequest, leftover: BytesMut)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let index = self.clients.fetch_add(1, Ordering::SeqCst);
        if self.behavior.max_clients.is_some_and(|max| index >= max) {
            let _ = io
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n")
                .await;
            return;
        }

        let mut rx = self.ticks.subscribe();
        let Ok(mut conn) = accept(io, &request, leftover, Config::server()).await else {
            return;
        };

        let period = self.behavior.interval;
        let mut own = (self.behavior.feed == Feed::Independent)
            .then(|| interval_at(tokio::time::Instant::now() + period, period));
        let mut n = index as u64 * 13;

        loop {
            tokio::select! {
                tick = rx.recv() => match tick {
                    Ok(payload) => {
                        if conn.send(Message::text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                () = own_tick(&mut own) => {
                    n += 1;
                    if conn.send(Message::text(coordinate(n))).await.is_err() {
                        break;
                    }
                }
                msg = conn.recv() => match msg {
                    Ok(Some(Message::Close(_))) | Ok(None) | Err(_) => break,
                    Ok(Some(_)) => {}
                },
            }
        }
    }

    async fn serve_http<T>(self, mut io: T, head: &[u8])
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let request_line = head.split(|&b| b == b'\r').next().unwrap_or_default();
        let response = match (&self.behavior.page, request_line.starts_with(b"GET / ")) {
            (Some(page), true) => format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                self.behavior.content_type,
                page.len(),
                page
            ),
            _ => "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\n\r\nnot found"
                .to_string(),
        };
        let _ = io.write_all(response.as_bytes()).await;
        let _ = io.shutdown().await;
    }
}

/// A hub behind a real TCP listener on an ephemeral port.
pub struct BroadcastServer {
    hub: Hub,
    ticker: JoinHandle<()>,
    acceptor: JoinHandle<()>,
}

impl BroadcastServer {
    pub async fn spawn(behavior: Behavior) -> (BroadcastServer, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (hub, ticker) = Hub::start(behavior);

        let accepting = hub.clone();
        let acceptor = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let _ = stream.set_nodelay(true);
                tokio::spawn(accepting.clone().serve(stream));
            }
        });

        (
            BroadcastServer {
                hub,
                ticker,
                acceptor,
            },
            addr,
        )
    }

    pub fn endpoint(addr: SocketAddr) -> String {
        format!("ws://{}/path", addr)
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub async fn shutdown(self) {
        self.acceptor.abort();
        self.ticker.abort();
        let _ = self.acceptor.await;
        let _ = self.ticker.await;
    }
}
