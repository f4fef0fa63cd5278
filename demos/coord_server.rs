//! Reference coordinate broadcast server.
//!
//! Listens on one port for both WebSocket upgrades and `GET /`, and every
//! interval sends a random-walk `{x, y}` to every connected client. A
//! passing target for `wsassess`:
//!
//! ```text
//! cargo run --example coord_server -- --port 8080 --page index.html
//! cargo run --bin wsassess -- --page index.html
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wsassess::connection::{accept, read_head};
use wsassess::protocol::HandshakeRequest;
use wsassess::{Config, Coordinate, Limits, Message};

#[derive(Parser)]
#[command(name = "coord_server")]
#[command(about = "Broadcast random coordinates to every WebSocket client")]
struct Args {
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Broadcast interval in milliseconds
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// HTML page served on GET /
    #[arg(long)]
    page: Option<PathBuf>,
}

/// Moves by a bounded random step, clamped to the 0..100 square. Never
/// repeats the previous point.
struct RandomWalk {
    current: Coordinate,
}

impl RandomWalk {
    fn step(&mut self, rng: &mut impl Rng) -> Coordinate {
        loop {
            let dx: i32 = rng.gen_range(-10..=10);
            let dy: i32 = rng.gen_range(-10..=10);
            let next = Coordinate::new(
                (self.current.x + f64::from(dx)).clamp(0.0, 100.0),
                (self.current.y + f64::from(dy)).clamp(0.0, 100.0),
            );
            if next != self.current {
                self.current = next;
                return next;
            }
        }
    }
}

async fn handle(mut stream: TcpStream, ticks: broadcast::Sender<String>, page: Arc<Option<String>>) {
    let peer = stream.peer_addr().ok();
    let mut buf = BytesMut::new();
    let Ok(head) = read_head(&mut stream, &mut buf, &Limits::default()).await else {
        return;
    };

    let request = match HandshakeRequest::parse(&head) {
        Ok(request) => request,
        Err(_) => {
            let response = match page.as_deref() {
                Some(body) if head.starts_with(b"GET / ") => format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ),
                _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
            };
            let _ = stream.write_all(response.as_bytes()).await;
            return;
        }
    };

    let mut rx = ticks.subscribe();
    let mut conn = match accept(stream, &request, buf, Config::server()).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(?peer, error = %e, "upgrade failed");
            return;
        }
    };
    info!(?peer, path = %request.path, "client connected");

    loop {
        tokio::select! {
            tick = rx.recv() => match tick {
                Ok(payload) => {
                    if conn.send(Message::text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(?peer, skipped, "client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = conn.recv() => match msg {
                Ok(Some(Message::Close(_))) | Ok(None) => break,
                Ok(Some(_)) => {}
                Err(e) => {
                    debug!(?peer, error = %e, "client error");
                    break;
                }
            },
        }
    }
    info!(?peer, "client disconnected");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let page = match &args.page {
        Some(path) => Some(tokio::fs::read_to_string(path).await?),
        None => None,
    };
    let page = Arc::new(page);

    let listener = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let (ticks, _) = broadcast::channel::<String>(16);
    let sender = ticks.clone();
    let period = Duration::from_millis(args.interval_ms);
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut walk = RandomWalk {
            current: Coordinate::new(50.0, 50.0),
        };
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let coordinate = walk.step(&mut rng);
            match serde_json::to_string(&coordinate) {
                Ok(payload) => {
                    let _ = sender.send(payload);
                }
                Err(e) => warn!(error = %e, "failed to encode coordinate"),
            }
        }
    });

    loop {
        let (stream, _) = listener.accept().await?;
        stream.set_nodelay(true)?;
        tokio::spawn(handle(stream, ticks.clone(), Arc::clone(&page)));
    }
}
