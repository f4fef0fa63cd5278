//! Connection probes: one observing client connection per task.
//!
//! A probe never touches shared state. Everything it sees (open, each
//! message with its receive time, transport errors, close) is sent to the
//! coordinator as a [`ProbeEvent`] over an unbounded channel, so a slow
//! consumer never stalls the socket.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::connection::{self, Connection};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::CloseCode;

/// Opens raw byte streams to a target.
///
/// Real runs use [`TcpDialer`]; tests can hand out in-memory streams.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Plain TCP, no TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, endpoint: &Endpoint) -> Result<TcpStream> {
        let stream = TcpStream::connect(endpoint.authority()).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// A message as the probe received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Receive time on the driving clock.
    pub at: Duration,
    pub payload: Vec<u8>,
}

impl Received {
    #[must_use]
    pub fn new(at: Duration, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            at,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Opened,
    Message(Received),
    Failed(Error),
    Closed,
}

/// Something that happened on probe `probe`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeEvent {
    pub probe: usize,
    pub kind: EventKind,
}

/// Per-probe settings, shared by all probes of a run.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub endpoint: Endpoint,
    pub transport: Config,
    /// Bound on connect plus handshake.
    pub connect_timeout: Duration,
}

/// Handle the coordinator keeps for each running probe.
#[derive(Debug)]
pub struct ProbeHandle {
    index: usize,
    close_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Ask the probe to close its connection. Safe to call repeatedly.
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    /// Wait up to `grace` on `clock` for the probe task to finish, then
    /// abort it.
    ///
    /// Returns the panic as an error if the task crashed, since such a
    /// probe never got to report its own failure.
    pub async fn join<C: Clock>(self, clock: &C, grace: Duration) -> Option<Error> {
        let Self { index, task, .. } = self;
        let abort = task.abort_handle();
        tokio::select! {
            outcome = task => match outcome {
                Err(e) if e.is_panic() => {
                    let reason = panic_message(e.into_panic());
                    warn!(probe = index, %reason, "probe task panicked");
                    Some(Error::ProbePanicked(reason))
                }
                _ => None,
            },
            () = clock.sleep(grace) => {
                debug!(probe = index, "probe did not finish in time, aborting");
                abort.abort();
                None
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown cause".to_string(), |s| (*s).to_string()),
    }
}

/// Start probe `index`.
///
/// Makes one open attempt; there is no retry. Every outcome is reported on
/// `events`.
pub fn spawn<C, D>(
    index: usize,
    options: ProbeOptions,
    dialer: Arc<D>,
    clock: C,
    events: mpsc::UnboundedSender<ProbeEvent>,
) -> ProbeHandle
where
    C: Clock,
    D: Dialer,
{
    let (close_tx, close_rx) = watch::channel(false);
    let probe = Probe {
        index,
        options,
        clock,
        events,
    };
    let task = tokio::spawn(probe.run(dialer, close_rx));
    ProbeHandle {
        index,
        close_tx,
        task,
    }
}

struct Probe<C> {
    index: usize,
    options: ProbeOptions,
    clock: C,
    events: mpsc::UnboundedSender<ProbeEvent>,
}

impl<C: Clock> Probe<C> {
    fn emit(&self, kind: EventKind) {
        // The coordinator stops listening once it has what it needs.
        let _ = self.events.send(ProbeEvent {
            probe: self.index,
            kind,
        });
    }

    async fn open<D: Dialer>(&self, dialer: &D) -> Result<Connection<D::Stream>> {
        let endpoint = &self.options.endpoint;
        let attempt = async {
            let io = dialer.dial(endpoint).await?;
            connection::connect(
                io,
                &endpoint.authority(),
                &endpoint.path,
                self.options.transport.clone(),
            )
            .await
        };

        tokio::select! {
            result = attempt => result,
            () = self.clock.sleep(self.options.connect_timeout) => Err(Error::Timeout(format!(
                "connecting to {} took longer than {:?}",
                endpoint, self.options.connect_timeout
            ))),
        }
    }

    async fn run<D: Dialer>(self, dialer: Arc<D>, mut close_rx: watch::Receiver<bool>) {
        let opened = tokio::select! {
            biased;
            () = close_requested(&mut close_rx) => {
                self.emit(EventKind::Closed);
                return;
            }
            result = self.open(dialer.as_ref()) => result,
        };

        let mut conn = match opened {
            Ok(conn) => conn,
            Err(e) => {
                warn!(probe = self.index, error = %e, "probe failed to open");
                self.emit(EventKind::Failed(e));
                self.emit(EventKind::Closed);
                return;
            }
        };
        info!(probe = self.index, endpoint = %self.options.endpoint, "opened connection");
        self.emit(EventKind::Opened);

        loop {
            tokio::select! {
                biased;
                _ = close_rx.changed() => {
                    let _ = conn.close(CloseCode::Normal, "").await;
                    let _ = conn.shutdown().await;
                    break;
                }
                msg = conn.recv() => match msg {
                    Ok(Some(msg)) => {
                        let Some(payload) = msg.into_data() else { continue };
                        let at = self.clock.now();
                        debug!(probe = self.index, at_ms = at.as_millis() as u64, bytes = payload.len(), "received message");
                        self.emit(EventKind::Message(Received::new(at, payload)));
                    }
                    Ok(None) => {
                        debug!(probe = self.index, "connection closed by target");
                        break;
                    }
                    Err(e) => {
                        warn!(probe = self.index, error = %e, "probe transport error");
                        self.emit(EventKind::Failed(e));
                        break;
                    }
                },
            }
        }

        self.emit(EventKind::Closed);
    }
}

async fn close_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}
