use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::io::DuplexStream;

use wsassess::probe::Dialer;
use wsassess::{Endpoint, Error, Result};

use super::Hub;

/// Connects probes to a [`Hub`] over in-memory pipes.
pub struct PipeDialer {
    hub: Option<Hub>,
    dials: AtomicUsize,
    crash_on: Option<usize>,
}

impl PipeDialer {
    pub fn new(hub: Hub) -> Self {
        Self {
            hub: Some(hub),
            dials: AtomicUsize::new(0),
            crash_on: None,
        }
    }

    /// Every dial is refused, as if nothing were listening.
    pub fn refusing() -> Self {
        Self {
            hub: None,
            dials: AtomicUsize::new(0),
            crash_on: None,
        }
    }

    /// Like [`PipeDialer::new`], but the `nth` dial (counting from zero,
    /// preflight included) panics inside the dialing task.
    pub fn crashing_on(hub: Hub, nth: usize) -> Self {
        Self {
            crash_on: Some(nth),
            ..Self::new(hub)
        }
    }
}

impl Dialer for PipeDialer {
    type Stream = DuplexStream;

    async fn dial(&self, _endpoint: &Endpoint) -> Result<DuplexStream> {
        let n = self.dials.fetch_add(1, Ordering::SeqCst);
        if self.crash_on == Some(n) {
            panic!("dial {n} crashed");
        }
        let hub = self
            .hub
            .clone()
            .ok_or_else(|| Error::Io("connection refused".into()))?;
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(hub.serve(server));
        Ok(client)
    }
}
