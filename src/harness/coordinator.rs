use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, TokioClock};
use crate::config::HarnessConfig;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::harness::evaluate::{evaluate, static_page};
use crate::harness::record::ConnectionRecord;
use crate::harness::report::{Assertion, Report};
use crate::http;
use crate::probe::{self, Dialer, ProbeEvent, ProbeHandle, ProbeOptions, TcpDialer};
use crate::target::{RunningTarget, Target};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Target launched, waiting for it to bind.
    Warmup,
    /// Probes open, collecting messages.
    Observing,
    /// Window closed, records frozen.
    Evaluating,
    Done,
}

impl Phase {
    /// The only phase this one may move to.
    #[must_use]
    pub const fn next(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::Warmup),
            Phase::Warmup => Some(Phase::Observing),
            Phase::Observing => Some(Phase::Evaluating),
            Phase::Evaluating => Some(Phase::Done),
            Phase::Done => None,
        }
    }
}

/// Drives one assessment run: launch, warm up, observe, evaluate.
///
/// ## Example
///
/// ```rust,ignore
/// use wsassess::{Coordinator, HarnessConfig};
///
/// let mut coordinator = Coordinator::new(HarnessConfig::new("ws://localhost:8080/path"));
/// let report = coordinator.run().await?;
/// println!("{}", report);
/// ```
pub struct Coordinator<C = TokioClock, D = TcpDialer> {
    config: HarnessConfig,
    target: Target,
    clock: C,
    dialer: Arc<D>,
    phase: Phase,
}

impl Coordinator {
    /// Real clock, real TCP, external target.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            target: Target::External,
            clock: TokioClock::new(),
            dialer: Arc::new(TcpDialer),
            phase: Phase::Idle,
        }
    }
}

impl<C: Clock, D: Dialer> Coordinator<C, D> {
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Coordinator<C2, D> {
        Coordinator {
            config: self.config,
            target: self.target,
            clock,
            dialer: self.dialer,
            phase: self.phase,
        }
    }

    #[must_use]
    pub fn with_dialer<D2: Dialer>(self, dialer: D2) -> Coordinator<C, D2> {
        Coordinator {
            config: self.config,
            target: self.target,
            clock: self.clock,
            dialer: Arc::new(dialer),
            phase: self.phase,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn advance(&mut self) {
        if let Some(next) = self.phase.next() {
            info!(from = ?self.phase, to = ?next, "phase transition");
            self.phase = next;
        }
    }

    /// Run the whole assessment once.
    ///
    /// Recorded failures end up in the report; the run itself only fails
    /// when there is nothing to assess.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if the tolerance settings are unusable
    /// - `Error::InvalidEndpoint` if the configured endpoint is not `ws://`
    /// - `Error::TargetUnavailable` if the target cannot be launched, exits
    ///   during warmup, or nothing accepts connections afterwards
    /// - `Error::ProtocolViolation` if called twice
    pub async fn run(&mut self) -> Result<Report> {
        if self.phase != Phase::Idle {
            return Err(Error::ProtocolViolation(format!(
                "run already started (phase {:?})",
                self.phase
            )));
        }
        self.config.tolerance.validate()?;
        let endpoint: Endpoint = self.config.endpoint.parse()?;

        self.advance();
        let mut target = self.target.launch()?;
        let result = self.assess(&endpoint, &mut target).await;
        target.stop().await;
        result
    }

    async fn assess(&mut self, endpoint: &Endpoint, target: &mut RunningTarget) -> Result<Report> {
        self.clock.sleep(self.config.warmup).await;
        target.ensure_running()?;
        self.preflight(endpoint).await?;

        let mut assertions = Vec::new();
        if let Some(page) = self.config.reference_page.clone() {
            assertions.extend(self.check_static_page(endpoint, &page).await);
        }

        self.advance();
        let records = self.observe(endpoint).await;

        self.advance();
        let evaluation = evaluate(&records, &self.config.tolerance, self.config.budget);
        assertions.extend(evaluation.assertions);

        self.advance();
        let report = Report::new(assertions, evaluation.suppressed);
        info!(
            passed = report.summary.passed,
            failed = report.summary.failed,
            "assessment finished"
        );
        Ok(report)
    }

    /// Make sure something accepts connections before probes go out.
    async fn preflight(&self, endpoint: &Endpoint) -> Result<()> {
        let dial = self.dialer.dial(endpoint);
        tokio::select! {
            result = dial => result.map(drop).map_err(|e| {
                Error::TargetUnavailable(format!("nothing accepting connections at {}: {}", endpoint, e))
            }),
            () = self.clock.sleep(self.config.connect_timeout) => Err(Error::TargetUnavailable(
                format!("connecting to {} timed out", endpoint)
            )),
        }
    }

    async fn check_static_page(&self, endpoint: &Endpoint, page: &Path) -> Vec<Assertion> {
        let fetch = async {
            let io = self.dialer.dial(endpoint).await?;
            http::get(io, &endpoint.authority(), "/", &self.config.transport.limits).await
        };
        let response = tokio::select! {
            result = fetch => result,
            () = self.clock.sleep(self.config.connect_timeout) => {
                Err(Error::Timeout("GET / did not complete".into()))
            }
        };
        let reference = tokio::fs::read_to_string(page).await;
        static_page(response, page, reference)
    }

    async fn observe(&self, endpoint: &Endpoint) -> Vec<ConnectionRecord> {
        let n = self.config.tolerance.connections;
        let options = ProbeOptions {
            endpoint: endpoint.clone(),
            transport: self.config.transport.clone(),
            connect_timeout: self.config.connect_timeout,
        };

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let probes: Vec<ProbeHandle> = (0..n)
            .map(|i| {
                probe::spawn(
                    i,
                    options.clone(),
                    Arc::clone(&self.dialer),
                    self.clock.clone(),
                    events_tx.clone(),
                )
            })
            .collect();
        drop(events_tx);
        let mut records: Vec<ConnectionRecord> = (0..n).map(ConnectionRecord::new).collect();

        let observation = self.config.tolerance.observation;
        let deadline = self.clock.now() + observation;
        let window = self.clock.sleep(observation);
        tokio::pin!(window);
        loop {
            tokio::select! {
                () = &mut window => break,
                event = events.recv() => match event {
                    Some(ProbeEvent { probe, kind }) => {
                        if let Some(record) = records.get_mut(probe) {
                            record.apply(kind);
                        }
                    }
                    None => {
                        debug!("all probes finished before the window closed");
                        window.as_mut().await;
                        break;
                    }
                },
            }
        }

        for record in &mut records {
            record.freeze(deadline);
        }
        for probe in &probes {
            probe.close();
        }
        for (probe, record) in probes.into_iter().zip(records.iter_mut()) {
            if let Some(crash) = probe.join(&self.clock, self.config.connect_timeout).await {
                record.fault(crash);
            }
        }

        let mut discarded = 0usize;
        while let Ok(ProbeEvent { probe, kind }) = events.try_recv() {
            if let Some(record) = records.get_mut(probe) {
                if !record.apply(kind) {
                    discarded += 1;
                }
            }
        }
        if discarded > 0 {
            debug!(discarded, "dropped events from after the window deadline");
        }

        let opened = records.iter().filter(|r| r.opened).count();
        if opened < n {
            warn!(opened, expected = n, "not every probe opened");
        }
        records
    }
}
