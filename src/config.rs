//! Configuration for probe connections and assessment runs.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::harness::ViolationBudget;

/// Size caps applied to every connection.
///
/// The target only ever sends small JSON objects; anything much larger is
/// treated as a protocol failure rather than buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Largest single frame payload (1 MiB).
    pub max_frame_size: usize,
    /// Largest reassembled message or HTTP body (4 MiB).
    pub max_message_size: usize,
    /// Most fragments one message may arrive in (128).
    pub max_fragment_count: usize,
    /// Largest handshake or HTTP response head (8 KiB).
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(1 << 20, 4 << 20, 128, 8 << 10)
    }
}

impl Limits {
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// # Errors
    ///
    /// [`Error::MessageTooLarge`] when `size` is over the cap.
    pub const fn check_message_size(&self, size: usize) -> Result<(), Error> {
        let max = self.max_message_size;
        if size <= max { Ok(()) } else { Err(Error::MessageTooLarge { size, max }) }
    }

    /// # Errors
    ///
    /// [`Error::FrameTooLarge`] when `size` is over the cap.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), Error> {
        let max = self.max_frame_size;
        if size <= max { Ok(()) } else { Err(Error::FrameTooLarge { size, max }) }
    }

    /// # Errors
    ///
    /// [`Error::ProtocolViolation`] when a message spans too many fragments.
    pub fn check_fragment_count(&self, count: usize) -> Result<(), Error> {
        if count <= self.max_fragment_count {
            return Ok(());
        }
        Err(Error::ProtocolViolation(format!(
            "message split into {count} fragments, limit is {}",
            self.max_fragment_count
        )))
    }

    /// # Errors
    ///
    /// [`Error::HandshakeTooLarge`] when a response head is over the cap.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), Error> {
        let max = self.max_handshake_size;
        if size <= max { Ok(()) } else { Err(Error::HandshakeTooLarge { size, max }) }
    }
}

/// Per-connection transport settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub limits: Limits,
    /// Initial read buffer capacity, also the read chunk reserved per syscall.
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_buffer_size: 4096,
            write_buffer_size: 1024,
        }
    }
}

impl Config {
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Settings used by probes.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }

    /// Settings used by the reference target and test fixtures.
    #[must_use]
    pub fn server() -> Self {
        Self {
            write_buffer_size: 256,
            ..Self::default()
        }
    }
}

/// Statistical expectations for a run.
///
/// All derived values (interval, expected count, near-simultaneous
/// threshold) are computed from these fields; nothing changes once a run
/// starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Tolerance {
    /// Number of concurrent probes.
    pub connections: usize,
    /// Length of the observation window.
    pub observation: Duration,
    /// Expected broadcast cadence.
    pub messages_per_sec: f64,
    /// Accepted deviation from the expected per-connection count.
    pub count_tolerance: usize,
    /// Fraction of the broadcast interval under which two messages count as
    /// the same tick.
    pub threshold_ratio: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            connections: 3,
            observation: Duration::from_millis(5000),
            messages_per_sec: 2.0,
            count_tolerance: 1,
            threshold_ratio: 0.9,
        }
    }
}

impl Tolerance {
    /// Reject settings the derived values cannot be computed from.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |why: String| Err(Error::InvalidConfig(why));
        if self.connections == 0 {
            return invalid("connections must be at least 1".into());
        }
        if self.observation.is_zero() {
            return invalid("observation window must be longer than zero".into());
        }
        let rate = self.messages_per_sec;
        if !(rate.is_finite() && rate > 0.0) || Duration::try_from_secs_f64(rate.recip()).is_err() {
            return invalid(format!("message rate {rate} gives no usable interval"));
        }
        let ratio = self.threshold_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return invalid(format!("threshold ratio {ratio} is outside (0, 1]"));
        }
        Ok(())
    }

    /// Expected time between two broadcasts. Saturates at `Duration::MAX`
    /// for rates [`validate`](Tolerance::validate) rejects.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.messages_per_sec.recip()).unwrap_or(Duration::MAX)
    }

    /// Gap below which two consecutive messages belong to the same tick.
    #[must_use]
    pub fn near_simultaneous(&self) -> Duration {
        let secs = self.interval().as_secs_f64() * self.threshold_ratio.max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Messages each connection should see during the window.
    #[must_use]
    pub fn expected_count(&self) -> usize {
        (self.observation.as_secs_f64() * self.messages_per_sec).round() as usize
    }

    /// Inclusive range of acceptable per-connection counts.
    #[must_use]
    pub fn count_window(&self) -> RangeInclusive<usize> {
        let exp = self.expected_count();
        exp.saturating_sub(self.count_tolerance)..=exp + self.count_tolerance
    }
}

/// Full configuration of one assessment run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// WebSocket endpoint probes connect to, e.g. `ws://localhost:8080/path`.
    pub endpoint: String,
    /// Statistical expectations.
    pub tolerance: Tolerance,
    /// Initial violation-report budget.
    pub budget: ViolationBudget,
    /// Grace period between launching the target and opening probes.
    ///
    /// Default: 100 ms
    pub warmup: Duration,
    /// Bound on TCP connect plus handshake for each probe.
    ///
    /// Default: 1 s
    pub connect_timeout: Duration,
    /// Page that `GET /` must return; `None` skips the static resource check.
    pub reference_page: Option<PathBuf>,
    /// Transport settings for probe connections.
    pub transport: Config,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/path".to_string(),
            tolerance: Tolerance::default(),
            budget: ViolationBudget::default(),
            warmup: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(1),
            reference_page: None,
            transport: Config::client(),
        }
    }
}

impl HarnessConfig {
    /// Create a configuration with default expectations.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the statistical expectations.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the violation-report budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: ViolationBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Set the warmup grace period.
    #[must_use]
    pub const fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the per-probe connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable the static resource check against this file.
    #[must_use]
    pub fn with_reference_page(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_page = Some(path.into());
        self
    }
}
