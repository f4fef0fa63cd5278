//! Assessment results and their rendering.

use std::fmt;

use serde::Serialize;

/// Failure taxonomy for recorded (non-fatal) outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Number of probes that opened.
    OpenCount,
    /// A probe failed to open or hit a transport error.
    ConnectionError,
    /// Per-connection message count outside the expected window.
    Rate,
    MalformedPayload,
    OutOfBounds,
    /// Tick mismatch or stale payload across connections.
    Synchrony,
    /// `GET /` status, content type or body.
    StaticResource,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Category::OpenCount => "open_count",
            Category::ConnectionError => "connection_error",
            Category::Rate => "rate",
            Category::MalformedPayload => "malformed_payload",
            Category::OutOfBounds => "out_of_bounds",
            Category::Synchrony => "synchrony",
            Category::StaticResource => "static_resource",
        })
    }
}

/// One named check and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub category: Category,
    pub passed: bool,
    pub message: String,
}

impl Assertion {
    pub fn pass(category: Category, message: impl Into<String>) -> Self {
        Self {
            category,
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(category: Category, message: impl Into<String>) -> Self {
        Self {
            category,
            passed: false,
            message: message.into(),
        }
    }

    /// Pass or fail depending on `ok`.
    pub fn check(category: Category, ok: bool, message: impl Into<String>) -> Self {
        Self {
            category,
            passed: ok,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    /// Violations tolerated silently after their budget ran out.
    pub suppressed: usize,
}

/// Outcome of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Report {
    pub assertions: Vec<Assertion>,
    pub summary: Summary,
}

impl Report {
    #[must_use]
    pub fn new(assertions: Vec<Assertion>, suppressed: usize) -> Self {
        let passed = assertions.iter().filter(|a| a.passed).count();
        let summary = Summary {
            passed,
            failed: assertions.len() - passed,
            suppressed,
        };
        Self {
            assertions,
            summary,
        }
    }

    /// `true` when no assertion failed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter().filter(|a| !a.passed)
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter().filter(move |a| a.category == category)
    }

    /// # Errors
    ///
    /// Only if serialization itself fails, which plain data never does.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for assertion in &self.assertions {
            let status = if assertion.passed { "ok" } else { "FAIL" };
            writeln!(
                f,
                "{:<4}  {:<17}  {}",
                status, assertion.category, assertion.message
            )?;
        }
        write!(
            f,
            "{} passed, {} failed",
            self.summary.passed, self.summary.failed
        )?;
        if self.summary.suppressed > 0 {
            write!(f, " ({} further violations suppressed)", self.summary.suppressed)?;
        }
        Ok(())
    }
}
