//! The assertion pass over frozen connection records.
//!
//! Everything here is pure: records and budget in, assertions out.

use std::path::Path;

use hyper::StatusCode;
use tracing::debug;

use crate::config::Tolerance;
use crate::error::Error;
use crate::harness::budget::{ViolationBudget, ViolationKind};
use crate::harness::record::ConnectionRecord;
use crate::harness::report::{Assertion, Category};
use crate::http::HttpResponse;
use crate::payload::{PayloadCheck, check_payload};
use crate::probe::Received;

/// Result of [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub assertions: Vec<Assertion>,
    /// What is left of the budget afterwards.
    pub budget: ViolationBudget,
    /// Violations seen after their category was exhausted.
    pub suppressed: usize,
}

#[derive(Default)]
struct Seen {
    malformed: usize,
    out_of_bounds: usize,
    synchrony: usize,
}

struct Pass {
    assertions: Vec<Assertion>,
    budget: ViolationBudget,
    suppressed: usize,
    seen: Seen,
}

impl Pass {
    fn violation(&mut self, kind: ViolationKind, message: impl FnOnce() -> String) {
        match kind {
            ViolationKind::MalformedPayload => self.seen.malformed += 1,
            ViolationKind::OutOfBounds => self.seen.out_of_bounds += 1,
            ViolationKind::TickMismatch | ViolationKind::StalePayload => self.seen.synchrony += 1,
        }
        match self.budget.spend(kind) {
            Some(next) => {
                self.budget = next;
                self.assertions
                    .push(Assertion::fail(kind.category(), message()));
            }
            None => {
                debug!(?kind, "violation budget exhausted, suppressing");
                self.suppressed += 1;
            }
        }
    }
}

/// Run the assertion suite against frozen records.
///
/// Payload and synchrony checks walk all messages in global receive order
/// (ties keep connection order). The first message has no predecessor and is
/// not compared.
#[must_use]
pub fn evaluate(
    records: &[ConnectionRecord],
    tolerance: &Tolerance,
    budget: ViolationBudget,
) -> Evaluation {
    let mut pass = Pass {
        assertions: Vec::new(),
        budget,
        suppressed: 0,
        seen: Seen::default(),
    };

    let opened = records.iter().filter(|r| r.opened).count();
    pass.assertions.push(Assertion::check(
        Category::OpenCount,
        opened == tolerance.connections,
        format!("{}/{} connections opened", opened, tolerance.connections),
    ));

    for record in records {
        if let Some(error) = &record.error {
            pass.assertions.push(Assertion::fail(
                Category::ConnectionError,
                format!("connection {}: {}", record.index, error),
            ));
        }
    }

    let window = tolerance.count_window();
    for record in records {
        let count = record.count();
        pass.assertions.push(Assertion::check(
            Category::Rate,
            window.contains(&count),
            format!(
                "connection {} received {} messages, expected {}..={}",
                record.index,
                count,
                window.start(),
                window.end()
            ),
        ));
    }

    let mut timeline: Vec<&Received> = records.iter().flat_map(|r| &r.messages).collect();
    timeline.sort_by_key(|m| m.at);

    if opened > 0 && timeline.is_empty() {
        pass.assertions.push(Assertion::fail(
            Category::Rate,
            "no messages received on any open connection",
        ));
    }

    let threshold = tolerance.near_simultaneous();
    let mut previous: Option<&Received> = None;
    for message in timeline {
        match check_payload(&message.payload) {
            PayloadCheck::Valid(_) => {}
            PayloadCheck::Malformed(_) => pass.violation(ViolationKind::MalformedPayload, || {
                format!(
                    "coordinates should be sent as JSON, got {:?}",
                    String::from_utf8_lossy(&message.payload)
                )
            }),
            PayloadCheck::OutOfBounds(detail) => {
                pass.violation(ViolationKind::OutOfBounds, || detail);
            }
        }

        if let Some(prev) = previous {
            let gap = message.at.saturating_sub(prev.at);
            let same = message.payload == prev.payload;
            if gap < threshold && !same {
                pass.violation(ViolationKind::TickMismatch, || {
                    format!(
                        "coordinates received within {}ms should be the same ({}ms apart)",
                        threshold.as_millis(),
                        gap.as_millis()
                    )
                });
            } else if gap >= threshold && same {
                pass.violation(ViolationKind::StalePayload, || {
                    format!(
                        "subsequent coordinates should not be the same ({}ms apart)",
                        gap.as_millis()
                    )
                });
            }
        }
        previous = Some(message);
    }

    let Pass {
        mut assertions,
        budget,
        suppressed,
        seen,
    } = pass;
    if seen.malformed == 0 {
        assertions.push(Assertion::pass(Category::MalformedPayload, "all payloads are JSON"));
    }
    if seen.out_of_bounds == 0 {
        assertions.push(Assertion::pass(
            Category::OutOfBounds,
            "all coordinates within 0..100",
        ));
    }
    if seen.synchrony == 0 {
        assertions.push(Assertion::pass(
            Category::Synchrony,
            "connections saw the same coordinates each tick",
        ));
    }

    Evaluation {
        assertions,
        budget,
        suppressed,
    }
}

/// Static resource assertions for `GET /`.
///
/// `reference` is the result of reading `reference_path`; a missing
/// reference page fails the check outright.
#[must_use]
pub fn static_page(
    response: Result<HttpResponse, Error>,
    reference_path: &Path,
    reference: std::io::Result<String>,
) -> Vec<Assertion> {
    let reference = match reference {
        Ok(page) => page,
        Err(e) => {
            return vec![Assertion::fail(
                Category::StaticResource,
                format!("reference page {} is missing: {}", reference_path.display(), e),
            )];
        }
    };
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            return vec![Assertion::fail(
                Category::StaticResource,
                format!("server should serve HTML on GET /: {}", e),
            )];
        }
    };

    let content_type = response.header("content-type").unwrap_or("");
    let body = String::from_utf8_lossy(&response.body);
    vec![
        Assertion::check(
            Category::StaticResource,
            response.status == StatusCode::OK,
            format!("GET / returned status {}", response.status.as_u16()),
        ),
        Assertion::check(
            Category::StaticResource,
            content_type.starts_with("text/html"),
            format!("GET / returned content type {:?}", content_type),
        ),
        Assertion::check(
            Category::StaticResource,
            body.trim() == reference.trim(),
            format!("GET / body matches {}", reference_path.display()),
        ),
    ]
}
