//! The `{x, y}` coordinate payload a target broadcasts.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed range both coordinates must fall in.
pub const COORDINATE_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// One broadcast tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn in_bounds(&self) -> bool {
        COORDINATE_RANGE.contains(&self.x) && COORDINATE_RANGE.contains(&self.y)
    }
}

/// Outcome of checking a single raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadCheck {
    Valid(Coordinate),
    /// Not JSON at all.
    Malformed(String),
    /// JSON, but not an object with numeric in-range `x` and `y`.
    OutOfBounds(String),
}

impl PayloadCheck {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, PayloadCheck::Valid(_))
    }
}

/// Classify raw payload bytes.
///
/// ```
/// use wsassess::payload::{check_payload, PayloadCheck};
///
/// assert!(check_payload(br#"{"x":95,"y":42}"#).is_valid());
/// assert!(matches!(check_payload(br#"{"x":150,"y":10}"#), PayloadCheck::OutOfBounds(_)));
/// assert!(matches!(check_payload(b"not json"), PayloadCheck::Malformed(_)));
/// ```
#[must_use]
pub fn check_payload(raw: &[u8]) -> PayloadCheck {
    let value: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => return PayloadCheck::Malformed(e.to_string()),
    };

    let field = |name| value.get(name).and_then(Value::as_f64);
    match (field("x"), field("y")) {
        (Some(x), Some(y)) if Coordinate::new(x, y).in_bounds() => {
            PayloadCheck::Valid(Coordinate::new(x, y))
        }
        _ => PayloadCheck::OutOfBounds(format!(
            "coordinates {},{} out of 0..100 bounds",
            describe(value.get("x")),
            describe(value.get("y"))
        )),
    }
}

fn describe(field: Option<&Value>) -> String {
    field.map_or_else(|| "undefined".to_string(), Value::to_string)
}
