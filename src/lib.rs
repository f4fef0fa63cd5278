//! # wsassess
//!
//! Assessment harness for servers that broadcast `{x, y}` coordinates to
//! every connected WebSocket client on a fixed cadence.
//!
//! A run launches (or attaches to) the target, opens several probe
//! connections at once, records every message with its receive time, and
//! then checks the records: how many probes opened, per-connection message
//! rate, payload validity, and whether all connections saw the same
//! coordinates on each tick. Optionally `GET /` is compared against a
//! reference page.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsassess::{Coordinator, HarnessConfig, Target};
//!
//! let config = HarnessConfig::new("ws://localhost:8080/path")
//!     .with_reference_page("worksheet/webpages/index.html");
//! let mut coordinator = Coordinator::new(config)
//!     .with_target(Target::command("node", ["worksheet/server.js"]));
//!
//! let report = coordinator.run().await?;
//! println!("{}", report);
//! ```
//!
//! The WebSocket client underneath (`protocol`, `codec`, `connection`) is a
//! small RFC 6455 implementation without TLS or extensions.

pub mod clock;
pub mod codec;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod harness;
pub mod http;
pub mod message;
pub mod payload;
pub mod probe;
pub mod protocol;
pub mod target;

pub use clock::{Clock, TokioClock, VirtualClock};
pub use codec::WebSocketCodec;
pub use config::{Config, HarnessConfig, Limits, Tolerance};
pub use connection::{Connection, ConnectionState, Role};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use harness::{
    Assertion, Category, ConnectionRecord, Coordinator, Phase, Report, ViolationBudget,
    ViolationKind,
};
pub use message::{CloseCode, CloseFrame, Message};
pub use payload::{Coordinate, PayloadCheck, check_payload};
pub use probe::{Dialer, ProbeEvent, Received, TcpDialer};
pub use target::Target;
