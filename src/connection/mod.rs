//! Live WebSocket connections: handshake over a stream, then messages.
//!
//! 1. **Connecting** - handshake in progress ([`connect`] / [`accept`])
//! 2. **Open** - messages flow in both directions
//! 3. **Closing** - we sent Close, draining until the peer answers
//! 4. **Closed** - done; `recv` yields `None`

mod role;
mod state;
mod upgrade;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
pub use role::Role;
pub use state::ConnectionState;
pub use upgrade::{accept, connect, read_head};
