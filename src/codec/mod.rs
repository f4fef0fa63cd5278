//! Frame-level codec over async byte streams.

mod framed;

pub use framed::WebSocketCodec;
