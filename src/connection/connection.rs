use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::WebSocketCodec;
use crate::config::Config;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{AssembledMessage, Frame, MessageAssembler, OpCode};

/// A WebSocket connection wrapping an async I/O stream.
///
/// Handles reassembly, automatic pong replies and the close handshake.
/// Probes use it in the client role; the reference target and test fixtures
/// use the server role.
///
/// ## Example
///
/// ```rust,ignore
/// use wsassess::connection::connect;
/// use wsassess::Config;
///
/// let stream = tokio::net::TcpStream::connect("localhost:8080").await?;
/// let mut conn = connect(stream, "localhost:8080", "/path", Config::client()).await?;
///
/// while let Some(msg) = conn.recv().await? {
///     println!("Received: {:?}", msg);
/// }
/// ```
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    state: ConnectionState,
    assembler: MessageAssembler,
    pending_pong: Option<Vec<u8>>,
}

impl<T> Connection<T> {
    /// Wrap a stream whose handshake has already completed.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        Self::with_buffered(io, role, config, BytesMut::new())
    }

    /// Like [`Connection::new`], with bytes already read past the handshake.
    pub fn with_buffered(io: T, role: Role, config: Config, leftover: BytesMut) -> Self {
        let assembler = MessageAssembler::new(config.limits.clone());
        Self {
            codec: WebSocketCodec::with_buffered(io, role, config, leftover),
            state: ConnectionState::Open,
            assembler,
            pending_pong: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Send a single-frame message.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` once a close has been sent or received
    /// - `Error::MessageTooLarge` if the payload exceeds `limits.max_message_size`
    /// - I/O errors from the underlying stream
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }

        let frame = match message {
            Message::Text(text) => Frame::text(text),
            Message::Binary(data) => Frame::binary(data),
            Message::Ping(data) => Frame::ping(data),
            Message::Pong(data) => Frame::pong(data),
            Message::Close(cf) => {
                let code = cf.as_ref().map(|cf| cf.code);
                let reason = cf.as_ref().map(|cf| cf.reason.as_str()).unwrap_or("");
                return self.close(code.unwrap_or_default(), reason).await;
            }
        };
        self.codec
            .config()
            .limits
            .check_message_size(frame.payload().len())?;

        self.codec.write_frame(&frame).await?;
        self.codec.flush().await
    }

    /// Receive the next message.
    ///
    /// Pings are answered before the next read. A received Close is echoed
    /// and returned; after that, and on EOF, this returns `Ok(None)`.
    ///
    /// ## Errors
    ///
    /// Protocol errors (invalid frame, UTF-8 violation, etc.) and I/O errors.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Ok(None);
        }

        loop {
            if let Some(data) = self.pending_pong.take() {
                self.codec.write_frame(&Frame::pong(data)).await?;
                self.codec.flush().await?;
            }

            let frame = match self.codec.read_frame().await {
                Ok(f) => f,
                Err(Error::ConnectionClosed(_)) => {
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            frame.validate()?;

            match frame.opcode {
                OpCode::Ping => {
                    self.pending_pong = Some(frame.payload().to_vec());
                    return Ok(Some(Message::Ping(frame.into_payload())));
                }
                OpCode::Pong => return Ok(Some(Message::Pong(frame.into_payload()))),
                OpCode::Close => {
                    let close_frame = CloseFrame::from_payload(frame.payload());
                    if self.state == ConnectionState::Open {
                        let echo = match close_frame {
                            Some(ref cf) => Frame::close(Some(cf.code.as_u16()), &cf.reason),
                            None => Frame::close(None, ""),
                        };
                        let _ = self.codec.write_frame(&echo).await;
                        let _ = self.codec.flush().await;
                    }
                    self.state = ConnectionState::Closed;
                    return Ok(Some(Message::Close(close_frame)));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(assembled) = self.assembler.push(frame)? {
                        return Ok(Some(into_message(assembled)?));
                    }
                }
            }
        }
    }

    /// Start the close handshake. A no-op unless the connection is open.
    ///
    /// ## Errors
    ///
    /// `Error::ProtocolViolation` for reserved codes, and I/O errors.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        if code.is_reserved() {
            return Err(Error::ProtocolViolation(format!(
                "Reserved close code: {}",
                code.as_u16()
            )));
        }

        self.state = ConnectionState::Closing;
        self.codec
            .write_frame(&Frame::close(Some(code.as_u16()), reason))
            .await?;
        self.codec.flush().await
    }

    /// Shut down the underlying stream without waiting for the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.state = ConnectionState::Closed;
        self.codec.shutdown().await
    }
}

fn into_message(assembled: AssembledMessage) -> Result<Message> {
    match assembled.opcode {
        OpCode::Text => String::from_utf8(assembled.payload)
            .map(Message::Text)
            .map_err(|_| Error::InvalidUtf8),
        OpCode::Binary => Ok(Message::Binary(assembled.payload)),
        other => Err(Error::ProtocolViolation(format!(
            "Unexpected opcode {}",
            other
        ))),
    }
}
