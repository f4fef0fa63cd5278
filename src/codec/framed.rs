use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameHeader};

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x12345678)
    }
}

/// Buffered frame reader/writer over an async byte stream.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    role: Role,
    config: Config,
    mask_counter: u32,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, role: Role, config: Config) -> Self {
        Self::with_buffered(io, role, config, BytesMut::new())
    }

    /// Create a codec that first consumes bytes already read off the stream,
    /// e.g. frames that arrived in the same segment as the handshake response.
    #[must_use]
    pub fn with_buffered(io: T, role: Role, config: Config, leftover: BytesMut) -> Self {
        let mut read_buf = BytesMut::with_capacity(config.read_buffer_size.max(leftover.len()));
        read_buf.extend_from_slice(&leftover);
        Self {
            io,
            read_buf,
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            role,
            config,
            mask_counter: random_mask_seed(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        c.wrapping_mul(0xC2B2_AE35).to_le_bytes()
    }

    /// Reject frames whose masking or size breaks the rules for our role,
    /// before the payload is buffered.
    fn check_header(&self, header: &FrameHeader) -> Result<()> {
        match (self.role, header.mask.is_some()) {
            (Role::Client, true) => return Err(Error::MaskedServerFrame),
            (Role::Server, false) => return Err(Error::UnmaskedClientFrame),
            _ => {}
        }
        self.config.limits.check_frame_size(header.payload_len)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next complete frame.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` on EOF, otherwise I/O and protocol errors.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.read_buf) {
                Ok(header) => {
                    self.check_header(&header)?;
                    match Frame::parse(&self.read_buf) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            self.read_buf.reserve(self.config.read_buffer_size);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    /// Encode and write a frame, masking it when acting as the client.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = if self.role.must_mask() {
            Some(self.generate_mask())
        } else {
            None
        };

        self.write_buf.clear();
        self.write_buf.reserve(frame.wire_size(mask.is_some()));
        frame.encode(&mut self.write_buf, mask);
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
