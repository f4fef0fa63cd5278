//! Reassembly of fragmented data messages.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// Collects Text/Binary/Continuation frames until FIN.
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame. Returns the complete message once FIN is seen.
    ///
    /// # Errors
    ///
    /// `Error::ProtocolViolation` on a stray or missing continuation, or when
    /// fragment/size limits are exceeded.
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (opcode, None) => self.opcode = Some(opcode),
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let opcode = self
            .opcode
            .take()
            .ok_or_else(|| Error::ProtocolViolation("Missing message opcode".into()))?;
        self.fragment_count = 0;
        Ok(Some(AssembledMessage {
            opcode,
            payload: self.buffer.split().to_vec(),
        }))
    }

    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }
}

/// A fully assembled data message.
pub struct AssembledMessage {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}
