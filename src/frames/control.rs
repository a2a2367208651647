use bytes::{BufMut, Bytes, BytesMut};

use super::Opcode;
use crate::error::CloseReason;

/// Largest payload a control frame may carry.
pub(crate) const MAX_CONTROL_PAYLOAD: usize = 125;

// Fast path for single frames (Ping, Pong, Close): payload <= 125 bytes and FIN always set.
pub(crate) struct ControlFrame<'a> {
    opcode: Opcode,
    payload: &'a [u8],
}

impl<'a> ControlFrame<'a> {
    pub(crate) fn ping(payload: &'a [u8]) -> Self {
        Self {
            opcode: Opcode::Ping,
            payload,
        }
    }

    pub(crate) fn pong(payload: &'a [u8]) -> Self {
        Self {
            opcode: Opcode::Pong,
            payload,
        }
    }

    pub(crate) fn close(payload: &'a [u8]) -> Self {
        Self {
            opcode: Opcode::Close,
            payload,
        }
    }

    /// Builds an encoded close frame from a status code and a reason, truncating the
    /// reason so the payload fits in a control frame.
    pub(crate) fn close_code(code: u16, text: &str) -> Bytes {
        let mut len = text.len().min(MAX_CONTROL_PAYLOAD - 2);
        while !text.is_char_boundary(len) {
            len -= 1;
        }

        let mut buf = BytesMut::with_capacity(2 + len);
        buf.extend_from_slice(&code.to_be_bytes());
        buf.extend_from_slice(&text.as_bytes()[..len]);
        ControlFrame::close(&buf).encode()
    }

    pub(crate) fn close_reason(reason: CloseReason, text: &str) -> Bytes {
        Self::close_code(reason.into(), text)
    }

    // encoding: sets Opcode, FIN, MASK and masks payload
    pub(crate) fn encode(self) -> Bytes {
        tracing::trace!(
            opcode = ?self.opcode,
            len = self.payload.len(),
            "encoding CTRL"
        );

        let mut buf = BytesMut::with_capacity(self.payload.len() + 6); // max single frame size
        buf.put_u8(self.opcode as u8 | 0x80); // always set FIN
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(self.payload.len() as u8 | 0x80); // clients always mask

        let mut mask_key = [0; 4];
        rand::fill(&mut mask_key);
        buf.extend_from_slice(&mask_key);

        let start = buf.len();
        buf.extend_from_slice(self.payload);
        crate::protocol::mask(&mut buf[start..], mask_key);

        buf.freeze()
    }
}
