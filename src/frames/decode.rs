use std::ops::Deref;

use bytes::{Bytes, BytesMut};

use super::{Opcode, control::MAX_CONTROL_PAYLOAD};
use crate::MAX_FRAME_PAYLOAD;

// helper type since decoder errors return FrameParseResult
type Result<T> = std::result::Result<T, FrameParseError>;

#[derive(Debug)]
pub(crate) struct DecodedFrame {
    pub(crate) opcode: Opcode,
    pub(crate) payload: Bytes,
    pub(crate) is_fin: bool,
}

#[derive(Debug)]
pub(crate) enum FrameState {
    Complete(DecodedFrame),
    Incomplete,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameParseError {
    ProtoError,
    SizeErr,
}

/// Incremental decoder for frames sent by a server.
pub(crate) struct FrameDecoder {
    buf: BytesMut,
    state: DecodeState,
    ctx: DecodeContext,
    max_payload: usize,
}

#[derive(Debug)]
enum DecodeState {
    Header1,
    Header2,
    ExtendedLen,
    Payload,
}

#[derive(Debug)]
struct DecodeContext {
    is_fin: bool,
    opcode: Opcode,
    payload_len: usize,
}

impl FrameDecoder {
    pub(crate) fn new(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_PAYLOAD),
            state: DecodeState::Header1,
            ctx: DecodeContext {
                is_fin: false,
                opcode: Opcode::Cont,
                payload_len: 0,
            },
            max_payload,
        }
    }

    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }

    pub(crate) fn next_frame(&mut self) -> Result<Option<FrameState>> {
        tracing::trace!(
            state = ?self.state,
            buf_len = self.buf.len(),
            "decoder"
        );
        loop {
            let next_state = match self.state {
                DecodeState::Header1 => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let b = self.buf.split_to(1)[0];
                    self.parse_header1(b)?
                }
                DecodeState::Header2 => match self.parse_header2()? {
                    Some(state) => state,
                    None => return Ok(Some(FrameState::Incomplete)),
                },
                DecodeState::ExtendedLen => match self.parse_extended_len()? {
                    Some(state) => state,
                    None => return Ok(Some(FrameState::Incomplete)),
                },
                DecodeState::Payload => {
                    let Some(payload) = self.parse_payload()? else {
                        return Ok(Some(FrameState::Incomplete));
                    };
                    self.state = DecodeState::Header1;

                    tracing::trace!(
                        opcode = ?self.ctx.opcode,
                        fin = self.ctx.is_fin,
                        payload_len = payload.len(),
                        "frame decoded"
                    );
                    return Ok(Some(FrameState::Complete(DecodedFrame {
                        opcode: self.ctx.opcode,
                        payload: payload.freeze(),
                        is_fin: self.ctx.is_fin,
                    })));
                }
            };
            tracing::trace!(
                from = ?self.state,
                to = ?next_state,
                "state transition"
            );
            self.state = next_state;
        }
    }

    fn parse_header1(&mut self, b: u8) -> Result<DecodeState> {
        // 0   | 1 2 3 | 4 5 6 7
        // Fin | Rsv   | Opcode
        // no extension is ever negotiated, so every RSV bit must be clear
        if b & 0b0111_0000 > 0 {
            tracing::warn!("invalid RSV bits");
            return Err(FrameParseError::ProtoError);
        }

        self.ctx = DecodeContext {
            is_fin: b & 0b1000_0000 > 0,
            opcode: Opcode::try_from(b & 0b1111).map_err(|()| {
                tracing::trace!("invalid opcode");
                FrameParseError::ProtoError
            })?,
            payload_len: 0,
        };

        Ok(DecodeState::Header2)
    }

    fn parse_header2(&mut self) -> Result<Option<DecodeState>> {
        // 0    | 1 2 3 4 5 6 7
        // Mask | Payload len
        if self.buf.is_empty() {
            return Ok(None);
        }

        let b = self.buf.split_to(1)[0];
        // Servers must NOT mask messages
        if b & 0b1000_0000 > 0 {
            tracing::trace!("server frame is masked");
            return Err(FrameParseError::ProtoError);
        }

        self.ctx.payload_len = (b & 0b0111_1111) as usize;

        // control frames must be FIN with at most 125B payload
        if self.ctx.opcode.is_control()
            && (!self.ctx.is_fin || self.ctx.payload_len > MAX_CONTROL_PAYLOAD)
        {
            tracing::trace!("invalid control frame received");
            return Err(FrameParseError::ProtoError);
        }

        Ok(Some(if self.ctx.payload_len > MAX_CONTROL_PAYLOAD {
            DecodeState::ExtendedLen
        } else {
            DecodeState::Payload
        }))
    }

    fn parse_extended_len(&mut self) -> Result<Option<DecodeState>> {
        self.ctx.payload_len = if self.ctx.payload_len == 126 {
            // 126 => 2 bytes extended (u16)
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            usize::from(u16::from_be_bytes(len_bytes))
        } else {
            // 127 => 8 bytes extended (u64)
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            usize::try_from(u64::from_be_bytes(len_bytes)).map_err(|_| {
                tracing::trace!("frame exceeded maximum size");
                FrameParseError::SizeErr
            })?
        };

        if self.ctx.payload_len > self.max_payload {
            self.buf.clear();
            self.state = DecodeState::Header1;
            tracing::trace!(len = self.ctx.payload_len, "payload larger than maximum size");
            return Err(FrameParseError::SizeErr);
        }

        Ok(Some(DecodeState::Payload))
    }

    fn parse_payload(&mut self) -> Result<Option<BytesMut>> {
        if self.buf.len() < self.ctx.payload_len {
            return Ok(None);
        }

        let payload = self.buf.split_to(self.ctx.payload_len);

        if self.ctx.opcode == Opcode::Close && !is_valid_close_payload(&payload) {
            return Err(FrameParseError::ProtoError);
        }

        Ok(Some(payload))
    }

    fn pop_n<const N: usize>(&mut self) -> Option<[u8; N]> {
        if N > self.buf.len() {
            return None;
        }
        self.buf.split_to(N).deref().try_into().ok()
    }
}

fn is_valid_close_payload(bytes: &[u8]) -> bool {
    match bytes.len() {
        0 => true,
        1 => false,
        _ => {
            let code = u16::from_be_bytes([bytes[0], bytes[1]]);
            matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
                && std::str::from_utf8(&bytes[2..]).is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec, prelude::*};

    use super::*;

    const LIMIT: usize = 1024 * 1024;

    fn opcode_strategy() -> BoxedStrategy<Opcode> {
        prop_oneof![
            Just(Opcode::Text),
            Just(Opcode::Bin),
            Just(Opcode::Cont),
            Just(Opcode::Ping),
            Just(Opcode::Pong),
        ]
        .boxed()
    }

    // Build a raw unmasked server frame from opcode and payload
    fn build_frame_bytes(opcode: Opcode, payload: &[u8], fin: bool) -> Vec<u8> {
        #![allow(clippy::cast_possible_truncation)]

        let mut bytes = Vec::new();
        let mut b1 = opcode as u8 & 0x0F;
        if fin {
            b1 |= 0x80;
        }
        bytes.push(b1);

        if payload.len() <= 125 {
            bytes.push(payload.len() as u8);
        } else if u16::try_from(payload.len()).is_ok() {
            bytes.push(126);
            bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        } else {
            bytes.push(127);
            bytes.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        }
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn decodes_frame_split_across_reads() {
        let payload = vec![42u8; 300];
        let bytes = build_frame_bytes(Opcode::Bin, &payload, true);
        let mut decoder = FrameDecoder::new(LIMIT);

        decoder.push_bytes(&bytes[..3]);
        assert!(matches!(decoder.next_frame(), Ok(Some(FrameState::Incomplete))));

        decoder.push_bytes(&bytes[3..]);
        match decoder.next_frame() {
            Ok(Some(FrameState::Complete(frame))) => {
                assert_eq!(frame.opcode, Opcode::Bin);
                assert_eq!(frame.payload.len(), 300);
                assert!(frame.is_fin);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(decoder.next_frame(), Ok(None)));
    }

    #[test]
    fn rejects_masked_server_frame() {
        let mut decoder = FrameDecoder::new(LIMIT);
        decoder.push_bytes(&[0x81, 0x81, 1, 2, 3, 4, b'a']);
        assert_eq!(decoder.next_frame().unwrap_err(), FrameParseError::ProtoError);
    }

    #[test]
    fn rejects_fragmented_control_frame() {
        let mut decoder = FrameDecoder::new(LIMIT);
        decoder.push_bytes(&build_frame_bytes(Opcode::Ping, b"x", false));
        assert_eq!(decoder.next_frame().unwrap_err(), FrameParseError::ProtoError);
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut decoder = FrameDecoder::new(200);
        decoder.push_bytes(&build_frame_bytes(Opcode::Text, &[b'a'; 300], true));
        assert_eq!(decoder.next_frame().unwrap_err(), FrameParseError::SizeErr);
    }

    #[test]
    fn close_payload_validation() {
        assert!(is_valid_close_payload(&[]));
        assert!(!is_valid_close_payload(&[0x03]));
        assert!(is_valid_close_payload(&1000u16.to_be_bytes()));
        assert!(!is_valid_close_payload(&1005u16.to_be_bytes()));
        assert!(is_valid_close_payload(&[0x0F, 0xA0, b'o', b'k']));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn decoder_handles_random_frames(
            opcode in opcode_strategy(),
            payload in vec(any::<u8>(), 0..=125),
            fin in any::<bool>(),
        ) {
            // control frames are always final
            let fin = fin || opcode.is_control();
            let frame_bytes = build_frame_bytes(opcode, &payload, fin);
            let mut decoder = FrameDecoder::new(LIMIT);
            decoder.push_bytes(&frame_bytes);

            match decoder.next_frame() {
                Ok(Some(FrameState::Complete(frame))) => {
                    prop_assert_eq!(&frame.payload[..], &payload[..]);
                    prop_assert_eq!(frame.opcode, opcode);
                    prop_assert_eq!(frame.is_fin, fin);
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn fuzz_decoder(buf in vec(any::<u8>(), 0..2048)) {
            let mut fd = FrameDecoder::new(LIMIT);
            fd.push_bytes(&buf);

            while let Ok(Some(state)) = fd.next_frame() {
                if let FrameState::Incomplete = state {
                    break;
                }
            }
        }
    }
}
