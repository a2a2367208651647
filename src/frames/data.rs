use super::Opcode;
use crate::MAX_FRAME_PAYLOAD;

// -- SLOW PATH --
// DataFrames may be fragmented or very large hence they need extra processing compared to
// ControlFrames
pub(crate) struct DataFrame<'a> {
    opcode: Opcode,
    payload: &'a [u8],
}

impl<'a> DataFrame<'a> {
    pub(crate) fn new(payload: &'a [u8], opcode: Opcode) -> Self { Self { opcode, payload } }

    pub(crate) fn encode(self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::with_capacity(self.payload.len().div_ceil(MAX_FRAME_PAYLOAD).max(1));

        // an empty message is still one (empty) frame
        let parts: Vec<&[u8]> = if self.payload.is_empty() {
            vec![&[]]
        } else {
            self.payload.chunks(MAX_FRAME_PAYLOAD).collect()
        };
        let mut iter = parts.into_iter().peekable();

        let mut first = true;
        while let Some(chunk) = iter.next() {
            tracing::trace!(
                opcode = ?self.opcode,
                len = chunk.len(),
                "encoding DATA"
            );

            // Set OPCODE and FIN
            let opcode = if first {
                first = false;
                self.opcode
            } else {
                Opcode::Cont
            } as u8;
            let mut buf = Vec::with_capacity(chunk.len() + 14);
            buf.push(if iter.peek().is_none() { 0x80 } else { 0 } | opcode);

            // push LEN
            #[allow(clippy::cast_possible_truncation)]
            match chunk.len() {
                0..=125 => {
                    buf.push(chunk.len() as u8);
                }
                126..=65535 => {
                    buf.push(126);
                    buf.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
                }
                _ => {
                    buf.push(127);
                    buf.extend_from_slice(&(chunk.len() as u64).to_be_bytes());
                }
            }

            // Clients must SEND masked
            buf[1] |= 0x80;
            let mut mask_key = [0u8; 4];
            rand::fill(&mut mask_key);
            buf.extend_from_slice(&mask_key);

            let start = buf.len();
            buf.extend_from_slice(chunk);
            crate::protocol::mask(&mut buf[start..], mask_key);

            chunks.push(buf);
        }

        tracing::debug!(len = self.payload.len(), frames = chunks.len(), "encoded DATA");
        chunks
    }
}
