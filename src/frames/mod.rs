mod control;
mod data;
mod decode;
mod opcode;

pub(crate) use control::{ControlFrame, MAX_CONTROL_PAYLOAD};
pub(crate) use data::DataFrame;
pub(crate) use decode::{DecodedFrame, FrameDecoder, FrameParseError, FrameState};
pub(crate) use opcode::Opcode;
