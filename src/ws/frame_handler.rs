use std::sync::{Arc, atomic::Ordering};

use tokio::sync::mpsc::{Sender, error::TrySendError};

use super::{Event, websocket::Inner};
use crate::{
    error::CloseReason,
    frames::{ControlFrame, DecodedFrame, Opcode},
    protocol::PartialMessage,
};

/// What the receive loop should do after a frame.
pub(super) enum Flow {
    Continue,
    /// Stop decoding; the connection is closing. Carries the server's close code, if any.
    Stop(Option<u16>),
}

pub(super) async fn handle_frame(
    frame: &DecodedFrame,
    inner: &Arc<Inner>,
    partial_msg: &mut Option<PartialMessage>,
    event_tx: &Sender<Event>,
    max_message_size: usize,
) -> Flow {
    match frame.opcode {
        Opcode::Ping => handle_ping(frame, inner).await,
        Opcode::Pong => {
            tracing::debug!(len = frame.payload.len(), "received PONG");
            forward(event_tx, Event::Pong(frame.payload.to_vec()));
        }
        Opcode::Text | Opcode::Bin | Opcode::Cont => {
            if !handle_message(frame, inner, partial_msg, event_tx, max_message_size).await {
                return Flow::Stop(None);
            }
        }
        Opcode::Close => return Flow::Stop(handle_close(frame, inner).await),
    }
    Flow::Continue
}

// Never waits on the queue, the reader has to keep answering pings while nobody listens
fn forward(event_tx: &Sender<Event>, event: Event) {
    match event_tx.try_send(event) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(event)) => {
            tracing::warn!(?event, "event queue full, dropping event");
        }
    }
}

// Reply with pong, keeps the connection alive while nobody is sending
async fn handle_ping(frame: &DecodedFrame, inner: &Arc<Inner>) {
    tracing::debug!(len = frame.payload.len(), "received PING, replying with PONG");
    if inner.closing.load(Ordering::Acquire) {
        return;
    }
    if let Err(e) = inner.write_once(&ControlFrame::pong(&frame.payload).encode()).await {
        tracing::warn!(error = %e, "failed to answer PING");
    }
}

// If we are not already closing, echo the close frame back
async fn handle_close(frame: &DecodedFrame, inner: &Arc<Inner>) -> Option<u16> {
    let code = (frame.payload.len() >= 2)
        .then(|| u16::from_be_bytes([frame.payload[0], frame.payload[1]]));
    tracing::info!(
        code = ?code,
        reason = ?code.map(CloseReason::from),
        "received Close frame"
    );

    if !inner.closing.swap(true, Ordering::AcqRel) {
        let echo = match code {
            Some(code) => ControlFrame::close_code(code, ""),
            None => ControlFrame::close(&[]).encode(),
        };
        if let Err(e) = inner.write_once(&echo).await {
            tracing::warn!(error = %e, "error replying to close");
        }
    }
    code
}

// Build message out of frames, returns false once the connection has to be closed
async fn handle_message(
    frame: &DecodedFrame,
    inner: &Arc<Inner>,
    partial_msg: &mut Option<PartialMessage>,
    event_tx: &Sender<Event>,
    max_message_size: usize,
) -> bool {
    tracing::trace!(
        partial = partial_msg.is_some(),
        opcode = ?frame.opcode,
        "handling message"
    );
    let partial = match (partial_msg.as_mut(), frame.opcode) {
        (None, Opcode::Text) => partial_msg.insert(PartialMessage::Text(vec![])),
        (None, Opcode::Bin) => partial_msg.insert(PartialMessage::Binary(vec![])),
        (Some(p), Opcode::Cont) => p,
        _ => {
            // a CONT before TEXT or BINARY,
            // or a TEXT/BINARY without finishing the last message
            inner.fail(CloseReason::ProtoError, "Unexpected frame").await;
            return false;
        }
    };

    if partial.len() + frame.payload.len() > max_message_size {
        inner
            .fail(CloseReason::TooBig, "Message exceeded maximum size")
            .await;
        return false;
    }

    partial.push_bytes(&frame.payload);
    tracing::trace!(
        current_len = partial.len(),
        added = frame.payload.len(),
        "message fragment appended"
    );

    if !frame.is_fin {
        return true;
    }

    let Some(msg) = partial_msg.take().and_then(PartialMessage::finish) else {
        inner.fail(CloseReason::DataError, "Invalid UTF-8").await;
        return false;
    };
    tracing::debug!(total_len = msg.len(), "message assembly complete");
    forward(event_tx, Event::Message(msg));
    true
}
