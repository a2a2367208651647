use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{
        Mutex,
        mpsc::{self, Receiver, Sender},
    },
    task::JoinHandle,
};

use super::{
    Connection, Event,
    frame_handler::{Flow, handle_frame},
};
use crate::{
    MAX_FRAME_PAYLOAD,
    error::{CloseReason, Error, Result},
    frames::{ControlFrame, DataFrame, FrameDecoder, FrameParseError, FrameState, MAX_CONTROL_PAYLOAD, Opcode},
    settings::ConnectionSettings,
};

const EVENT_QUEUE: usize = 256;

/// Plain TCP or TLS stream carrying the connection.
pub(crate) trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

pub(crate) type BoxedStream = Box<dyn Stream>;

/// State shared between the connection handle and its receive task.
pub(crate) struct Inner {
    writer: Mutex<WriteHalf<BoxedStream>>,
    pub(crate) closing: AtomicBool,
    pub(crate) closed: AtomicBool,
}

impl Inner {
    pub(crate) async fn write_once(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut ws = self.writer.lock().await;
        ws.write_all(bytes).await?;
        ws.flush().await
    }

    pub(crate) async fn write_chunks(
        &self,
        chunks: impl IntoIterator<Item = Vec<u8>>,
    ) -> std::io::Result<()> {
        let mut ws = self.writer.lock().await;
        for chunk in chunks {
            ws.write_all(&chunk).await?;
        }
        ws.flush().await
    }

    /// Starts closing the connection because the server misbehaved.
    pub(crate) async fn fail(&self, reason: CloseReason, text: &str) {
        tracing::warn!(?reason, text, "closing connection");
        if !self.closing.swap(true, Ordering::AcqRel) {
            let _ = self.write_once(&ControlFrame::close_reason(reason, text)).await;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closing.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

/// A client websocket connection.
///
/// Incoming frames are read by a background task which answers pings on its own, so the
/// connection stays alive while its owner is busy elsewhere. Everything else surfaces as
/// [`Event`]s through [`Connection::next_event`].
pub struct WebSocket {
    inner: Arc<Inner>,
    event_rx: Receiver<Event>,
    recv_task: JoinHandle<()>,
    disconnect_timeout: Duration,
    shut: bool,
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("disconnect_timeout", &self.disconnect_timeout)
            .field("shut", &self.shut)
            .finish_non_exhaustive()
    }
}

/// Stop reading if the handle is dropped without [`Connection::close`].
impl Drop for WebSocket {
    fn drop(&mut self) { self.recv_task.abort(); }
}

impl WebSocket {
    /// Wraps an upgraded stream. `leftover` holds bytes read past the handshake response.
    pub(crate) fn from_stream(
        stream: BoxedStream,
        leftover: &[u8],
        settings: &ConnectionSettings,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let inner = Arc::new(Inner {
            writer: Mutex::new(writer),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let mut decoder = FrameDecoder::new(settings.max_message_size);
        decoder.push_bytes(leftover);

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let recv_task = tokio::spawn(recv_loop(
            reader,
            decoder,
            Arc::clone(&inner),
            event_tx,
            settings.max_message_size,
        ));

        Self {
            inner,
            event_rx,
            recv_task,
            disconnect_timeout: settings.disconnect_timeout,
            shut: false,
        }
    }

    /// Whether the server side of the connection is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.inner.closed.load(Ordering::Acquire) }

    async fn send_control(&self, frame: ControlFrame<'_>, len: usize) -> Result<()> {
        self.inner.ensure_open()?;
        if len > MAX_CONTROL_PAYLOAD {
            return Err(Error::ControlPayload(len));
        }
        Ok(self.inner.write_once(&frame.encode()).await?)
    }

    async fn send_data(&self, bytes: &[u8], opcode: Opcode) -> Result<()> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .write_chunks(DataFrame::new(bytes, opcode).encode())
            .await?)
    }
}

#[async_trait]
impl Connection for WebSocket {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_data(text.as_bytes(), Opcode::Text).await
    }

    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.send_data(bytes, Opcode::Bin).await
    }

    async fn ping(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(ControlFrame::ping(payload), payload.len())
            .await
    }

    async fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.send_control(ControlFrame::pong(payload), payload.len())
            .await
    }

    async fn next_event(&mut self) -> Option<Event> { self.event_rx.recv().await }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if self.shut {
            return Ok(());
        }
        self.shut = true;

        let mut result = Ok(());
        if !self.inner.closing.swap(true, Ordering::AcqRel) {
            tracing::debug!(code, reason, "sending close");
            result = self
                .inner
                .write_once(&ControlFrame::close_code(code, reason))
                .await
                .map_err(Error::from);
        }

        // wait for the server to finish the closing handshake
        if result.is_ok() && !self.is_closed() {
            let rx = &mut self.event_rx;
            let drained = tokio::time::timeout(self.disconnect_timeout, async {
                while let Some(event) = rx.recv().await {
                    if matches!(event, Event::Closed(_)) {
                        break;
                    }
                }
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    timeout = ?self.disconnect_timeout,
                    "server did not complete the close handshake"
                );
            }
        }

        self.recv_task.abort();
        let _ = self.inner.writer.lock().await.shutdown().await;
        self.inner.closed.store(true, Ordering::Release);
        tracing::info!("connection closed");
        result
    }
}

async fn recv_loop(
    mut reader: ReadHalf<BoxedStream>,
    mut fd: FrameDecoder,
    inner: Arc<Inner>,
    event_tx: Sender<Event>,
    max_message_size: usize,
) {
    let mut buf = vec![0; MAX_FRAME_PAYLOAD];
    let mut partial_msg = None;
    let mut close_code = None;
    // set once a close frame was seen or sent; afterwards just read and discard until FIN
    let mut stopped = false;

    loop {
        while !stopped {
            match fd.next_frame() {
                Ok(Some(FrameState::Complete(frame))) => {
                    if let Flow::Stop(code) =
                        handle_frame(&frame, &inner, &mut partial_msg, &event_tx, max_message_size)
                            .await
                    {
                        close_code = code;
                        stopped = true;
                    }
                }
                // read more bytes
                Ok(Some(FrameState::Incomplete) | None) => break,
                Err(FrameParseError::ProtoError) => {
                    inner
                        .fail(CloseReason::ProtoError, "There was a ws protocol violation.")
                        .await;
                    stopped = true;
                }
                Err(FrameParseError::SizeErr) => {
                    inner
                        .fail(CloseReason::TooBig, "Frame exceeded maximum size")
                        .await;
                    stopped = true;
                }
            }
        }

        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("TCP FIN");
                break;
            }
            Ok(n) => {
                tracing::trace!(bytes = n, "read socket");
                fd.push_bytes(&buf[..n]);
            }
            Err(e) => {
                tracing::warn!(error = ?e, "reader error");
                break;
            }
        }
    }

    inner.closing.store(true, Ordering::Release);
    inner.closed.store(true, Ordering::Release);
    let _ = event_tx.send(Event::Closed(close_code)).await;
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;
    use crate::{Message, protocol::mask};

    // servers never mask
    fn server_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0x80 | opcode as u8, u8::try_from(payload.len()).unwrap()];
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn pings_are_answered_while_nobody_reads_events() {
        let (client, mut server) = duplex(64 * 1024);
        let mut ws = WebSocket::from_stream(Box::new(client), &[], &ConnectionSettings::default());

        for i in 0..EVENT_QUEUE + 44 {
            let frame = server_frame(Opcode::Text, format!("msg {i}").as_bytes());
            server.write_all(&frame).await.unwrap();
        }
        server
            .write_all(&server_frame(Opcode::Ping, b"still there?"))
            .await
            .unwrap();

        let mut head = [0; 2];
        tokio::time::timeout(Duration::from_secs(5), server.read_exact(&mut head))
            .await
            .expect("PING left unanswered")
            .unwrap();
        assert_eq!(head, [0x80 | Opcode::Pong as u8, 0x80 | 12]);
        let mut key = [0; 4];
        server.read_exact(&mut key).await.unwrap();
        let mut payload = [0; 12];
        server.read_exact(&mut payload).await.unwrap();
        mask(&mut payload, key);
        assert_eq!(&payload, b"still there?");

        // the oldest events are kept, the overflow is dropped
        assert_eq!(
            ws.next_event().await,
            Some(Event::Message(Message::Text("msg 0".into())))
        );
    }
}
