mod event;
mod frame_handler;
mod websocket;

use async_trait::async_trait;
pub use event::Event;
pub(crate) use websocket::BoxedStream;
pub use websocket::WebSocket;

use crate::error::Result;

/// The operations the probe engine and the session loop need from an open connection.
///
/// The connection is owned by exactly one driver at a time, hence `&mut self` everywhere.
#[async_trait]
pub trait Connection: Send {
    /// Sends a text message.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Sends a binary message.
    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Sends a ping frame; the answer arrives as [`Event::Pong`].
    async fn ping(&mut self, payload: &[u8]) -> Result<()>;

    /// Sends an unsolicited pong frame.
    async fn pong(&mut self, payload: &[u8]) -> Result<()>;

    /// Next event from the server, `None` once the connection is gone.
    ///
    /// Cancel safe: dropping the future before it completes loses no event.
    async fn next_event(&mut self) -> Option<Event>;

    /// Runs the closing handshake. Calling it again is a no-op.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for &mut C {
    async fn send_text(&mut self, text: &str) -> Result<()> { (**self).send_text(text).await }

    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> { (**self).send_bytes(bytes).await }

    async fn ping(&mut self, payload: &[u8]) -> Result<()> { (**self).ping(payload).await }

    async fn pong(&mut self, payload: &[u8]) -> Result<()> { (**self).pong(payload).await }

    async fn next_event(&mut self) -> Option<Event> { (**self).next_event().await }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        (**self).close(code, reason).await
    }
}
