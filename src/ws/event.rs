use crate::Message;

/// `Event`s are produced by [`Connection::next_event`](crate::Connection::next_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A pong frame with its payload, solicited or not.
    Pong(Vec<u8>),
    /// A complete data message.
    Message(Message),
    /// The connection is gone. Carries the status code of the server's close frame, if one
    /// was received. This is always the last event.
    Closed(Option<u16>),
}
