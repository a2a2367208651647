/// Assembled messages received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Valid UTF-8 message.
    Text(String),
    /// Binary message bytes.
    Binary(Vec<u8>),
}

impl Message {
    /// If the type is `Message::Text`, returns a reference to the internal `String`, otherwise
    /// `None`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Message::Binary(..) => None,
            Message::Text(s) => Some(s),
        }
    }

    /// Returns a reference to the data as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Binary(b) => b,
            Message::Text(s) => s.as_bytes(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize { self.as_bytes().len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[derive(Debug)]
pub(crate) enum PartialMessage {
    Text(Vec<u8>),
    Binary(Vec<u8>),
}

impl PartialMessage {
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        match self {
            Self::Text(buf) | Self::Binary(buf) => buf.extend_from_slice(bytes),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Text(buf) | Self::Binary(buf) => buf.len(),
        }
    }

    /// Finishes the message; `None` when a text message is not valid UTF-8.
    pub(crate) fn finish(self) -> Option<Message> {
        match self {
            Self::Binary(buf) => Some(Message::Binary(buf)),
            Self::Text(buf) => String::from_utf8(buf).ok().map(Message::Text),
        }
    }
}
