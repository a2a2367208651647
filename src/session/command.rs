use std::fmt;

/// The commands understood by the interactive session, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Help,
    Ping,
    Pong,
    Text,
    Byte,
    Close,
    Quit,
}

impl Command {
    const ALL: [Command; 7] = [
        Command::Help,
        Command::Ping,
        Command::Pong,
        Command::Text,
        Command::Byte,
        Command::Close,
        Command::Quit,
    ];

    /// Every command, in the order help listings show them.
    #[must_use]
    pub fn all() -> &'static [Command] { &Self::ALL }

    /// Exact, case-sensitive match on the canonical name.
    #[must_use]
    pub fn lookup(token: &str) -> Option<Command> {
        Self::ALL.iter().copied().find(|c| c.name() == token)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::Text => "text",
            Command::Byte => "byte",
            Command::Close => "close",
            Command::Quit => "quit",
        }
    }

    /// Invocation syntax; optional arguments are wrapped in `<>`.
    #[must_use]
    pub fn usage(self) -> &'static str {
        match self {
            Command::Help => "help <command>",
            Command::Ping => "ping <message>",
            Command::Pong => "pong <message>",
            Command::Text => "text message",
            Command::Byte => "byte message",
            Command::Close => "close <code> <reason>",
            Command::Quit => "quit",
        }
    }

    #[must_use]
    pub fn summary(self) -> &'static str {
        match self {
            Command::Help => "Shows the general help, or the help of the given command.",
            Command::Ping => "Sends a ping with an optional message and waits for the pong.",
            Command::Pong => "Sends an unsolicited pong with an optional message.",
            Command::Text => "Sends a text message.",
            Command::Byte => "Sends a binary message made of the UTF-8 bytes of the message.",
            Command::Close => {
                "Closes the connection with a code (1000 by default) and a reason, then ends the session."
            }
            Command::Quit => "Ends the session.",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        assert_eq!(Command::lookup("quit"), Some(Command::Quit));
        assert_eq!(Command::lookup("Quit"), None);
        assert_eq!(Command::lookup("qui"), None);
        assert_eq!(Command::lookup(""), None);
    }

    #[test]
    fn every_command_resolves_to_itself() {
        for &command in Command::all() {
            assert_eq!(Command::lookup(&command.to_string()), Some(command));
            assert!(command.usage().starts_with(command.name()));
        }
    }

    #[test]
    fn display_order_is_stable() {
        let names: Vec<_> = Command::all().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["help", "ping", "pong", "text", "byte", "close", "quit"]);
    }
}
