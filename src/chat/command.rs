//! Outbound wire commands.
//!
//! Pure formatting: each command renders to a single protocol line with no
//! trailing terminator; the send path appends `\r\n`.

/// Keepalive probe Twitch sends. Compared case-insensitively on receive.
pub const PING: &str = "PING :tmi.twitch.tv";

/// Fixed response to the keepalive probe.
pub const PONG: &str = "PONG :tmi.twitch.tv";

/// The closed set of commands a session ever sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Authenticate with an OAuth token.
    Pass { token: &'a str },
    /// Set the login name.
    Nick { login: &'a str },
    /// Join a channel.
    Join { channel: &'a str },
    /// Leave a channel.
    Part { channel: &'a str },
    /// Send a chat message to a channel.
    Privmsg { channel: &'a str, text: &'a str },
}

impl Command<'_> {
    /// Render the wire form, without the line terminator.
    pub fn to_line(&self) -> String {
        match self {
            Self::Pass { token } => format!("PASS oauth:{token}"),
            Self::Nick { login } => format!("NICK {login}"),
            Self::Join { channel } => format!("JOIN #{channel}"),
            Self::Part { channel } => format!("PART #{channel}"),
            Self::Privmsg { channel, text } => format!("PRIVMSG #{channel} :{text}"),
        }
    }
}
