//! Incoming line classification and chat message extraction.
//!
//! Three line shapes matter, tried in order:
//!
//! 1. numeric reply: `:<prefix> <3-digit-code> <target> :<payload>`
//! 2. command line:  `:<sender>!<rest> <COMMAND> <payload>`
//! 3. anything else is unrecognized
//!
//! Only a `PRIVMSG` command line produces a [`ChatMessage`]; every other
//! recognized shape is deliberately discarded so server housekeeping never
//! leaks into the chat stream. Unrecognized lines are tolerated, not
//! errors, which keeps the session forward-compatible with server chatter
//! we don't model.

/// A chat message received from a channel.
///
/// Every field is non-empty; construction fails otherwise, so a value in
/// hand is always complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    channel: String,
    sender: String,
    text: String,
}

/// Rejected [`ChatMessage`] construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMessage {
    #[error("chat message channel must not be empty")]
    EmptyChannel,
    #[error("chat message sender must not be empty")]
    EmptySender,
    #[error("chat message text must not be empty")]
    EmptyText,
}

impl ChatMessage {
    /// Build a message, rejecting any empty field.
    pub fn new(
        channel: impl Into<String>,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, InvalidMessage> {
        let channel = channel.into();
        let sender = sender.into();
        let text = text.into();

        if channel.is_empty() {
            return Err(InvalidMessage::EmptyChannel);
        }
        if sender.is_empty() {
            return Err(InvalidMessage::EmptySender);
        }
        if text.is_empty() {
            return Err(InvalidMessage::EmptyText);
        }

        Ok(Self {
            channel,
            sender,
            text,
        })
    }

    /// Channel the message was sent to, without the leading `#`.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Nickname of the sender.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The message text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One incoming line, classified by shape.
///
/// Classification is purely structural; it does not decide what to do with
/// the line. The borrowed fields point into the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Numeric reply: `:<prefix> <code> <target> :<payload>`.
    ///
    /// Codes seen in practice are connection housekeeping: 001-004
    /// (welcome), 353/366 (names list), 372/375/376 (MOTD). All are
    /// currently discarded; this variant is the extension point if a
    /// future session needs to act on one.
    Reply {
        prefix: &'a str,
        code: u16,
        target: &'a str,
        payload: &'a str,
    },
    /// Command line: `:<sender>!<rest> <COMMAND> <payload>`.
    Command {
        sender: &'a str,
        command: &'a str,
        payload: &'a str,
    },
    /// Anything that matches neither shape.
    Unrecognized,
}

/// Line matched a known shape but its inner payload did not.
///
/// Per-line and non-fatal: the receive loop reports it and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedLine {
    #[error("invalid chat payload: {0:?}")]
    ChatPayload(String),
    #[error(transparent)]
    Message(#[from] InvalidMessage),
}

/// Classify one line (without its terminator) by shape.
///
/// Reply is tried before Command, so a numeric code is never mistaken for
/// a command word.
pub fn classify(line: &str) -> LineKind<'_> {
    let Some(rest) = line.strip_prefix(':') else {
        return LineKind::Unrecognized;
    };
    let Some((prefix, rest)) = rest.split_once(' ') else {
        return LineKind::Unrecognized;
    };
    if prefix.is_empty() {
        return LineKind::Unrecognized;
    }

    if let Some(reply) = match_reply(prefix, rest) {
        return reply;
    }
    match_command(prefix, rest)
}

/// `<code> <target> :<payload>` with a three-digit code.
fn match_reply<'a>(prefix: &'a str, rest: &'a str) -> Option<LineKind<'a>> {
    let (code, rest) = rest.split_once(' ')?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Target runs to the first ` :`; it may itself contain spaces
    // (names-list replies look like `bot = #channel`).
    let (target, payload) = rest.split_once(" :")?;
    if target.is_empty() || payload.is_empty() {
        return None;
    }
    let code = code.parse().ok()?;
    Some(LineKind::Reply {
        prefix,
        code,
        target,
        payload,
    })
}

/// `<sender>!<rest-of-prefix> <COMMAND> <payload>`.
fn match_command<'a>(prefix: &'a str, rest: &'a str) -> LineKind<'a> {
    let Some((sender, host)) = prefix.split_once('!') else {
        return LineKind::Unrecognized;
    };
    if sender.is_empty() || host.is_empty() || !is_word(sender) {
        return LineKind::Unrecognized;
    }
    let Some((command, payload)) = rest.split_once(' ') else {
        return LineKind::Unrecognized;
    };
    if command.is_empty()
        || payload.is_empty()
        || !command.bytes().all(|b| b.is_ascii_uppercase())
    {
        return LineKind::Unrecognized;
    }
    LineKind::Command {
        sender,
        command,
        payload,
    }
}

fn is_word(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Parse one line into a chat message, if it is one.
///
/// `Ok(None)` covers everything recognized-but-ignored (numeric replies,
/// non-PRIVMSG commands) as well as unrecognized lines. `Err` means the
/// line was shaped as a chat message but its payload was not
/// `#<channel> :<text>`.
pub fn parse_line(line: &str) -> Result<Option<ChatMessage>, MalformedLine> {
    match classify(line) {
        LineKind::Reply { .. } | LineKind::Unrecognized => Ok(None),
        LineKind::Command {
            sender,
            command,
            payload,
        } => {
            if command == "PRIVMSG" {
                parse_chat_payload(sender, payload).map(Some)
            } else {
                Ok(None)
            }
        }
    }
}

/// Extract `#<channel> :<text>` from a PRIVMSG payload.
fn parse_chat_payload(sender: &str, payload: &str) -> Result<ChatMessage, MalformedLine> {
    let malformed = || MalformedLine::ChatPayload(payload.to_owned());

    let rest = payload.strip_prefix('#').ok_or_else(malformed)?;
    let (channel, text) = rest.split_once(" :").ok_or_else(malformed)?;
    if channel.is_empty() || !is_word(channel) || text.is_empty() {
        return Err(malformed());
    }

    Ok(ChatMessage::new(channel, sender, text)?)
}
