//! minnow — a minimal Twitch chat client.
//!
//! Maintains a single persistent chat session against Twitch's IRC
//! interface and translates the wire protocol into structured message
//! events. A session is single-use: connect once, stop once; a dropped
//! connection means building a new [`ChatSession`].
//!
//! ```no_run
//! use minnow::{ChatConfig, ChatSession};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = ChatConfig::new("mybot", "abc123", vec!["somechannel".into()])?;
//! let mut session = ChatSession::new(config);
//! session.on_message(|msg| {
//!     println!("[#{}] {}: {}", msg.channel(), msg.sender(), msg.text());
//!     Ok(())
//! });
//! session.connect().await?;
//! // ...
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod chat;

pub use chat::command::Command;
pub use chat::config::{ChatConfig, ConfigError};
pub use chat::message::{ChatMessage, InvalidMessage, LineKind, MalformedLine};
pub use chat::session::{ChatSession, HandlerError, SessionError};
pub use chat::transport::{
    Connector, TcpConnector, TransportError, TransportReader, TransportWriter,
};
