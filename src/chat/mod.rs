//! Twitch chat session core — wire formatting, line parsing, the receive
//! loop, and the session lifecycle manager.

pub mod command;
pub mod config;
pub mod message;
pub(crate) mod reader;
pub mod session;
pub mod transport;
