//! Session lifecycle — connect-once, the concurrent command surface, and
//! the idempotent stop sequence.

use std::error::Error;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::command::Command;
use super::config::ChatConfig;
use super::message::ChatMessage;
use super::reader::{self, SharedWriter};
use super::transport::{Connector, TcpConnector, TransportError};

/// Error type the application's message handler may return. Reported at
/// the dispatch site; never ends the session.
pub type HandlerError = Box<dyn Error + Send + Sync>;

pub(crate) type MessageHandler = dyn Fn(ChatMessage) -> Result<(), HandlerError> + Send + Sync;

/// Failures surfaced to direct callers of the session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `connect` already ran (or the session was stopped). Sessions are
    /// single-use; build a new one to reconnect.
    #[error("session already started; create a new session to reconnect")]
    AlreadyStarted,
    /// `connect` called before a handler was registered. No transport I/O
    /// was performed.
    #[error("no message handler registered; call on_message before connect")]
    HandlerMissing,
    /// A send-side operation was called outside the `Connected` phase.
    #[error("session is not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The shared shutdown completion. The first `stop()` caller creates it
/// and runs the shutdown inside it; everyone else awaits a clone.
type StopSignal = Shared<BoxFuture<'static, ()>>;

enum Phase {
    Idle,
    Connecting,
    Connected(Active),
    Stopping(StopSignal),
    Stopped,
}

struct Active {
    writer: SharedWriter,
    recv_task: JoinHandle<()>,
}

struct Inner {
    handler: Option<Arc<MessageHandler>>,
    phase: Phase,
}

/// One chat session: a single connection lifecycle, not restartable.
///
/// All operations take `&self`, so a session can sit behind an [`Arc`]
/// and be driven from any number of tasks. The phase lock is held for the
/// whole of `connect`, which keeps the `Connecting` window invisible to
/// concurrent callers.
pub struct ChatSession {
    config: ChatConfig,
    connector: Box<dyn Connector>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

impl ChatSession {
    /// Session against the production Twitch endpoint.
    pub fn new(config: ChatConfig) -> Self {
        Self::with_connector(config, Box::new(TcpConnector::twitch()))
    }

    /// Session over a caller-supplied transport.
    pub fn with_connector(config: ChatConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                handler: None,
                phase: Phase::Idle,
            }),
        }
    }

    /// Register the message handler. Must happen before [`connect`];
    /// registering again before connect replaces the previous handler.
    ///
    /// The handler runs on the receive loop's task, in wire order. Its
    /// errors (and panics) are reported and swallowed there.
    ///
    /// [`connect`]: ChatSession::connect
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: Fn(ChatMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.get_mut().handler = Some(Arc::new(handler));
    }

    /// Open the transport, authenticate, start the receive loop, and join
    /// the configured channels in order.
    ///
    /// Fails with [`SessionError::AlreadyStarted`] on any second call and
    /// with [`SessionError::HandlerMissing`] (before any transport I/O) if
    /// no handler was registered. A failed join send aborts the remaining
    /// joins and surfaces to the caller; the session stays connected.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, Phase::Idle) {
            return Err(SessionError::AlreadyStarted);
        }
        let Some(handler) = inner.handler.clone() else {
            return Err(SessionError::HandlerMissing);
        };
        inner.phase = Phase::Connecting;

        let active = match self.establish(handler).await {
            Ok(active) => active,
            Err(e) => {
                // One-shot lifecycle: a failed connect retires the session.
                inner.phase = Phase::Stopped;
                return Err(e);
            }
        };
        let writer = active.writer.clone();
        inner.phase = Phase::Connected(active);
        drop(inner);

        for channel in self.config.channels() {
            write_line(&writer, &Command::Join { channel }.to_line()).await?;
            info!(%channel, "join sent");
        }

        Ok(())
    }

    /// Open the transport, send the auth handshake, spawn the loop.
    async fn establish(&self, handler: Arc<MessageHandler>) -> Result<Active, SessionError> {
        let (transport_reader, transport_writer) = self.connector.open().await?;
        let writer: SharedWriter = Arc::new(Mutex::new(transport_writer));

        write_line(
            &writer,
            &Command::Pass {
                token: self.config.token(),
            }
            .to_line(),
        )
        .await?;
        write_line(
            &writer,
            &Command::Nick {
                login: self.config.login(),
            }
            .to_line(),
        )
        .await?;

        let recv_task = tokio::spawn(reader::receive_loop(
            transport_reader,
            writer.clone(),
            handler,
            self.cancel.clone(),
        ));

        info!(login = self.config.login(), "connected");
        Ok(Active { writer, recv_task })
    }

    /// Join a channel.
    pub async fn join(&self, channel: &str) -> Result<(), SessionError> {
        self.send_command(Command::Join { channel }).await
    }

    /// Leave a channel.
    pub async fn leave(&self, channel: &str) -> Result<(), SessionError> {
        self.send_command(Command::Part { channel }).await
    }

    /// Send a chat message to a channel.
    pub async fn send_message(&self, channel: &str, text: &str) -> Result<(), SessionError> {
        self.send_command(Command::Privmsg { channel, text }).await
    }

    async fn send_command(&self, command: Command<'_>) -> Result<(), SessionError> {
        let writer = {
            let inner = self.inner.lock().await;
            match &inner.phase {
                Phase::Connected(active) => active.writer.clone(),
                _ => return Err(SessionError::NotConnected),
            }
        };
        write_line(&writer, &command.to_line()).await?;
        Ok(())
    }

    /// Stop the receive loop and retire the session.
    ///
    /// Idempotent under concurrency: the first caller cancels the pending
    /// read and awaits the loop task; every other caller, then or later,
    /// awaits the same completion.
    ///
    /// Calling before `connect` succeeds without doing anything, but it
    /// still retires the session: phases only move forward, so a later
    /// `connect` fails with [`SessionError::AlreadyStarted`] rather than
    /// starting a stopped session.
    pub async fn stop(&self) {
        let signal = {
            let mut inner = self.inner.lock().await;
            match std::mem::replace(&mut inner.phase, Phase::Stopped) {
                // Connecting is unobservable here (connect holds the lock),
                // but retiring it is the right answer if that ever changes.
                Phase::Idle | Phase::Connecting | Phase::Stopped => return,
                Phase::Stopping(signal) => {
                    inner.phase = Phase::Stopping(signal.clone());
                    signal
                }
                Phase::Connected(active) => {
                    let cancel = self.cancel.clone();
                    let signal: StopSignal = async move {
                        cancel.cancel();
                        if let Err(e) = active.recv_task.await {
                            warn!("receive loop task failed: {e}");
                        }
                    }
                    .boxed()
                    .shared();
                    inner.phase = Phase::Stopping(signal.clone());
                    signal
                }
            }
        };

        signal.await;

        let mut inner = self.inner.lock().await;
        if matches!(inner.phase, Phase::Stopping(_)) {
            inner.phase = Phase::Stopped;
            info!("session stopped");
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        // Disposal without stop(): wind the receive loop down. The task
        // owns its transport halves and exits on cancellation.
        self.cancel.cancel();
    }
}

/// Append the terminator and write the line as one serialized write.
async fn write_line(writer: &SharedWriter, line: &str) -> Result<(), TransportError> {
    let mut buf = String::with_capacity(line.len() + 2);
    buf.push_str(line);
    buf.push_str("\r\n");
    writer.lock().await.write_all(buf.as_bytes()).await
}
