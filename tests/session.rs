//! End-to-end session tests over a scripted in-memory transport.
//!
//! The scripted connector hands the session a reader fed from a channel of
//! byte chunks and a writer that captures every outbound write, so tests
//! can drive arbitrary chunk boundaries and assert exact wire traffic.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;

use minnow::{
    ChatConfig, ChatMessage, ChatSession, Connector, SessionError, TransportError,
    TransportReader, TransportWriter,
};

/// Reader driven by scripted chunks; end of stream when the sender drops.
/// Counts its own drop so tests can assert the receive loop was torn
/// down exactly once no matter how many stop calls raced.
struct ScriptedReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
    drops: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportReader for ScriptedReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

impl Drop for ScriptedReader {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Writer that forwards every write, as text, to the test.
struct CapturingWriter {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl TransportWriter for CapturingWriter {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let _ = self.tx.send(String::from_utf8_lossy(buf).into_owned());
        Ok(())
    }
}

/// Connector yielding one pre-built reader/writer pair.
struct ScriptedConnector {
    pair: StdMutex<Option<(Box<dyn TransportReader>, Box<dyn TransportWriter>)>>,
    opened: Arc<AtomicBool>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(
        &self,
    ) -> Result<(Box<dyn TransportReader>, Box<dyn TransportWriter>), TransportError> {
        self.opened.store(true, Ordering::SeqCst);
        self.pair
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Connect {
                addr: "scripted".into(),
                source: std::io::Error::other("transport already opened"),
            })
    }
}

struct Harness {
    session: ChatSession,
    /// Feed inbound chunks; drop to signal end of stream.
    chunks: mpsc::UnboundedSender<Bytes>,
    /// Captured outbound writes, one entry per write call.
    wire: mpsc::UnboundedReceiver<String>,
    /// Messages the handler received, in dispatch order.
    messages: mpsc::UnboundedReceiver<ChatMessage>,
    opened: Arc<AtomicBool>,
    /// How many times the scripted reader has been dropped; 1 once the
    /// receive loop has torn down.
    reader_drops: Arc<AtomicUsize>,
}

fn config(channels: &[&str]) -> ChatConfig {
    let channels = channels.iter().map(|c| (*c).to_string()).collect();
    ChatConfig::new("mybot", "token123", channels).unwrap()
}

/// Session wired to the scripted transport, with a forwarding handler.
fn harness(channels: &[&str]) -> Harness {
    let mut h = harness_without_handler(channels);
    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    h.session.on_message(move |msg| {
        let _ = msg_tx.send(msg);
        Ok(())
    });
    h.messages = msg_rx;
    h
}

fn harness_without_handler(channels: &[&str]) -> Harness {
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let (wire_tx, wire_rx) = mpsc::unbounded_channel();
    let (_, empty_rx) = mpsc::unbounded_channel();
    let opened = Arc::new(AtomicBool::new(false));
    let reader_drops = Arc::new(AtomicUsize::new(0));

    let connector = ScriptedConnector {
        pair: StdMutex::new(Some((
            Box::new(ScriptedReader {
                rx: chunk_rx,
                drops: Arc::clone(&reader_drops),
            }) as Box<dyn TransportReader>,
            Box::new(CapturingWriter { tx: wire_tx }) as Box<dyn TransportWriter>,
        ))),
        opened: Arc::clone(&opened),
    };

    Harness {
        session: ChatSession::with_connector(config(channels), Box::new(connector)),
        chunks: chunk_tx,
        wire: wire_rx,
        messages: empty_rx,
        opened,
        reader_drops,
    }
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting on channel")
        .expect("channel closed")
}

fn feed(h: &Harness, bytes: &[u8]) {
    h.chunks.send(Bytes::copy_from_slice(bytes)).unwrap();
}

// ── Lifecycle preconditions ──────────────────────────────────────

#[tokio::test]
async fn second_connect_fails() {
    let h = harness(&[]);
    h.session.connect().await.unwrap();

    let err = h.session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyStarted));

    h.session.stop().await;
}

#[tokio::test]
async fn connect_without_handler_does_no_io() {
    let h = harness_without_handler(&[]);

    let err = h.session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::HandlerMissing));
    assert!(!h.opened.load(Ordering::SeqCst));
}

#[tokio::test]
async fn stop_before_connect_retires_the_session() {
    let h = harness(&[]);
    h.session.stop().await;

    let err = h.session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyStarted));
    assert!(!h.opened.load(Ordering::SeqCst));
}

#[tokio::test]
async fn send_before_connect_fails() {
    let h = harness(&[]);
    let err = h.session.send_message("foo", "hi").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
}

// ── Handshake and command surface ────────────────────────────────

#[tokio::test]
async fn connect_sends_handshake_then_joins_in_order() {
    let mut h = harness(&["alpha", "beta"]);
    h.session.connect().await.unwrap();

    assert_eq!(recv(&mut h.wire).await, "PASS oauth:token123\r\n");
    assert_eq!(recv(&mut h.wire).await, "NICK mybot\r\n");
    assert_eq!(recv(&mut h.wire).await, "JOIN #alpha\r\n");
    assert_eq!(recv(&mut h.wire).await, "JOIN #beta\r\n");

    h.session.stop().await;
}

#[tokio::test]
async fn join_leave_send_write_wire_lines() {
    let mut h = harness(&[]);
    h.session.connect().await.unwrap();
    recv(&mut h.wire).await; // PASS
    recv(&mut h.wire).await; // NICK

    h.session.join("foo").await.unwrap();
    assert_eq!(recv(&mut h.wire).await, "JOIN #foo\r\n");

    h.session.send_message("foo", "hello there").await.unwrap();
    assert_eq!(recv(&mut h.wire).await, "PRIVMSG #foo :hello there\r\n");

    h.session.leave("foo").await.unwrap();
    assert_eq!(recv(&mut h.wire).await, "PART #foo\r\n");

    h.session.stop().await;
}

// ── Receive loop ─────────────────────────────────────────────────

#[tokio::test]
async fn ping_is_answered_and_not_dispatched() {
    let mut h = harness(&[]);
    h.session.connect().await.unwrap();
    recv(&mut h.wire).await; // PASS
    recv(&mut h.wire).await; // NICK

    feed(&h, b"PING :tmi.twitch.tv\r\n");
    assert_eq!(recv(&mut h.wire).await, "PONG :tmi.twitch.tv\r\n");

    h.session.stop().await;
    assert!(h.messages.try_recv().is_err());
}

#[tokio::test]
async fn dispatches_chat_messages_in_wire_order() {
    let mut h = harness(&[]);
    h.session.connect().await.unwrap();

    feed(
        &h,
        b":alice!x@y PRIVMSG #foo :hello world\r\n:bob!x@y PRIVMSG #foo :second\r\n",
    );

    let first = recv(&mut h.messages).await;
    assert_eq!(first.sender(), "alice");
    assert_eq!(first.channel(), "foo");
    assert_eq!(first.text(), "hello world");

    let second = recv(&mut h.messages).await;
    assert_eq!(second.sender(), "bob");
    assert_eq!(second.text(), "second");

    h.session.stop().await;
}

#[tokio::test]
async fn chunk_boundaries_do_not_change_dispatch() {
    let input: &[u8] =
        b":alice!x@y PRIVMSG #foo :hello world\r\n:bob!x@y PRIVMSG #bar :split me\r\n";

    let whole = run_script(&[input]).await;

    // Split mid-line, including inside the first message's text.
    for split_at in [5, 20, 36, 50] {
        let (a, b) = input.split_at(split_at);
        let parts = run_script(&[a, b]).await;
        assert_eq!(parts, whole, "split at byte {split_at} changed dispatch");
    }
}

/// Feed the chunks, close the stream, stop, and return every dispatched
/// message.
async fn run_script(chunks: &[&[u8]]) -> Vec<ChatMessage> {
    let mut h = harness(&[]);
    h.session.connect().await.unwrap();

    for chunk in chunks {
        feed(&h, chunk);
    }
    drop(h.chunks); // end of stream; the loop drains and exits
    h.session.stop().await;

    let mut out = Vec::new();
    while let Ok(msg) = h.messages.try_recv() {
        out.push(msg);
    }
    out
}

#[tokio::test]
async fn malformed_chat_line_does_not_stop_the_loop() {
    let mut h = harness(&[]);
    h.session.connect().await.unwrap();

    // First PRIVMSG payload is missing the `#`; the next line must still
    // come through.
    feed(
        &h,
        b":alice!x@y PRIVMSG foo :no hash\r\n:alice!x@y PRIVMSG #ok :fine\r\n",
    );

    let msg = recv(&mut h.messages).await;
    assert_eq!(msg.channel(), "ok");
    assert_eq!(msg.text(), "fine");

    h.session.stop().await;
    assert!(h.messages.try_recv().is_err());
}

#[tokio::test]
async fn numeric_replies_are_not_dispatched() {
    let mut h = harness(&[]);
    h.session.connect().await.unwrap();

    feed(
        &h,
        b":tmi.twitch.tv 001 mybot :Welcome, GLHF!\r\n:tmi.twitch.tv 376 mybot :>\r\n:alice!x@y PRIVMSG #foo :real\r\n",
    );

    let msg = recv(&mut h.messages).await;
    assert_eq!(msg.text(), "real");

    h.session.stop().await;
    assert!(h.messages.try_recv().is_err());
}

#[tokio::test]
async fn handler_error_does_not_stop_the_loop() {
    let mut h = harness_without_handler(&[]);
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    h.session.on_message(move |msg| {
        let _ = msg_tx.send(msg);
        Err("handler is grumpy".into())
    });
    h.session.connect().await.unwrap();

    feed(
        &h,
        b":alice!x@y PRIVMSG #foo :one\r\n:alice!x@y PRIVMSG #foo :two\r\n",
    );

    assert_eq!(recv(&mut msg_rx).await.text(), "one");
    assert_eq!(recv(&mut msg_rx).await.text(), "two");

    h.session.stop().await;
}

#[tokio::test]
async fn handler_panic_does_not_stop_the_loop() {
    let mut h = harness_without_handler(&[]);
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    h.session.on_message(move |msg| {
        if msg.text() == "boom" {
            panic!("handler blew up");
        }
        let _ = msg_tx.send(msg);
        Ok(())
    });
    h.session.connect().await.unwrap();

    // The first message makes the handler panic; the next line must
    // still be dispatched.
    feed(
        &h,
        b":alice!x@y PRIVMSG #foo :boom\r\n:alice!x@y PRIVMSG #foo :after\r\n",
    );

    assert_eq!(recv(&mut msg_rx).await.text(), "after");
    h.session.stop().await;
}

#[tokio::test]
async fn eof_with_partial_line_exits_cleanly() {
    let mut h = harness(&[]);
    h.session.connect().await.unwrap();

    feed(&h, b":alice!x@y PRIV");
    drop(h.chunks); // truncated stream

    // The loop must exit on its own and stop must still complete.
    h.session.stop().await;
    assert!(h.messages.try_recv().is_err());
}

// ── Stop coordination ────────────────────────────────────────────

#[tokio::test]
async fn concurrent_stops_all_complete() {
    let h = harness(&[]);
    h.session.connect().await.unwrap();

    let session = Arc::new(h.session);
    let mut stoppers = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        stoppers.push(tokio::spawn(async move {
            session.stop().await;
        }));
    }
    for stopper in stoppers {
        stopper.await.unwrap();
    }

    // One shutdown: the receive loop (and with it the transport reader)
    // was torn down exactly once despite the racing callers.
    assert_eq!(h.reader_drops.load(Ordering::SeqCst), 1);

    // The session is retired; late stops are still fine.
    session.stop().await;
    assert_eq!(h.reader_drops.load(Ordering::SeqCst), 1);

    let err = session.join("foo").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
}

#[tokio::test]
async fn stop_after_loop_already_exited() {
    let h = harness(&[]);
    h.session.connect().await.unwrap();

    drop(h.chunks); // loop sees end of stream and exits
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.session.stop().await;
    h.session.stop().await;
}
