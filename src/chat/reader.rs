//! Receive-side machinery — the line splitter and the receive loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::sync::Mutex;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::command::{PING, PONG};
use super::message::{self, ChatMessage};
use super::session::MessageHandler;
use super::transport::{TransportReader, TransportWriter};

/// Maximum line length the splitter will buffer; longer lines are
/// skipped. RFC 2812 says 512 bytes; IRCv3 message-tags can push this
/// to 8191.
const MAX_LINE_LENGTH: usize = 8191;

/// Write half shared between the receive loop (keepalive responses) and
/// the session's send-side callers. The mutex serializes writes so
/// concurrent callers cannot interleave bytes on the stream.
pub(crate) type SharedWriter = Arc<Mutex<Box<dyn TransportWriter>>>;

/// Splits a byte stream into lines on `\n`, tolerating `\r\n`.
///
/// Bytes after the last terminator stay buffered until the rest of the
/// line arrives, so chunk boundaries never drop or duplicate a line.
/// Oversized lines are skipped (logged + discarded) instead of ending
/// the session — one bad line must not kill the connection.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    /// True while discarding an oversized line whose terminator has not
    /// arrived yet.
    skipping: bool,
}

impl Decoder for LineSplitter {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, std::io::Error> {
        // Finish discarding an oversized line first: scan for its
        // terminator, then fall through to the next message.
        if self.skipping {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                src.clear();
                return Ok(None);
            };
            warn!(
                bytes = pos + 1,
                "finished skipping oversized line tail"
            );
            src.advance(pos + 1);
            self.skipping = false;
        }

        match src.iter().position(|&b| b == b'\n') {
            Some(pos) if pos > MAX_LINE_LENGTH => {
                // Complete oversized line — skip it entirely.
                warn!(bytes = pos, "skipped oversized line");
                src.advance(pos + 1);
                self.decode(src)
            }
            Some(pos) => {
                let mut line = src.split_to(pos);
                src.advance(1); // skip \n
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                if src.len() > MAX_LINE_LENGTH {
                    warn!(
                        bytes = src.len(),
                        "discarding oversized partial line, waiting for terminator"
                    );
                    src.clear();
                    self.skipping = true;
                }
                Ok(None)
            }
        }
    }
}

/// The session's long-lived inbound task.
///
/// Reads chunks until cancellation, end of stream, or a transport error;
/// every complete line is answered (keepalive) or parsed and dispatched in
/// wire order. Nothing encountered in here propagates out: per-line
/// problems are reported and skipped.
pub(crate) async fn receive_loop(
    mut transport: Box<dyn TransportReader>,
    writer: SharedWriter,
    handler: Arc<MessageHandler>,
    cancel: CancellationToken,
) {
    let mut splitter = LineSplitter::default();
    let mut buf = BytesMut::new();

    loop {
        let chunk = tokio::select! {
            biased;
            // When a stop request and a read complete together, the stop
            // wins and partial data is not processed further.
            () = cancel.cancelled() => break,
            chunk = transport.read_chunk() => chunk,
        };

        match chunk {
            Ok(Some(bytes)) => {
                buf.extend_from_slice(&bytes);
                if !drain_lines(&mut splitter, &mut buf, &writer, &handler).await {
                    break;
                }
            }
            Ok(None) => {
                if !buf.is_empty() {
                    error!(
                        buffered = buf.len(),
                        "stream ended mid-line; dropping buffered bytes"
                    );
                }
                break;
            }
            Err(e) => {
                error!("transport read failed: {e}");
                break;
            }
        }
    }

    debug!("receive loop exited");
}

/// Process every complete line currently buffered. Returns `false` when
/// the loop should shut down (a dead keepalive write).
async fn drain_lines(
    splitter: &mut LineSplitter,
    buf: &mut BytesMut,
    writer: &SharedWriter,
    handler: &Arc<MessageHandler>,
) -> bool {
    loop {
        match splitter.decode(buf) {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                if !handle_line(&line, writer, handler).await {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(e) => {
                error!("line framing failed: {e}");
                return false;
            }
        }
    }
}

/// Answer or dispatch a single line. Returns `false` only when the
/// connection itself is unusable.
async fn handle_line(line: &str, writer: &SharedWriter, handler: &Arc<MessageHandler>) -> bool {
    debug!(%line, "received");

    // Keepalive first: the probe is not a chat message and must be
    // answered even if parsing ever changes.
    if line.eq_ignore_ascii_case(PING) {
        let response = format!("{PONG}\r\n");
        if let Err(e) = writer.lock().await.write_all(response.as_bytes()).await {
            error!("keepalive response failed: {e}");
            return false;
        }
        return true;
    }

    match message::parse_line(line) {
        Ok(Some(msg)) => dispatch(msg, handler),
        Ok(None) => {}
        Err(e) => warn!(%line, "malformed line: {e}"),
    }
    true
}

/// Deliver one message to the application handler, isolating its failures
/// from the loop.
fn dispatch(msg: ChatMessage, handler: &Arc<MessageHandler>) {
    match catch_unwind(AssertUnwindSafe(|| (handler.as_ref())(msg))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("message handler failed: {e}"),
        Err(_) => error!("message handler panicked"),
    }
}
