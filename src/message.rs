use std::{
    ops::AddAssign,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    envelope::{ReplyKind, decode_reply},
    error::{ClientError, Result},
    protocol::classify_binary_reply,
    socket::{FrameSink, FrameStream, Message},
    state::StateCell,
};

/// Lock-free per-session counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_sent: AtomicU64,
    pixels_sent: AtomicU64,
    canvas_queries_sent: AtomicU64,
    replies: AtomicU64,
    malformed_replies: AtomicU64,
    server_errors: AtomicU64,
}

impl SessionStats {
    pub fn record_pixel(&self) {
        self.pixels_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_canvas_query(&self) {
        self.canvas_queries_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            pixels_sent: self.pixels_sent.load(Ordering::Relaxed),
            canvas_queries_sent: self.canvas_queries_sent.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            malformed_replies: self.malformed_replies.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub pixels_sent: u64,
    pub canvas_queries_sent: u64,
    pub replies: u64,
    pub malformed_replies: u64,
    pub server_errors: u64,
}

impl AddAssign for StatsSnapshot {
    fn add_assign(&mut self, rhs: Self) {
        self.frames_sent += rhs.frames_sent;
        self.pixels_sent += rhs.pixels_sent;
        self.canvas_queries_sent += rhs.canvas_queries_sent;
        self.replies += rhs.replies;
        self.malformed_replies += rhs.malformed_replies;
        self.server_errors += rhs.server_errors;
    }
}

/// Sole owner of a session's sink. Every generator funnels whole messages
/// through one queue, so frames hit the wire one at a time.
pub struct FrameWriter {
    session: usize,
    stats: Arc<SessionStats>,
}

impl FrameWriter {
    pub fn new(session: usize, stats: Arc<SessionStats>) -> Self {
        Self { session, stats }
    }

    /// Runs until every queue sender is dropped, then closes the transport.
    #[instrument(skip_all, fields(session = self.session))]
    pub async fn run(
        self,
        mut queue: mpsc::Receiver<Message>,
        mut sink: FrameSink,
        cancel: CancellationToken,
    ) -> Result<()> {
        debug!("Frame writer started");

        while let Some(msg) = queue.recv().await {
            if let Err(e) = sink.send(msg).await {
                warn!("Failed to send frame to server: {}", e);
                cancel.cancel();
                return Err(ClientError::WebSocket(e));
            }
            let sent = self.stats.frames_sent.fetch_add(1, Ordering::Relaxed) + 1;
            trace!("Sent frame #{}", sent);
        }

        debug!("Outbound queue drained, closing transport");
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!("Close frame not delivered: {}", e);
        }
        if let Err(e) = sink.close().await {
            debug!("Transport close failed: {}", e);
        }
        Ok(())
    }
}

/// Drains server replies so nothing backs up behind unread frames. Replies
/// are counted and logged, never correlated with requests.
pub struct ReplyReader {
    session: usize,
    stats: Arc<SessionStats>,
}

impl ReplyReader {
    pub fn new(session: usize, stats: Arc<SessionStats>) -> Self {
        Self { session, stats }
    }

    #[instrument(skip_all, fields(session = self.session))]
    pub async fn run(self, mut stream: FrameStream, state: StateCell, cancel: CancellationToken) {
        debug!("Reply reader started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Reply reader cancelled");
                    return;
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    if self.handle_text(text.as_str()) {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    self.stats.replies.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        "Received {} binary frame, {} bytes",
                        classify_binary_reply(&data).unwrap_or("empty"),
                        data.len()
                    );
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the connection: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => trace!("Ignoring control frame"),
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!("WebSocket stream ended");
                    break;
                }
            }
        }

        // The server side is gone; stop this session's generators.
        state.close();
        cancel.cancel();
    }

    /// Returns true when the reply ends the session.
    fn handle_text(&self, text: &str) -> bool {
        let reply = match decode_reply(text) {
            Ok(reply) => reply,
            Err(e) => {
                self.stats.malformed_replies.fetch_add(1, Ordering::Relaxed);
                warn!("Discarding malformed reply: {}", e);
                return false;
            }
        };

        self.stats.replies.fetch_add(1, Ordering::Relaxed);
        match &reply.kind {
            ReplyKind::Error => {
                self.stats.server_errors.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Server rejected a request: {}",
                    reply.error_message().unwrap_or("unspecified")
                );
            }
            ReplyKind::Announcement => info!("Announcement: {:?}", reply.fields.get("message")),
            _ => trace!("Got {} reply", reply.rt),
        }

        if reply.ends_session() {
            info!("Server ended the session with {}", reply.rt);
            return true;
        }
        false
    }
}
