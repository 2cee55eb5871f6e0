//! In-memory transports and a scripted stand-in for the canvas server.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt, channel::mpsc};
use url::Url;

use crate::{
    envelope::{AdminAction, Request, decode_json},
    error::ClientError,
    socket::{Connector, Message, Transport, WsError},
};

#[derive(Debug, Clone)]
pub enum ServerBehavior {
    /// Issue `USER-<attempt>` after `initialAuth`.
    Accept,
    /// Send noise, then an unrelated reply, then the identity.
    NoisyAccept,
    /// Always issue the same identity.
    FixedIdentity(String),
    /// Never answer, never close.
    Silent,
    /// Drop the connection as soon as a request arrives.
    HangUp,
    /// Issue an identity, then kick the user on their next frame.
    KickAfterFirstFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Received(Message),
    Sent(String),
}

#[derive(Debug, Default)]
pub struct ConnectionLog {
    events: Mutex<Vec<Event>>,
}

impl ConnectionLog {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Waits until the client's Close frame has been recorded.
    pub async fn wait_for_close(&self) {
        let closed = async {
            while !self
                .received()
                .iter()
                .any(|m| matches!(m, Message::Close(_)))
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), closed)
            .await
            .expect("client never closed the connection");
    }

    pub fn received(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Received(m) => Some(m),
                Event::Sent(_) => None,
            })
            .collect()
    }
}

pub struct MockConnector {
    behavior: ServerBehavior,
    refuse: HashSet<usize>,
    silent: HashSet<usize>,
    attempts: AtomicUsize,
    logs: Mutex<Vec<Arc<ConnectionLog>>>,
}

impl MockConnector {
    pub fn new(behavior: ServerBehavior) -> Self {
        Self {
            behavior,
            refuse: HashSet::new(),
            silent: HashSet::new(),
            attempts: AtomicUsize::new(0),
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Refuse the given zero-based connection attempts.
    pub fn refusing(mut self, attempts: impl IntoIterator<Item = usize>) -> Self {
        self.refuse.extend(attempts);
        self
    }

    /// Accept the given attempts but never answer them.
    pub fn silent_on(mut self, attempts: impl IntoIterator<Item = usize>) -> Self {
        self.silent.extend(attempts);
        self
    }

    pub fn logs(&self) -> Vec<Arc<ConnectionLog>> {
        self.logs.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Transport, ClientError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.contains(&attempt) {
            return Err(ClientError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let log = Arc::new(ConnectionLog::default());
        self.logs.lock().unwrap().push(Arc::clone(&log));

        let (client_tx, server_rx) = mpsc::unbounded::<Message>();
        let (server_tx, client_rx) = mpsc::unbounded::<Result<Message, WsError>>();
        let behavior = if self.silent.contains(&attempt) {
            ServerBehavior::Silent
        } else {
            self.behavior.clone()
        };
        tokio::spawn(serve(
            behavior,
            attempt,
            log,
            server_rx,
            server_tx,
        ));

        let sink = client_tx.sink_map_err(|_| WsError::ConnectionClosed);
        Ok(Transport::new(Box::pin(sink), Box::pin(client_rx)))
    }
}

async fn serve(
    behavior: ServerBehavior,
    attempt: usize,
    log: Arc<ConnectionLog>,
    mut inbound: mpsc::UnboundedReceiver<Message>,
    mut outbound: mpsc::UnboundedSender<Result<Message, WsError>>,
) {
    let mut authenticated = false;

    while let Some(msg) = inbound.next().await {
        log.push(Event::Received(msg.clone()));

        let request = match &msg {
            Message::Text(text) => decode_json(text.as_str()).ok(),
            Message::Close(_) => return,
            _ => None,
        };

        if matches!(behavior, ServerBehavior::HangUp) {
            return;
        }

        let mut replies = Vec::new();
        match (&behavior, request) {
            (ServerBehavior::Silent, _) => {}
            (_, Some(Request::InitialAuth)) => {
                let uuid = match &behavior {
                    ServerBehavior::FixedIdentity(uuid) => uuid.clone(),
                    _ => format!("USER-{attempt}"),
                };
                if matches!(behavior, ServerBehavior::NoisyAccept) {
                    replies.push("{definitely not json".to_string());
                    replies.push(r#"[{"responseType":"userCount","count":3}]"#.to_string());
                }
                replies.push(format!(
                    r#"[{{"responseType":"authSuccessful","uuid":"{uuid}","remainingTiles":60}}]"#
                ));
                authenticated = true;
            }
            (_, Some(Request::Auth { .. })) => {
                replies.push(r#"[{"responseType":"reAuthSuccessful","level":1}]"#.to_string());
                authenticated = true;
            }
            (_, Some(Request::AdminCmd { cmd: AdminAction::Shutdown, .. })) => return,
            (_, Some(Request::AdminCmd { cmd, .. })) => {
                replies.push(format!(
                    r#"[{{"responseType":"adminAck","action":"{}"}}]"#,
                    cmd.name()
                ));
            }
            (ServerBehavior::KickAfterFirstFrame, _) if authenticated => {
                replies.push(r#"{"rt":"kicked","message":"bye"}"#.to_string());
                send_all(&log, &mut outbound, replies).await;
                return;
            }
            _ => {}
        }

        send_all(&log, &mut outbound, replies).await;
    }
}

async fn send_all(
    log: &ConnectionLog,
    outbound: &mut mpsc::UnboundedSender<Result<Message, WsError>>,
    replies: Vec<String>,
) {
    for reply in replies {
        log.push(Event::Sent(reply.clone()));
        if outbound.send(Ok(Message::text(reply))).await.is_err() {
            return;
        }
    }
}
