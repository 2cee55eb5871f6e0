//! One-shot privileged commands against a running server.

use std::{collections::HashMap, fs, io, path::Path};

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    constants::PLACEHOLDER_MARKER,
    envelope::{AdminAction, Request, encode_json},
    error::{ClientError, Result},
    identity::UserIdentity,
    socket::{Connector, Message},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCommand {
    /// Must hold admin rights; the server checks, the client does not.
    pub actor: UserIdentity,
    pub action: AdminAction,
}

impl AdminCommand {
    pub fn to_request(&self) -> Request {
        Request::AdminCmd {
            user_id: self.actor.clone(),
            cmd: self.action.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// The server's reply, verbatim.
    Replied(String),
    /// No reply after `shutdown`; the server went away as asked.
    ServerGone,
}

/// Sends `command`, reads exactly one reply and closes. No retries.
#[instrument(skip(connector, command), fields(action = command.action.name()))]
pub async fn send_admin_command<C: Connector>(
    connector: &C,
    endpoint: &Url,
    command: &AdminCommand,
) -> Result<AdminOutcome> {
    let mut transport = connector.connect(endpoint).await?;
    transport
        .sink
        .send(Message::text(encode_json(&command.to_request())))
        .await?;
    debug!("Sent admin command");

    let expects_hangup = command.action == AdminAction::Shutdown;
    let outcome = loop {
        match transport.stream.next().await {
            Some(Ok(Message::Text(text))) => break AdminOutcome::Replied(text.to_string()),
            Some(Ok(Message::Binary(data))) => {
                break AdminOutcome::Replied(String::from_utf8_lossy(&data).into_owned());
            }
            Some(Ok(Message::Close(_))) | None if expects_hangup => break AdminOutcome::ServerGone,
            Some(Err(e)) if expects_hangup => {
                debug!("Read after shutdown failed: {}", e);
                break AdminOutcome::ServerGone;
            }
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::TransportClosed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(_)) => continue,
        }
    };

    if let Err(e) = transport.sink.send(Message::Close(None)).await {
        debug!("Close frame not delivered: {}", e);
    }
    if let Err(e) = transport.sink.close().await {
        debug!("Transport close failed: {}", e);
    }
    info!("Admin command finished: {:?}", outcome);
    Ok(outcome)
}

/// Maps endpoint URLs to the admin identity to use there.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct CredentialStore {
    entries: HashMap<String, String>,
}

impl CredentialStore {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No credential file at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exact URL match first, then the `default` entry.
    pub fn lookup(&self, endpoint: &Url) -> Result<UserIdentity> {
        let raw = self
            .entries
            .iter()
            .find(|(key, _)| Url::parse(key).is_ok_and(|url| url == *endpoint))
            .map(|(_, value)| value)
            .or_else(|| self.entries.get("default"));

        match raw {
            Some(raw) => usable_identity(raw)
                .ok_or_else(|| ClientError::MissingCredential(endpoint.to_string())),
            None => Err(ClientError::MissingCredential(endpoint.to_string())),
        }
    }
}

/// Placeholder values shipped in sample credential files count as missing.
fn usable_identity(raw: &str) -> Option<UserIdentity> {
    if raw.contains(PLACEHOLDER_MARKER) {
        warn!("Credential {:?} is a placeholder, substitute a real admin uuid", raw);
        return None;
    }
    UserIdentity::new(raw).ok()
}

/// An explicit override wins over the store.
pub fn resolve_admin_identity(
    explicit: Option<&str>,
    store: &CredentialStore,
    endpoint: &Url,
) -> Result<UserIdentity> {
    match explicit {
        Some(raw) => {
            usable_identity(raw).ok_or_else(|| ClientError::MissingCredential(endpoint.to_string()))
        }
        None => store.lookup(endpoint),
    }
}
