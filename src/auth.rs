use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    envelope::{Reply, ReplyKind, Request, decode_reply, encode_json},
    error::{ClientError, Result},
    identity::UserIdentity,
    protocol::classify_binary_reply,
    socket::{Message, Transport},
};

/// How a session obtains its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Ask the server for a fresh identity.
    Initial,
    /// Present an identity the server issued earlier.
    Reauth(UserIdentity),
}

/// Runs `fut`, turning expiry into `HandshakeTimeout`. `None` waits forever.
pub async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| ClientError::HandshakeTimeout { duration })?,
        None => fut.await,
    }
}

pub async fn authenticate(transport: &mut Transport, mode: &AuthMode) -> Result<UserIdentity> {
    match mode {
        AuthMode::Initial => initial_auth(transport).await,
        AuthMode::Reauth(identity) => {
            reauth(transport, identity).await?;
            Ok(identity.clone())
        }
    }
}

/// Sends `initialAuth` and waits for an `authSuccessful` reply, skipping
/// everything else the server pushes in the meantime.
pub async fn initial_auth(transport: &mut Transport) -> Result<UserIdentity> {
    send_request(transport, &Request::InitialAuth).await?;

    loop {
        let reply = match next_reply(transport).await? {
            Some(reply) => reply,
            None => continue,
        };

        if reply.kind != ReplyKind::AuthSuccessful {
            debug!("Skipping {} reply while waiting for auth", reply.rt);
            continue;
        }

        match reply.uuid().map(UserIdentity::new) {
            Some(Ok(identity)) => {
                info!("Got user {}", identity);
                return Ok(identity);
            }
            _ => warn!("authSuccessful reply without a usable uuid, still waiting"),
        }
    }
}

/// Sends `auth` with a known identity and consumes the one reply that
/// follows without requiring it to be a success.
pub async fn reauth(transport: &mut Transport, identity: &UserIdentity) -> Result<()> {
    send_request(
        transport,
        &Request::Auth {
            user_id: identity.clone(),
        },
    )
    .await?;

    match transport.stream.next().await {
        Some(Ok(Message::Close(_))) | None => Err(ClientError::AuthRejected(
            "connection closed before the auth reply".to_string(),
        )),
        Some(Err(e)) => Err(ClientError::AuthRejected(e.to_string())),
        Some(Ok(msg)) => {
            if let Message::Text(text) = &msg {
                match decode_reply(text.as_str()) {
                    Ok(reply) if reply.kind == ReplyKind::Error => warn!(
                        "Server answered re-auth with an error: {}",
                        reply.error_message().unwrap_or("unspecified")
                    ),
                    Ok(reply) => debug!("Re-auth answered with {}", reply.rt),
                    Err(e) => warn!("Unreadable re-auth reply: {}", e),
                }
            }
            info!("Re-authenticated as {}", identity);
            Ok(())
        }
    }
}

async fn send_request(transport: &mut Transport, request: &Request) -> Result<()> {
    transport
        .sink
        .send(Message::text(encode_json(request)))
        .await
        .map_err(|e| ClientError::AuthRejected(format!("failed to send {}: {e}", request.request_type())))
}

/// Reads one frame. `Ok(None)` means the frame was not a usable reply.
async fn next_reply(transport: &mut Transport) -> Result<Option<Reply>> {
    match transport.stream.next().await {
        Some(Ok(Message::Text(text))) => match decode_reply(text.as_str()) {
            Ok(reply) => Ok(Some(reply)),
            Err(e) => {
                warn!("Discarding reply during handshake: {}", e);
                Ok(None)
            }
        },
        Some(Ok(Message::Binary(data))) => {
            debug!(
                "Ignoring {} binary frame during handshake",
                classify_binary_reply(&data).unwrap_or("empty")
            );
            Ok(None)
        }
        Some(Ok(Message::Close(_))) | None => Err(ClientError::AuthRejected(
            "Didn't get reply. Perhaps kicked?".to_string(),
        )),
        Some(Ok(_)) => Ok(None),
        Some(Err(e)) => Err(ClientError::AuthRejected(e.to_string())),
    }
}
