use std::{future::Future, pin::Pin};

use futures::{Sink, Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, instrument};
use url::Url;

use crate::error::ClientError;

pub use tungstenite::Message;

pub type WsError = tungstenite::Error;
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// An open, split bidirectional message channel to the server.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens transports to an endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Url)
    -> impl Future<Output = Result<Transport, ClientError>> + Send;
}

/// Connects over real WebSockets (`ws://` or `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &Url) -> Result<Transport, ClientError> {
        let (socket, response) =
            connect_async(endpoint.as_str())
                .await
                .map_err(|e| ClientError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        debug!("WebSocket upgrade answered with {}", response.status());

        let (sink, stream) = socket.split();
        Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_connect_failed() {
        // Port 1 on loopback refuses connections on any sane test host.
        let url = Url::parse("ws://127.0.0.1:1/ws").unwrap();
        let err = match WsConnector.connect(&url).await {
            Ok(_) => panic!("connected to a closed port"),
            Err(e) => e,
        };
        assert!(matches!(err, ClientError::ConnectFailed { .. }));
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
