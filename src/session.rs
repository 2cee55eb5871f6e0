use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{AuthMode, authenticate, with_timeout},
    config::SimulationConfig,
    constants::{OUTBOUND_QUEUE_CAP, WRITER_FLUSH_TIMEOUT},
    error::{ClientError, Result},
    generators::{CanvasRefreshGenerator, PixelGenerator},
    identity::UserIdentity,
    message::{FrameWriter, ReplyReader, SessionStats, StatsSnapshot},
    payload::PayloadEncoder,
    socket::{Connector, Message, Transport},
    state::{SessionState, StateCell},
};

/// Cloneable handle generators use to queue frames for the session writer.
/// Refuses to queue anything unless the session is active.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Message>,
    state: watch::Receiver<SessionState>,
}

impl FrameSender {
    pub fn new(tx: mpsc::Sender<Message>, state: watch::Receiver<SessionState>) -> Self {
        Self { tx, state }
    }

    pub async fn send(&self, msg: Message) -> Result<()> {
        let state = *self.state.borrow();
        if state != SessionState::Active {
            return Err(ClientError::NotActive(state));
        }
        self.tx
            .send(msg)
            .await
            .map_err(|_| ClientError::TransportClosed)
    }
}

/// One authenticated connection and everything running on its behalf.
#[derive(Debug)]
pub struct Session {
    index: usize,
    identity: UserIdentity,
    state: StateCell,
    sender: Option<FrameSender>,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
    writer: JoinHandle<Result<()>>,
    reader: JoinHandle<()>,
    generators: Vec<JoinHandle<()>>,
}

impl Session {
    /// Connects, authenticates and starts the session's writer and reader.
    /// The returned session is active; on error the attempt is abandoned.
    #[instrument(
        skip(connector, config, mode, parent),
        fields(connection_id = %Uuid::new_v4())
    )]
    pub async fn establish<C: Connector>(
        connector: &C,
        config: &SimulationConfig,
        index: usize,
        mode: AuthMode,
        parent: &CancellationToken,
    ) -> Result<Session> {
        debug!("Opening connection to {}", config.endpoint);

        let state = StateCell::new();
        let mut transport = match connector.connect(&config.endpoint).await {
            Ok(transport) => transport,
            Err(e) => {
                state.close();
                return Err(e);
            }
        };

        state.advance(SessionState::Authenticating)?;
        let identity =
            match with_timeout(config.handshake_timeout, authenticate(&mut transport, &mode)).await
            {
                Ok(identity) => identity,
                Err(e) => {
                    state.close();
                    return Err(e);
                }
            };
        state.advance(SessionState::Active)?;

        Ok(Session::start(
            index,
            identity,
            state,
            transport,
            parent.child_token(),
        ))
    }

    fn start(
        index: usize,
        identity: UserIdentity,
        state: StateCell,
        transport: Transport,
        cancel: CancellationToken,
    ) -> Self {
        let stats = Arc::new(SessionStats::default());
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAP);
        let Transport { sink, stream } = transport;

        let writer = tokio::spawn(FrameWriter::new(index, Arc::clone(&stats)).run(
            rx,
            sink,
            cancel.clone(),
        ));
        let reader = tokio::spawn(ReplyReader::new(index, Arc::clone(&stats)).run(
            stream,
            state.clone(),
            cancel.clone(),
        ));

        info!("Session {} active as {}", index, identity);
        Self {
            index,
            identity,
            sender: Some(FrameSender::new(tx, state.subscribe())),
            state,
            stats,
            cancel,
            writer,
            reader,
            generators: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn sender(&self) -> Result<FrameSender> {
        self.sender.clone().ok_or(ClientError::NotActive(self.state()))
    }

    /// Starts the pixel generator and, unless disabled, the canvas refresher.
    pub fn spawn_generators(&mut self, config: &SimulationConfig) -> Result<()> {
        let sender = self.sender()?;
        let encoder = PayloadEncoder::new(self.identity.clone(), config.encoding, config.codec());
        let seed = config.seed.map(|s| s.wrapping_add(self.index as u64));

        let pixels = PixelGenerator::new(self.index, encoder.clone(), config, seed);
        self.generators.push(tokio::spawn(pixels.run(
            sender.clone(),
            Arc::clone(&self.stats),
            self.cancel.clone(),
        )));

        if config.canvas_refresh {
            let canvas = CanvasRefreshGenerator::new(
                self.index,
                encoder,
                config.canvas_delay,
                seed.map(|s| !s),
            );
            self.generators.push(tokio::spawn(canvas.run(
                sender,
                Arc::clone(&self.stats),
                self.cancel.clone(),
            )));
        }

        debug!(
            "Booted {} generators for {}",
            self.generators.len(),
            self.identity
        );
        Ok(())
    }

    /// Stops generators, lets the writer flush and close the transport, and
    /// returns the session's final counters.
    #[instrument(skip(self), fields(session = self.index))]
    pub async fn shutdown(mut self) -> StatsSnapshot {
        self.cancel.cancel();

        for handle in self.generators.drain(..) {
            if let Err(e) = handle.await {
                error!("Generator task panicked: {}", e);
            }
        }

        // Last sender gone: the writer drains its queue and sends Close,
        // unless the server has stopped reading.
        self.sender.take();
        match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut self.writer).await {
            Ok(Ok(Ok(()))) => debug!("Writer finished cleanly"),
            Ok(Ok(Err(e))) => warn!("Writer ended with error: {}", e),
            Ok(Err(e)) => error!("Writer task panicked: {}", e),
            Err(_) => {
                warn!(
                    "Transport stalled, abandoning writer after {:?}",
                    WRITER_FLUSH_TIMEOUT
                );
                self.writer.abort();
            }
        }
        if let Err(e) = self.reader.await {
            error!("Reader task panicked: {}", e);
        }

        self.state.close();
        self.stats.snapshot()
    }
}
