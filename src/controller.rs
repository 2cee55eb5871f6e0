use std::{collections::HashSet, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::AuthMode,
    config::SimulationConfig,
    error::{ClientError, Result},
    identity::UserIdentity,
    message::StatsSnapshot,
    session::Session,
    socket::{Connector, WsConnector},
};

/// Outcome of bringing sessions up.
#[derive(Debug, Default)]
pub struct BringUp {
    pub sessions: Vec<Session>,
    pub connect_failed: usize,
    pub auth_rejected: usize,
    seen: HashSet<UserIdentity>,
}

impl BringUp {
    /// Files one finished handshake attempt. Returns the session when it
    /// joined the active set.
    async fn admit(&mut self, index: usize, result: Result<Session>) -> Option<&mut Session> {
        match result {
            Ok(session) if self.seen.insert(session.identity().clone()) => {
                self.sessions.push(session);
                self.sessions.last_mut()
            }
            Ok(session) => {
                warn!(
                    "Session {} was issued duplicate identity {}, dropping it",
                    index,
                    session.identity()
                );
                self.auth_rejected += 1;
                session.shutdown().await;
                None
            }
            Err(e @ ClientError::ConnectFailed { .. }) => {
                warn!("Session {}: {}", index, e);
                self.connect_failed += 1;
                None
            }
            Err(e) => {
                warn!("Session {} rejected: {}", index, e);
                self.auth_rejected += 1;
                None
            }
        }
    }
}

type Attempts = JoinSet<(usize, Result<Session>)>;

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub requested: usize,
    pub active: usize,
    pub connect_failed: usize,
    pub auth_rejected: usize,
    pub identities: Vec<UserIdentity>,
    pub totals: StatsSnapshot,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} of {} users active ({} connect failures, {} rejected)",
            self.active, self.requested, self.connect_failed, self.auth_rejected
        )?;
        writeln!(
            f,
            "sent {} frames: {} pixels, {} canvas requests",
            self.totals.frames_sent, self.totals.pixels_sent, self.totals.canvas_queries_sent
        )?;
        writeln!(
            f,
            "received {} replies: {} errors, {} malformed",
            self.totals.replies, self.totals.server_errors, self.totals.malformed_replies
        )?;
        write!(
            f,
            "ran from {} to {} ({:.1}s)",
            self.started_at.format("%H:%M:%S"),
            self.finished_at.format("%H:%M:%S"),
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        )
    }
}

/// Owns every session of a run from bring-up to shutdown.
pub struct SimulationController<C: Connector = WsConnector> {
    config: Arc<SimulationConfig>,
    connector: Arc<C>,
    cancel: CancellationToken,
}

impl SimulationController<WsConnector> {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_connector(config, WsConnector)
    }
}

impl<C: Connector> SimulationController<C> {
    pub fn with_connector(config: SimulationConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling this token ends the run early.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn auth_modes(&self) -> Vec<AuthMode> {
        if self.config.identities.is_empty() {
            vec![AuthMode::Initial; self.config.user_count]
        } else {
            self.config
                .identities
                .iter()
                .cloned()
                .map(AuthMode::Reauth)
                .collect()
        }
    }

    /// One task per planned session, each running its own handshake.
    fn spawn_attempts(&self) -> Attempts {
        let mut attempts = JoinSet::new();
        for (index, mode) in self.auth_modes().into_iter().enumerate() {
            let connector = Arc::clone(&self.connector);
            let config = Arc::clone(&self.config);
            let cancel = self.cancel.clone();
            attempts.spawn(async move {
                let result =
                    Session::establish(connector.as_ref(), &config, index, mode, &cancel).await;
                (index, result)
            });
        }
        attempts
    }

    /// Attempts every planned session concurrently and waits for all of them.
    /// Failed attempts are counted, never replaced.
    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    pub async fn establish_sessions(&self) -> BringUp {
        let mut attempts = self.spawn_attempts();
        let mut bring_up = BringUp::default();
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((index, result)) => {
                    bring_up.admit(index, result).await;
                }
                Err(e) => error!("Handshake task panicked: {}", e),
            }
        }
        bring_up.sessions.sort_by_key(Session::index);
        bring_up
    }

    /// Handshakes still running when the run ends are abandoned and count as
    /// rejected.
    async fn abandon(&self, mut attempts: Attempts, bring_up: &mut BringUp) {
        if attempts.is_empty() {
            return;
        }
        warn!("Abandoning {} unfinished handshakes", attempts.len());
        attempts.abort_all();
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((index, result)) => {
                    bring_up.admit(index, result).await;
                }
                Err(e) if e.is_cancelled() => bring_up.auth_rejected += 1,
                Err(e) => error!("Handshake task panicked: {}", e),
            }
        }
    }

    async fn wait_for_end(&self) {
        match self.config.run_for {
            Some(duration) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => info!("Run cancelled"),
                    _ = tokio::time::sleep(duration) => info!("Run time of {:?} elapsed", duration),
                }
            }
            None => {
                tokio::select! {
                    _ = self.cancel.cancelled() => info!("Run cancelled"),
                    result = tokio::signal::ctrl_c() => match result {
                        Ok(()) => info!("Interrupted, shutting down"),
                        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                    },
                }
            }
        }
    }

    /// Runs the whole simulation and reports what happened.
    pub async fn run(self) -> Result<SimulationReport> {
        let started_at = Utc::now();
        let requested = self.config.planned_sessions();
        info!(
            "Starting {} simulated users against {}",
            requested, self.config.endpoint
        );

        // Sessions start generating as soon as they authenticate; a stuck
        // handshake only holds up its own session.
        let mut attempts = self.spawn_attempts();
        let mut bring_up = BringUp::default();
        let run_end = self.wait_for_end();
        tokio::pin!(run_end);

        loop {
            tokio::select! {
                _ = &mut run_end => break,
                Some(joined) = attempts.join_next(), if !attempts.is_empty() => {
                    match joined {
                        Ok((index, result)) => {
                            if let Some(session) = bring_up.admit(index, result).await {
                                if let Err(e) = session.spawn_generators(&self.config) {
                                    warn!("Could not start generators for session {}: {}", index, e);
                                }
                            }
                        }
                        Err(e) => error!("Handshake task panicked: {}", e),
                    }
                    if attempts.is_empty() {
                        info!("{} of {} users authenticated", bring_up.sessions.len(), requested);
                    }
                }
            }
        }
        self.cancel.cancel();
        self.abandon(attempts, &mut bring_up).await;

        let BringUp {
            mut sessions,
            connect_failed,
            auth_rejected,
            ..
        } = bring_up;
        sessions.sort_by_key(Session::index);
        let identities: Vec<UserIdentity> =
            sessions.iter().map(|s| s.identity().clone()).collect();

        let active = sessions.len();
        let mut totals = StatsSnapshot::default();
        for stats in join_all(sessions.into_iter().map(Session::shutdown)).await {
            totals += stats;
        }

        let report = SimulationReport {
            requested,
            active,
            connect_failed,
            auth_rejected,
            identities,
            totals,
            started_at,
            finished_at: Utc::now(),
        };
        info!("Simulation finished: {} pixels sent", report.totals.pixels_sent);
        Ok(report)
    }
}
