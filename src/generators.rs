//! Per-session background traffic: random pixel placements and periodic
//! canvas refreshes. Neither generator reads replies.

use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace};

use crate::{
    config::{DelayRange, PixelPattern, SimulationConfig},
    message::SessionStats,
    payload::PayloadEncoder,
    protocol::PixelUpdate,
    session::FrameSender,
    socket::Message,
    utils::{Sweep, random_delay, random_pixel},
};

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Sleeps for a random delay unless cancelled first. Returns false on cancel.
async fn pause(rng: &mut StdRng, range: &DelayRange, cancel: &CancellationToken) -> bool {
    let delay = random_delay(rng, range);
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(delay) => true,
    }
}

/// Queues `msg` unless cancelled first. Returns false when the generator
/// should stop.
async fn emit(sender: &FrameSender, msg: Message, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        result = sender.send(msg) => match result {
            Ok(()) => true,
            Err(e) => {
                debug!("Stopping generator: {}", e);
                false
            }
        },
    }
}

enum PixelSource {
    Random { edge: i16, y_min: i16 },
    Sweep(Sweep),
}

pub struct PixelGenerator {
    session: usize,
    encoder: PayloadEncoder,
    delay: DelayRange,
    source: PixelSource,
    rng: StdRng,
}

impl PixelGenerator {
    pub fn new(
        session: usize,
        encoder: PayloadEncoder,
        config: &SimulationConfig,
        seed: Option<u64>,
    ) -> Self {
        let source = match config.pattern {
            PixelPattern::Random => PixelSource::Random {
                edge: config.edge,
                y_min: config.y_min,
            },
            PixelPattern::Sweep => PixelSource::Sweep(Sweep::new(config.edge)),
        };
        Self {
            session,
            encoder,
            delay: config.pixel_delay,
            source,
            rng: make_rng(seed),
        }
    }

    fn next_update(&mut self) -> Option<PixelUpdate> {
        match &mut self.source {
            PixelSource::Random { edge, y_min } => Some(random_pixel(&mut self.rng, *edge, *y_min)),
            PixelSource::Sweep(sweep) => sweep.next(),
        }
    }

    #[instrument(skip_all, fields(session = self.session, user = %self.encoder.identity()))]
    pub async fn run(
        mut self,
        sender: FrameSender,
        stats: Arc<SessionStats>,
        cancel: CancellationToken,
    ) {
        debug!("Pixel generator started");

        while pause(&mut self.rng, &self.delay, &cancel).await {
            let Some(update) = self.next_update() else {
                break;
            };
            let msg = match self.encoder.pixel(&update) {
                Ok(msg) => msg,
                Err(e) => {
                    error!("Refusing to send pixel {:?}: {}", update, e);
                    break;
                }
            };
            if !emit(&sender, msg, &cancel).await {
                break;
            }
            stats.record_pixel();
            trace!("Placed ({}, {}) colour {}", update.x, update.y, update.color_id);
        }

        debug!("Pixel generator stopped");
    }
}

pub struct CanvasRefreshGenerator {
    session: usize,
    encoder: PayloadEncoder,
    delay: DelayRange,
    rng: StdRng,
}

impl CanvasRefreshGenerator {
    pub fn new(
        session: usize,
        encoder: PayloadEncoder,
        delay: DelayRange,
        seed: Option<u64>,
    ) -> Self {
        Self {
            session,
            encoder,
            delay,
            rng: make_rng(seed),
        }
    }

    #[instrument(skip_all, fields(session = self.session, user = %self.encoder.identity()))]
    pub async fn run(
        mut self,
        sender: FrameSender,
        stats: Arc<SessionStats>,
        cancel: CancellationToken,
    ) {
        debug!("Canvas refresh generator started");

        while pause(&mut self.rng, &self.delay, &cancel).await {
            if !emit(&sender, self.encoder.canvas_query(), &cancel).await {
                break;
            }
            stats.record_canvas_query();
            trace!("Requested canvas");
        }

        debug!("Canvas refresh generator stopped");
    }
}
