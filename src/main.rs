use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use place_loadgen::{LoadArgs, SimulationController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or("info,place_loadgen=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LoadArgs::parse().into_config().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;
    info!(
        "Targeting {} with {} users ({:?} encoding)",
        config.endpoint,
        config.planned_sessions(),
        config.encoding
    );

    let report = SimulationController::new(config)?.run().await?;
    println!("{report}");
    Ok(())
}
