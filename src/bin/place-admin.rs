use std::{path::PathBuf, process};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use place_loadgen::{
    UserIdentity,
    admin::{
        AdminCommand, AdminOutcome, CredentialStore, resolve_admin_identity, send_admin_command,
    },
    envelope::AdminAction,
    socket::WsConnector,
};

#[derive(Debug, Parser)]
#[command(name = "place-admin")]
#[command(about = "Send a privileged command to a place canvas server")]
struct Cli {
    /// JSON file mapping endpoint URLs to admin uuids
    #[arg(
        long,
        global = true,
        env = "PLACE_ADMIN_CREDENTIALS",
        default_value = "admin_credentials.json"
    )]
    credentials: PathBuf,

    /// Admin uuid; overrides the credential file
    #[arg(long, global = true, env = "PLACE_ADMIN_UUID", hide_env_values = true)]
    uuid: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Broadcast a message to every connected user
    Announce { endpoint: Url, message: String },
    /// Toggle the shadowban on a user
    Ban { endpoint: Url, target: UserIdentity },
    /// Ask the server to shut down
    Shutdown { endpoint: Url },
}

impl Command {
    fn into_parts(self) -> (Url, AdminAction) {
        match self {
            Command::Announce { endpoint, message } => (endpoint, AdminAction::Message { message }),
            Command::Ban { endpoint, target } => {
                (endpoint, AdminAction::ToggleShadowban { target })
            }
            Command::Shutdown { endpoint } => (endpoint, AdminAction::Shutdown),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or("info,place_loadgen=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Usage problems are not failures: print help and exit cleanly.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            e.print()?;
            process::exit(0);
        }
        Err(e) => e.exit(),
    };

    let (endpoint, action) = cli.command.into_parts();
    let actor = match CredentialStore::load(&cli.credentials)
        .and_then(|store| resolve_admin_identity(cli.uuid.as_deref(), &store, &endpoint))
    {
        Ok(actor) => actor,
        Err(e) => {
            error!("{}", e);
            eprintln!(
                "No admin uuid for {endpoint}. Set PLACE_ADMIN_UUID or add it to {}",
                cli.credentials.display()
            );
            process::exit(-1);
        }
    };

    info!("Sending {} to {}", action.name(), endpoint);
    let command = AdminCommand { actor, action };
    match send_admin_command(&WsConnector, &endpoint, &command).await? {
        AdminOutcome::Replied(reply) => println!("Received '{reply}'"),
        AdminOutcome::ServerGone => println!("Server closed the connection"),
    }
    Ok(())
}
