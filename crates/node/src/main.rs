//! Contest node
//!
//! Command-line front end for a team's client:
//! - `keygen` creates the team key pair
//! - `new` / `join` start tracking a game
//! - `sync`, `send`, `next`, `ping`, `time` act once on the saved game
//! - `play` follows the game until Ctrl+C, sending commands as rounds advance

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tc_api::{ApiClient, ApiConfig, PingOutcome};
use tc_block_store::{BlockStore, StoreConfig};
use tc_client::{Client, ClientEvent, JsonFileSnapshot};
use tc_message::KeyPair;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::NodeConfig;

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Generate the team key pair
    Keygen,
    /// Create a new game from the configured protocol and parameters
    New,
    /// Join an existing game
    Join {
        /// Game key
        key: String,
    },
    /// Refetch the saved game and its new blocks
    Sync,
    /// Send every bot's commands for the current round
    Send,
    /// Close the current round
    Next,
    /// Ping every node playing the game
    Ping,
    /// Compare the local clock with the server's
    Time,
    /// Follow the game until interrupted
    Play,
}

/// Turn-based contest node
#[derive(Parser, Debug)]
#[command(name = "tc-node")]
#[command(about = "Team node for turn-based contests", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "node.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NodeConfig::load(&args.config)?;
    if let Cmd::Keygen = args.command {
        KeyPair::generate()
            .write(&config.signing)
            .with_context(|| format!("writing key pair {:?}", config.signing))?;
        return Ok(());
    }

    let client = build_client(&config)?;
    match args.command {
        Cmd::Keygen => {}
        Cmd::New => {
            let protocol = config.protocol_source()?;
            let game = client.new_game(&protocol, &config.new_game_params).await?;
            tracing::info!("Game key: {}", game.key);
        }
        Cmd::Join { key } => {
            let game = client.join_game(&key).await?;
            tracing::info!("Joined {} at round {}", game.key, game.current_round);
        }
        Cmd::Sync => {
            resume(&client).await?;
        }
        Cmd::Send => {
            resume(&client).await?;
            let round = client.send_commands().await?;
            tracing::info!("Commands accepted for round {}", round);
        }
        Cmd::Next => {
            resume(&client).await?;
            client.end_of_round().await?;
        }
        Cmd::Ping => {
            resume(&client).await?;
            match client.ping().await? {
                PingOutcome::AllResponsive => tracing::info!("All nodes answered"),
                PingOutcome::SomeUnresponsive => tracing::warn!("Some nodes did not answer"),
            }
        }
        Cmd::Time => {
            let stats = client.time_stats().await?;
            tracing::info!("Local time:  {}", stats.local);
            tracing::info!("Server time: {}", stats.server);
            tracing::info!("Latency: {}ms", stats.latency.num_milliseconds());
            tracing::info!("Delta: {}ms", stats.delta.num_milliseconds());
        }
        Cmd::Play => play(client).await?,
    }
    Ok(())
}

fn build_client(config: &NodeConfig) -> Result<Arc<Client>> {
    let keys = KeyPair::read(&config.signing)
        .with_context(|| format!("reading key pair {:?}; run `tc-node keygen` first", config.signing))?;
    let api = ApiClient::new(ApiConfig::new(&config.api_base(), &config.api_key), Some(&keys))?;
    let store = BlockStore::open(StoreConfig::new(&config.store_base(), config.store_dir.clone()))?;

    Ok(Client::builder(config.client_config(), api, store)
        .snapshot(Arc::new(JsonFileSnapshot::new(config.snapshot.clone())))
        .build())
}

/// Load the saved game and bring it up to date
async fn resume(client: &Client) -> Result<u64> {
    if !client.restore().await? {
        anyhow::bail!("no saved game; run `tc-node new` or `tc-node join <key>` first");
    }
    let round = client.sync_game().await?;
    tracing::info!("Game is at round {}", round);
    Ok(round)
}

async fn play(client: Arc<Client>) -> Result<()> {
    let mut events = client
        .take_events()
        .context("client events already taken")?;
    client.start().await?;
    if client.game().await.is_none() {
        client.stop();
        anyhow::bail!("no saved game; run `tc-node new` or `tc-node join <key>` first");
    }
    if client.catch_up() {
        tracing::info!("Sending commands for the current round");
    }

    tracing::info!("Following the game. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::NewBlock { hash }) => tracing::info!("New block {}", hash),
                Some(ClientEvent::RoundSynced { round, last_block }) => {
                    tracing::info!("Round {} (block {})", round, last_block)
                }
                Some(ClientEvent::Pinged { payload }) => tracing::debug!("Answered ping {}", payload),
                Some(ClientEvent::GameEnded) => {
                    tracing::info!("Game over");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    client.stop();
    tracing::info!("Node stopped");
    Ok(())
}
