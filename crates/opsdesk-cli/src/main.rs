use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opsdesk_cli::output::print_json;
use opsdesk_cli::players::default_player;
use opsdesk_cli::tracing_setup::init_tracing;
use opsdesk_cli::{run_watch, CliConfig};
use opsdesk_core::constants::paths;
use opsdesk_core::models::NotificationRecord;
use opsdesk_core::pull::{pull_data, HttpPullClient, PullRequest};
use opsdesk_core::views::catalog;
use opsdesk_core::{Identity, SyncSession, Topic};
use serde_json::json;

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(about = "Live sync client for the opsdesk HR/ops API")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (apiBaseUrl, pushAddr, authToken, identity, ...)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and keep notifications and views live; commands on stdin
    Watch {
        /// Identity joined on the push channel (defaults to config `identity`)
        #[arg(long, short = 'i')]
        identity: Option<String>,
    },

    /// Pull the notification list once
    Notifications,

    /// List push topics and the views they refresh
    Topics,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_tracing()?;
    let config = CliConfig::resolve(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::Watch { identity } => {
            let identity = identity
                .or(config.identity.clone())
                .context("No identity: pass --identity or set `identity` in the config file")?;
            runtime.block_on(watch(config, Identity::new(identity), cli.pretty))
        }
        Commands::Notifications => runtime.block_on(notifications(&config, cli.pretty)),
        Commands::Topics => {
            let topics: Vec<_> = Topic::ALL
                .iter()
                .map(|topic| {
                    let views: Vec<&str> = catalog::ALL
                        .iter()
                        .filter(|spec| spec.topics.contains(topic))
                        .map(|spec| spec.name)
                        .collect();
                    json!({
                        "topic": topic.as_str(),
                        "carriesPayload": topic.carries_payload(),
                        "refreshes": views,
                    })
                })
                .collect();
            print_json(&topics, cli.pretty)
        }
    }
}

async fn watch(config: CliConfig, identity: Identity, pretty: bool) -> Result<()> {
    let player = default_player(&config.sync);
    let session = SyncSession::from_config(config.sync, player)?;
    run_watch(&session, identity, pretty).await
}

async fn notifications(config: &CliConfig, pretty: bool) -> Result<()> {
    let client = HttpPullClient::from_config(&config.sync)?;
    let items: Vec<NotificationRecord> =
        pull_data(&client, PullRequest::get(paths::NOTIFICATIONS)).await?;
    print_json(
        &json!({
            "unread": NotificationRecord::unread_count(&items),
            "items": items,
        }),
        pretty,
    )
}
