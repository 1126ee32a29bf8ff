use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hostdesk_core::{DispatchEnvelope, HistoryTurn, InboundMessage};
use hostdesk_gateway::GatewayServer;

mod config;

use config::HostdeskConfig;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Parser)]
#[command(name = "hostdesk")]
#[command(version)]
#[command(about = "hostdesk: intent routing and lead scoring for an event venue's front desk")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// Classify and score a message without calling any agent
    Classify {
        /// The customer message
        message: String,
    },

    /// Dispatch a one-shot message and print the agent's answer
    Ask {
        /// The customer message
        message: String,

        /// Customer display name
        #[arg(long, default_value = "Customer")]
        name: String,

        /// Customer id (e.g. a WhatsApp jid)
        #[arg(long, default_value = "")]
        sender: String,

        /// Earlier turns, alternating customer/assistant, oldest first
        #[arg(long = "history")]
        history: Vec<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP gateway
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Classify { message } => cmd_classify(&cli.config, &message).await,
        Commands::Ask {
            message,
            name,
            sender,
            history,
            json,
        } => {
            let msg = InboundMessage::new(message)
                .with_sender(name, sender)
                .with_history(history_from_args(history));
            cmd_ask(&cli.config, &msg, json).await
        }
        Commands::Serve { port } => cmd_serve(&cli.config, port).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("hostdesk initialized at {}", config_dir.display());
    println!("Edit {} to configure your provider, agents and notifications.", config_path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = HostdeskConfig::load(config_path)?;
    println!("{:#?}", cfg);
    Ok(())
}

async fn cmd_classify(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = HostdeskConfig::load(config_path)?;
    let dispatcher = cfg.build_dispatcher()?;

    let (routing, lead) = dispatcher.route(&InboundMessage::new(message)).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "routing": routing,
            "lead": lead,
        }))?
    );
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &InboundMessage, json: bool) -> Result<()> {
    let cfg = HostdeskConfig::load(config_path)?;
    let dispatcher = cfg.build_dispatcher()?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let envelope = dispatcher.dispatch_with_cancel(message, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        print_envelope(&envelope);
    }
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let mut cfg = HostdeskConfig::load(config_path)?;
    if let Some(port) = port {
        cfg.gateway.port = port;
    }
    info!("Starting hostdesk gateway...");

    let dispatcher = Arc::new(cfg.build_dispatcher()?);
    let registry = dispatcher.registry();
    info!(
        "Agents: {}",
        registry
            .ids()
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let server = GatewayServer::new(
        cfg.gateway.socket_addr()?,
        dispatcher,
        cfg.gateway.auth_token.clone(),
    );
    let mut server_task = tokio::spawn(server.run(async move { shutdown.cancelled().await }));

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
        finished = &mut server_task => return gateway_outcome(finished),
    }

    gateway_outcome(server_task.await)
}

fn gateway_outcome(joined: Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Gateway error: {:#}", e);
            Err(e)
        }
        Err(e) => Err(e).context("Gateway task panicked"),
    }
}

fn print_envelope(envelope: &DispatchEnvelope) {
    println!("{}", envelope.primary_response.text);
    println!();
    println!(
        "→ {} ({:.2}{}): {}",
        envelope.routing.target_agent,
        envelope.routing.confidence,
        envelope
            .routing
            .action_tag
            .map(|a| format!(", {}", a))
            .unwrap_or_default(),
        envelope.routing.reasoning
    );
    println!(
        "→ lead {} (score {}){}",
        envelope.lead.tier,
        envelope.lead.score,
        if envelope.notified { ", venue notified" } else { "" }
    );
}

/// Alternate customer/assistant turns, starting with the customer
fn history_from_args(turns: Vec<String>) -> Vec<HistoryTurn> {
    turns
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            if i % 2 == 0 {
                HistoryTurn::user(content)
            } else {
                HistoryTurn::assistant(content)
            }
        })
        .collect()
}
