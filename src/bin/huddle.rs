//! Huddle CLI binary.
//!
//! Ephemeral session rendezvous and payload relay.
//!
//! # Commands
//!
//! - `server` - Start the relay server
//! - `create` - Create a session and relay stdin lines to its members
//! - `join` - Join a session and relay stdin lines to its members

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use huddle::{ClientConfig, Config, Server, ServerConfig, SessionClient, VERSION};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "huddle")]
#[command(version = VERSION)]
#[command(about = "Huddle - ephemeral session rendezvous and payload relay", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/huddle/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Server {
        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Bind to all interfaces (0.0.0.0)
        #[arg(long)]
        bind_all: bool,

        /// Seconds to keep an empty session alive (0 = destroy immediately)
        #[arg(long)]
        grace_secs: Option<u64>,
    },

    /// Create a session, print its id, then relay stdin lines
    Create {
        /// Server WebSocket URL
        #[arg(short, long)]
        url: Option<String>,

        /// Command timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Join an existing session, then relay stdin lines
    Join {
        /// Session id
        id: String,

        /// Server WebSocket URL
        #[arg(short, long)]
        url: Option<String>,

        /// Command timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_default()?,
    };
    let config = file_config.merge(Config::from_env());

    init_logging(cli.verbose || config.server.verbose, cli.json_logs);

    match cli.command {
        Commands::Server {
            port,
            host,
            bind_all,
            grace_secs,
        } => cmd_server(config, port, host, bind_all, grace_secs),
        Commands::Create { url, timeout_ms } => {
            cmd_relay(client_config(&config, url, timeout_ms), None)
        },
        Commands::Join {
            id,
            url,
            timeout_ms,
        } => cmd_relay(client_config(&config, url, timeout_ms), Some(id)),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // Logs go to stderr so stdout carries only session output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn client_config(config: &Config, url: Option<String>, timeout_ms: Option<u64>) -> ClientConfig {
    let mut client = ClientConfig::from_section(&config.client);
    if let Some(url) = url {
        client.url = url;
    }
    if let Some(ms) = timeout_ms {
        client.command_timeout = Duration::from_millis(ms);
    }
    client
}

fn cmd_server(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    bind_all: bool,
    grace_secs: Option<u64>,
) -> anyhow::Result<()> {
    let mut section = config.server;
    if let Some(port) = port {
        section.port = port;
    }
    if let Some(host) = host {
        section.host = host;
    }

    let mut server_config = ServerConfig::from_section(&section)?;
    if bind_all {
        server_config = server_config.bind_all();
    }
    if let Some(secs) = grace_secs {
        server_config = server_config.with_empty_session_grace(Duration::from_secs(secs));
    }

    tracing::info!("Starting Huddle server on {}", server_config.addr);
    if server_config.empty_session_grace.is_zero() {
        tracing::info!("Empty sessions: destroyed immediately");
    } else {
        tracing::info!(
            "Empty sessions: kept for {:?}",
            server_config.empty_session_grace
        );
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        Server::new(server_config)
            .run()
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    })
}

fn cmd_relay(config: ClientConfig, join: Option<String>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let client = SessionClient::connect_with(&config).await?;
        let mut relayed = client.messages();

        let id = match join {
            Some(id) => client.join_session(&id).await?,
            None => client.create_session().await?,
        };
        println!("{id}");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) if line.is_empty() => {},
                    Some(line) => client.send_message(&line).await?,
                    None => break,
                },
                frame = relayed.recv() => match frame {
                    Some(frame) => println!("{frame}"),
                    None => anyhow::bail!("connection closed by server"),
                },
            }
        }

        if client.current_session_id().is_some() {
            client.leave_session().await?;
        }
        client.disconnect();
        Ok::<_, anyhow::Error>(())
    })
}
