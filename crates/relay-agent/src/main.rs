//! # relay-agent
//!
//! Entry point for the webhook relay. `serve` runs the relay server;
//! `chat` runs a terminal chat client against a workflow webhook.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_client::{ChatClient, ClientConfig, ClientError, ReconnectingSubscriber};
use relay_core::{Message, SenderType};
use relay_server::metrics::install_recorder;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::RelaySettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

/// Time allowed for relay tasks to drain on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Webhook chat relay.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "Webhook chat relay")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// Payloads retained for late joiners.
        #[arg(long)]
        history_capacity: Option<usize>,
        /// Skip the Prometheus recorder.
        #[arg(long)]
        no_metrics: bool,
    },
    /// Chat with a workflow from the terminal.
    Chat {
        /// Workflow webhook URL. Read from the first input line when omitted.
        #[arg(long)]
        webhook_url: Option<String>,
        /// Relay push-channel URL.
        #[arg(long)]
        relay_url: Option<String>,
        /// Session identifier sent with each message.
        #[arg(long)]
        chat_id: Option<String>,
    },
}

/// Load layered settings, then apply global CLI flags.
fn load_settings(cli: &Cli) -> (RelaySettings, Option<relay_settings::SettingsError>) {
    let path = cli.settings.clone().unwrap_or_else(relay_settings::settings_path);
    let (mut settings, error) = match relay_settings::load_settings_from_path(&path) {
        Ok(settings) => (settings, None),
        Err(error) => (RelaySettings::default(), Some(error)),
    };
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    (settings, error)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut settings, settings_error) = load_settings(&cli);
    relay_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    if let Some(error) = settings_error {
        tracing::warn!(%error, "settings not loaded, using defaults");
    }

    match cli.command {
        Command::Serve {
            host,
            port,
            history_capacity,
            no_metrics,
        } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(capacity) = history_capacity {
                settings.server.history_capacity = capacity;
            }
            serve(ServerConfig::from(&settings.server), !no_metrics).await
        }
        Command::Chat {
            webhook_url,
            relay_url,
            chat_id,
        } => {
            if let Some(url) = relay_url {
                settings.client.relay_url = url;
            }
            if chat_id.is_some() {
                settings.client.chat_id = chat_id;
            }
            chat(ClientConfig::from(&settings.client), webhook_url).await
        }
    }
}

async fn serve(config: ServerConfig, with_metrics: bool) -> Result<()> {
    let metrics = if with_metrics {
        Some(install_recorder().context("Failed to install metrics recorder")?)
    } else {
        None
    };

    let mut server = RelayServer::new(config, metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        "relay listening on http://{addr} (ingestion at {})",
        relay_server::server::WEBHOOK_PATH
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let mut handles = vec![handle];
    handles.extend(server.take_broker_task());
    server
        .shutdown()
        .graceful_shutdown(handles, Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn chat(config: ClientConfig, webhook_url: Option<String>) -> Result<()> {
    let client = ChatClient::new(&config);
    let printer = spawn_printer(&client);
    let subscriber = ReconnectingSubscriber::spawn(
        config.relay_url.clone(),
        config.reconnect_delay,
        client.log().clone(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut webhook_url = webhook_url;
    if webhook_url.is_none() {
        println!("Workflow webhook URL:");
        webhook_url = lines.next_line().await.context("Failed to read stdin")?;
    }
    let Some(webhook_url) = webhook_url else {
        subscriber.shutdown().await;
        return Ok(());
    };
    report(client.connect(&webhook_url).await);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl-c")?;
                None
            }
        };
        let Some(line) = line else { break };
        match line.trim() {
            "/quit" => break,
            "/retry" => report(client.connect(&webhook_url).await),
            "" => {}
            text => {
                if let Err(error) = client.send(text).await {
                    println!("! {error}");
                }
            }
        }
    }

    subscriber.shutdown().await;
    printer.abort();
    Ok(())
}

fn report<T>(result: Result<T, ClientError>) {
    if let Err(error) = result {
        println!("! {error}");
    }
}

/// Print every message appended to the client's log.
fn spawn_printer(client: &ChatClient) -> tokio::task::JoinHandle<()> {
    let mut rx = client.log().subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => println!("{}", render(&message)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "printer lagged behind message log");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn render(message: &Message) -> String {
    let who = match message.sender {
        SenderType::User => "you",
        SenderType::Bot => "bot",
        SenderType::System => "system",
    };
    format!("[{}] {who}: {}", message.timestamp.format("%H:%M:%S"), message.text)
}
