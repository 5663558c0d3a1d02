//! bus-tap command line entry point.
//!
//! Subscribes to events or actions on the message bus and prints each
//! record as it arrives.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use bus_tap::config::ClientConfig;
use bus_tap::domain::{EntityKind, NameFilter, SubscriptionTarget};
use bus_tap::sink::PrintSink;
use bus_tap::{BusClient, TransportKind};

/// bus-tap - message bus subscription client
#[derive(Parser, Debug)]
#[command(name = "bus-tap")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Root url of the gateway (host:port)
    #[arg(short = 'u', long)]
    root_url: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Subscribe to events/actions in the message bus
    #[command(subcommand)]
    Subscribe(SubscribeCommands),
}

#[derive(Subcommand, Debug)]
enum SubscribeCommands {
    /// Subscribe to events
    Events(EntityArgs),

    /// Subscribe to actions
    Actions(EntityArgs),

    /// Subscribe to all entities via socketio
    Socketio {
        /// Socket.IO namespace
        #[arg(long, default_value = "/")]
        namespace: String,
    },
}

#[derive(Args, Debug)]
struct EntityArgs {
    /// Source id
    #[arg(short, long)]
    source_id: String,

    /// Names to subscribe to (separated by comma) - applicable for 'websocket' only
    #[arg(short, long)]
    names: Option<String>,

    /// Subscribe type
    #[arg(short, long, value_enum, default_value_t = TransportArg::Websocket)]
    transport: TransportArg,

    /// Message buffer size in bytes - applicable for 'websocket' only
    #[arg(short = 'm', long)]
    message_buffer_size: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TransportArg {
    Websocket,
    Socketio,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Websocket => Self::WebSocket,
            TransportArg::Socketio => Self::SocketIo,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let mut config = ClientConfig::from_env().context("failed to load configuration")?;
    if let Some(root_url) = cli.root_url {
        config.root_url = root_url;
    }
    let client = BusClient::new(config).context("invalid bus address")?;
    tracing::info!(host = client.endpoint().host(), "message bus resolved");

    match cli.command {
        Commands::Subscribe(SubscribeCommands::Events(args)) => {
            subscribe_entity(&client, EntityKind::Event, args).await
        }
        Commands::Subscribe(SubscribeCommands::Actions(args)) => {
            subscribe_entity(&client, EntityKind::Action, args).await
        }
        Commands::Subscribe(SubscribeCommands::Socketio { namespace }) => client
            .subscribe_multiplexed(&namespace, PrintSink::stdout())
            .await
            .context("socketio subscription ended"),
    }
}

async fn subscribe_entity(client: &BusClient, kind: EntityKind, args: EntityArgs) -> Result<()> {
    let buffer_size = args
        .message_buffer_size
        .unwrap_or_else(ClientConfig::message_buffer_size_from_env);
    let names = args.names.as_deref().and_then(NameFilter::parse);
    let target = SubscriptionTarget::new(kind, args.source_id, names, buffer_size)
        .context("invalid subscription")?;

    client
        .subscribe(&target, args.transport.into(), PrintSink::stdout())
        .await
        .with_context(|| format!("{kind} subscription ended"))
}
