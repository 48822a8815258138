use anyhow::{anyhow, bail, Context};
use carla_remote::protocol::{ConnectionId, CorrelationId, ParamId, PluginId};
use carla_remote::{ClientConfig, ClientEvent, ConnectionStatus, RemoteClient, WsTransport};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{timeout_at, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "carla-remote", about = "Inspect and drive a remote audio host")]
struct Args {
    /// Host to connect to (default: $CARLA_REMOTE_HOST or 127.0.0.1).
    #[arg(long)]
    host: Option<String>,

    /// Port to connect to (default: $CARLA_REMOTE_PORT or 22752).
    #[arg(long)]
    port: Option<u16>,

    /// OSC path of the host instance used for per-plugin messages.
    #[arg(long)]
    target: Option<String>,

    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the synchronized state as JSON.
    Snapshot,
    AddPlugin {
        identifier: String,
    },
    RemovePlugin {
        plugin: u32,
    },
    Connect {
        source_plugin: u32,
        source_port: u32,
        target_plugin: u32,
        target_port: u32,
    },
    Disconnect {
        /// Connection id, e.g. `1:0>2:0`.
        connection: String,
    },
    SetParam {
        plugin: u32,
        param: u32,
        value: f32,
    },
    /// Print client events as JSON lines until the time is up or the host goes away.
    Watch {
        #[arg(long, default_value_t = 10_000)]
        for_ms: u64,
    },
}

type Client = RemoteClient<WsTransport>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::from_env().context("reading environment")?;
    if let Some(host) = args.host.clone() {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(target) = args.target.as_deref() {
        config.target_name = target.trim_matches('/').to_string();
    }
    let url = config.ws_url()?;
    let wait = Duration::from_millis(args.timeout_ms);

    let mut client = RemoteClient::new(config, WsTransport::new());
    let mut observer = client.subscribe();

    eprintln!("connecting to {url}");
    client.connect();
    settle(&mut client, wait).await.context("handshake")?;
    eprintln!(
        "connected: {} plugin(s), {} connection(s)",
        client.store().plugins().count(),
        client.store().connections().count()
    );

    let issued = match args.cmd {
        Cmd::Snapshot => None,
        Cmd::AddPlugin { identifier } => Some(client.add_plugin(&identifier)?),
        Cmd::RemovePlugin { plugin } => Some(client.remove_plugin(PluginId(plugin))?),
        Cmd::Connect {
            source_plugin,
            source_port,
            target_plugin,
            target_port,
        } => Some(client.connect_ports(source_plugin, source_port, target_plugin, target_port)?),
        Cmd::Disconnect { connection } => {
            Some(client.disconnect_ports(&ConnectionId::raw(connection.trim()))?)
        }
        Cmd::SetParam {
            plugin,
            param,
            value,
        } => Some(client.set_parameter_value(PluginId(plugin), ParamId(param), value)?),
        Cmd::Watch { for_ms } => {
            watch(&mut client, &mut observer, Duration::from_millis(for_ms)).await?;
            None
        }
    };

    if let Some(id) = issued {
        settle(&mut client, wait).await.context("waiting for response")?;
        match outcome(&mut observer, id) {
            Some(Ok(())) => eprintln!("{id} confirmed"),
            Some(Err(error)) => bail!("host rejected {id}: {error}"),
            None => bail!("no response for {id}"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&client.store().snapshot())?);
    client.disconnect();
    Ok(())
}

/// Pumps until connected with nothing pending.
async fn settle(client: &mut Client, wait: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + wait;
    while !(client.status().is_connected() && client.pending() == 0) {
        if let ConnectionStatus::Error(reason) = client.status() {
            bail!("connection failed: {reason}");
        }
        match timeout_at(deadline, client.pump()).await {
            Ok(true) => {}
            Ok(false) => bail!("connection ended ({})", client.status()),
            Err(_) => bail!(
                "timed out ({}, {} pending)",
                client.status(),
                client.pending()
            ),
        }
    }
    Ok(())
}

async fn watch(
    client: &mut Client,
    observer: &mut broadcast::Receiver<ClientEvent>,
    duration: Duration,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + duration;
    loop {
        print_events(observer)?;
        match timeout_at(deadline, client.pump()).await {
            Ok(true) => {}
            Ok(false) | Err(_) => break,
        }
    }
    print_events(observer)
}

fn print_events(observer: &mut broadcast::Receiver<ClientEvent>) -> anyhow::Result<()> {
    loop {
        match observer.try_recv() {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(broadcast::error::TryRecvError::Lagged(n)) => eprintln!("(missed {n} events)"),
            Err(broadcast::error::TryRecvError::Empty) => return Ok(()),
            Err(broadcast::error::TryRecvError::Closed) => {
                return Err(anyhow!("event channel closed"))
            }
        }
    }
}

fn outcome(
    observer: &mut broadcast::Receiver<ClientEvent>,
    id: CorrelationId,
) -> Option<Result<(), String>> {
    loop {
        match observer.try_recv() {
            Ok(ClientEvent::CommandConfirmed { id: got, .. }) if got == id => return Some(Ok(())),
            Ok(ClientEvent::CommandRolledBack { id: got, error, .. }) if got == id => {
                return Some(Err(error))
            }
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => return None,
        }
    }
}
