//! `serve` subcommand.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, ensure};
use clap::Args;
use open8055_core::CardId;
use open8055_core::constants::MAX_CARDS;
use open8055_hardware::AnyCardDevice;
use open8055_hardware::mock::SimulatedBoard;
use open8055_server::{PolicyCell, Server, ServerConfig, ServerHandle};
use tracing::{error, info};

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Configuration file [default: /usr/local/etc/open8055.toml, then
    /// open8055.toml next to the executable]
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen on this address only
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<IpAddr>,

    /// TCP port, overrides the configuration file
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Serve N simulated cards instead of USB hardware
    #[arg(long, value_name = "N")]
    pub simulate: Option<u8>,
}

/// Run the server until SIGINT or SIGTERM.
///
/// Returns an error if the server could not start or the acceptor failed,
/// so a supervisor sees a non-zero exit status.
pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let mut config =
        ServerConfig::locate(args.config.as_deref()).context("loading configuration")?;
    if let Some(addr) = args.listen {
        config.general.listen_address = Some(addr);
    }
    if let Some(port) = args.port {
        config.general.server_port = port;
    }
    match config.source() {
        Some(path) => info!(config = %path.display(), "configuration loaded"),
        None => info!("no configuration file found, using defaults"),
    }

    let policy = PolicyCell::new(config.access_policy().context("building access policy")?);
    let device = Arc::new(open_device(args.simulate)?);
    let mut signals = Signals::install().context("installing signal handlers")?;

    let mut server = Server::bind(&config, device, policy)
        .await
        .context("starting server")?;
    let watcher = tokio::spawn({
        let handle = server.handle();
        async move {
            loop {
                match signals.recv().await {
                    SignalEvent::Shutdown(name) => {
                        info!(signal = name, "shutting down");
                        handle.shutdown();
                        break;
                    }
                    SignalEvent::Reload => reload(&handle, &config),
                }
            }
        }
    });

    let result = server.run().await;
    server.shutdown().await;
    watcher.abort();
    result.context("server stopped")
}

fn open_device(simulate: Option<u8>) -> anyhow::Result<AnyCardDevice> {
    if let Some(count) = simulate {
        ensure!(count <= MAX_CARDS, "at most {MAX_CARDS} cards can be simulated");
        let cards: Vec<CardId> = CardId::all().take(usize::from(count)).collect();
        let (board, _handle) = SimulatedBoard::with_cards(&cards);
        info!(cards = count, "serving simulated cards");
        return Ok(AnyCardDevice::Simulated(board));
    }
    usb_device()
}

#[cfg(feature = "hardware-usb")]
fn usb_device() -> anyhow::Result<AnyCardDevice> {
    let backend = open8055_hardware::usb::HidBackend::new().context("initialising hidapi")?;
    Ok(AnyCardDevice::Hid(backend))
}

#[cfg(not(feature = "hardware-usb"))]
fn usb_device() -> anyhow::Result<AnyCardDevice> {
    anyhow::bail!("built without USB support, use --simulate N")
}

/// Re-read the configuration and users file. On failure the old policy
/// stays in force.
fn reload(handle: &ServerHandle, config: &ServerConfig) {
    let policy = config
        .reload()
        .and_then(|config| config.access_policy());
    match policy {
        Ok(policy) => handle.reload(policy),
        Err(e) => error!(error = %e, "reload failed, keeping previous configuration"),
    }
}

enum SignalEvent {
    Shutdown(&'static str),
    Reload,
}

#[cfg(unix)]
struct Signals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> SignalEvent {
        tokio::select! {
            _ = self.terminate.recv() => SignalEvent::Shutdown("SIGTERM"),
            _ = self.interrupt.recv() => SignalEvent::Shutdown("SIGINT"),
            _ = self.hangup.recv() => SignalEvent::Reload,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> SignalEvent {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot wait for Ctrl+C");
            std::future::pending::<()>().await;
        }
        SignalEvent::Shutdown("Ctrl+C")
    }
}
