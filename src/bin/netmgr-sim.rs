//! Network manager simulator (netmgr-sim)
//!
//! Runs the network manager against simulated drivers: starts the configured
//! links, plays a short script of outside-world events (DHCP leases, a cable
//! plugged in, stations joining the access point) and prints the resulting
//! status.
//!
//! # Usage
//!
//! ```bash
//! # Built-in demo configuration
//! netmgr-sim
//!
//! # Settings file, JSON output
//! netmgr-sim --settings netmgr.toml --json
//!
//! # Drop the client link once to watch the reconnect backoff
//! netmgr-sim --drop-client --verbose
//! ```

use anyhow::Context;
use clap::Parser;
use libnetmgr::sim::SimNetwork;
use libnetmgr::{
    ClientId, ClientInfo, ConfigStore, EventLoop, FileStore, InterfaceKind, IpInfo, LinkStatus,
    LoggingObserver, ManagerSettings, MemoryStore, NetManager, NetmgrError, Status,
    SystemConfig,
};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Network manager simulator
#[derive(Parser, Debug)]
#[command(name = "netmgr-sim")]
#[command(author = "netmgr contributors")]
#[command(version)]
#[command(
    about = "Network Manager Simulator - runs the link coordinator against simulated drivers",
    long_about = None
)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Settings file (TOML)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Persist configuration in the settings' storage directory instead of in memory
    #[arg(long)]
    persist: bool,

    /// Persist configuration under this directory (implies --persist)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Save the configuration that was started
    #[arg(long)]
    save: bool,

    /// Override the client reconnect limit (-1 for unlimited)
    #[arg(long, allow_negative_numbers = true)]
    max_retries: Option<i32>,

    /// Drop the client link once and let it reconnect
    #[arg(long)]
    drop_client: bool,

    /// Number of wired ports the simulated MAC/PHY reports
    #[arg(long, default_value_t = 1)]
    wired_ports: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    status: Status,
    stations: Vec<ClientInfo>,
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting network manager simulator");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut settings = match &args.settings {
        Some(path) => ManagerSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => ManagerSettings::default(),
    };
    if let Some(max_retries) = args.max_retries {
        settings.retry.max_retries = max_retries;
    }
    if !InterfaceKind::ALL.iter().any(|kind| settings.defaults.is_enabled(*kind)) {
        info!("No links enabled in settings, using the demo configuration");
        settings.defaults = demo_config();
    }

    let store: Arc<dyn ConfigStore> = match (&args.store_dir, args.persist) {
        (Some(dir), _) => Arc::new(FileStore::new(dir)),
        (None, true) => Arc::new(FileStore::new(&settings.storage.dir)),
        (None, false) => Arc::new(MemoryStore::new()),
    };

    let events = EventLoop::spawn();
    let sim = SimNetwork::with_wired_ports(events.clone(), args.wired_ports);
    let manager = NetManager::new(sim.drivers(), events, store, settings);

    manager.init(Some(Arc::new(LoggingObserver))).await?;
    manager.start(None).await.context("Failed to start links")?;
    sim.settle().await?;

    run_script(&sim, &manager, args.drop_client).await?;

    if args.save {
        let config = match manager.load_config().await {
            Ok(Some(config)) => config,
            Ok(None) => manager.settings().defaults.clone(),
            Err(e) => {
                warn!("Stored config unusable ({}), saving defaults", e);
                manager.settings().defaults.clone()
            }
        };
        manager.save_config(&config).await.context("Failed to save configuration")?;
        info!("Configuration saved");
    }

    let status = manager.get_status().await?;
    let stations = match manager.get_access_point_clients().await {
        Ok(stations) => stations,
        Err(NetmgrError::InterfaceNotActive(_)) => Vec::new(),
        Err(e) => {
            warn!("Failed to list access point stations: {}", e);
            Vec::new()
        }
    };

    if args.json {
        let report = Report {
            status,
            stations,
            commands: sim.control.commands().await,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_status(&status, &stations);
    }

    manager.stop().await?;
    manager.deinit().await?;
    Ok(())
}

/// Initialize logging; stdout is kept for the report
fn init_logging(args: &Args) {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "netmgr_sim={},libnetmgr={}",
            log_level, log_level
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

fn demo_config() -> SystemConfig {
    let mut config = SystemConfig {
        client_enabled: true,
        access_point_enabled: true,
        wired_enabled: true,
        ..Default::default()
    };
    config.client.ssid = "net1".to_string();
    config.client.secret = "password123".to_string();
    config.access_point.ssid = "netmgr-ap".to_string();
    config.access_point.secret = "apsecret1".to_string();
    config
}

fn lease(last: u8) -> IpInfo {
    IpInfo::new(
        Ipv4Addr::new(192, 168, 1, last),
        Ipv4Addr::new(255, 255, 255, 0),
        Ipv4Addr::new(192, 168, 1, 1),
    )
}

/// Outside-world events for every link that came up
async fn run_script(
    sim: &SimNetwork,
    manager: &NetManager,
    drop_client: bool,
) -> anyhow::Result<()> {
    let status = manager.get_status().await?;
    let dns = Some(Ipv4Addr::new(192, 168, 1, 1));

    if status.client != LinkStatus::Stopped {
        bring_up(sim, manager, InterfaceKind::ClientLink, lease(50), dns).await?;

        if drop_client {
            warn!("Dropping client link");
            sim.client_lost().await?;
            sim.settle().await?;
            bring_up(sim, manager, InterfaceKind::ClientLink, lease(51), dns).await?;
        }
    }

    if status.access_point != LinkStatus::Stopped {
        let first = ClientId { mac: [0x02, 0, 0, 0, 0, 0x01], aid: 1 };
        let second = ClientId { mac: [0x02, 0, 0, 0, 0, 0x02], aid: 2 };
        sim.station_joined(first, -40).await?;
        sim.station_joined(second, -62).await?;
        sim.station_left(first).await?;
    }

    if status.wired != LinkStatus::Stopped {
        bring_up(sim, manager, InterfaceKind::WiredLink, lease(60), dns).await?;
    }

    sim.settle().await?;
    Ok(())
}

/// Link comes up; a DHCP lease follows unless the link is statically addressed
async fn bring_up(
    sim: &SimNetwork,
    manager: &NetManager,
    kind: InterfaceKind,
    ip: IpInfo,
    dns: Option<Ipv4Addr>,
) -> anyhow::Result<()> {
    match kind {
        InterfaceKind::WiredLink => sim.wired_plugged()?,
        _ => sim.client_associated()?,
    }
    sim.settle().await?;

    if !manager.is_connected(kind).await? {
        sim.dhcp_lease(kind, ip, dns).await?;
        sim.settle().await?;
    }
    Ok(())
}

fn print_status(status: &Status, stations: &[ClientInfo]) {
    println!("LINK          STATUS                 ADDRESS");
    for kind in InterfaceKind::ALL {
        let ip = status.ip(kind);
        let address = if ip.is_unspecified() {
            "-".to_string()
        } else {
            ip.to_string()
        };
        println!("{:<13} {:<22} {}", kind.to_string(), status.link(kind).to_string(), address);
    }
    println!();
    println!("Access point stations: {}", status.access_point_clients);
    for station in stations {
        let m = station.mac;
        println!(
            "  {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}  {} dBm",
            m[0], m[1], m[2], m[3], m[4], m[5], station.rssi
        );
    }
}
