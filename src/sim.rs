//! Simulated drivers
//!
//! In-memory radio, wired port and IP stack. Commands are recorded in a
//! shared log, state changes are posted to the [`EventLoop`] like real
//! drivers would, and any command can be told to fail.
//!
//! A [`SimNetwork`] bundles the three drivers and adds scripting helpers for
//! what the outside world does: an access point appearing, a DHCP lease, a
//! cable being pulled, stations joining.

use crate::config::StaticIpConfig;
use crate::driver::{
    AccessPointRadioConfig, ClientRadioConfig, DriverResult, DriverSet, IpStack, RadioDriver,
    RadioMode, WiredDriver,
};
use crate::error::{DriverError, NetmgrError, NetmgrResult};
use crate::events::{DriverEvent, EventLoop, LinkChange};
use crate::types::{ClientId, ClientInfo, DnsInfo, DnsType, InterfaceKind, IpInfo};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Default address of the access point interface
pub const SIM_AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Command journal and failure plan shared by the simulated drivers
#[derive(Default)]
pub struct SimControl {
    commands: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl SimControl {
    /// Make every later call of `command` (e.g. `"radio.start"`) fail
    pub async fn fail(&self, command: &str) {
        self.failing.lock().await.insert(command.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.lock().await.clear();
    }

    /// Commands issued so far, oldest first
    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    /// How many times a command was issued
    pub async fn count(&self, command: &str) -> usize {
        self.commands.lock().await.iter().filter(|c| c.as_str() == command).count()
    }

    async fn record(&self, command: String) -> DriverResult<()> {
        debug!("sim: {}", command);
        let failing = self.failing.lock().await.contains(&command);
        self.commands.lock().await.push(command.clone());
        if failing {
            Err(DriverError::Rejected(format!("{} failed (injected)", command)))
        } else {
            Ok(())
        }
    }
}

fn post(events: &EventLoop, event: DriverEvent) -> DriverResult<()> {
    events
        .post(event)
        .map_err(|e| DriverError::Unavailable(e.to_string()))
}

#[derive(Default)]
struct RadioState {
    mode: Option<RadioMode>,
    started: bool,
    client: Option<ClientRadioConfig>,
    access_point: Option<AccessPointRadioConfig>,
    stations: Vec<ClientInfo>,
}

/// Radio with station and access point roles
pub struct SimRadio {
    control: Arc<SimControl>,
    events: Arc<EventLoop>,
    state: Mutex<RadioState>,
}

impl SimRadio {
    pub fn new(control: Arc<SimControl>, events: Arc<EventLoop>) -> Self {
        Self {
            control,
            events,
            state: Mutex::new(RadioState::default()),
        }
    }

    /// Station settings last applied
    pub async fn client_config(&self) -> Option<ClientRadioConfig> {
        self.state.lock().await.client.clone()
    }

    /// Access point settings last applied
    pub async fn access_point_config(&self) -> Option<AccessPointRadioConfig> {
        self.state.lock().await.access_point.clone()
    }

    pub async fn mode(&self) -> Option<RadioMode> {
        self.state.lock().await.mode
    }

    async fn station_joined(&self, client: ClientId, rssi: i8) -> DriverResult<()> {
        self.state.lock().await.stations.push(ClientInfo { mac: client.mac, rssi });
        post(&self.events, DriverEvent::client_joined(client))
    }

    async fn station_left(&self, client: ClientId) -> DriverResult<()> {
        self.state.lock().await.stations.retain(|s| s.mac != client.mac);
        post(&self.events, DriverEvent::client_left(client))
    }
}

#[async_trait]
impl RadioDriver for SimRadio {
    async fn init(&self) -> DriverResult<()> {
        self.control.record("radio.init".to_string()).await
    }

    async fn set_mode(&self, mode: RadioMode) -> DriverResult<()> {
        self.control.record("radio.set_mode".to_string()).await?;
        self.state.lock().await.mode = Some(mode);
        Ok(())
    }

    async fn configure_client(&self, config: &ClientRadioConfig) -> DriverResult<()> {
        self.control.record("radio.configure_client".to_string()).await?;
        self.state.lock().await.client = Some(config.clone());
        Ok(())
    }

    async fn configure_access_point(&self, config: &AccessPointRadioConfig) -> DriverResult<()> {
        self.control.record("radio.configure_access_point".to_string()).await?;
        self.state.lock().await.access_point = Some(config.clone());
        Ok(())
    }

    async fn start(&self) -> DriverResult<()> {
        self.control.record("radio.start".to_string()).await?;
        let mut state = self.state.lock().await;
        let mode = state.mode.ok_or(DriverError::NotStarted)?;
        state.started = true;
        if mode.has_client() {
            post(&self.events, DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Started))?;
        }
        if mode.has_access_point() {
            post(
                &self.events,
                DriverEvent::link(InterfaceKind::AccessPointLink, LinkChange::Started),
            )?;
        }
        Ok(())
    }

    async fn stop(&self) -> DriverResult<()> {
        self.control.record("radio.stop".to_string()).await?;
        let mut state = self.state.lock().await;
        if !state.started {
            return Err(DriverError::NotStarted);
        }
        state.started = false;
        state.stations.clear();
        if let Some(mode) = state.mode {
            if mode.has_client() {
                post(
                    &self.events,
                    DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Stopped),
                )?;
            }
            if mode.has_access_point() {
                post(
                    &self.events,
                    DriverEvent::link(InterfaceKind::AccessPointLink, LinkChange::Stopped),
                )?;
            }
        }
        Ok(())
    }

    async fn deinit(&self) -> DriverResult<()> {
        self.control.record("radio.deinit".to_string()).await?;
        *self.state.lock().await = RadioState::default();
        Ok(())
    }

    async fn connect(&self) -> DriverResult<()> {
        self.control.record("radio.connect".to_string()).await?;
        let state = self.state.lock().await;
        if !state.started || state.client.is_none() {
            return Err(DriverError::NotStarted);
        }
        Ok(())
    }

    async fn access_point_clients(&self) -> DriverResult<Vec<ClientInfo>> {
        let state = self.state.lock().await;
        if !state.started {
            return Err(DriverError::NotStarted);
        }
        Ok(state.stations.clone())
    }
}

/// Ethernet MAC/PHY with a configurable number of ports
pub struct SimWired {
    control: Arc<SimControl>,
    events: Arc<EventLoop>,
    ports: usize,
    started: Mutex<Option<usize>>,
}

impl SimWired {
    pub fn new(control: Arc<SimControl>, events: Arc<EventLoop>, ports: usize) -> Self {
        Self {
            control,
            events,
            ports,
            started: Mutex::new(None),
        }
    }

    /// Port currently started
    pub async fn started_port(&self) -> Option<usize> {
        *self.started.lock().await
    }
}

#[async_trait]
impl WiredDriver for SimWired {
    async fn install(&self) -> DriverResult<usize> {
        self.control.record("wired.install".to_string()).await?;
        Ok(self.ports)
    }

    async fn start(&self, port: usize) -> DriverResult<()> {
        self.control.record(format!("wired.start({})", port)).await?;
        if port >= self.ports {
            return Err(DriverError::Unavailable(format!("no wired port {}", port)));
        }
        *self.started.lock().await = Some(port);
        post(&self.events, DriverEvent::link(InterfaceKind::WiredLink, LinkChange::Started))
    }

    async fn stop(&self) -> DriverResult<()> {
        self.control.record("wired.stop".to_string()).await?;
        if self.started.lock().await.take().is_none() {
            return Err(DriverError::NotStarted);
        }
        post(&self.events, DriverEvent::link(InterfaceKind::WiredLink, LinkChange::Stopped))
    }

    async fn uninstall(&self) -> DriverResult<()> {
        self.control.record("wired.uninstall".to_string()).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SimNetif {
    ip: IpInfo,
    dns_primary: Option<Ipv4Addr>,
    dns_secondary: Option<Ipv4Addr>,
    static_ip: bool,
}

/// IP layer keeping one interface record per link
pub struct SimIpStack {
    control: Arc<SimControl>,
    netifs: Mutex<HashMap<InterfaceKind, SimNetif>>,
}

impl SimIpStack {
    pub fn new(control: Arc<SimControl>) -> Self {
        Self {
            control,
            netifs: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the interface for `kind` exists
    pub async fn exists(&self, kind: InterfaceKind) -> bool {
        self.netifs.lock().await.contains_key(&kind)
    }

    /// Install a DHCP lease; returns false if the interface does not exist
    /// or has a static address
    async fn lease(&self, kind: InterfaceKind, ip: IpInfo, dns: Option<Ipv4Addr>) -> bool {
        match self.netifs.lock().await.get_mut(&kind) {
            Some(netif) if !netif.static_ip => {
                netif.ip = ip;
                netif.dns_primary = dns;
                true
            }
            _ => false,
        }
    }

    async fn release(&self, kind: InterfaceKind) {
        if let Some(netif) = self.netifs.lock().await.get_mut(&kind) {
            if !netif.static_ip {
                netif.ip = IpInfo::UNSPECIFIED;
            }
        }
    }
}

#[async_trait]
impl IpStack for SimIpStack {
    async fn create(&self, kind: InterfaceKind) -> DriverResult<()> {
        self.control.record(format!("ip.create({})", kind)).await?;
        let mut netif = SimNetif::default();
        if kind == InterfaceKind::AccessPointLink {
            netif.ip = IpInfo::new(SIM_AP_ADDRESS, Ipv4Addr::new(255, 255, 255, 0), SIM_AP_ADDRESS);
        }
        self.netifs.lock().await.insert(kind, netif);
        Ok(())
    }

    async fn destroy(&self, kind: InterfaceKind) -> DriverResult<()> {
        self.control.record(format!("ip.destroy({})", kind)).await?;
        match self.netifs.lock().await.remove(&kind) {
            Some(_) => Ok(()),
            None => Err(DriverError::NotStarted),
        }
    }

    async fn apply_static(&self, kind: InterfaceKind, config: &StaticIpConfig) -> DriverResult<()> {
        self.control.record(format!("ip.apply_static({})", kind)).await?;
        let mut netifs = self.netifs.lock().await;
        let netif = netifs.get_mut(&kind).ok_or(DriverError::NotStarted)?;
        netif.ip = config.ip_info();
        netif.dns_primary = config.dns(DnsType::Primary);
        netif.dns_secondary = config.dns(DnsType::Secondary);
        netif.static_ip = true;
        Ok(())
    }

    async fn ip_info(&self, kind: InterfaceKind) -> DriverResult<IpInfo> {
        let netifs = self.netifs.lock().await;
        netifs.get(&kind).map(|n| n.ip).ok_or(DriverError::NotStarted)
    }

    async fn dns_info(&self, kind: InterfaceKind, dns_type: DnsType) -> DriverResult<DnsInfo> {
        let netifs = self.netifs.lock().await;
        let netif = netifs.get(&kind).ok_or(DriverError::NotStarted)?;
        let server = match dns_type {
            DnsType::Primary => netif.dns_primary,
            DnsType::Secondary => netif.dns_secondary,
        };
        Ok(DnsInfo {
            server: server.unwrap_or(Ipv4Addr::UNSPECIFIED),
        })
    }
}

/// The three simulated drivers plus the outside world acting on them
pub struct SimNetwork {
    pub control: Arc<SimControl>,
    pub radio: Arc<SimRadio>,
    pub wired: Arc<SimWired>,
    pub ip: Arc<SimIpStack>,
    events: Arc<EventLoop>,
}

impl SimNetwork {
    /// Simulated network with one wired port
    pub fn new(events: Arc<EventLoop>) -> Self {
        Self::with_wired_ports(events, 1)
    }

    pub fn with_wired_ports(events: Arc<EventLoop>, ports: usize) -> Self {
        let control = Arc::new(SimControl::default());
        Self {
            radio: Arc::new(SimRadio::new(control.clone(), events.clone())),
            wired: Arc::new(SimWired::new(control.clone(), events.clone(), ports)),
            ip: Arc::new(SimIpStack::new(control.clone())),
            control,
            events,
        }
    }

    /// Driver handles for the manager
    pub fn drivers(&self) -> DriverSet {
        DriverSet::new(self.radio.clone(), self.wired.clone(), self.ip.clone())
    }

    /// The station associated with its access point
    pub fn client_associated(&self) -> NetmgrResult<()> {
        self.events.post(DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Up))
    }

    /// The station lost its access point
    pub async fn client_lost(&self) -> NetmgrResult<()> {
        self.ip.release(InterfaceKind::ClientLink).await;
        self.events.post(DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Down))
    }

    /// Cable plugged in on the started port
    pub fn wired_plugged(&self) -> NetmgrResult<()> {
        self.events.post(DriverEvent::link(InterfaceKind::WiredLink, LinkChange::Up))
    }

    /// Cable pulled
    pub async fn wired_unplugged(&self) -> NetmgrResult<()> {
        self.ip.release(InterfaceKind::WiredLink).await;
        self.events.post(DriverEvent::link(InterfaceKind::WiredLink, LinkChange::Down))
    }

    /// DHCP server handed out a lease on a client or wired link. Ignored by
    /// the IP stack when the interface is missing or statically addressed;
    /// the acquisition event is posted either way.
    pub async fn dhcp_lease(
        &self,
        kind: InterfaceKind,
        ip: IpInfo,
        dns: Option<Ipv4Addr>,
    ) -> NetmgrResult<()> {
        if !self.ip.lease(kind, ip, dns).await {
            debug!("sim: lease on {} not applied to interface", kind);
        }
        self.events.post(DriverEvent::ip_acquired(kind, ip))
    }

    /// A station associated with the access point
    pub async fn station_joined(&self, client: ClientId, rssi: i8) -> NetmgrResult<()> {
        self.radio
            .station_joined(client, rssi)
            .await
            .map_err(|e| {
                NetmgrError::from_driver(InterfaceKind::AccessPointLink, "station_joined", e)
            })
    }

    /// A station left the access point
    pub async fn station_left(&self, client: ClientId) -> NetmgrResult<()> {
        self.radio
            .station_left(client)
            .await
            .map_err(|e| {
                NetmgrError::from_driver(InterfaceKind::AccessPointLink, "station_left", e)
            })
    }

    /// Driver-specific event the coordinator does not interpret
    pub fn vendor_event(&self, source: InterfaceKind, code: u32) -> NetmgrResult<()> {
        self.events.post(DriverEvent::link(source, LinkChange::Other(code)))
    }

    /// Wait until every posted event has been handled
    pub async fn settle(&self) -> NetmgrResult<()> {
        self.events.flush().await
    }
}
