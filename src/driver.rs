//! Interface driver seams
//!
//! The radio, the wired MAC/PHY and the IP stack are external collaborators.
//! The lifecycle manager drives them through these traits during start/stop;
//! the coordinator only ever issues `RadioDriver::connect` and reads addresses
//! from the `IpStack`.
//!
//! Implementations must not deliver events inline from a command call: events
//! go through the [`EventLoop`](crate::events::EventLoop) so that the caller,
//! which may hold the coordinator lock, never re-enters it.

use crate::config::{AccessPointConfig, AuthMode, ClientLinkConfig, StaticIpConfig};
use crate::error::DriverError;
use crate::types::{ClientInfo, DnsInfo, DnsType, InterfaceKind, IpInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type DriverResult<T> = Result<T, DriverError>;

/// Radio role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioMode {
    /// Station only
    Client,
    /// Access point only
    AccessPoint,
    /// Station and access point on the same radio
    Dual,
}

impl RadioMode {
    pub fn has_client(self) -> bool {
        matches!(self, RadioMode::Client | RadioMode::Dual)
    }

    pub fn has_access_point(self) -> bool {
        matches!(self, RadioMode::AccessPoint | RadioMode::Dual)
    }
}

/// How the station scans for its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMethod {
    /// Stop at the first matching access point
    Fast,
}

/// How the station picks among matching access points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMethod {
    BySignal,
}

/// Station settings handed to the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRadioConfig {
    pub ssid: String,
    pub secret: String,
    pub scan_method: ScanMethod,
    pub sort_method: SortMethod,
    /// Weakest signal accepted, in dBm
    pub rssi_threshold: i8,
    /// Weakest security accepted
    pub auth_threshold: AuthMode,
}

impl From<&ClientLinkConfig> for ClientRadioConfig {
    fn from(config: &ClientLinkConfig) -> Self {
        Self {
            ssid: config.ssid.clone(),
            secret: config.secret.clone(),
            scan_method: ScanMethod::Fast,
            sort_method: SortMethod::BySignal,
            rssi_threshold: -127,
            auth_threshold: AuthMode::Open,
        }
    }
}

/// Access point settings handed to the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointRadioConfig {
    pub ssid: String,
    pub secret: String,
    pub channel: u8,
    pub max_connections: u8,
    pub auth_mode: AuthMode,
}

impl From<&AccessPointConfig> for AccessPointRadioConfig {
    fn from(config: &AccessPointConfig) -> Self {
        Self {
            ssid: config.ssid.clone(),
            secret: config.secret.clone(),
            channel: config.channel,
            max_connections: config.max_clients,
            auth_mode: config.auth_mode(),
        }
    }
}

/// Shared radio serving the client and access point links
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RadioDriver: Send + Sync {
    /// Bring up the radio driver
    async fn init(&self) -> DriverResult<()>;

    /// Select station, access point or dual role
    async fn set_mode(&self, mode: RadioMode) -> DriverResult<()>;

    /// Apply station settings
    async fn configure_client(&self, config: &ClientRadioConfig) -> DriverResult<()>;

    /// Apply access point settings
    async fn configure_access_point(&self, config: &AccessPointRadioConfig) -> DriverResult<()>;

    /// Start the radio in the configured mode
    async fn start(&self) -> DriverResult<()>;

    /// Stop the radio
    async fn stop(&self) -> DriverResult<()>;

    /// Release the radio driver
    async fn deinit(&self) -> DriverResult<()>;

    /// Ask the station to (re)associate
    async fn connect(&self) -> DriverResult<()>;

    /// Stations currently associated with the access point
    async fn access_point_clients(&self) -> DriverResult<Vec<ClientInfo>>;
}

/// Wired Ethernet ports
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WiredDriver: Send + Sync {
    /// Initialize MAC/PHY for every port; returns how many came up
    async fn install(&self) -> DriverResult<usize>;

    /// Start one port
    async fn start(&self, port: usize) -> DriverResult<()>;

    /// Stop all started ports
    async fn stop(&self) -> DriverResult<()>;

    /// Release every port
    async fn uninstall(&self) -> DriverResult<()>;
}

/// IP layer attached to each link
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IpStack: Send + Sync {
    /// Create the network interface for a link
    async fn create(&self, kind: InterfaceKind) -> DriverResult<()>;

    /// Destroy the network interface for a link
    async fn destroy(&self, kind: InterfaceKind) -> DriverResult<()>;

    /// Stop the DHCP client and apply a fixed address and DNS servers
    async fn apply_static(&self, kind: InterfaceKind, config: &StaticIpConfig) -> DriverResult<()>;

    /// Current address of a link
    async fn ip_info(&self, kind: InterfaceKind) -> DriverResult<IpInfo>;

    /// Current DNS server of a link
    async fn dns_info(&self, kind: InterfaceKind, dns_type: DnsType) -> DriverResult<DnsInfo>;
}

/// Handles to every external driver
#[derive(Clone)]
pub struct DriverSet {
    pub radio: Arc<dyn RadioDriver>,
    pub wired: Arc<dyn WiredDriver>,
    pub ip: Arc<dyn IpStack>,
}

impl DriverSet {
    pub fn new(
        radio: Arc<dyn RadioDriver>,
        wired: Arc<dyn WiredDriver>,
        ip: Arc<dyn IpStack>,
    ) -> Self {
        Self { radio, wired, ip }
    }
}
