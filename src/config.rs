//! Configuration management for netmgr
//!
//! Two layers live here: the per-link [`SystemConfig`] consumed by
//! `NetManager::start`, and the [`ManagerSettings`] file that tunes the
//! coordinator (retry policy, storage location, statically supplied defaults).

use crate::driver::RadioMode;
use crate::error::{NetmgrError, NetmgrResult};
use crate::types::{DnsType, InterfaceKind, IpInfo};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Static IPv4 override for a link; disables the DHCP client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIpConfig {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// Primary DNS server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_primary: Option<Ipv4Addr>,
    /// Secondary DNS server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_secondary: Option<Ipv4Addr>,
}

impl StaticIpConfig {
    pub fn ip_info(&self) -> IpInfo {
        IpInfo::new(self.address, self.netmask, self.gateway)
    }

    pub fn dns(&self, dns_type: DnsType) -> Option<Ipv4Addr> {
        let server = match dns_type {
            DnsType::Primary => self.dns_primary,
            DnsType::Secondary => self.dns_secondary,
        };
        server.filter(|addr| !addr.is_unspecified())
    }

    fn validate(&self) -> NetmgrResult<()> {
        validation::validate_static_address(self.address, self.netmask)
    }
}

/// Wireless station link configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLinkConfig {
    pub ssid: String,
    /// Passphrase; empty for an open network
    #[serde(default)]
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<StaticIpConfig>,
}

impl ClientLinkConfig {
    pub fn validate(&self) -> NetmgrResult<()> {
        validation::validate_ssid(&self.ssid)?;
        validation::validate_secret(&self.secret)?;
        if let Some(static_ip) = &self.static_ip {
            static_ip.validate()?;
        }
        Ok(())
    }
}

/// Access point authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    Open,
    Wpa2Personal,
}

/// Wireless access point configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointConfig {
    pub ssid: String,
    /// Passphrase; empty selects open (unauthenticated) mode
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_channel")]
    pub channel: u8,
    #[serde(default = "default_max_clients")]
    pub max_clients: u8,
}

fn default_channel() -> u8 {
    1
}

fn default_max_clients() -> u8 {
    4
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            secret: String::new(),
            channel: default_channel(),
            max_clients: default_max_clients(),
        }
    }
}

impl AccessPointConfig {
    pub fn auth_mode(&self) -> AuthMode {
        if self.secret.is_empty() {
            AuthMode::Open
        } else {
            AuthMode::Wpa2Personal
        }
    }

    pub fn validate(&self) -> NetmgrResult<()> {
        validation::validate_ssid(&self.ssid)?;
        validation::validate_secret(&self.secret)?;
        validation::validate_channel(self.channel)?;
        validation::validate_max_clients(self.max_clients)
    }
}

/// Wired link configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiredLinkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<StaticIpConfig>,
}

impl WiredLinkConfig {
    pub fn validate(&self) -> NetmgrResult<()> {
        match &self.static_ip {
            Some(static_ip) => static_ip.validate(),
            None => Ok(()),
        }
    }
}

/// Master configuration: which links to run and how
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub client_enabled: bool,
    #[serde(default)]
    pub access_point_enabled: bool,
    #[serde(default)]
    pub wired_enabled: bool,
    #[serde(default)]
    pub client: ClientLinkConfig,
    #[serde(default)]
    pub access_point: AccessPointConfig,
    #[serde(default)]
    pub wired: WiredLinkConfig,
}

impl SystemConfig {
    pub fn is_enabled(&self, kind: InterfaceKind) -> bool {
        match kind {
            InterfaceKind::ClientLink => self.client_enabled,
            InterfaceKind::AccessPointLink => self.access_point_enabled,
            InterfaceKind::WiredLink => self.wired_enabled,
        }
    }

    /// Radio role needed for the enabled wireless links, if any
    pub fn radio_mode(&self) -> Option<RadioMode> {
        match (self.client_enabled, self.access_point_enabled) {
            (true, true) => Some(RadioMode::Dual),
            (true, false) => Some(RadioMode::Client),
            (false, true) => Some(RadioMode::AccessPoint),
            (false, false) => None,
        }
    }

    /// Static override configured for a link
    pub fn static_ip(&self, kind: InterfaceKind) -> Option<&StaticIpConfig> {
        match kind {
            InterfaceKind::ClientLink => self.client.static_ip.as_ref(),
            InterfaceKind::AccessPointLink => None,
            InterfaceKind::WiredLink => self.wired.static_ip.as_ref(),
        }
    }

    /// Validate every enabled link; disabled links are not checked
    pub fn validate(&self) -> NetmgrResult<()> {
        if self.client_enabled {
            self.client.validate()?;
        }
        if self.access_point_enabled {
            self.access_point.validate()?;
        }
        if self.wired_enabled {
            self.wired.validate()?;
        }
        Ok(())
    }
}

/// Reconnect policy settings for the client link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum reconnect attempts; negative means unlimited
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    /// Base delay in milliseconds, doubled per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling on the doubling shift
    #[serde(default = "default_max_backoff_shift")]
    pub max_backoff_shift: u32,
}

fn default_max_retries() -> i32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_backoff_shift() -> u32 {
    5
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_backoff_shift: default_max_backoff_shift(),
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Where persisted link configuration lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_key")]
    pub key: String,
    /// Directory used by the file-backed store
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

fn default_namespace() -> String {
    "net_manager".to_string()
}

fn default_key() -> String {
    "net_config".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("/var/lib/netmgr")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            key: default_key(),
            dir: default_storage_dir(),
        }
    }
}

/// Manager settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub storage: StorageSettings,
    /// Link configuration used when nothing has been persisted
    #[serde(default)]
    pub defaults: SystemConfig,
}

impl ManagerSettings {
    /// Load settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> NetmgrResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NetmgrError::ConfigError(format!("Failed to read settings: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> NetmgrResult<Self> {
        toml::from_str(content)
            .map_err(|e| NetmgrError::ConfigError(format!("Failed to parse settings: {}", e)))
    }

    /// Save settings to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> NetmgrResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NetmgrError::ConfigError(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| NetmgrError::ConfigError(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }
}
