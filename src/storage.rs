//! Persistent configuration storage
//!
//! The backing store is a namespaced key/blob store. The link configuration
//! is written as a fixed-layout record: strings occupy fixed-width NUL-padded
//! fields and addresses are raw `u32`s, so every valid blob has exactly
//! [`encoded_size`] bytes. A blob of any other size is rejected.

use crate::config::{
    AccessPointConfig, ClientLinkConfig, StaticIpConfig, SystemConfig, WiredLinkConfig,
};
use crate::error::{NetmgrError, NetmgrResult};
use crate::validation::{MAX_SECRET_LEN, MAX_SSID_LEN};
use async_trait::async_trait;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Layout version written at the start of every record
const LAYOUT_VERSION: u16 = 1;

/// Namespaced blob store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read a blob; `Ok(None)` when the key has never been written
    async fn load(&self, namespace: &str, key: &str) -> NetmgrResult<Option<Vec<u8>>>;

    /// Write and commit a blob
    async fn save(&self, namespace: &str, key: &str, bytes: &[u8]) -> NetmgrResult<()>;
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self, namespace: &str, key: &str) -> NetmgrResult<Option<Vec<u8>>> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    async fn save(&self, namespace: &str, key: &str, bytes: &[u8]) -> NetmgrResult<()> {
        self.blobs
            .write()
            .await
            .insert((namespace.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }
}

/// File-backed store: one file per key under `<dir>/<namespace>/`
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, namespace: &str, key: &str) -> NetmgrResult<PathBuf> {
        for part in [namespace, key] {
            let valid = part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if part.is_empty() || !valid {
                return Err(NetmgrError::Storage(format!("Invalid storage name: {:?}", part)));
            }
        }
        Ok(self.dir.join(namespace).join(format!("{}.bin", key)))
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn load(&self, namespace: &str, key: &str) -> NetmgrResult<Option<Vec<u8>>> {
        let path = self.path(namespace, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NetmgrError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save(&self, namespace: &str, key: &str, bytes: &[u8]) -> NetmgrResult<()> {
        let path = self.path(namespace, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so a torn write never replaces a good blob
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| {
                NetmgrError::Storage(format!("Failed to write {}: {}", tmp.display(), e))
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| {
                NetmgrError::Storage(format!("Failed to commit {}: {}", path.display(), e))
            })?;

        debug!("Committed {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// Fixed-width NUL-padded byte field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FixedBytes<const N: usize>([u8; N]);

impl<const N: usize> FixedBytes<N> {
    fn from_field(field: &str, value: &str) -> NetmgrResult<Self> {
        let bytes = value.as_bytes();
        if bytes.len() > N {
            return Err(NetmgrError::ConfigurationInvalid(format!(
                "{} exceeds {} bytes",
                field, N
            )));
        }
        let mut out = [0u8; N];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(out))
    }

    fn into_string(self, field: &str) -> NetmgrResult<String> {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        String::from_utf8(self.0[..len].to_vec())
            .map_err(|_| NetmgrError::StorageDecodeError(format!("{} is not valid UTF-8", field)))
    }
}

impl<const N: usize> Serialize for FixedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(N)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FixedVisitor<const N: usize>;

        impl<'de, const N: usize> Visitor<'de> for FixedVisitor<N> {
            type Value = FixedBytes<N>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} bytes", N)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = [0u8; N];
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(FixedBytes(out))
            }
        }

        deserializer.deserialize_tuple(N, FixedVisitor::<N>)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredStaticIp {
    enabled: bool,
    address: u32,
    netmask: u32,
    gateway: u32,
    dns_primary: u32,
    dns_secondary: u32,
}

impl From<Option<&StaticIpConfig>> for StoredStaticIp {
    fn from(config: Option<&StaticIpConfig>) -> Self {
        match config {
            Some(c) => Self {
                enabled: true,
                address: c.address.into(),
                netmask: c.netmask.into(),
                gateway: c.gateway.into(),
                dns_primary: c.dns_primary.map(u32::from).unwrap_or(0),
                dns_secondary: c.dns_secondary.map(u32::from).unwrap_or(0),
            },
            None => Self::default(),
        }
    }
}

impl StoredStaticIp {
    fn into_config(self) -> Option<StaticIpConfig> {
        let dns = |raw: u32| (raw != 0).then(|| Ipv4Addr::from(raw));
        self.enabled.then(|| StaticIpConfig {
            address: Ipv4Addr::from(self.address),
            netmask: Ipv4Addr::from(self.netmask),
            gateway: Ipv4Addr::from(self.gateway),
            dns_primary: dns(self.dns_primary),
            dns_secondary: dns(self.dns_secondary),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct StoredConfig {
    version: u16,
    client_enabled: bool,
    access_point_enabled: bool,
    wired_enabled: bool,

    client_ssid: FixedBytes<MAX_SSID_LEN>,
    client_secret: FixedBytes<MAX_SECRET_LEN>,
    client_static_ip: StoredStaticIp,

    ap_ssid: FixedBytes<MAX_SSID_LEN>,
    ap_secret: FixedBytes<MAX_SECRET_LEN>,
    ap_channel: u8,
    ap_max_clients: u8,

    wired_static_ip: StoredStaticIp,
}

impl StoredConfig {
    fn empty() -> Self {
        Self {
            version: LAYOUT_VERSION,
            client_enabled: false,
            access_point_enabled: false,
            wired_enabled: false,
            client_ssid: FixedBytes([0; MAX_SSID_LEN]),
            client_secret: FixedBytes([0; MAX_SECRET_LEN]),
            client_static_ip: StoredStaticIp::default(),
            ap_ssid: FixedBytes([0; MAX_SSID_LEN]),
            ap_secret: FixedBytes([0; MAX_SECRET_LEN]),
            ap_channel: 0,
            ap_max_clients: 0,
            wired_static_ip: StoredStaticIp::default(),
        }
    }

    fn from_config(config: &SystemConfig) -> NetmgrResult<Self> {
        Ok(Self {
            version: LAYOUT_VERSION,
            client_enabled: config.client_enabled,
            access_point_enabled: config.access_point_enabled,
            wired_enabled: config.wired_enabled,
            client_ssid: FixedBytes::from_field("client SSID", &config.client.ssid)?,
            client_secret: FixedBytes::from_field("client secret", &config.client.secret)?,
            client_static_ip: StoredStaticIp::from(config.client.static_ip.as_ref()),
            ap_ssid: FixedBytes::from_field("access point SSID", &config.access_point.ssid)?,
            ap_secret: FixedBytes::from_field("access point secret", &config.access_point.secret)?,
            ap_channel: config.access_point.channel,
            ap_max_clients: config.access_point.max_clients,
            wired_static_ip: StoredStaticIp::from(config.wired.static_ip.as_ref()),
        })
    }

    fn into_config(self) -> NetmgrResult<SystemConfig> {
        Ok(SystemConfig {
            client_enabled: self.client_enabled,
            access_point_enabled: self.access_point_enabled,
            wired_enabled: self.wired_enabled,
            client: ClientLinkConfig {
                ssid: self.client_ssid.into_string("client SSID")?,
                secret: self.client_secret.into_string("client secret")?,
                static_ip: self.client_static_ip.into_config(),
            },
            access_point: AccessPointConfig {
                ssid: self.ap_ssid.into_string("access point SSID")?,
                secret: self.ap_secret.into_string("access point secret")?,
                channel: self.ap_channel,
                max_clients: self.ap_max_clients,
            },
            wired: WiredLinkConfig {
                static_ip: self.wired_static_ip.into_config(),
            },
        })
    }
}

/// Size in bytes of every encoded configuration
pub fn encoded_size() -> usize {
    // Fixed-width fields make the size independent of content
    bincode::serialized_size(&StoredConfig::empty())
        .map(|size| size as usize)
        .unwrap_or(0)
}

/// Encode a configuration as a fixed-layout blob
pub fn encode_config(config: &SystemConfig) -> NetmgrResult<Vec<u8>> {
    let stored = StoredConfig::from_config(config)?;
    bincode::serialize(&stored).map_err(|e| NetmgrError::Storage(e.to_string()))
}

/// Decode a blob produced by [`encode_config`]
pub fn decode_config(bytes: &[u8]) -> NetmgrResult<SystemConfig> {
    let expected = encoded_size();
    if bytes.len() != expected {
        warn!(
            "Stored config size mismatch. Expected {}, got {}.",
            expected,
            bytes.len()
        );
        return Err(NetmgrError::StorageDecodeError(format!(
            "size mismatch: expected {} bytes, got {}",
            expected,
            bytes.len()
        )));
    }

    let stored: StoredConfig = bincode::deserialize(bytes)?;
    if stored.version != LAYOUT_VERSION {
        return Err(NetmgrError::StorageDecodeError(format!(
            "unsupported layout version {}",
            stored.version
        )));
    }
    stored.into_config()
}

/// Load and decode a configuration; `Ok(None)` when nothing is stored
pub async fn load_config(
    store: &dyn ConfigStore,
    namespace: &str,
    key: &str,
) -> NetmgrResult<Option<SystemConfig>> {
    match store.load(namespace, key).await? {
        Some(bytes) => {
            let config = decode_config(&bytes)?;
            info!("Configuration loaded from {}/{}", namespace, key);
            Ok(Some(config))
        }
        None => {
            debug!("No configuration stored at {}/{}", namespace, key);
            Ok(None)
        }
    }
}

/// Encode and save a configuration
pub async fn save_config(
    store: &dyn ConfigStore,
    namespace: &str,
    key: &str,
    config: &SystemConfig,
) -> NetmgrResult<()> {
    let bytes = encode_config(config)?;
    store.save(namespace, key, &bytes).await?;
    info!("Configuration saved to {}/{}", namespace, key);
    Ok(())
}
