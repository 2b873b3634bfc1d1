//! Core data types shared by the coordinator, the lifecycle manager and observers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Logical interface an event or status pertains to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// Wireless station link
    ClientLink,
    /// Wireless access point link
    AccessPointLink,
    /// Wired (Ethernet) link
    WiredLink,
}

impl InterfaceKind {
    pub const ALL: [InterfaceKind; 3] = [
        InterfaceKind::ClientLink,
        InterfaceKind::AccessPointLink,
        InterfaceKind::WiredLink,
    ];
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterfaceKind::ClientLink => "client",
            InterfaceKind::AccessPointLink => "access-point",
            InterfaceKind::WiredLink => "wired",
        };
        f.write_str(name)
    }
}

/// Per-interface link status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Uninitialized,
    Stopped,
    Started,
    Connecting,
    Connected,
    Disconnected,
    WaitingForReconnect,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkStatus::Uninitialized => "uninitialized",
            LinkStatus::Stopped => "stopped",
            LinkStatus::Started => "started",
            LinkStatus::Connecting => "connecting",
            LinkStatus::Connected => "connected",
            LinkStatus::Disconnected => "disconnected",
            LinkStatus::WaitingForReconnect => "waiting-for-reconnect",
        };
        f.write_str(name)
    }
}

/// IPv4 configuration snapshot (address, netmask, gateway)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl IpInfo {
    pub const UNSPECIFIED: IpInfo = IpInfo {
        address: Ipv4Addr::UNSPECIFIED,
        netmask: Ipv4Addr::UNSPECIFIED,
        gateway: Ipv4Addr::UNSPECIFIED,
    };

    pub fn new(address: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self { address, netmask, gateway }
    }

    pub fn is_unspecified(&self) -> bool {
        self.address.is_unspecified()
    }
}

impl Default for IpInfo {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl fmt::Display for IpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mask {} gw {}", self.address, self.netmask, self.gateway)
    }
}

/// Which DNS server slot to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsType {
    Primary,
    Secondary,
}

/// DNS server assigned to an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsInfo {
    pub server: Ipv4Addr,
}

/// Station associated with the access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId {
    /// Station MAC address
    pub mac: [u8; 6],
    /// Association id assigned by the access point
    pub aid: u16,
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mac;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x} (aid {})",
            m[0], m[1], m[2], m[3], m[4], m[5], self.aid
        )
    }
}

/// Entry in the access point's station list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub mac: [u8; 6],
    pub rssi: i8,
}

/// Payload attached to a normalized event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Address information of the interface
    Ip(IpInfo),
    /// A station joined the access point
    ClientJoined(ClientId),
    /// A station left the access point
    ClientLeft(ClientId),
}

/// Normalized event delivered to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetEvent {
    pub source: InterfaceKind,
    pub status: LinkStatus,
    pub payload: Option<EventPayload>,
}

impl NetEvent {
    pub fn new(source: InterfaceKind, status: LinkStatus) -> Self {
        Self { source, status, payload: None }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Whether this is a membership pulse rather than a status change
    pub fn is_pulse(&self) -> bool {
        matches!(
            self.payload,
            Some(EventPayload::ClientJoined(_)) | Some(EventPayload::ClientLeft(_))
        )
    }
}

impl fmt::Display for NetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.status)?;
        match &self.payload {
            Some(EventPayload::Ip(ip)) => write!(f, " ({})", ip),
            Some(EventPayload::ClientJoined(id)) => write!(f, " (client joined {})", id),
            Some(EventPayload::ClientLeft(id)) => write!(f, " (client left {})", id),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let ip = IpInfo::new(
            Ipv4Addr::new(192, 168, 4, 2),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::new(192, 168, 4, 1),
        );
        let event = NetEvent::new(InterfaceKind::ClientLink, LinkStatus::Connected)
            .with_payload(EventPayload::Ip(ip));
        assert_eq!(
            event.to_string(),
            "client: connected (192.168.4.2 mask 255.255.255.0 gw 192.168.4.1)"
        );
        assert!(!event.is_pulse());
    }

    #[test]
    fn test_client_pulse() {
        let id = ClientId { mac: [0xaa, 0xbb, 0xcc, 0x00, 0x11, 0x22], aid: 3 };
        let event = NetEvent::new(InterfaceKind::AccessPointLink, LinkStatus::Started)
            .with_payload(EventPayload::ClientJoined(id));
        assert!(event.is_pulse());
        assert!(event.to_string().contains("aa:bb:cc:00:11:22 (aid 3)"));
    }
}
