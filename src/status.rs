//! Per-interface status tracking
//!
//! The store has no lock of its own: it lives inside the coordinator's
//! critical section and is only reachable through the coordinator's guard.

use crate::types::{InterfaceKind, IpInfo, LinkStatus};
use serde::{Deserialize, Serialize};

/// Snapshot of every interface's status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub client: LinkStatus,
    pub access_point: LinkStatus,
    pub wired: LinkStatus,

    /// Last-known address per link, unspecified when not connected
    pub client_ip: IpInfo,
    pub access_point_ip: IpInfo,
    pub wired_ip: IpInfo,

    pub access_point_clients: u8,
}

impl Status {
    /// Status before anything has been started
    pub fn uninitialized() -> Self {
        Self::with_all(LinkStatus::Uninitialized)
    }

    /// Status after a full stop
    pub fn stopped() -> Self {
        Self::with_all(LinkStatus::Stopped)
    }

    fn with_all(status: LinkStatus) -> Self {
        Self {
            client: status,
            access_point: status,
            wired: status,
            client_ip: IpInfo::UNSPECIFIED,
            access_point_ip: IpInfo::UNSPECIFIED,
            wired_ip: IpInfo::UNSPECIFIED,
            access_point_clients: 0,
        }
    }

    pub fn link(&self, kind: InterfaceKind) -> LinkStatus {
        match kind {
            InterfaceKind::ClientLink => self.client,
            InterfaceKind::AccessPointLink => self.access_point,
            InterfaceKind::WiredLink => self.wired,
        }
    }

    pub fn ip(&self, kind: InterfaceKind) -> IpInfo {
        match kind {
            InterfaceKind::ClientLink => self.client_ip,
            InterfaceKind::AccessPointLink => self.access_point_ip,
            InterfaceKind::WiredLink => self.wired_ip,
        }
    }

    pub fn set_link(&mut self, kind: InterfaceKind, status: LinkStatus) {
        match kind {
            InterfaceKind::ClientLink => self.client = status,
            InterfaceKind::AccessPointLink => self.access_point = status,
            InterfaceKind::WiredLink => self.wired = status,
        }
    }

    pub fn set_ip(&mut self, kind: InterfaceKind, ip: IpInfo) {
        match kind {
            InterfaceKind::ClientLink => self.client_ip = ip,
            InterfaceKind::AccessPointLink => self.access_point_ip = ip,
            InterfaceKind::WiredLink => self.wired_ip = ip,
        }
    }

    pub fn is_connected(&self, kind: InterfaceKind) -> bool {
        self.link(kind) == LinkStatus::Connected
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::uninitialized()
    }
}

/// Canonical status owned by the coordinator
#[derive(Debug, Default)]
pub struct StatusStore {
    current: Status,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current status; never a live reference
    pub fn read_snapshot(&self) -> Status {
        self.current
    }

    /// Apply a mutation; callers must already hold the coordinator lock
    pub fn mutate<R>(&mut self, f: impl FnOnce(&mut Status) -> R) -> R {
        f(&mut self.current)
    }

    /// Move a link to a new status, clearing its address unless connected
    /// or started (an access point keeps the address it was started with)
    pub fn transition(&mut self, kind: InterfaceKind, status: LinkStatus) {
        self.mutate(|s| {
            s.set_link(kind, status);
            if !matches!(status, LinkStatus::Connected | LinkStatus::Started) {
                s.set_ip(kind, IpInfo::UNSPECIFIED);
            }
        });
    }

    pub fn client_joined(&mut self) -> u8 {
        self.mutate(|s| {
            s.access_point_clients = s.access_point_clients.saturating_add(1);
            s.access_point_clients
        })
    }

    pub fn client_left(&mut self) -> u8 {
        self.mutate(|s| {
            s.access_point_clients = s.access_point_clients.saturating_sub(1);
            s.access_point_clients
        })
    }

    /// Reset every link to stopped with no addresses or clients
    pub fn reset(&mut self) {
        self.current = Status::stopped();
    }
}
