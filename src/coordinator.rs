//! Interface-state coordinator
//!
//! Every raw driver event funnels through [`EventCoordinator::handle_event`],
//! which takes the single state lock, classifies the event, updates the
//! status store, runs the client reconnect policy and hands one normalized
//! event to the observer before releasing the lock.
//!
//! The reconnect backoff sleeps while the lock is held: no other event is
//! processed until the reconnect command has been issued.

use crate::driver::{IpStack, RadioDriver};
use crate::error::{NetmgrError, NetmgrResult};
use crate::events::{DriverEvent, EventHandler, LinkChange, MembershipChange};
use crate::lifecycle::ActiveLinks;
use crate::observer::Observer;
use crate::retry::{RetryPolicy, RetryState};
use crate::status::{Status, StatusStore};
use crate::types::{ClientId, EventPayload, InterfaceKind, IpInfo, LinkStatus, NetEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Everything guarded by the coordinator lock
pub struct CoordinatorState {
    pub(crate) status: StatusStore,
    pub(crate) retry: RetryState,
    pub(crate) observer: Option<Arc<dyn Observer>>,
    /// Owned by the lifecycle manager; read-only to event handling
    pub(crate) links: ActiveLinks,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            status: StatusStore::new(),
            retry: RetryState::default(),
            observer: None,
            links: ActiveLinks::default(),
        }
    }

    fn notify(&self, event: &NetEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event);
        }
    }

    /// Clear status and retry state after a full stop
    pub(crate) fn reset(&mut self) {
        self.status.reset();
        self.retry.reset();
    }
}

pub struct EventCoordinator {
    state: Mutex<CoordinatorState>,
    radio: Arc<dyn RadioDriver>,
    ip: Arc<dyn IpStack>,
    policy: RetryPolicy,
}

impl EventCoordinator {
    pub fn new(radio: Arc<dyn RadioDriver>, ip: Arc<dyn IpStack>, policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::new()),
            radio,
            ip,
            policy,
        }
    }

    /// Enter the critical section
    pub(crate) async fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().await
    }

    /// Consistent copy of the current status
    pub async fn status(&self) -> Status {
        self.state.lock().await.status.read_snapshot()
    }

    /// Current reconnect attempt count of the client link
    pub async fn retry_attempt(&self) -> u32 {
        self.state.lock().await.retry.attempt()
    }

    /// Process one driver event under the coordinator lock
    pub async fn handle_event(&self, event: DriverEvent) {
        let mut state = self.state.lock().await;

        let outcome = match event {
            DriverEvent::LinkState { source, change } => {
                if !state.links.is_active(source) {
                    debug!("Dropping {:?} for inactive {} link", change, source);
                    return;
                }
                match source {
                    InterfaceKind::ClientLink => self.on_client_link(&mut state, change).await,
                    InterfaceKind::AccessPointLink => {
                        self.on_access_point_link(&mut state, change).await
                    }
                    InterfaceKind::WiredLink => on_wired_link(&mut state, change),
                }
            }
            DriverEvent::IpAcquired { source, ip_info } => {
                on_ip_acquired(&mut state, source, ip_info)
            }
            DriverEvent::ClientMembership { change, client } => {
                on_membership(&mut state, change, client)
            }
        };

        if let Some(event) = outcome {
            state.notify(&event);
        }
    }

    async fn on_client_link(
        &self,
        state: &mut CoordinatorState,
        change: LinkChange,
    ) -> Option<NetEvent> {
        const KIND: InterfaceKind = InterfaceKind::ClientLink;

        match change {
            LinkChange::Started => {
                info!("Client link started: connecting...");
                state.status.transition(KIND, LinkStatus::Connecting);
                match self.issue_connect().await {
                    Ok(()) => Some(NetEvent::new(KIND, LinkStatus::Connecting)),
                    Err(e) => {
                        error!("Client link connect failed: {}", e);
                        state.status.transition(KIND, LinkStatus::Disconnected);
                        Some(NetEvent::new(KIND, LinkStatus::Disconnected))
                    }
                }
            }
            LinkChange::Down => self.on_client_disconnected(state).await,
            LinkChange::Up => {
                // Association only matters when no address acquisition will follow
                let static_ip = state.links.static_ip(KIND)?;
                info!("Client link associated, using static address {}", static_ip.address);
                Some(connected(state, KIND, static_ip.ip_info()))
            }
            LinkChange::Stopped => {
                info!("Client link stopped");
                state.status.transition(KIND, LinkStatus::Stopped);
                Some(NetEvent::new(KIND, LinkStatus::Stopped))
            }
            LinkChange::Other(code) => {
                debug!("Ignoring client link event {}", code);
                None
            }
        }
    }

    async fn on_client_disconnected(&self, state: &mut CoordinatorState) -> Option<NetEvent> {
        const KIND: InterfaceKind = InterfaceKind::ClientLink;

        state.status.transition(KIND, LinkStatus::Disconnected);
        // Observers learn about the drop before the backoff wait
        state.notify(&NetEvent::new(KIND, LinkStatus::Disconnected));

        if !self.policy.allows(state.retry.attempt()) {
            error!(
                "Client link disconnected. Failed to connect after {} attempts.",
                state.retry.attempt()
            );
            return None;
        }

        let attempt = state.retry.next_attempt();
        let wait = self.policy.backoff(attempt);
        info!(
            "Client link disconnected. Retrying to connect in {:?} (attempt {})",
            wait, attempt
        );

        state.status.transition(KIND, LinkStatus::WaitingForReconnect);
        tokio::time::sleep(wait).await;

        match self.issue_connect().await {
            Ok(()) => {
                state.status.transition(KIND, LinkStatus::Connecting);
                Some(NetEvent::new(KIND, LinkStatus::Connecting))
            }
            Err(e) => {
                error!("Reconnect attempt {} failed: {}", attempt, e);
                state.status.transition(KIND, LinkStatus::Disconnected);
                Some(NetEvent::new(KIND, LinkStatus::Disconnected))
            }
        }
    }

    async fn on_access_point_link(
        &self,
        state: &mut CoordinatorState,
        change: LinkChange,
    ) -> Option<NetEvent> {
        const KIND: InterfaceKind = InterfaceKind::AccessPointLink;

        match change {
            LinkChange::Started => {
                let ip = match self.ip.ip_info(KIND).await {
                    Ok(ip) => ip,
                    Err(e) => {
                        warn!("Could not read access point address: {}", e);
                        IpInfo::UNSPECIFIED
                    }
                };
                info!("Access point started at {}", ip.address);
                state.status.mutate(|s| s.set_ip(KIND, ip));
                state.status.transition(KIND, LinkStatus::Started);
                Some(NetEvent::new(KIND, LinkStatus::Started).with_payload(EventPayload::Ip(ip)))
            }
            LinkChange::Stopped => {
                info!("Access point stopped");
                state.status.transition(KIND, LinkStatus::Stopped);
                state.status.mutate(|s| s.access_point_clients = 0);
                Some(NetEvent::new(KIND, LinkStatus::Stopped))
            }
            other => {
                debug!("Ignoring access point event {:?}", other);
                None
            }
        }
    }

    async fn issue_connect(&self) -> NetmgrResult<()> {
        self.radio
            .connect()
            .await
            .map_err(|e| NetmgrError::from_driver(InterfaceKind::ClientLink, "connect", e))
    }
}

#[async_trait]
impl EventHandler for EventCoordinator {
    async fn handle_event(&self, event: DriverEvent) {
        EventCoordinator::handle_event(self, event).await
    }
}

fn on_wired_link(state: &mut CoordinatorState, change: LinkChange) -> Option<NetEvent> {
    const KIND: InterfaceKind = InterfaceKind::WiredLink;

    let status = match change {
        LinkChange::Started => {
            info!("Wired link started");
            LinkStatus::Started
        }
        LinkChange::Stopped => {
            info!("Wired link stopped");
            LinkStatus::Stopped
        }
        LinkChange::Up => {
            if let Some(static_ip) = state.links.static_ip(KIND) {
                info!("Wired link up, using static address {}", static_ip.address);
                return Some(connected(state, KIND, static_ip.ip_info()));
            }
            info!("Wired link up, waiting for address");
            LinkStatus::Connecting
        }
        LinkChange::Down => {
            warn!("Wired link down");
            LinkStatus::Disconnected
        }
        LinkChange::Other(code) => {
            debug!("Ignoring wired link event {}", code);
            return None;
        }
    };

    state.status.transition(KIND, status);
    Some(NetEvent::new(KIND, status))
}

fn on_ip_acquired(
    state: &mut CoordinatorState,
    source: InterfaceKind,
    ip: IpInfo,
) -> Option<NetEvent> {
    match source {
        InterfaceKind::ClientLink | InterfaceKind::WiredLink if state.links.is_active(source) => {
            info!("{} link got address {}", source, ip.address);
            Some(connected(state, source, ip))
        }
        _ => {
            debug!("Dropping address event for {} link", source);
            None
        }
    }
}

fn on_membership(
    state: &mut CoordinatorState,
    change: MembershipChange,
    client: ClientId,
) -> Option<NetEvent> {
    const KIND: InterfaceKind = InterfaceKind::AccessPointLink;

    if !state.links.is_active(KIND) {
        debug!("Dropping membership event for inactive access point");
        return None;
    }

    let payload = match change {
        MembershipChange::Joined => {
            let total = state.status.client_joined();
            info!("Access point client connected: {}. Total clients: {}", client, total);
            EventPayload::ClientJoined(client)
        }
        MembershipChange::Left => {
            let total = state.status.client_left();
            info!("Access point client disconnected: {}. Total clients: {}", client, total);
            EventPayload::ClientLeft(client)
        }
    };

    let status = state.status.read_snapshot().access_point;
    Some(NetEvent::new(KIND, status).with_payload(payload))
}

/// Record an address and move the link to Connected
fn connected(state: &mut CoordinatorState, kind: InterfaceKind, ip: IpInfo) -> NetEvent {
    if kind == InterfaceKind::ClientLink {
        state.retry.reset();
    }
    state.status.mutate(|s| s.set_ip(kind, ip));
    state.status.transition(kind, LinkStatus::Connected);
    NetEvent::new(kind, LinkStatus::Connected).with_payload(EventPayload::Ip(ip))
}
