//! Raw driver events and the loop that delivers them
//!
//! Drivers post [`DriverEvent`]s from whatever context they run in; a single
//! dispatch task hands each event, in posting order, to every handler
//! registered for the event's base. Handlers run on that task.

use crate::error::{NetmgrError, NetmgrResult};
use crate::types::{ClientId, InterfaceKind, IpInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, trace};

/// Link-level change reported by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkChange {
    /// Driver started the link
    Started,
    /// Driver stopped the link
    Stopped,
    /// Carrier or association established
    Up,
    /// Carrier or association lost
    Down,
    /// Driver-specific event the coordinator does not interpret
    Other(u32),
}

/// Access point station membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipChange {
    Joined,
    Left,
}

/// Event emitted by a driver or the IP stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverEvent {
    LinkState {
        source: InterfaceKind,
        change: LinkChange,
    },
    IpAcquired {
        source: InterfaceKind,
        ip_info: IpInfo,
    },
    ClientMembership {
        change: MembershipChange,
        client: ClientId,
    },
}

impl DriverEvent {
    pub fn link(source: InterfaceKind, change: LinkChange) -> Self {
        DriverEvent::LinkState { source, change }
    }

    pub fn ip_acquired(source: InterfaceKind, ip_info: IpInfo) -> Self {
        DriverEvent::IpAcquired { source, ip_info }
    }

    pub fn client_joined(client: ClientId) -> Self {
        DriverEvent::ClientMembership { change: MembershipChange::Joined, client }
    }

    pub fn client_left(client: ClientId) -> Self {
        DriverEvent::ClientMembership { change: MembershipChange::Left, client }
    }

    /// Subsystem that emitted the event
    pub fn base(&self) -> EventBase {
        match self {
            DriverEvent::LinkState { source: InterfaceKind::WiredLink, .. } => EventBase::Ethernet,
            DriverEvent::LinkState { .. } => EventBase::Wifi,
            DriverEvent::ClientMembership { .. } => EventBase::Wifi,
            DriverEvent::IpAcquired { .. } => EventBase::Ip,
        }
    }
}

/// Event source a handler subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventBase {
    Wifi,
    Ip,
    Ethernet,
}

impl EventBase {
    pub const ALL: [EventBase; 3] = [EventBase::Wifi, EventBase::Ip, EventBase::Ethernet];
}

/// Consumer of raw driver events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: DriverEvent);
}

/// Registration handle returned by [`EventLoop::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    base: EventBase,
    handler: Arc<dyn EventHandler>,
}

enum Message {
    Event(DriverEvent),
    Flush(oneshot::Sender<()>),
}

/// Ordered event queue with a single dispatch task
pub struct EventLoop {
    tx: mpsc::UnboundedSender<Message>,
    handlers: Arc<RwLock<Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventLoop {
    /// Create the loop and spawn its dispatch task on the current runtime
    pub fn spawn() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handlers = Arc::new(RwLock::new(Vec::new()));

        tokio::spawn(Self::dispatch_loop(rx, handlers.clone()));

        Arc::new(Self {
            tx,
            handlers,
            next_id: AtomicU64::new(1),
        })
    }

    /// Subscribe a handler to one event base
    pub async fn register(&self, base: EventBase, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().await.push(Registration { id, base, handler });
        debug!("Registered event handler {:?} for {:?}", id, base);
        id
    }

    /// Remove a subscription; returns false if it was not registered
    pub async fn unregister(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().await;
        let before = handlers.len();
        handlers.retain(|r| r.id != id);
        before != handlers.len()
    }

    /// Number of live subscriptions
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Queue an event for delivery; never blocks
    pub fn post(&self, event: DriverEvent) -> NetmgrResult<()> {
        self.tx
            .send(Message::Event(event))
            .map_err(|_| NetmgrError::EventLoopClosed)
    }

    /// Wait until every event posted before this call has been delivered
    pub async fn flush(&self) -> NetmgrResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Message::Flush(done_tx))
            .map_err(|_| NetmgrError::EventLoopClosed)?;
        done_rx.await.map_err(|_| NetmgrError::EventLoopClosed)
    }

    async fn dispatch_loop(
        mut rx: mpsc::UnboundedReceiver<Message>,
        handlers: Arc<RwLock<Vec<Registration>>>,
    ) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Event(event) => {
                    let base = event.base();
                    // Snapshot so handlers may (un)register without deadlocking
                    let targets: Vec<Arc<dyn EventHandler>> = handlers
                        .read()
                        .await
                        .iter()
                        .filter(|r| r.base == base)
                        .map(|r| r.handler.clone())
                        .collect();

                    trace!("Dispatching {:?} to {} handler(s)", event, targets.len());
                    for handler in targets {
                        handler.handle_event(event).await;
                    }
                }
                Message::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Event loop dispatch task exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<DriverEvent>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: DriverEvent) {
            self.seen.lock().await.push(event);
        }
    }

    #[test]
    fn test_event_bases() {
        assert_eq!(
            DriverEvent::link(InterfaceKind::WiredLink, LinkChange::Up).base(),
            EventBase::Ethernet
        );
        assert_eq!(
            DriverEvent::link(InterfaceKind::AccessPointLink, LinkChange::Started).base(),
            EventBase::Wifi
        );
        assert_eq!(
            DriverEvent::ip_acquired(InterfaceKind::ClientLink, IpInfo::UNSPECIFIED).base(),
            EventBase::Ip
        );
        let client = ClientId { mac: [0; 6], aid: 1 };
        assert_eq!(DriverEvent::client_joined(client).base(), EventBase::Wifi);
    }

    #[tokio::test]
    async fn test_dispatch_by_base_in_order() {
        let events = EventLoop::spawn();
        let wifi = Arc::new(Recorder::default());
        let eth = Arc::new(Recorder::default());
        events.register(EventBase::Wifi, wifi.clone()).await;
        events.register(EventBase::Ethernet, eth.clone()).await;

        events.post(DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Started)).unwrap();
        events.post(DriverEvent::link(InterfaceKind::WiredLink, LinkChange::Up)).unwrap();
        events.post(DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Down)).unwrap();
        events.flush().await.unwrap();

        assert_eq!(
            *wifi.seen.lock().await,
            vec![
                DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Started),
                DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Down),
            ]
        );
        assert_eq!(
            *eth.seen.lock().await,
            vec![DriverEvent::link(InterfaceKind::WiredLink, LinkChange::Up)]
        );
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let events = EventLoop::spawn();
        let recorder = Arc::new(Recorder::default());
        let id = events.register(EventBase::Wifi, recorder.clone()).await;

        assert!(events.unregister(id).await);
        assert!(!events.unregister(id).await);
        assert_eq!(events.handler_count().await, 0);

        events.post(DriverEvent::link(InterfaceKind::ClientLink, LinkChange::Started)).unwrap();
        events.flush().await.unwrap();
        assert!(recorder.seen.lock().await.is_empty());
    }
}
