//! Observer of normalized events
//!
//! The observer runs inside the coordinator's critical section. It must
//! return quickly and must not call back into the manager.

use crate::types::NetEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub trait Observer: Send + Sync {
    fn on_event(&self, event: &NetEvent);
}

impl<F> Observer for F
where
    F: Fn(&NetEvent) + Send + Sync,
{
    fn on_event(&self, event: &NetEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded channel for consumption elsewhere
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<NetEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn on_event(&self, event: &NetEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(*event);
    }
}

/// Logs every event through `tracing`
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn on_event(&self, event: &NetEvent) {
        use crate::types::LinkStatus;
        match event.status {
            LinkStatus::Disconnected => warn!("{}", event),
            _ => info!("{}", event),
        }
    }
}
