//! netmgr - Network Interface Coordinator
//!
//! Async library giving one coordinated view over the network links of a
//! small device:
//! - Wireless client link with bounded exponential-backoff reconnect
//! - Wireless access point with station accounting
//! - Wired Ethernet link
//! - Static or DHCP addressing per link
//! - Persisted system configuration
//!
//! Drivers are reached through the traits in [`driver`]; [`sim`] provides
//! in-memory implementations.

pub mod error;
pub mod types;
pub mod validation;
pub mod config;
pub mod status;
pub mod retry;
pub mod driver;
pub mod events;
pub mod observer;
pub mod coordinator;
pub mod storage;
pub mod lifecycle;
pub mod sim;

// Re-export commonly used types
pub use error::{DriverError, NetmgrError, NetmgrResult};
pub use types::{
    ClientId, ClientInfo, DnsInfo, DnsType, EventPayload, InterfaceKind, IpInfo, LinkStatus,
    NetEvent,
};
pub use config::{
    AccessPointConfig, AuthMode, ClientLinkConfig, ManagerSettings, RetrySettings, StaticIpConfig,
    StorageSettings, SystemConfig, WiredLinkConfig,
};
pub use status::Status;
pub use retry::RetryPolicy;
pub use driver::{DriverSet, IpStack, RadioDriver, RadioMode, WiredDriver};
pub use events::{DriverEvent, EventLoop, LinkChange};
pub use observer::{ChannelObserver, LoggingObserver, Observer};
pub use coordinator::EventCoordinator;
pub use storage::{ConfigStore, FileStore, MemoryStore};
pub use lifecycle::NetManager;
