//! Error types for netmgr

use crate::types::InterfaceKind;
use std::io;
use thiserror::Error;

/// Error reported by an interface driver or the IP stack
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The driver refused the command
    #[error("rejected: {0}")]
    Rejected(String),
    /// The interface the command targets has not been started
    #[error("interface not started")]
    NotStarted,
    /// The underlying hardware is missing or unusable
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum NetmgrError {
    /// API called before `init`
    #[error("Network manager not initialized")]
    NotInitialized,
    /// Query or command against a stopped or never-started interface
    #[error("Interface not active: {0}")]
    InterfaceNotActive(InterfaceKind),
    /// Underlying driver rejected start/stop/connect
    #[error("Driver command '{command}' failed on {kind}: {source}")]
    DriverCommandFailed {
        kind: InterfaceKind,
        command: &'static str,
        #[source]
        source: DriverError,
    },
    /// Persisted blob present but malformed or of the wrong size
    #[error("Stored configuration could not be decoded: {0}")]
    StorageDecodeError(String),
    /// An enabled interface is missing required fields or has out-of-range values
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),
    /// Backing store failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),
    /// Settings file could not be read or parsed
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Event loop dispatch task has exited
    #[error("Event loop is closed")]
    EventLoopClosed,
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl NetmgrError {
    /// Wrap a driver failure, keeping "not started" distinct from a rejection
    pub fn from_driver(kind: InterfaceKind, command: &'static str, source: DriverError) -> Self {
        match source {
            DriverError::NotStarted => NetmgrError::InterfaceNotActive(kind),
            source => NetmgrError::DriverCommandFailed { kind, command, source },
        }
    }
}

impl From<bincode::Error> for NetmgrError {
    fn from(error: bincode::Error) -> Self {
        NetmgrError::StorageDecodeError(error.to_string())
    }
}

pub type NetmgrResult<T> = Result<T, NetmgrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started_maps_to_not_active() {
        let err = NetmgrError::from_driver(
            InterfaceKind::ClientLink,
            "connect",
            DriverError::NotStarted,
        );
        assert!(matches!(err, NetmgrError::InterfaceNotActive(InterfaceKind::ClientLink)));

        let err = NetmgrError::from_driver(
            InterfaceKind::WiredLink,
            "start",
            DriverError::Rejected("busy".to_string()),
        );
        match err {
            NetmgrError::DriverCommandFailed { kind, command, .. } => {
                assert_eq!(kind, InterfaceKind::WiredLink);
                assert_eq!(command, "start");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
