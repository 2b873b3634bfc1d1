//! Input validation for link configuration
//!
//! Enforces the limits the radio and IP layers impose before a configuration
//! is handed to the drivers.

use crate::error::{NetmgrError, NetmgrResult};
use std::net::Ipv4Addr;

/// Maximum SSID length in bytes (802.11 limit)
pub const MAX_SSID_LEN: usize = 32;

/// Maximum secret length in bytes (63-char passphrase or 64-hex PSK)
pub const MAX_SECRET_LEN: usize = 64;

/// Minimum WPA2 passphrase length
pub const MIN_SECRET_LEN: usize = 8;

/// Maximum number of stations the access point accepts
pub const MAX_AP_CLIENTS: u8 = 10;

/// Validate WiFi SSID
///
/// SSIDs are 1-32 bytes and may not contain control characters
pub fn validate_ssid(ssid: &str) -> NetmgrResult<()> {
    if ssid.is_empty() {
        return Err(NetmgrError::ConfigurationInvalid("SSID cannot be empty".to_string()));
    }

    if ssid.len() > MAX_SSID_LEN {
        return Err(NetmgrError::ConfigurationInvalid(format!(
            "SSID cannot exceed {} bytes",
            MAX_SSID_LEN
        )));
    }

    if ssid.chars().any(|c| c.is_control()) {
        return Err(NetmgrError::ConfigurationInvalid(
            "SSID contains invalid control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate a link secret
///
/// An empty secret selects an open network. Otherwise WPA2 requires 8-64
/// ASCII characters.
pub fn validate_secret(secret: &str) -> NetmgrResult<()> {
    if secret.is_empty() {
        return Ok(());
    }

    if secret.len() < MIN_SECRET_LEN {
        return Err(NetmgrError::ConfigurationInvalid(format!(
            "Secret must be at least {} characters (or empty for an open network)",
            MIN_SECRET_LEN
        )));
    }

    if secret.len() > MAX_SECRET_LEN {
        return Err(NetmgrError::ConfigurationInvalid(format!(
            "Secret cannot exceed {} characters",
            MAX_SECRET_LEN
        )));
    }

    if !secret.is_ascii() || secret.chars().any(|c| c.is_control()) {
        return Err(NetmgrError::ConfigurationInvalid(
            "Secret must contain only printable ASCII characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate 2.4GHz channel
pub fn validate_channel(channel: u8) -> NetmgrResult<()> {
    if !(1..=13).contains(&channel) {
        return Err(NetmgrError::ConfigurationInvalid(format!(
            "Invalid channel {} (expected 1-13)",
            channel
        )));
    }
    Ok(())
}

/// Validate access point station limit
pub fn validate_max_clients(max_clients: u8) -> NetmgrResult<()> {
    if max_clients == 0 || max_clients > MAX_AP_CLIENTS {
        return Err(NetmgrError::ConfigurationInvalid(format!(
            "Max clients must be between 1 and {}",
            MAX_AP_CLIENTS
        )));
    }
    Ok(())
}

/// Validate that a netmask is a contiguous run of leading ones
pub fn validate_netmask(mask: Ipv4Addr) -> NetmgrResult<()> {
    let bits = u32::from(mask);
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(NetmgrError::ConfigurationInvalid(format!("Invalid netmask: {}", mask)));
    }
    Ok(())
}

/// Validate a static IPv4 assignment
pub fn validate_static_address(address: Ipv4Addr, netmask: Ipv4Addr) -> NetmgrResult<()> {
    if address.is_unspecified() || address.is_broadcast() || address.is_multicast() {
        return Err(NetmgrError::ConfigurationInvalid(format!(
            "Invalid static address: {}",
            address
        )));
    }
    validate_netmask(netmask)
}
