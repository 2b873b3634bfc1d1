//! Manager Scenario Tests
//!
//! End-to-end scenarios for the network manager running on simulated drivers:
//! 1. Client link connect and bounded reconnect
//! 2. Access point station accounting
//! 3. Wired link with static and dynamic addressing
//! 4. Lifecycle: init/stop/deinit idempotence, fail-fast start
//! 5. Configuration persistence

use libnetmgr::sim::{SimNetwork, SIM_AP_ADDRESS};
use libnetmgr::{
    ChannelObserver, ClientId, ConfigStore, DnsType, EventLoop, FileStore, InterfaceKind, IpInfo,
    LinkStatus, ManagerSettings, MemoryStore, NetEvent, NetManager, NetmgrError, StaticIpConfig,
    SystemConfig,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    manager: NetManager,
    sim: SimNetwork,
    events: Arc<EventLoop>,
    rx: UnboundedReceiver<NetEvent>,
}

impl Harness {
    async fn new(settings: ManagerSettings) -> Self {
        Self::with_store(settings, Arc::new(MemoryStore::new())).await
    }

    async fn with_store(settings: ManagerSettings, store: Arc<dyn ConfigStore>) -> Self {
        let events = EventLoop::spawn();
        let sim = SimNetwork::new(events.clone());
        let manager = NetManager::new(sim.drivers(), events.clone(), store, settings);
        let (observer, rx) = ChannelObserver::new();
        manager.init(Some(Arc::new(observer))).await.unwrap();
        Self { manager, sim, events, rx }
    }

    fn drain(&mut self) -> Vec<(InterfaceKind, LinkStatus)> {
        let mut seen = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            seen.push((event.source, event.status));
        }
        seen
    }
}

fn client_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.client_enabled = true;
    config.client.ssid = "net1".to_string();
    config.client.secret = "password123".to_string();
    config
}

fn access_point_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.access_point_enabled = true;
    config.access_point.ssid = "netmgr-ap".to_string();
    config
}

fn wired_config(static_ip: Option<StaticIpConfig>) -> SystemConfig {
    let mut config = SystemConfig::default();
    config.wired_enabled = true;
    config.wired.static_ip = static_ip;
    config
}

fn lease(last: u8) -> IpInfo {
    IpInfo::new(
        Ipv4Addr::new(192, 168, 1, last),
        Ipv4Addr::new(255, 255, 255, 0),
        Ipv4Addr::new(192, 168, 1, 1),
    )
}

fn station(n: u8) -> ClientId {
    ClientId { mac: [0x02, 0, 0, 0, 0, n], aid: n as u16 }
}

// =============================================================================
// Client Link Tests
// =============================================================================

mod client_tests {
    use super::*;

    #[tokio::test]
    async fn test_client_connects_on_lease() {
        let mut h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(client_config())).await.unwrap();
        h.sim.settle().await.unwrap();

        assert_eq!(h.manager.get_status().await.unwrap().client, LinkStatus::Connecting);
        assert_eq!(h.sim.control.count("radio.connect").await, 1);

        h.sim.client_associated().unwrap();
        h.sim
            .dhcp_lease(InterfaceKind::ClientLink, lease(50), Some(Ipv4Addr::new(192, 168, 1, 1)))
            .await
            .unwrap();
        h.sim.settle().await.unwrap();

        let status = h.manager.get_status().await.unwrap();
        assert_eq!(status.client, LinkStatus::Connected);
        assert_eq!(status.client_ip, lease(50));
        assert!(h.manager.is_connected(InterfaceKind::ClientLink).await.unwrap());
        assert_eq!(h.manager.get_ip_info(InterfaceKind::ClientLink).await.unwrap(), lease(50));
        assert_eq!(
            h.manager
                .get_dns_info(InterfaceKind::ClientLink, DnsType::Primary)
                .await
                .unwrap()
                .server,
            Ipv4Addr::new(192, 168, 1, 1)
        );

        // Association alone is not reported for a DHCP link
        use InterfaceKind::ClientLink as C;
        assert_eq!(h.drain(), vec![(C, LinkStatus::Connecting), (C, LinkStatus::Connected)]);

        let radio = h.sim.radio.client_config().await.unwrap();
        assert_eq!(radio.ssid, "net1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_gives_up_after_max_retries() {
        let mut settings = ManagerSettings::default();
        settings.retry.max_retries = 3;
        let mut h = Harness::new(settings).await;
        h.manager.start(Some(client_config())).await.unwrap();
        h.sim.settle().await.unwrap();

        let before = tokio::time::Instant::now();
        for _ in 0..4 {
            h.sim.client_lost().await.unwrap();
            h.sim.settle().await.unwrap();
        }

        // 2s + 4s + 8s of backoff, then no fourth reconnect
        assert!(before.elapsed() >= Duration::from_secs(14));
        assert_eq!(h.sim.control.count("radio.connect").await, 1 + 3);

        use InterfaceKind::ClientLink as C;
        assert_eq!(
            h.drain(),
            vec![
                (C, LinkStatus::Connecting),
                (C, LinkStatus::Disconnected),
                (C, LinkStatus::Connecting),
                (C, LinkStatus::Disconnected),
                (C, LinkStatus::Connecting),
                (C, LinkStatus::Disconnected),
                (C, LinkStatus::Connecting),
                (C, LinkStatus::Disconnected),
            ]
        );
        assert_eq!(h.manager.get_status().await.unwrap().client, LinkStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_resets_reconnect_budget() {
        let mut settings = ManagerSettings::default();
        settings.retry.max_retries = 1;
        let h = Harness::new(settings).await;
        h.manager.start(Some(client_config())).await.unwrap();
        h.sim.settle().await.unwrap();

        h.sim.client_lost().await.unwrap();
        h.sim.dhcp_lease(InterfaceKind::ClientLink, lease(50), None).await.unwrap();
        h.sim.settle().await.unwrap();
        assert_eq!(h.manager.coordinator().retry_attempt().await, 0);

        // The budget is available again after a successful lease
        h.sim.client_lost().await.unwrap();
        h.sim.settle().await.unwrap();
        assert_eq!(h.manager.get_status().await.unwrap().client, LinkStatus::Connecting);
        assert_eq!(h.sim.control.count("radio.connect").await, 3);
    }

    #[tokio::test]
    async fn test_static_client_connects_on_association() {
        let mut config = client_config();
        config.client.static_ip = Some(StaticIpConfig {
            address: Ipv4Addr::new(192, 168, 1, 20),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns_primary: None,
            dns_secondary: None,
        });

        let h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(config)).await.unwrap();
        h.sim.client_associated().unwrap();
        h.sim.settle().await.unwrap();

        let status = h.manager.get_status().await.unwrap();
        assert_eq!(status.client, LinkStatus::Connected);
        assert_eq!(status.client_ip.address, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(h.sim.control.count("ip.apply_static(client)").await, 1);
    }
}

// =============================================================================
// Access Point Tests
// =============================================================================

mod access_point_tests {
    use super::*;

    #[tokio::test]
    async fn test_station_accounting() {
        let mut h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(access_point_config())).await.unwrap();
        h.sim.settle().await.unwrap();

        let status = h.manager.get_status().await.unwrap();
        assert_eq!(status.access_point, LinkStatus::Started);
        assert_eq!(status.access_point_ip.address, SIM_AP_ADDRESS);

        h.sim.station_joined(station(1), -40).await.unwrap();
        h.sim.station_joined(station(2), -60).await.unwrap();
        h.sim.station_left(station(1)).await.unwrap();
        h.sim.settle().await.unwrap();

        let status = h.manager.get_status().await.unwrap();
        assert_eq!(status.access_point_clients, 1);
        assert_eq!(status.access_point, LinkStatus::Started);

        let clients = h.manager.get_access_point_clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].mac, station(2).mac);

        // One start event plus one pulse per membership change
        let events = h.drain();
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| *e == (InterfaceKind::AccessPointLink, LinkStatus::Started)));
    }

    #[tokio::test]
    async fn test_open_access_point_has_open_auth() {
        let h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(access_point_config())).await.unwrap();

        let radio = h.sim.radio.access_point_config().await.unwrap();
        assert_eq!(radio.ssid, "netmgr-ap");
        assert_eq!(radio.auth_mode, libnetmgr::AuthMode::Open);
        assert_eq!(h.sim.radio.mode().await, Some(libnetmgr::RadioMode::AccessPoint));
    }
}

// =============================================================================
// Wired Link Tests
// =============================================================================

mod wired_tests {
    use super::*;

    fn static_ip() -> StaticIpConfig {
        StaticIpConfig {
            address: Ipv4Addr::new(10, 0, 0, 5),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            dns_primary: Some(Ipv4Addr::new(10, 0, 0, 1)),
            dns_secondary: Some(Ipv4Addr::new(8, 8, 8, 8)),
        }
    }

    #[tokio::test]
    async fn test_static_wired_link() {
        let h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(wired_config(Some(static_ip())))).await.unwrap();
        h.sim.settle().await.unwrap();
        assert_eq!(h.manager.get_status().await.unwrap().wired, LinkStatus::Started);

        h.sim.wired_plugged().unwrap();
        h.sim.settle().await.unwrap();

        let status = h.manager.get_status().await.unwrap();
        assert_eq!(status.wired, LinkStatus::Connected);
        assert_eq!(status.wired_ip, static_ip().ip_info());

        assert_eq!(
            h.manager.get_ip_info(InterfaceKind::WiredLink).await.unwrap(),
            static_ip().ip_info()
        );
        let dns = h
            .manager
            .get_dns_info(InterfaceKind::WiredLink, DnsType::Secondary)
            .await
            .unwrap();
        assert_eq!(dns.server, Ipv4Addr::new(8, 8, 8, 8));

        // Static addressing is applied before the port starts
        let commands = h.sim.control.commands().await;
        let applied = commands.iter().position(|c| c == "ip.apply_static(wired)").unwrap();
        let started = commands.iter().position(|c| c == "wired.start(0)").unwrap();
        assert!(applied < started);
    }

    #[tokio::test]
    async fn test_dhcp_wired_link_cycle() {
        let mut h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(wired_config(None))).await.unwrap();

        h.sim.wired_plugged().unwrap();
        h.sim.dhcp_lease(InterfaceKind::WiredLink, lease(60), None).await.unwrap();
        h.sim.settle().await.unwrap();
        assert!(h.manager.is_connected(InterfaceKind::WiredLink).await.unwrap());

        h.sim.wired_unplugged().await.unwrap();
        h.sim.vendor_event(InterfaceKind::WiredLink, 99).unwrap();
        h.sim.settle().await.unwrap();

        use InterfaceKind::WiredLink as W;
        assert_eq!(
            h.drain(),
            vec![
                (W, LinkStatus::Started),
                (W, LinkStatus::Connecting),
                (W, LinkStatus::Connected),
                (W, LinkStatus::Disconnected),
            ]
        );
        let status = h.manager.get_status().await.unwrap();
        assert!(status.wired_ip.is_unspecified());
    }

    #[tokio::test]
    async fn test_no_wired_ports() {
        let events = EventLoop::spawn();
        let sim = SimNetwork::with_wired_ports(events.clone(), 0);
        let manager = NetManager::new(
            sim.drivers(),
            events,
            Arc::new(MemoryStore::new()),
            ManagerSettings::default(),
        );
        manager.init(None).await.unwrap();

        let err = manager.start(Some(wired_config(None))).await.unwrap_err();
        assert!(matches!(
            err,
            NetmgrError::DriverCommandFailed {
                kind: InterfaceKind::WiredLink,
                command: "install",
                ..
            }
        ));
        assert!(!sim.ip.exists(InterfaceKind::WiredLink).await);
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

mod lifecycle_tests {
    use super::*;

    fn dual_config() -> SystemConfig {
        let mut config = client_config();
        config.access_point_enabled = true;
        config.access_point.ssid = "netmgr-ap".to_string();
        config
    }

    #[tokio::test]
    async fn test_start_order() {
        let h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(dual_config())).await.unwrap();

        // Dispatch of the start events may already have issued a connect
        let commands = h.sim.control.commands().await;
        assert_eq!(
            commands[..7],
            [
                "radio.init",
                "radio.set_mode",
                "ip.create(client)",
                "radio.configure_client",
                "ip.create(access-point)",
                "radio.configure_access_point",
                "radio.start",
            ]
        );
        assert_eq!(h.sim.radio.mode().await, Some(libnetmgr::RadioMode::Dual));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(dual_config())).await.unwrap();
        h.sim.settle().await.unwrap();

        h.manager.stop().await.unwrap();
        h.sim.settle().await.unwrap();
        let stopped = h.manager.get_status().await.unwrap();
        assert_eq!(stopped, libnetmgr::Status::stopped());

        h.manager.stop().await.unwrap();
        assert_eq!(h.manager.get_status().await.unwrap(), stopped);

        assert!(!h.sim.ip.exists(InterfaceKind::ClientLink).await);
        assert!(matches!(
            h.manager.get_ip_info(InterfaceKind::ClientLink).await,
            Err(NetmgrError::InterfaceNotActive(InterfaceKind::ClientLink))
        ));

        // Late events for stopped links change nothing
        h.sim.dhcp_lease(InterfaceKind::ClientLink, lease(50), None).await.unwrap();
        h.sim.settle().await.unwrap();
        assert_eq!(h.manager.get_status().await.unwrap(), stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_drops_events_from_previous_session() {
        let mut settings = ManagerSettings::default();
        settings.retry.max_retries = 1;
        let mut h = Harness::new(settings).await;
        h.manager.start(Some(client_config())).await.unwrap();
        h.sim.settle().await.unwrap();
        h.drain();

        // The drop is still queued when the manager restarts
        h.sim.client_lost().await.unwrap();
        h.manager.start(Some(client_config())).await.unwrap();
        h.sim.settle().await.unwrap();

        assert_eq!(h.manager.coordinator().retry_attempt().await, 0);
        let seen = h.drain();
        assert!(!seen.iter().any(|(_, status)| *status == LinkStatus::Stopped));
        assert_eq!(seen.last(), Some(&(InterfaceKind::ClientLink, LinkStatus::Connecting)));
        assert_eq!(h.manager.get_status().await.unwrap().client, LinkStatus::Connecting);

        // The fresh session still has its whole retry budget
        h.sim.client_lost().await.unwrap();
        h.sim.settle().await.unwrap();
        assert_eq!(h.manager.coordinator().retry_attempt().await, 1);
        assert_eq!(h.manager.get_status().await.unwrap().client, LinkStatus::Connecting);
    }

    #[tokio::test]
    async fn test_restart_keeps_new_links_running() {
        let mut h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(dual_config())).await.unwrap();
        h.sim.settle().await.unwrap();
        h.drain();

        h.manager.start(Some(dual_config())).await.unwrap();
        h.sim.settle().await.unwrap();

        let seen = h.drain();
        assert!(!seen.iter().any(|(_, status)| *status == LinkStatus::Stopped));
        assert!(seen.contains(&(InterfaceKind::ClientLink, LinkStatus::Connecting)));
        assert!(seen.contains(&(InterfaceKind::AccessPointLink, LinkStatus::Started)));

        let status = h.manager.get_status().await.unwrap();
        assert_eq!(status.client, LinkStatus::Connecting);
        assert_eq!(status.access_point, LinkStatus::Started);
    }

    #[tokio::test]
    async fn test_init_twice_delivers_once() {
        let mut h = Harness::new(ManagerSettings::default()).await;
        let (second, mut second_rx) = ChannelObserver::new();
        h.manager.init(Some(Arc::new(second))).await.unwrap();
        assert_eq!(h.events.handler_count().await, 3);

        h.manager.start(Some(wired_config(None))).await.unwrap();
        h.sim.settle().await.unwrap();

        assert_eq!(h.drain(), vec![(InterfaceKind::WiredLink, LinkStatus::Started)]);
        // The second init kept the first observer
        assert!(second_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deinit_unregisters() {
        let h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(wired_config(None))).await.unwrap();
        h.manager.deinit().await.unwrap();

        assert_eq!(h.events.handler_count().await, 0);
        assert!(!h.sim.ip.exists(InterfaceKind::WiredLink).await);
        assert!(matches!(
            h.manager.get_status().await,
            Err(NetmgrError::NotInitialized)
        ));
        h.manager.deinit().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_fast() {
        let h = Harness::new(ManagerSettings::default()).await;
        h.sim.control.fail("radio.configure_access_point").await;

        let err = h.manager.start(Some(dual_config())).await.unwrap_err();
        assert!(matches!(
            err,
            NetmgrError::DriverCommandFailed {
                kind: InterfaceKind::AccessPointLink,
                command: "configure",
                ..
            }
        ));

        // Earlier steps are not rolled back, and the radio never started
        assert!(h.sim.ip.exists(InterfaceKind::ClientLink).await);
        assert_eq!(h.sim.control.count("radio.start").await, 0);

        h.manager.stop().await.unwrap();
        assert!(!h.sim.ip.exists(InterfaceKind::ClientLink).await);
        assert!(!h.sim.ip.exists(InterfaceKind::AccessPointLink).await);
    }

    #[tokio::test]
    async fn test_restart_replaces_running_links() {
        let h = Harness::new(ManagerSettings::default()).await;
        h.manager.start(Some(dual_config())).await.unwrap();
        h.manager.start(Some(wired_config(None))).await.unwrap();
        h.sim.settle().await.unwrap();

        assert!(!h.sim.ip.exists(InterfaceKind::ClientLink).await);
        assert!(h.sim.ip.exists(InterfaceKind::WiredLink).await);
        let status = h.manager.get_status().await.unwrap();
        assert_eq!(status.client, LinkStatus::Stopped);
        assert_eq!(status.wired, LinkStatus::Started);
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load_across_managers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = client_config();
        config.wired_enabled = true;

        {
            let store = Arc::new(FileStore::new(dir.path()));
            let h = Harness::with_store(ManagerSettings::default(), store).await;
            assert_eq!(h.manager.load_config().await.unwrap(), None);
            h.manager.save_config(&config).await.unwrap();
        }

        let store = Arc::new(FileStore::new(dir.path()));
        let h = Harness::with_store(ManagerSettings::default(), store).await;
        assert_eq!(h.manager.load_config().await.unwrap(), Some(config));

        // Stored configuration wins over the defaults
        h.manager.start(None).await.unwrap();
        assert!(h.sim.ip.exists(InterfaceKind::ClientLink).await);
        assert!(h.sim.ip.exists(InterfaceKind::WiredLink).await);
    }

    #[tokio::test]
    async fn test_corrupt_blob_falls_back_to_defaults() {
        let store = Arc::new(MemoryStore::new());
        let settings = ManagerSettings {
            defaults: access_point_config(),
            ..Default::default()
        };
        store
            .save(&settings.storage.namespace, &settings.storage.key, &[0xde, 0xad])
            .await
            .unwrap();

        let h = Harness::with_store(settings, store).await;
        assert!(matches!(
            h.manager.load_config().await,
            Err(NetmgrError::StorageDecodeError(_))
        ));

        h.manager.start(None).await.unwrap();
        assert!(h.sim.ip.exists(InterfaceKind::AccessPointLink).await);
        assert!(!h.sim.ip.exists(InterfaceKind::ClientLink).await);
    }

    #[tokio::test]
    async fn test_invalid_config_not_saved() {
        let h = Harness::new(ManagerSettings::default()).await;
        let mut config = SystemConfig::default();
        config.access_point_enabled = true;
        config.access_point.ssid = "netmgr-ap".to_string();
        config.access_point.secret = "short".to_string();

        assert!(matches!(
            h.manager.save_config(&config).await,
            Err(NetmgrError::ConfigurationInvalid(_))
        ));
        assert_eq!(h.manager.load_config().await.unwrap(), None);
    }
}
