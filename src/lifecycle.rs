//! Lifecycle manager
//!
//! Owns init/start/stop/deinit ordering and the driver handles. Every
//! lifecycle operation runs inside the coordinator's critical section, so a
//! start or stop never interleaves with event handling.

use crate::config::{
    AccessPointConfig, ClientLinkConfig, ManagerSettings, StaticIpConfig, SystemConfig,
    WiredLinkConfig,
};
use crate::coordinator::{CoordinatorState, EventCoordinator};
use crate::driver::{AccessPointRadioConfig, ClientRadioConfig, DriverSet, RadioMode};
use crate::error::{DriverError, NetmgrError, NetmgrResult};
use crate::events::{EventBase, EventLoop, HandlerId};
use crate::observer::Observer;
use crate::retry::RetryPolicy;
use crate::status::{Status, StatusStore};
use crate::storage::{self, ConfigStore};
use crate::types::{ClientInfo, DnsInfo, DnsType, InterfaceKind, IpInfo, LinkStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Driver resources brought up by the current `start`
#[derive(Debug, Default)]
pub(crate) struct ActiveLinks {
    /// Working copy of the configuration the links were started with
    config: Option<SystemConfig>,
    /// Radio initialized in this mode
    radio: Option<RadioMode>,
    radio_started: bool,
    client: bool,
    access_point: bool,
    wired_installed: bool,
    wired: bool,
    wired_port: Option<usize>,
}

impl ActiveLinks {
    /// Whether the link's network interface exists
    pub(crate) fn is_active(&self, kind: InterfaceKind) -> bool {
        match kind {
            InterfaceKind::ClientLink => self.client,
            InterfaceKind::AccessPointLink => self.access_point,
            InterfaceKind::WiredLink => self.wired,
        }
    }

    pub(crate) fn static_ip(&self, kind: InterfaceKind) -> Option<StaticIpConfig> {
        self.config.as_ref()?.static_ip(kind).copied()
    }

    #[cfg(test)]
    pub(crate) fn activate_for_test(&mut self, config: SystemConfig) {
        self.client = config.client_enabled;
        self.access_point = config.access_point_enabled;
        self.wired = config.wired_enabled;
        self.config = Some(config);
    }
}

#[derive(Default)]
struct Registration {
    initialized: bool,
    handlers: Vec<HandlerId>,
}

/// Entry point: a single coordinated view over the client, access point
/// and wired links
pub struct NetManager {
    coordinator: Arc<EventCoordinator>,
    drivers: DriverSet,
    events: Arc<EventLoop>,
    store: Arc<dyn ConfigStore>,
    settings: ManagerSettings,
    registration: Mutex<Registration>,
    initialized: AtomicBool,
}

impl NetManager {
    pub fn new(
        drivers: DriverSet,
        events: Arc<EventLoop>,
        store: Arc<dyn ConfigStore>,
        settings: ManagerSettings,
    ) -> Self {
        let policy = RetryPolicy::from_settings(&settings.retry);
        let coordinator = Arc::new(EventCoordinator::new(
            drivers.radio.clone(),
            drivers.ip.clone(),
            policy,
        ));

        Self {
            coordinator,
            drivers,
            events,
            store,
            settings,
            registration: Mutex::new(Registration::default()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn coordinator(&self) -> &Arc<EventCoordinator> {
        &self.coordinator
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_initialized(&self) -> NetmgrResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(NetmgrError::NotInitialized)
        }
    }

    /// Register with the driver event sources and install the observer.
    /// Calling it again while initialized is a successful no-op.
    pub async fn init(&self, observer: Option<Arc<dyn Observer>>) -> NetmgrResult<()> {
        let mut registration = self.registration.lock().await;
        if registration.initialized {
            warn!("Already initialized");
            return Ok(());
        }

        {
            let mut state = self.coordinator.lock().await;
            state.status = StatusStore::new();
            state.retry.reset();
            state.observer = observer;
        }

        for base in EventBase::ALL {
            let id = self.events.register(base, self.coordinator.clone()).await;
            registration.handlers.push(id);
        }

        registration.initialized = true;
        self.initialized.store(true, Ordering::Release);
        info!("Initialized successfully");
        Ok(())
    }

    /// Stop everything, unregister from event sources and drop the observer.
    /// A no-op when not initialized.
    pub async fn deinit(&self) -> NetmgrResult<()> {
        let mut registration = self.registration.lock().await;
        if !registration.initialized {
            return Ok(());
        }

        {
            let mut state = self.coordinator.lock().await;
            self.stop_all(&mut state).await;
            state.observer = None;
        }

        for id in registration.handlers.drain(..) {
            self.events.unregister(id).await;
        }

        registration.initialized = false;
        self.initialized.store(false, Ordering::Release);
        info!("De-initialized successfully");
        Ok(())
    }

    /// Start the enabled links. Without a configuration, the stored one is
    /// used, falling back to the settings' defaults.
    ///
    /// Any driver failure aborts immediately; links already brought up by
    /// this call stay up until the next `stop`.
    pub async fn start(&self, config: Option<SystemConfig>) -> NetmgrResult<()> {
        let _registration = self.registration.lock().await;
        self.ensure_initialized()?;

        {
            let mut state = self.coordinator.lock().await;
            self.stop_all(&mut state).await;
        }
        // Events still queued from the previous session are dispatched while
        // no link is active, so they are dropped instead of reaching this one
        self.events.flush().await?;

        let mut state = self.coordinator.lock().await;
        let config = match config {
            Some(config) => config,
            None => self.stored_or_default().await,
        };
        config.validate()?;
        state.links.config = Some(config.clone());

        let mode = config.radio_mode();
        if let Some(mode) = mode {
            let kind = radio_kind(mode);
            self.drivers
                .radio
                .init()
                .await
                .map_err(|e| NetmgrError::from_driver(kind, "init", e))?;
            state.links.radio = Some(mode);
            self.drivers
                .radio
                .set_mode(mode)
                .await
                .map_err(|e| NetmgrError::from_driver(kind, "set_mode", e))?;
            debug!("Radio initialized in {:?} mode", mode);
        }

        if config.client_enabled {
            self.start_client(&mut state, &config.client).await?;
        }
        if config.access_point_enabled {
            self.start_access_point(&mut state, &config.access_point)
                .await?;
        }
        if config.wired_enabled {
            self.start_wired(&mut state, &config.wired).await?;
        }

        // Radio goes live only once every wireless role is configured
        if let Some(mode) = mode {
            self.drivers
                .radio
                .start()
                .await
                .map_err(|e| NetmgrError::from_driver(radio_kind(mode), "start", e))?;
            state.links.radio_started = true;
            if mode.has_client() {
                state
                    .status
                    .transition(InterfaceKind::ClientLink, LinkStatus::Started);
            }
        }

        info!(
            "Started links: client={} access_point={} wired={}",
            config.client_enabled, config.access_point_enabled, config.wired_enabled
        );
        Ok(())
    }

    async fn stored_or_default(&self) -> SystemConfig {
        let storage = &self.settings.storage;
        match storage::load_config(self.store.as_ref(), &storage.namespace, &storage.key).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!("No stored config, using defaults.");
                self.settings.defaults.clone()
            }
            Err(e) => {
                warn!("Stored config unusable ({}), using defaults.", e);
                self.settings.defaults.clone()
            }
        }
    }

    async fn start_client(
        &self,
        state: &mut CoordinatorState,
        config: &ClientLinkConfig,
    ) -> NetmgrResult<()> {
        const KIND: InterfaceKind = InterfaceKind::ClientLink;

        self.drivers
            .ip
            .create(KIND)
            .await
            .map_err(|e| NetmgrError::from_driver(KIND, "create", e))?;
        state.links.client = true;

        match &config.static_ip {
            Some(static_ip) => {
                info!("Using static IP for client link");
                self.apply_static(KIND, static_ip).await?;
            }
            None => info!("Using DHCP for client link"),
        }

        self.drivers
            .radio
            .configure_client(&ClientRadioConfig::from(config))
            .await
            .map_err(|e| NetmgrError::from_driver(KIND, "configure", e))?;
        info!("Client link configured for SSID: {}", config.ssid);
        Ok(())
    }

    async fn start_access_point(
        &self,
        state: &mut CoordinatorState,
        config: &AccessPointConfig,
    ) -> NetmgrResult<()> {
        const KIND: InterfaceKind = InterfaceKind::AccessPointLink;

        self.drivers
            .ip
            .create(KIND)
            .await
            .map_err(|e| NetmgrError::from_driver(KIND, "create", e))?;
        state.links.access_point = true;

        self.drivers
            .radio
            .configure_access_point(&AccessPointRadioConfig::from(config))
            .await
            .map_err(|e| NetmgrError::from_driver(KIND, "configure", e))?;
        info!(
            "Access point configured with SSID: {} ({:?})",
            config.ssid,
            config.auth_mode()
        );
        Ok(())
    }

    async fn start_wired(
        &self,
        state: &mut CoordinatorState,
        config: &WiredLinkConfig,
    ) -> NetmgrResult<()> {
        const KIND: InterfaceKind = InterfaceKind::WiredLink;

        let ports = self
            .drivers
            .wired
            .install()
            .await
            .map_err(|e| NetmgrError::from_driver(KIND, "install", e))?;
        state.links.wired_installed = true;
        if ports == 0 {
            error!("Wired driver did not initialize any ports.");
            return Err(NetmgrError::from_driver(
                KIND,
                "install",
                DriverError::Unavailable("no wired ports found".to_string()),
            ));
        }
        info!("{} wired port(s) initialized. Using the first one.", ports);

        self.drivers
            .ip
            .create(KIND)
            .await
            .map_err(|e| NetmgrError::from_driver(KIND, "create", e))?;
        state.links.wired = true;

        // Static addressing must be in place before the port starts
        match &config.static_ip {
            Some(static_ip) => {
                info!("Using static IP for wired link");
                self.apply_static(KIND, static_ip).await?;
            }
            None => info!("Using DHCP for wired link"),
        }

        self.drivers.wired.start(0).await.map_err(|e| NetmgrError::from_driver(KIND, "start", e))?;
        state.links.wired_port = Some(0);
        info!("Wired link started.");
        Ok(())
    }

    async fn apply_static(&self, kind: InterfaceKind, config: &StaticIpConfig) -> NetmgrResult<()> {
        self.drivers
            .ip
            .apply_static(kind, config)
            .await
            .map_err(|e| NetmgrError::from_driver(kind, "apply_static", e))
    }

    /// Tear down every active link and reset status. Safe when nothing runs.
    pub async fn stop(&self) -> NetmgrResult<()> {
        let _registration = self.registration.lock().await;
        self.ensure_initialized()?;

        let mut state = self.coordinator.lock().await;
        self.stop_all(&mut state).await;
        Ok(())
    }

    /// Best-effort teardown; failures are logged and teardown continues
    async fn stop_all(&self, state: &mut CoordinatorState) {
        let links = std::mem::take(&mut state.links);

        if links.wired_port.is_some() {
            info!("Stopping wired link...");
            if let Err(e) = self.drivers.wired.stop().await {
                warn!("Failed to stop wired port: {}", e);
            }
        }
        if links.wired {
            let result = self.drivers.ip.destroy(InterfaceKind::WiredLink).await;
            log_teardown(InterfaceKind::WiredLink, result);
        }
        if links.wired_installed {
            if let Err(e) = self.drivers.wired.uninstall().await {
                warn!("Failed to release wired driver: {}", e);
            }
        }

        if links.radio.is_some() {
            info!("Stopping radio...");
            if links.radio_started {
                if let Err(e) = self.drivers.radio.stop().await {
                    warn!("Failed to stop radio: {}", e);
                }
            }
            // Radio goes down before its interfaces are destroyed
            if let Err(e) = self.drivers.radio.deinit().await {
                warn!("Failed to release radio: {}", e);
            }
        }
        if links.client {
            let result = self.drivers.ip.destroy(InterfaceKind::ClientLink).await;
            log_teardown(InterfaceKind::ClientLink, result);
        }
        if links.access_point {
            log_teardown(
                InterfaceKind::AccessPointLink,
                self.drivers.ip.destroy(InterfaceKind::AccessPointLink).await,
            );
        }

        state.reset();
        info!("All network interfaces stopped and cleaned up.");
    }

    /// Consistent snapshot of every link's status
    pub async fn get_status(&self) -> NetmgrResult<Status> {
        self.ensure_initialized()?;
        Ok(self.coordinator.status().await)
    }

    /// Whether the link is fully connected (has an address)
    pub async fn is_connected(&self, kind: InterfaceKind) -> NetmgrResult<bool> {
        Ok(self.get_status().await?.is_connected(kind))
    }

    /// Current address of an active link
    pub async fn get_ip_info(&self, kind: InterfaceKind) -> NetmgrResult<IpInfo> {
        self.ensure_initialized()?;
        let state = self.coordinator.lock().await;
        if !state.links.is_active(kind) {
            return Err(NetmgrError::InterfaceNotActive(kind));
        }
        self.drivers
            .ip
            .ip_info(kind)
            .await
            .map_err(|e| NetmgrError::from_driver(kind, "ip_info", e))
    }

    /// Current DNS server of an active link
    pub async fn get_dns_info(
        &self,
        kind: InterfaceKind,
        dns_type: DnsType,
    ) -> NetmgrResult<DnsInfo> {
        self.ensure_initialized()?;
        let state = self.coordinator.lock().await;
        if !state.links.is_active(kind) {
            return Err(NetmgrError::InterfaceNotActive(kind));
        }
        self.drivers
            .ip
            .dns_info(kind, dns_type)
            .await
            .map_err(|e| NetmgrError::from_driver(kind, "dns_info", e))
    }

    /// Stations associated with the access point
    pub async fn get_access_point_clients(&self) -> NetmgrResult<Vec<ClientInfo>> {
        const KIND: InterfaceKind = InterfaceKind::AccessPointLink;

        self.ensure_initialized()?;
        let state = self.coordinator.lock().await;
        if !state.links.is_active(KIND) {
            return Err(NetmgrError::InterfaceNotActive(KIND));
        }
        self.drivers
            .radio
            .access_point_clients()
            .await
            .map_err(|e| NetmgrError::from_driver(KIND, "access_point_clients", e))
    }

    /// Persist a configuration for later `start(None)` calls
    pub async fn save_config(&self, config: &SystemConfig) -> NetmgrResult<()> {
        self.ensure_initialized()?;
        config.validate()?;
        let storage = &self.settings.storage;
        let result = storage::save_config(
            self.store.as_ref(),
            &storage.namespace,
            &storage.key,
            config,
        )
        .await;
        if let Err(e) = &result {
            error!("Configuration save failed: {}", e);
        }
        result
    }

    /// Read the persisted configuration; `Ok(None)` when nothing is stored
    pub async fn load_config(&self) -> NetmgrResult<Option<SystemConfig>> {
        self.ensure_initialized()?;
        let storage = &self.settings.storage;
        storage::load_config(self.store.as_ref(), &storage.namespace, &storage.key).await
    }
}

/// Link a radio-wide command failure is reported against
fn radio_kind(mode: RadioMode) -> InterfaceKind {
    if mode.has_client() {
        InterfaceKind::ClientLink
    } else {
        InterfaceKind::AccessPointLink
    }
}

fn log_teardown(kind: InterfaceKind, result: Result<(), DriverError>) {
    if let Err(e) = result {
        warn!("Failed to destroy {} interface: {}", kind, e);
    }
}
