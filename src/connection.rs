//! Connection lifecycle: scan, connect, MTU, discovery, and auto-reconnect.
//!
//! ```text
//! connect ─► Connecting ─(up)─► Connected ─► request MTU
//!                                   │
//!        MTU response ─(discovery_delay)─► ServicesDiscovering ─► discover
//!                                   │
//!   ServicesDiscovered ─┬─(notification_setup_delay)─► setup entry point
//!                       └─(services_ready_delay)─────► ServicesReady
//! ```
//!
//! Any link drop returns to `Disconnected` and, when auto-reconnect is on and
//! a device has connected before, schedules the next attempt on the backoff
//! schedule.  [`ConnectionManager`] owns the connection state; the per-link
//! sensor state lives in [`crate::session::LinkSession`] and is handled by
//! the engine around the calls made here.

use std::time::Duration;

use log::{debug, info, warn};

use crate::config::LinkBandConfig;
use crate::gatt::GattLink;
use crate::timer::{TimerHandle, TimerQueue};
use crate::types::{ConnectionState, DeviceEvent, DeviceHandle};

/// Timers owned by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTimer {
    DiscoverServices,
    NotificationSetup,
    ServicesReady,
    Reconnect,
}

/// What a fired [`LinkTimer`] asks the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    /// Run the notification-setup entry point (battery read).
    NotificationSetup,
    /// The link just became `ServicesReady`.
    ServicesReady,
}

/// Reconnect bookkeeping.  Survives a single disconnection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    /// Attempts scheduled since the last successful connection.
    pub attempts: u32,
    pub pending: Option<TimerHandle>,
}

#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    scanning: bool,
    devices: Vec<DeviceHandle>,
    /// Device being connected to, manually or by a reconnect attempt.
    target: Option<DeviceHandle>,
    /// Last device that connected successfully.  Never cleared.
    last_device: Option<DeviceHandle>,
    services_discovered: bool,
    auto_reconnect: bool,
    reconnect: ReconnectState,
    timers: TimerQueue<LinkTimer>,
}

impl ConnectionManager {
    pub fn new(auto_reconnect: bool) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            scanning: false,
            devices: Vec::new(),
            target: None,
            last_device: None,
            services_discovered: false,
            auto_reconnect,
            reconnect: ReconnectState::default(),
            timers: TimerQueue::new(),
        }
    }

    // ── Observable state ──────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    pub fn last_device(&self) -> Option<&DeviceHandle> {
        self.last_device.as_ref()
    }

    /// The device of the current link, once it is up.
    pub fn connected_device(&self) -> Option<&DeviceHandle> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Connecting => None,
            _ => self.target.as_ref(),
        }
    }

    /// Service discovery completed on the current link.
    pub fn services_discovered(&self) -> bool {
        self.services_discovered
    }

    pub fn is_services_ready(&self) -> bool {
        self.state == ConnectionState::ServicesReady
    }

    pub fn auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.reconnect
    }

    pub fn timers(&self) -> &TimerQueue<LinkTimer> {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerQueue<LinkTimer> {
        &mut self.timers
    }

    fn set_state(&mut self, state: ConnectionState, events: &mut Vec<DeviceEvent>) {
        if self.state != state {
            debug!("connection: {:?} -> {state:?}", self.state);
            self.state = state;
            events.push(DeviceEvent::StateChanged(state));
        }
    }

    // ── Scanning ──────────────────────────────────────────────────────────────

    pub fn start_scan<L: GattLink>(&mut self, link: &mut L, events: &mut Vec<DeviceEvent>) {
        if self.scanning {
            return;
        }
        info!("connection: scan started");
        self.devices.clear();
        self.scanning = true;
        link.start_scan();
        events.push(DeviceEvent::Scanning(true));
        events.push(DeviceEvent::ScanResults(Vec::new()));
    }

    pub fn stop_scan<L: GattLink>(&mut self, link: &mut L, events: &mut Vec<DeviceEvent>) {
        if !self.scanning {
            return;
        }
        info!("connection: scan stopped ({} device(s))", self.devices.len());
        self.scanning = false;
        link.stop_scan();
        events.push(DeviceEvent::Scanning(false));
    }

    /// Record an advertisement.  Devices outside `name_prefix` and repeats of
    /// a known id are dropped.
    pub fn on_device_discovered(
        &mut self,
        device: DeviceHandle,
        name_prefix: &str,
        events: &mut Vec<DeviceEvent>,
    ) {
        if !self.scanning || !device.name.starts_with(name_prefix) {
            return;
        }
        if self.devices.iter().any(|d| d.id == device.id) {
            return;
        }
        info!("connection: found {}  id={}", device.name, device.id);
        self.devices.push(device);
        events.push(DeviceEvent::ScanResults(self.devices.clone()));
    }

    // ── Connecting ────────────────────────────────────────────────────────────

    /// Start connecting to `device`.  The caller tears down any existing link
    /// first.
    pub fn connect<L: GattLink>(
        &mut self,
        device: DeviceHandle,
        link: &mut L,
        events: &mut Vec<DeviceEvent>,
    ) {
        self.stop_scan(link, events);
        self.cancel_reconnect();
        info!("connection: connecting to {} ({})", device.name, device.id);
        link.connect(&device);
        self.target = Some(device);
        self.set_state(ConnectionState::Connecting, events);
    }

    /// The link came up.  Returns the connected device.
    pub fn on_connected<L: GattLink>(
        &mut self,
        link: &mut L,
        cfg: &LinkBandConfig,
        events: &mut Vec<DeviceEvent>,
    ) -> Option<DeviceHandle> {
        if self.state != ConnectionState::Connecting {
            warn!("connection: unexpected link-up in state {:?}", self.state);
            return None;
        }
        let device = self.target.clone()?;
        info!("connection: connected to {}", device.name);
        self.last_device = Some(device.clone());
        self.reconnect.attempts = 0;
        self.cancel_reconnect();
        self.set_state(ConnectionState::Connected, events);
        events.push(DeviceEvent::Connected(device.clone()));
        link.request_mtu(cfg.link.mtu);
        Some(device)
    }

    /// Any MTU response, success or not, leads to service discovery.
    pub fn on_mtu_changed(&mut self, mtu: u16, success: bool, cfg: &LinkBandConfig) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if success {
            info!("connection: MTU {mtu}");
        } else {
            warn!("connection: MTU request failed, continuing with the default");
        }
        self.timers
            .spawn_after(cfg.link.discovery_delay(), LinkTimer::DiscoverServices);
    }

    /// Returns `true` when discovery succeeded on the current link.
    pub fn on_services_discovered(
        &mut self,
        success: bool,
        cfg: &LinkBandConfig,
    ) -> bool {
        if self.state != ConnectionState::ServicesDiscovering {
            return false;
        }
        if !success {
            warn!("connection: service discovery failed");
            return false;
        }
        info!("connection: services discovered");
        self.services_discovered = true;
        self.timers.spawn_after(
            cfg.link.notification_setup_delay(),
            LinkTimer::NotificationSetup,
        );
        self.timers
            .spawn_after(cfg.link.services_ready_delay(), LinkTimer::ServicesReady);
        true
    }

    /// Dispatch a fired link timer.
    pub fn on_timer<L: GattLink>(
        &mut self,
        timer: LinkTimer,
        link: &mut L,
        events: &mut Vec<DeviceEvent>,
    ) -> Option<Milestone> {
        match timer {
            LinkTimer::DiscoverServices => {
                if self.state == ConnectionState::Connected {
                    self.set_state(ConnectionState::ServicesDiscovering, events);
                    link.discover_services();
                }
                None
            }
            LinkTimer::NotificationSetup => {
                self.services_discovered.then_some(Milestone::NotificationSetup)
            }
            LinkTimer::ServicesReady => {
                if !self.services_discovered {
                    return None;
                }
                info!("connection: services ready");
                self.set_state(ConnectionState::ServicesReady, events);
                Some(Milestone::ServicesReady)
            }
            LinkTimer::Reconnect => {
                self.reconnect.pending = None;
                if !self.auto_reconnect || self.state != ConnectionState::Disconnected {
                    return None;
                }
                if let Some(device) = self.last_device.clone() {
                    info!(
                        "connection: auto-reconnect attempt {} to {}",
                        self.reconnect.attempts, device.name
                    );
                    link.connect(&device);
                    self.target = Some(device);
                    self.set_state(ConnectionState::Connecting, events);
                }
                None
            }
        }
    }

    // ── Disconnecting ─────────────────────────────────────────────────────────

    /// Cancel every link-setup timer and return to `Disconnected`.
    fn reset_link(&mut self, events: &mut Vec<DeviceEvent>) {
        let n = self.timers.cancel_where(|t| *t != LinkTimer::Reconnect);
        if n > 0 {
            debug!("connection: cancelled {n} link timer(s)");
        }
        self.services_discovered = false;
        self.set_state(ConnectionState::Disconnected, events);
    }

    /// User-initiated disconnect.  Idempotent.
    pub fn disconnect<L: GattLink>(&mut self, link: &mut L, events: &mut Vec<DeviceEvent>) {
        self.cancel_reconnect();
        self.reconnect.attempts = 0;
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!("connection: disconnecting");
        link.disconnect();
        self.reset_link(events);
        events.push(DeviceEvent::Disconnected);
    }

    /// The link dropped without being asked to.  Returns `false` when no link
    /// was up or being set up, i.e. the event was stale.
    pub fn on_link_lost(&mut self, cfg: &LinkBandConfig, events: &mut Vec<DeviceEvent>) -> bool {
        if self.state == ConnectionState::Disconnected {
            debug!("connection: link-down with no link, ignored");
            return false;
        }
        let was_connecting = self.state == ConnectionState::Connecting;
        if was_connecting {
            warn!("connection: connect attempt failed");
        } else {
            warn!("connection: link lost");
        }
        self.reset_link(events);
        if !was_connecting {
            events.push(DeviceEvent::Disconnected);
        }
        self.schedule_reconnect(cfg, events);
        true
    }

    fn schedule_reconnect(&mut self, cfg: &LinkBandConfig, events: &mut Vec<DeviceEvent>) {
        if !self.auto_reconnect || self.last_device.is_none() {
            return;
        }
        let r = &cfg.reconnect;
        if self.reconnect.attempts >= r.max_attempts {
            warn!(
                "connection: {} reconnect attempts failed, giving up",
                self.reconnect.attempts
            );
            events.push(DeviceEvent::ReconnectExhausted);
            return;
        }
        self.cancel_reconnect();
        self.reconnect.attempts += 1;
        let attempt = self.reconnect.attempts;
        let delay: Duration = r.delay_for(attempt);
        info!(
            "connection: reconnect {attempt}/{} in {} ms",
            r.max_attempts,
            delay.as_millis()
        );
        self.reconnect.pending = Some(self.timers.spawn_after(delay, LinkTimer::Reconnect));
        events.push(DeviceEvent::ReconnectScheduled { attempt, delay });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(h) = self.reconnect.pending.take() {
            if self.timers.cancel(h) {
                debug!("connection: pending reconnect cancelled");
            }
        }
    }

    // ── Auto-reconnect toggle ─────────────────────────────────────────────────

    pub fn enable_auto_reconnect(&mut self, events: &mut Vec<DeviceEvent>) {
        if !self.auto_reconnect {
            info!("connection: auto-reconnect enabled");
            self.auto_reconnect = true;
            events.push(DeviceEvent::AutoReconnect(true));
        }
    }

    /// Also cancels a scheduled attempt and resets the attempt count.
    pub fn disable_auto_reconnect(&mut self, events: &mut Vec<DeviceEvent>) {
        self.cancel_reconnect();
        self.reconnect.attempts = 0;
        if self.auto_reconnect {
            info!("connection: auto-reconnect disabled");
            self.auto_reconnect = false;
            events.push(DeviceEvent::AutoReconnect(false));
        }
    }
}
