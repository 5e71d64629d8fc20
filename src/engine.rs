//! The single-threaded protocol engine.
//!
//! [`LinkBandEngine`] owns the [`GattLink`], the [`ConnectionManager`] and,
//! while a link is up, the [`LinkSession`].  It has exactly three inputs:
//!
//! * user operations (`connect`, `start_sensors`, `start_recording`, …),
//! * [`LinkEvent`]s from the BLE stack via [`LinkBandEngine::handle_link_event`],
//! * the passage of time via [`LinkBandEngine::advance_to`].
//!
//! Every input runs to completion before the next one is looked at, and
//! nothing in here blocks or sleeps.  Output is a queue of [`DeviceEvent`]s
//! collected with [`LinkBandEngine::drain_events`].
//!
//! Time is virtual: the caller decides what "now" is.  The tokio runtime in
//! [`crate::client`] passes the elapsed wall time; tests pass whatever they
//! like.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CollectionMode, LinkBandConfig};
use crate::connection::{ConnectionManager, Milestone, ReconnectState};
use crate::error::RecordingError;
use crate::gatt::{GattLink, LinkEvent};
use crate::parse::{decode_acc, decode_battery, decode_eeg, decode_ppg};
use crate::protocol::{sensor_for_characteristic, BATTERY_CHARACTERISTIC, BATTERY_SERVICE};
use crate::session::LinkSession;
use crate::types::{BatterySample, ConnectionState, DeviceEvent, DeviceHandle, SensorType};

/// Snapshot of everything a consumer can observe about the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub state: ConnectionState,
    pub scanning: bool,
    pub device_name: Option<String>,
    pub selected: BTreeSet<SensorType>,
    pub started: BTreeSet<SensorType>,
    pub receiving_data: bool,
    pub recording: bool,
    pub auto_reconnect: bool,
    pub battery: Option<BatterySample>,
    pub collection_mode: CollectionMode,
}

pub struct LinkBandEngine<L: GattLink> {
    config: LinkBandConfig,
    link: L,
    conn: ConnectionManager,
    session: Option<LinkSession>,
    now: Duration,
    events: Vec<DeviceEvent>,
    notifications: u64,
}

impl<L: GattLink> LinkBandEngine<L> {
    pub fn new(config: LinkBandConfig, link: L) -> Self {
        let conn = ConnectionManager::new(config.reconnect.enabled);
        Self {
            config,
            link,
            conn,
            session: None,
            now: Duration::ZERO,
            events: Vec::new(),
            notifications: 0,
        }
    }

    // ── Observable state ──────────────────────────────────────────────────────

    pub fn config(&self) -> &LinkBandConfig {
        &self.config
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn is_scanning(&self) -> bool {
        self.conn.is_scanning()
    }

    pub fn scanned_devices(&self) -> &[DeviceHandle] {
        self.conn.devices()
    }

    pub fn connected_device_name(&self) -> Option<&str> {
        self.conn.connected_device().map(|d| d.name.as_str())
    }

    pub fn last_device(&self) -> Option<&DeviceHandle> {
        self.conn.last_device()
    }

    pub fn session(&self) -> Option<&LinkSession> {
        self.session.as_ref()
    }

    pub fn selected_sensors(&self) -> BTreeSet<SensorType> {
        self.session
            .as_ref()
            .map(|s| s.selected().clone())
            .unwrap_or_default()
    }

    pub fn is_started(&self, sensor: SensorType) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.sequencer().is_started(sensor))
    }

    pub fn is_receiving_data(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.sequencer().is_receiving())
    }

    pub fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.recorder().is_recording())
    }

    pub fn battery(&self) -> Option<BatterySample> {
        self.session.as_ref().and_then(|s| s.battery())
    }

    pub fn auto_reconnect_enabled(&self) -> bool {
        self.conn.auto_reconnect_enabled()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.conn.reconnect_state()
    }

    pub fn collection_mode(&self) -> CollectionMode {
        self.config.batch.mode
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state(),
            scanning: self.is_scanning(),
            device_name: self.connected_device_name().map(str::to_owned),
            selected: self.selected_sensors(),
            started: self
                .session
                .as_ref()
                .map(|s| s.sequencer().started().clone())
                .unwrap_or_default(),
            receiving_data: self.is_receiving_data(),
            recording: self.is_recording(),
            auto_reconnect: self.auto_reconnect_enabled(),
            battery: self.battery(),
            collection_mode: self.collection_mode(),
        }
    }

    /// Take every event produced since the last call.
    pub fn drain_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events)
    }

    // ── Scanning and connecting ───────────────────────────────────────────────

    pub fn start_scan(&mut self) {
        self.conn.start_scan(&mut self.link, &mut self.events);
    }

    pub fn stop_scan(&mut self) {
        self.conn.stop_scan(&mut self.link, &mut self.events);
    }

    /// Connect to `device`, dropping any current link first.
    pub fn connect(&mut self, device: DeviceHandle) {
        if self.conn.state() != ConnectionState::Disconnected {
            self.disconnect();
        }
        self.conn.connect(device, &mut self.link, &mut self.events);
    }

    /// User-initiated disconnect.  Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        self.close_session();
        self.conn.disconnect(&mut self.link, &mut self.events);
    }

    pub fn enable_auto_reconnect(&mut self) {
        self.conn.enable_auto_reconnect(&mut self.events);
    }

    pub fn disable_auto_reconnect(&mut self) {
        self.conn.disable_auto_reconnect(&mut self.events);
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close(&mut self.events);
            if !session.selected().is_empty() {
                self.events.push(DeviceEvent::SelectionChanged(BTreeSet::new()));
            }
            debug!("engine: session for {} dropped", session.device().name);
        }
        self.notifications = 0;
    }

    // ── Sensors ───────────────────────────────────────────────────────────────

    /// Add `sensor` to the selection.  Refused while receiving data.
    pub fn select(&mut self, sensor: SensorType) -> bool {
        match self.session.as_mut() {
            Some(s) => s.toggle(sensor, true, &mut self.events),
            None => false,
        }
    }

    /// Remove `sensor` from the selection.  Refused while receiving data.
    pub fn deselect(&mut self, sensor: SensorType) -> bool {
        match self.session.as_mut() {
            Some(s) => s.toggle(sensor, false, &mut self.events),
            None => false,
        }
    }

    /// Run the activation sequence for the current selection.
    pub fn start_sensors(&mut self) {
        if !self.conn.services_discovered() {
            warn!("engine: cannot start sensors before services are discovered");
            return;
        }
        if let Some(s) = self.session.as_mut() {
            s.start_sensors(&mut self.link, &self.config.activation, &mut self.events);
        }
    }

    pub fn stop_sensors(&mut self) {
        if let Some(s) = self.session.as_mut() {
            s.stop_sensors(&mut self.link, &self.config.activation, &mut self.events);
        }
    }

    /// Switch between duration and sample-count batching.  Refused while
    /// receiving data; partial batches are discarded.
    pub fn set_collection_mode(&mut self, mode: CollectionMode) -> bool {
        if self.is_receiving_data() {
            warn!("engine: collection mode is locked while receiving data");
            return false;
        }
        if self.config.batch.mode != mode {
            info!("engine: collection mode {mode:?}");
            self.config.batch.mode = mode;
            if let Some(s) = self.session.as_mut() {
                s.reset_batches(&self.config.batch);
            }
        }
        true
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    pub fn start_recording(&mut self) -> Result<Vec<PathBuf>, RecordingError> {
        let session = self.session.as_mut().ok_or(RecordingError::NotConnected)?;
        session.start_recording(&self.config.recording, &mut self.events)
    }

    pub fn stop_recording(&mut self) -> Result<(), RecordingError> {
        let session = self.session.as_mut().ok_or(RecordingError::NotRecording)?;
        match session.stop_recording(&mut self.events) {
            0 => Err(RecordingError::NotRecording),
            _ => Ok(()),
        }
    }

    // ── Link events ───────────────────────────────────────────────────────────

    pub fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::DeviceDiscovered(device) => {
                self.conn
                    .on_device_discovered(device, &self.config.scan.name_prefix, &mut self.events);
            }
            LinkEvent::ConnectionStateChanged { connected: true } => {
                if let Some(device) =
                    self.conn
                        .on_connected(&mut self.link, &self.config, &mut self.events)
                {
                    self.close_session();
                    self.session = Some(LinkSession::new(device, self.now, &self.config.batch));
                }
            }
            LinkEvent::ConnectionStateChanged { connected: false } => {
                self.close_session();
                self.conn.on_link_lost(&self.config, &mut self.events);
            }
            LinkEvent::MtuChanged { mtu, success } => {
                self.conn.on_mtu_changed(mtu, success, &self.config);
            }
            LinkEvent::ServicesDiscovered { success } => {
                if self.conn.on_services_discovered(success, &self.config) {
                    if let Some(s) = self.session.as_mut() {
                        info!("engine: all sensors selected by default");
                        s.set_selection(SensorType::ALL.into_iter().collect(), &mut self.events);
                    }
                }
            }
            LinkEvent::CharacteristicChanged { uuid, value } => self.on_notification(uuid, &value),
            LinkEvent::WriteCompleted { uuid, success } => {
                if success {
                    debug!("engine: write to {uuid} completed");
                } else {
                    warn!("engine: write to {uuid} failed");
                }
            }
            LinkEvent::DescriptorWriteCompleted { uuid, success } => {
                if success {
                    debug!("engine: descriptor write on {uuid} completed");
                } else {
                    warn!("engine: descriptor write on {uuid} failed");
                }
            }
        }
    }

    fn on_notification(&mut self, uuid: Uuid, data: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            debug!("engine: notification from {uuid} with no session, dropped");
            return;
        };
        if data.is_empty() {
            debug!("engine: empty notification from {uuid}, dropped");
            return;
        }
        self.notifications += 1;
        let n = self.notifications;
        if n <= 5 || n % 500 == 0 {
            info!("engine: notif #{n} uuid={uuid} len={}", data.len());
        }

        if uuid == BATTERY_CHARACTERISTIC {
            match decode_battery(data) {
                Ok(b) => session.on_battery(b, &mut self.events),
                Err(e) => warn!("engine: {e}"),
            }
            return;
        }
        let Some(sensor) = sensor_for_characteristic(uuid) else {
            debug!("engine: notification from unknown characteristic {uuid}");
            return;
        };
        let cfg = &self.config.sensors;
        let decoded = match sensor {
            SensorType::Eeg => decode_eeg(data, cfg).map(|v| {
                let got = !v.is_empty();
                session.on_eeg(v, &mut self.events);
                got
            }),
            SensorType::Ppg => decode_ppg(data, cfg).map(|v| {
                let got = !v.is_empty();
                session.on_ppg(v, &mut self.events);
                got
            }),
            SensorType::Acc => decode_acc(data, cfg).map(|v| {
                let got = !v.is_empty();
                session.on_acc(v, &mut self.events);
                got
            }),
        };
        match decoded {
            Ok(true) => session.confirm_data(sensor, &self.config.activation, &mut self.events),
            Ok(false) => {}
            Err(e) => warn!("engine: {e}"),
        }
    }

    /// Entry point run shortly after service discovery.
    fn notification_setup(&mut self) {
        match self.link.characteristic(BATTERY_SERVICE, BATTERY_CHARACTERISTIC) {
            Ok(ch) => {
                debug!("engine: reading battery level");
                self.link.read_characteristic(&ch);
            }
            Err(e) => warn!("engine: battery: {e}"),
        }
    }

    // ── Time ──────────────────────────────────────────────────────────────────

    /// Earliest armed timer across the connection manager and the session.
    pub fn next_deadline(&self) -> Option<Duration> {
        let link = self.conn.timers().next_deadline();
        let activation = self
            .session
            .as_ref()
            .and_then(|s| s.sequencer().timers().next_deadline());
        match (link, activation) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every timer due at or before `until`, in deadline order, then
    /// move the clock to `until`.  Timers armed while firing are honoured if
    /// they also fall due before `until`.
    pub fn advance_to(&mut self, until: Duration) {
        loop {
            let link = self.conn.timers().next_deadline().filter(|d| *d <= until);
            let activation = self
                .session
                .as_ref()
                .and_then(|s| s.sequencer().timers().next_deadline())
                .filter(|d| *d <= until);
            match (link, activation) {
                (None, None) => break,
                (Some(l), Some(a)) if a < l => self.fire_activation_timer(until),
                (Some(_), _) => self.fire_link_timer(until),
                (None, Some(_)) => self.fire_activation_timer(until),
            }
        }
        self.now = self.now.max(until);
        self.conn.timers_mut().sync_clock(self.now);
        if let Some(s) = self.session.as_mut() {
            s.activation_timers().sync_clock(self.now);
        }
    }

    /// Advance the clock by `dt`.
    pub fn advance_by(&mut self, dt: Duration) {
        self.advance_to(self.now + dt);
    }

    fn fire_link_timer(&mut self, until: Duration) {
        let Some((h, timer)) = self.conn.timers_mut().pop_due(until) else {
            return;
        };
        self.now = self.now.max(h.deadline());
        if let Some(s) = self.session.as_mut() {
            s.activation_timers().sync_clock(self.now);
        }
        debug!("engine: t={} ms link timer {timer:?}", self.now.as_millis());
        match self.conn.on_timer(timer, &mut self.link, &mut self.events) {
            Some(Milestone::NotificationSetup) => self.notification_setup(),
            Some(Milestone::ServicesReady) | None => {}
        }
    }

    fn fire_activation_timer(&mut self, until: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some((h, timer)) = session.activation_timers().pop_due(until) else {
            return;
        };
        self.now = self.now.max(h.deadline());
        self.conn.timers_mut().sync_clock(self.now);
        debug!("engine: t={} ms activation timer {timer:?}", self.now.as_millis());
        session.on_activation_timer(
            timer,
            self.conn.is_services_ready(),
            &mut self.link,
            &self.config.activation,
            &mut self.events,
        );
    }
}
