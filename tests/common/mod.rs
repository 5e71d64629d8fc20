//! Shared fixtures: a recording [`GattLink`] and packet builders.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use linkband_rs::client::LinkBackend;
use linkband_rs::config::LinkBandConfig;
use linkband_rs::engine::LinkBandEngine;
use linkband_rs::error::GattError;
use linkband_rs::gatt::{CharacteristicRef, DescriptorRef, GattLink, LinkEvent};
use linkband_rs::protocol::*;
use linkband_rs::types::{ConnectionState, DeviceEvent, DeviceHandle, SensorType};

/// Every request the engine made, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect,
    RequestMtu(u16),
    DiscoverServices,
    SetNotify(Uuid, bool),
    Write(Uuid, Vec<u8>),
    WriteDescriptor(Uuid, Vec<u8>),
    Read(Uuid),
}

const KNOWN: [(Uuid, Uuid); 5] = [
    (EEG_SERVICE, EEG_NOTIFY_CHARACTERISTIC),
    (EEG_SERVICE, EEG_WRITE_CHARACTERISTIC),
    (PPG_SERVICE, PPG_CHARACTERISTIC),
    (ACCELEROMETER_SERVICE, ACCELEROMETER_CHARACTERISTIC),
    (BATTERY_SERVICE, BATTERY_CHARACTERISTIC),
];

/// A link that records requests.  With a responder attached it also answers
/// connect, MTU, discovery and scan requests the way a healthy device would.
#[derive(Clone, Default)]
pub struct MockLink {
    ops: Arc<Mutex<Vec<Op>>>,
    missing: HashSet<Uuid>,
    missing_cccd: HashSet<Uuid>,
    responder: Option<mpsc::UnboundedSender<LinkEvent>>,
    advertised: Vec<DeviceHandle>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `uuid` as absent from the peripheral.
    pub fn without_characteristic(mut self, uuid: Uuid) -> Self {
        self.missing.insert(uuid);
        self
    }

    /// Report the CCCD of `uuid` as absent.
    pub fn without_cccd(mut self, uuid: Uuid) -> Self {
        self.missing_cccd.insert(uuid);
        self
    }

    /// Answer requests on the returned channel.
    pub fn responding(
        mut self,
        advertised: Vec<DeviceHandle>,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.responder = Some(tx);
        self.advertised = advertised;
        (self, rx)
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut *self.ops.lock().unwrap())
    }

    fn push(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }

    fn respond(&self, ev: LinkEvent) {
        if let Some(tx) = &self.responder {
            let _ = tx.send(ev);
        }
    }
}

impl GattLink for MockLink {
    fn start_scan(&mut self) {
        self.push(Op::StartScan);
        for d in self.advertised.clone() {
            self.respond(LinkEvent::DeviceDiscovered(d));
        }
    }

    fn stop_scan(&mut self) {
        self.push(Op::StopScan);
    }

    fn connect(&mut self, device: &DeviceHandle) {
        self.push(Op::Connect(device.id.clone()));
        self.respond(LinkEvent::ConnectionStateChanged { connected: true });
    }

    fn disconnect(&mut self) {
        self.push(Op::Disconnect);
    }

    fn request_mtu(&mut self, mtu: u16) {
        self.push(Op::RequestMtu(mtu));
        self.respond(LinkEvent::MtuChanged { mtu, success: true });
    }

    fn discover_services(&mut self) {
        self.push(Op::DiscoverServices);
        self.respond(LinkEvent::ServicesDiscovered { success: true });
    }

    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Result<CharacteristicRef, GattError> {
        if self.missing.contains(&uuid) || !KNOWN.contains(&(service, uuid)) {
            return Err(GattError::CharacteristicNotFound {
                service,
                characteristic: uuid,
            });
        }
        Ok(CharacteristicRef { service, uuid })
    }

    fn descriptor(&self, ch: &CharacteristicRef, uuid: Uuid) -> Result<DescriptorRef, GattError> {
        if uuid != CCCD || self.missing_cccd.contains(&ch.uuid) {
            return Err(GattError::DescriptorNotFound {
                characteristic: ch.uuid,
                descriptor: uuid,
            });
        }
        Ok(DescriptorRef {
            characteristic: *ch,
            uuid,
        })
    }

    fn set_notify(&mut self, ch: &CharacteristicRef, enabled: bool) {
        self.push(Op::SetNotify(ch.uuid, enabled));
    }

    fn write_characteristic(&mut self, ch: &CharacteristicRef, value: &[u8]) {
        self.push(Op::Write(ch.uuid, value.to_vec()));
    }

    fn write_descriptor(&mut self, desc: &DescriptorRef, value: &[u8]) {
        self.push(Op::WriteDescriptor(desc.characteristic.uuid, value.to_vec()));
    }

    fn read_characteristic(&mut self, ch: &CharacteristicRef) {
        self.push(Op::Read(ch.uuid));
    }
}

impl LinkBackend for MockLink {
    type Event = LinkEvent;

    fn absorb(&mut self, ev: LinkEvent) -> Option<LinkEvent> {
        Some(ev)
    }
}

// ── Engine fixtures ───────────────────────────────────────────────────────────

pub fn device(id: &str, name: &str) -> DeviceHandle {
    DeviceHandle {
        id: id.into(),
        name: name.into(),
    }
}

pub fn band() -> DeviceHandle {
    device("AA:BB:CC:DD:EE:01", "LXB-01A2")
}

pub fn engine_with(config: LinkBandConfig, link: MockLink) -> LinkBandEngine<MockLink> {
    let _ = env_logger::builder().is_test(true).try_init();
    LinkBandEngine::new(config, link)
}

pub fn engine() -> LinkBandEngine<MockLink> {
    engine_with(LinkBandConfig::default(), MockLink::new())
}

pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Drive a fresh link to `ServicesReady` with default timing.
pub fn connect_ready(e: &mut LinkBandEngine<MockLink>) {
    e.connect(band());
    e.handle_link_event(LinkEvent::ConnectionStateChanged { connected: true });
    e.handle_link_event(LinkEvent::MtuChanged {
        mtu: 515,
        success: true,
    });
    e.advance_by(ms(1000));
    assert_eq!(e.state(), ConnectionState::ServicesDiscovering);
    e.handle_link_event(LinkEvent::ServicesDiscovered { success: true });
    e.advance_by(ms(2000));
    assert_eq!(e.state(), ConnectionState::ServicesReady);
    e.drain_events();
    e.link().take_ops();
}

/// A notification from `sensor`'s notify characteristic.
pub fn notify(sensor: SensorType, value: Vec<u8>) -> LinkEvent {
    LinkEvent::CharacteristicChanged {
        uuid: notify_characteristic(sensor).1,
        value,
    }
}

/// A packet of `n` well-formed samples for `sensor` starting at `ticks`.
pub fn packet(sensor: SensorType, ticks: u32, n: usize) -> Vec<u8> {
    let size = match sensor {
        SensorType::Eeg => EEG_SAMPLE_SIZE,
        SensorType::Ppg => PPG_SAMPLE_SIZE,
        SensorType::Acc => ACC_SAMPLE_SIZE,
    };
    let mut p = ticks.to_le_bytes().to_vec();
    for k in 0..n {
        p.extend((0..size).map(|i| ((k + i) % 7) as u8));
    }
    p
}

pub fn ops_on(ops: &[Op], uuid: Uuid) -> Vec<Op> {
    ops.iter()
        .filter(|op| match op {
            Op::SetNotify(u, _) | Op::Write(u, _) | Op::WriteDescriptor(u, _) | Op::Read(u) => {
                *u == uuid
            }
            _ => false,
        })
        .cloned()
        .collect()
}

pub fn count<F: Fn(&DeviceEvent) -> bool>(events: &[DeviceEvent], f: F) -> usize {
    events.iter().filter(|e| f(e)).count()
}
