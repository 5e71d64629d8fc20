//! [`GattLink`] on top of `btleplug`.
//!
//! btleplug is async; [`GattLink`] is not.  Every request spawns a short tokio
//! task that performs the operation and reports the outcome as a
//! [`BtleEvent`] on the channel returned by [`BtleLink::new`].  The runtime
//! loop hands each event back to [`BtleLink::absorb`], which updates the
//! link's own bookkeeping (peripheral, discovered characteristics) and
//! yields the [`LinkEvent`] for the engine.  All state changes therefore
//! happen on the runtime loop and no locking is needed.
//!
//! Each physical link gets a generation number.  Events from tasks belonging
//! to an older link are dropped in `absorb`, so a late notification or
//! disconnect from the previous peripheral never reaches the engine.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::LinkBackend;
use crate::config::LinkConfig;
use crate::error::GattError;
use crate::gatt::{CharacteristicRef, DescriptorRef, GattLink, LinkEvent};
use crate::types::DeviceHandle;

/// Outcome of a background btleplug operation.  Opaque; pass it to
/// [`BtleLink::absorb`].
#[derive(Debug)]
pub struct BtleEvent {
    generation: u64,
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Discovered {
        device: DeviceHandle,
        peripheral: Peripheral,
    },
    Connected(Peripheral),
    Services(Option<BTreeSet<Characteristic>>),
    /// Connect failed, or the link dropped.
    Lost,
    Link(LinkEvent),
}

pub struct BtleLink {
    adapter: Adapter,
    tx: mpsc::UnboundedSender<BtleEvent>,
    connect_timeout: Duration,
    /// Peripherals seen while scanning, by id.
    known: HashMap<String, Peripheral>,
    peripheral: Option<Peripheral>,
    characteristics: BTreeSet<Characteristic>,
    generation: u64,
    scan_task: Option<JoinHandle<()>>,
    link_tasks: Vec<JoinHandle<()>>,
}

impl BtleLink {
    /// Open the first Bluetooth adapter.
    pub async fn new(cfg: &LinkConfig) -> Result<(Self, mpsc::UnboundedReceiver<BtleEvent>)> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        wait_powered_on(&adapter).await;

        let (tx, rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                adapter,
                tx,
                connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
                known: HashMap::new(),
                peripheral: None,
                characteristics: BTreeSet::new(),
                generation: 0,
                scan_task: None,
                link_tasks: Vec::new(),
            },
            rx,
        ))
    }

    fn emit(&self, kind: Kind) {
        let _ = self.tx.send(BtleEvent {
            generation: self.generation,
            kind,
        });
    }

    /// Spawn `op` against the current peripheral; its result is reported
    /// under the current generation.
    fn spawn_op<F, Fut>(&self, what: &'static str, op: F)
    where
        F: FnOnce(Peripheral) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Option<LinkEvent>> + Send + 'static,
    {
        let Some(p) = self.peripheral.clone() else {
            warn!("btle: {what}: {}", GattError::NotConnected);
            return;
        };
        let tx = self.tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            if let Some(ev) = op(p).await {
                let _ = tx.send(BtleEvent {
                    generation,
                    kind: Kind::Link(ev),
                });
            }
        });
    }

    fn find(&self, ch: &CharacteristicRef) -> Option<Characteristic> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == ch.uuid && c.service_uuid == ch.service)
            .cloned()
    }

    /// Forget the current link and invalidate its in-flight events.
    fn drop_link(&mut self) -> Option<Peripheral> {
        self.generation += 1;
        for t in self.link_tasks.drain(..) {
            t.abort();
        }
        self.characteristics.clear();
        self.peripheral.take()
    }

    /// Spawn the notification pump and the disconnect watcher for `p`.
    fn watch(&mut self, p: &Peripheral) {
        let generation = self.generation;

        let tx = self.tx.clone();
        let peripheral = p.clone();
        self.link_tasks.push(tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("btle: could not get notifications stream: {e}");
                    return;
                }
            };
            while let Some(n) = notifications.next().await {
                let ev = LinkEvent::CharacteristicChanged {
                    uuid: n.uuid,
                    value: n.value,
                };
                if tx.send(BtleEvent { generation, kind: Kind::Link(ev) }).is_err() {
                    return;
                }
            }
            info!("btle: notification stream ended");
            let _ = tx.send(BtleEvent { generation, kind: Kind::Lost });
        }));

        // The adapter's DeviceDisconnected usually arrives well before the
        // notification stream closes.
        let tx = self.tx.clone();
        let adapter = self.adapter.clone();
        let id = p.id();
        self.link_tasks.push(tokio::spawn(async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(gone) = event {
                            if gone == id {
                                info!("btle: device {gone:?} disconnected");
                                let _ = tx.send(BtleEvent { generation, kind: Kind::Lost });
                                return;
                            }
                        }
                    }
                }
                Err(e) => warn!("btle: could not subscribe to adapter events: {e}"),
            }
        }));
    }
}

impl LinkBackend for BtleLink {
    type Event = BtleEvent;

    fn absorb(&mut self, ev: BtleEvent) -> Option<LinkEvent> {
        if let Kind::Discovered { device, peripheral } = ev.kind {
            self.known.insert(device.id.clone(), peripheral);
            return Some(LinkEvent::DeviceDiscovered(device));
        }
        if ev.generation != self.generation {
            debug!("btle: dropping event from a previous link");
            return None;
        }
        match ev.kind {
            Kind::Discovered { .. } => None,
            Kind::Connected(p) => {
                self.watch(&p);
                self.peripheral = Some(p);
                Some(LinkEvent::ConnectionStateChanged { connected: true })
            }
            Kind::Services(chars) => {
                let success = chars.is_some();
                self.characteristics = chars.unwrap_or_default();
                debug!("btle: {} characteristic(s)", self.characteristics.len());
                Some(LinkEvent::ServicesDiscovered { success })
            }
            Kind::Lost => {
                if let Some(p) = self.drop_link() {
                    tokio::spawn(async move {
                        p.disconnect().await.ok();
                    });
                }
                Some(LinkEvent::ConnectionStateChanged { connected: false })
            }
            Kind::Link(e) => Some(e),
        }
    }
}

impl GattLink for BtleLink {
    fn start_scan(&mut self) {
        if let Some(t) = self.scan_task.take() {
            t.abort();
        }
        let adapter = self.adapter.clone();
        let tx = self.tx.clone();
        self.scan_task = Some(tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(e) => e,
                Err(e) => {
                    warn!("btle: could not subscribe to adapter events: {e}");
                    return;
                }
            };
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                warn!("btle: start_scan failed: {e}");
                return;
            }
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(props)) = peripheral.properties().await else {
                    continue;
                };
                let Some(name) = props.local_name else {
                    continue;
                };
                let device = DeviceHandle {
                    id: peripheral.id().to_string(),
                    name,
                };
                let ev = BtleEvent {
                    generation: 0,
                    kind: Kind::Discovered { device, peripheral },
                };
                if tx.send(ev).is_err() {
                    return;
                }
            }
        }));
    }

    fn stop_scan(&mut self) {
        if let Some(t) = self.scan_task.take() {
            t.abort();
        }
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            adapter.stop_scan().await.ok();
        });
    }

    fn connect(&mut self, device: &DeviceHandle) {
        if let Some(old) = self.drop_link() {
            tokio::spawn(async move {
                old.disconnect().await.ok();
            });
        }
        let Some(p) = self.known.get(&device.id).cloned() else {
            warn!("btle: {} was never seen in a scan", device.id);
            self.emit(Kind::Lost);
            return;
        };
        let tx = self.tx.clone();
        let generation = self.generation;
        let limit = self.connect_timeout;
        tokio::spawn(async move {
            // BlueZ can block forever on Device1.Connect when the device is
            // out of range.
            let kind = match tokio::time::timeout(limit, p.connect()).await {
                Ok(Ok(())) => Kind::Connected(p),
                Ok(Err(e)) => {
                    warn!("btle: connect failed: {e}");
                    Kind::Lost
                }
                Err(_) => {
                    warn!("btle: connect timed out after {} s", limit.as_secs());
                    Kind::Lost
                }
            };
            let _ = tx.send(BtleEvent { generation, kind });
        });
    }

    fn disconnect(&mut self) {
        if let Some(p) = self.drop_link() {
            tokio::spawn(async move {
                if let Err(e) = p.disconnect().await {
                    warn!("btle: disconnect: {e}");
                }
            });
        }
    }

    fn request_mtu(&mut self, mtu: u16) {
        // btleplug leaves MTU negotiation to the OS stack.
        debug!("btle: MTU {mtu} requested; negotiated by the platform");
        self.emit(Kind::Link(LinkEvent::MtuChanged {
            mtu,
            success: false,
        }));
    }

    fn discover_services(&mut self) {
        let Some(p) = self.peripheral.clone() else {
            warn!("btle: discover_services: {}", GattError::NotConnected);
            return;
        };
        let tx = self.tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            // BlueZ reports the connection before its GATT cache is filled;
            // discovering too early returns an empty set.
            #[cfg(target_os = "linux")]
            tokio::time::sleep(Duration::from_millis(600)).await;

            let chars = match tokio::time::timeout(Duration::from_secs(15), p.discover_services())
                .await
            {
                Ok(Ok(())) => Some(p.characteristics()),
                Ok(Err(e)) => {
                    warn!("btle: discover_services failed: {e}");
                    None
                }
                Err(_) => {
                    warn!("btle: discover_services timed out after 15 s");
                    None
                }
            };
            let _ = tx.send(BtleEvent {
                generation,
                kind: Kind::Services(chars),
            });
        });
    }

    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Result<CharacteristicRef, GattError> {
        if self.peripheral.is_none() {
            return Err(GattError::NotConnected);
        }
        let r = CharacteristicRef { service, uuid };
        self.find(&r)
            .map(|_| r)
            .ok_or(GattError::CharacteristicNotFound {
                service,
                characteristic: uuid,
            })
    }

    fn descriptor(&self, ch: &CharacteristicRef, uuid: Uuid) -> Result<DescriptorRef, GattError> {
        let c = self.find(ch).ok_or(GattError::CharacteristicNotFound {
            service: ch.service,
            characteristic: ch.uuid,
        })?;
        if c.descriptors.iter().any(|d| d.uuid == uuid) {
            Ok(DescriptorRef {
                characteristic: *ch,
                uuid,
            })
        } else {
            Err(GattError::DescriptorNotFound {
                characteristic: ch.uuid,
                descriptor: uuid,
            })
        }
    }

    fn set_notify(&mut self, ch: &CharacteristicRef, enabled: bool) {
        let Some(c) = self.find(ch) else {
            return;
        };
        self.spawn_op("set_notify", move |p| async move {
            let res = if enabled {
                p.subscribe(&c).await
            } else {
                p.unsubscribe(&c).await
            };
            if let Err(e) = res {
                warn!("btle: notify({enabled}) on {}: {e}", c.uuid);
            }
            None
        });
    }

    fn write_characteristic(&mut self, ch: &CharacteristicRef, value: &[u8]) {
        let Some(c) = self.find(ch) else {
            return;
        };
        let value = value.to_vec();
        self.spawn_op("write", move |p| async move {
            let res = p.write(&c, &value, WriteType::WithResponse).await;
            if let Err(e) = &res {
                warn!("btle: write to {}: {e}", c.uuid);
            }
            Some(LinkEvent::WriteCompleted {
                uuid: c.uuid,
                success: res.is_ok(),
            })
        });
    }

    fn write_descriptor(&mut self, desc: &DescriptorRef, value: &[u8]) {
        let Some(d) = self
            .find(&desc.characteristic)
            .and_then(|c| c.descriptors.into_iter().find(|d| d.uuid == desc.uuid))
        else {
            return;
        };
        let value = value.to_vec();
        self.spawn_op("write_descriptor", move |p| async move {
            let res = p.write_descriptor(&d, &value).await;
            if let Err(e) = &res {
                warn!("btle: descriptor write on {}: {e}", d.characteristic_uuid);
            }
            Some(LinkEvent::DescriptorWriteCompleted {
                uuid: d.characteristic_uuid,
                success: res.is_ok(),
            })
        });
    }

    fn read_characteristic(&mut self, ch: &CharacteristicRef) {
        let Some(c) = self.find(ch) else {
            return;
        };
        self.spawn_op("read", move |p| async move {
            match p.read(&c).await {
                Ok(value) => Some(LinkEvent::CharacteristicChanged {
                    uuid: c.uuid,
                    value,
                }),
                Err(e) => {
                    warn!("btle: read {}: {e}", c.uuid);
                    None
                }
            }
        });
    }
}

impl Drop for BtleLink {
    fn drop(&mut self) {
        if let Some(t) = self.scan_task.take() {
            t.abort();
        }
        for t in self.link_tasks.drain(..) {
            t.abort();
        }
    }
}

/// On macOS, `CBCentralManager` starts in an unknown state and silently
/// ignores scans until it reports PoweredOn.
#[cfg(target_os = "macos")]
async fn wait_powered_on(adapter: &Adapter) {
    use btleplug::api::CentralState;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        match adapter.adapter_state().await {
            Ok(CentralState::PoweredOn) => break,
            Ok(state) if tokio::time::Instant::now() >= deadline => {
                warn!("btle: adapter still {state:?} after 3 s, proceeding anyway");
                break;
            }
            Ok(state) => debug!("btle: adapter state {state:?}, waiting"),
            Err(e) => {
                warn!("btle: adapter_state: {e}");
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
}

#[cfg(not(target_os = "macos"))]
async fn wait_powered_on(_adapter: &Adapter) {}
