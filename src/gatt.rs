//! The seam between the protocol engine and a platform BLE binding.
//!
//! [`GattLink`] is what the engine needs from a Bluetooth stack: scan,
//! connect, attribute lookup, and fire-and-forget GATT requests.  Every
//! request returns immediately; its outcome comes back later as a
//! [`LinkEvent`] fed to [`crate::engine::LinkBandEngine::handle_link_event`].
//!
//! [`crate::btle::BtleLink`] implements this on top of `btleplug`; the
//! integration tests implement it with a recording mock.

use uuid::Uuid;

use crate::error::GattError;
use crate::types::DeviceHandle;

/// A characteristic known to exist on the connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub uuid: Uuid,
}

/// A descriptor known to exist on the connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRef {
    pub characteristic: CharacteristicRef,
    pub uuid: Uuid,
}

/// Asynchronous completions and unsolicited events from the BLE stack.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A peripheral advertised during a scan.
    DeviceDiscovered(DeviceHandle),
    /// The link came up (`true`) or went down (`false`), for any reason.
    ConnectionStateChanged { connected: bool },
    /// Response to [`GattLink::request_mtu`].
    MtuChanged { mtu: u16, success: bool },
    /// Response to [`GattLink::discover_services`].
    ServicesDiscovered { success: bool },
    /// A notification, or the value returned by a read.
    CharacteristicChanged { uuid: Uuid, value: Vec<u8> },
    WriteCompleted { uuid: Uuid, success: bool },
    DescriptorWriteCompleted { uuid: Uuid, success: bool },
}

/// Non-blocking BLE operations against at most one peripheral.
pub trait GattLink {
    fn start_scan(&mut self);
    fn stop_scan(&mut self);

    /// Begin connecting; completion arrives as `ConnectionStateChanged`.
    fn connect(&mut self, device: &DeviceHandle);
    /// Drop the link and release its resources.  No event is expected.
    fn disconnect(&mut self);

    fn request_mtu(&mut self, mtu: u16);
    fn discover_services(&mut self);

    /// Look up a characteristic discovered on the current link.
    fn characteristic(&self, service: Uuid, uuid: Uuid) -> Result<CharacteristicRef, GattError>;
    /// Look up a descriptor of a discovered characteristic.
    fn descriptor(&self, ch: &CharacteristicRef, uuid: Uuid) -> Result<DescriptorRef, GattError>;

    /// Enable or disable local delivery of notifications for `ch`.
    fn set_notify(&mut self, ch: &CharacteristicRef, enabled: bool);
    fn write_characteristic(&mut self, ch: &CharacteristicRef, value: &[u8]);
    fn write_descriptor(&mut self, desc: &DescriptorRef, value: &[u8]);
    fn read_characteristic(&mut self, ch: &CharacteristicRef);
}
