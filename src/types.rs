use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A logical sensor stream, each backed by its own GATT service and notify
/// characteristic (see [`crate::protocol::notify_characteristic`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Eeg,
    Ppg,
    Acc,
}

impl SensorType {
    /// Every sensor, in declaration order.
    pub const ALL: [SensorType; 3] = [SensorType::Eeg, SensorType::Ppg, SensorType::Acc];

    /// Firmware-mandated activation order.  Activating sensors in any other
    /// order (or simultaneously) leaves some of them silent on current hardware.
    pub const ACTIVATION_ORDER: [SensorType; 3] =
        [SensorType::Eeg, SensorType::Acc, SensorType::Ppg];

    /// Upper-case label used in log lines and recording file names.
    pub fn label(self) -> &'static str {
        match self {
            SensorType::Eeg => "EEG",
            SensorType::Ppg => "PPG",
            SensorType::Acc => "ACC",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State of the single physical link.
///
/// ```text
/// Disconnected → Connecting → Connected → ServicesDiscovering → ServicesReady
///       ↑______________________ link drop (any state) ______________|
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    ServicesDiscovering,
    ServicesReady,
}

/// Opaque reference to a peripheral, as reported by the platform binding.
///
/// `id` is whatever the binding uses to find the peripheral again
/// (a MAC address on Linux, a UUID string on macOS / Windows).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    pub id: String,
    /// Advertised name, e.g. `"LXB-01A2"`.
    pub name: String,
}

// ── Samples ───────────────────────────────────────────────────────────────────

/// Access to the device-clock timestamp of a sample, in milliseconds.
///
/// Used by [`crate::batch`] to measure batch windows on device time.
pub trait Timestamped {
    fn timestamp_ms(&self) -> f64;
}

/// One two-channel EEG sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EegSample {
    /// Device time in seconds (`ticks / timestamp_divisor`).
    pub timestamp: f64,
    /// `true` when an electrode is not in contact.
    pub lead_off: bool,
    /// Channel 1 in µV.
    pub channel1_uv: f64,
    /// Channel 2 in µV.
    pub channel2_uv: f64,
    /// Channel 1 as the sign-extended 24-bit ADC value.
    pub ch1_raw: i32,
    /// Channel 2 as the sign-extended 24-bit ADC value.
    pub ch2_raw: i32,
}

/// One PPG sample: raw 24-bit red and infrared LED readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpgSample {
    pub timestamp: f64,
    pub red: i32,
    pub ir: i32,
}

/// One accelerometer sample in raw device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccSample {
    pub timestamp: f64,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// Battery state of charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatterySample {
    /// 0–100.
    pub level_percent: u8,
}

macro_rules! impl_timestamped {
    ($($t:ty),*) => {
        $(impl Timestamped for $t {
            fn timestamp_ms(&self) -> f64 {
                self.timestamp * 1000.0
            }
        })*
    };
}

impl_timestamped!(EegSample, PpgSample, AccSample);

// ── Events ────────────────────────────────────────────────────────────────────

/// Everything the driver reports to its consumer.
///
/// Produced by [`crate::engine::LinkBandEngine`] and forwarded over the
/// channel returned by [`crate::client::LinkBandClient::start`].
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The filtered, de-duplicated list of `LXB-` devices seen so far.
    ScanResults(Vec<DeviceHandle>),
    /// Scanning started (`true`) or stopped (`false`).
    Scanning(bool),
    /// The link moved to a new [`ConnectionState`].
    StateChanged(ConnectionState),
    /// A link to the named device came up.
    Connected(DeviceHandle),
    /// The link went down, manually or not.
    Disconnected,

    /// Decoded samples from one notification.
    Eeg(Vec<EegSample>),
    Ppg(Vec<PpgSample>),
    Acc(Vec<AccSample>),
    Battery(BatterySample),

    /// A completed collection batch (see [`crate::batch`]).
    EegBatch(Vec<EegSample>),
    PpgBatch(Vec<PpgSample>),
    AccBatch(Vec<AccSample>),

    /// Selection changed through select / deselect or the connect-time default.
    SelectionChanged(BTreeSet<SensorType>),
    /// The subscribe step was issued for this sensor.
    SensorStarted(SensorType),
    /// First data from this sensor arrived while it was activating.
    SensorConfirmed(SensorType),
    /// No data arrived from this sensor within the activation timeout.
    ActivationTimedOut(SensorType),
    /// Activation queue drained (`true`) or streaming stopped (`false`).
    ReceivingData(bool),

    AutoReconnect(bool),
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The attempt cap was reached; only a manual connect will retry.
    ReconnectExhausted,

    /// Recording opened these files.
    RecordingStarted(Vec<PathBuf>),
    RecordingStopped,
}
