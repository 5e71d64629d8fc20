//! GATT UUIDs, descriptor values, and write-characteristic commands for
//! LinkBand (`LXB-…`) wearables.
//!
//! Each sensor lives in its own vendor service with a single notify
//! characteristic.  EEG additionally exposes a write characteristic that
//! accepts start/stop commands; the battery level uses the standard
//! Battery Service.

use uuid::Uuid;

use crate::types::SensorType;

// ── Services ─────────────────────────────────────────────────────────────────

/// Accelerometer vendor service.
pub const ACCELEROMETER_SERVICE: Uuid = Uuid::from_u128(0x75c276c3_8f97_20bc_a143_b354244886d4);

/// EEG vendor service.  Hosts both the EEG notify and the EEG write characteristic.
pub const EEG_SERVICE: Uuid = Uuid::from_u128(0xdf7b5d95_3afe_00a1_084c_b50895ef4f95);

/// PPG (optical) vendor service.
pub const PPG_SERVICE: Uuid = Uuid::from_u128(0x1cc50ec0_6967_9d84_a243_c2267f924d1f);

/// Standard Bluetooth SIG Battery Service.
pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

// ── Characteristics ───────────────────────────────────────────────────────────

/// Accelerometer samples (notify).
pub const ACCELEROMETER_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0xd3d46a35_4394_e9aa_5a43_e7921120aaed);

/// EEG samples (notify).
pub const EEG_NOTIFY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x00ab4d15_66b4_0d8a_824f_8d6f8966c6e5);

/// EEG command channel (write).
///
/// Besides starting and stopping EEG, a start command here acts as the
/// device-wide wake signal; see [`crate::activation`].
pub const EEG_WRITE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0065cacb_9e52_21bf_a849_99a80d83830e);

/// PPG samples (notify).
pub const PPG_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6c739642_23ba_818b_2045_bfe8970263f6);

/// Battery level, one byte 0–100 (read / notify).
pub const BATTERY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

// ── Descriptors ───────────────────────────────────────────────────────────────

/// Client Characteristic Configuration Descriptor, shared by every notify characteristic.
pub const CCCD: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// CCCD value enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// CCCD value disabling notifications.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

// ── Scanning ──────────────────────────────────────────────────────────────────

/// Advertised-name prefix of every LinkBand device.
pub const DEVICE_NAME_PREFIX: &str = "LXB-";

// ── Packet framing ────────────────────────────────────────────────────────────

/// Every sensor packet starts with a 32-bit little-endian hardware tick count.
pub const PACKET_HEADER_SIZE: usize = 4;

/// Bytes per EEG sample: lead-off flag + two 24-bit channels.
pub const EEG_SAMPLE_SIZE: usize = 7;

/// Bytes per PPG sample: two 24-bit unsigned values (red, IR).
pub const PPG_SAMPLE_SIZE: usize = 6;

/// Bytes per accelerometer sample: three 2-byte slots.
pub const ACC_SAMPLE_SIZE: usize = 6;

// ── Sampling constants ────────────────────────────────────────────────────────

/// EEG sample rate in Hz.
pub const EEG_FREQUENCY: f64 = 250.0;

/// PPG sample rate in Hz.
pub const PPG_FREQUENCY: f64 = 50.0;

/// Accelerometer sample rate in Hz.
pub const ACC_FREQUENCY: f64 = 30.0;

/// Hardware tick rate; `seconds = ticks / TIMESTAMP_DIVISOR`.
pub const TIMESTAMP_DIVISOR: f64 = 32768.0;

// ── Topology lookup ───────────────────────────────────────────────────────────

/// `(service, notify characteristic)` pair carrying samples for `sensor`.
pub fn notify_characteristic(sensor: SensorType) -> (Uuid, Uuid) {
    match sensor {
        SensorType::Eeg => (EEG_SERVICE, EEG_NOTIFY_CHARACTERISTIC),
        SensorType::Ppg => (PPG_SERVICE, PPG_CHARACTERISTIC),
        SensorType::Acc => (ACCELEROMETER_SERVICE, ACCELEROMETER_CHARACTERISTIC),
    }
}

/// Reverse of [`notify_characteristic`]: which sensor a notification belongs to.
pub fn sensor_for_characteristic(uuid: Uuid) -> Option<SensorType> {
    SensorType::ALL
        .into_iter()
        .find(|&s| notify_characteristic(s).1 == uuid)
}

// ── EEG write-characteristic commands ─────────────────────────────────────────

/// Encode an EEG write-characteristic command.
///
/// Firmware revisions disagree on the start command: some accept the ASCII
/// string `"start"`, others a single `0x01` byte.  A command given as a hex
/// literal (`"0x01"`) is sent as raw bytes; anything else is sent as ASCII.
///
/// ```
/// # use linkband_rs::protocol::encode_command;
/// assert_eq!(encode_command("start"), b"start");
/// assert_eq!(encode_command("0x01"), &[0x01]);
/// ```
pub fn encode_command(cmd: &str) -> Vec<u8> {
    match cmd.strip_prefix("0x") {
        Some(hex) if !hex.is_empty() && hex.is_ascii() && hex.len() % 2 == 0 => {
            let bytes: Option<Vec<u8>> = (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
                .collect();
            bytes.unwrap_or_else(|| cmd.as_bytes().to_vec())
        }
        _ => cmd.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sensor_round_trips_through_its_characteristic() {
        for sensor in SensorType::ALL {
            let (_, ch) = notify_characteristic(sensor);
            assert_eq!(sensor_for_characteristic(ch), Some(sensor));
        }
        assert_eq!(sensor_for_characteristic(BATTERY_CHARACTERISTIC), None);
    }

    #[test]
    fn malformed_hex_command_falls_back_to_ascii() {
        assert_eq!(encode_command("0xZZ"), b"0xZZ");
        assert_eq!(encode_command("stop"), b"stop");
        assert_eq!(encode_command("0x0102"), &[0x01, 0x02]);
    }
}
