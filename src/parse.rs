//! Binary decoders for LinkBand BLE notification payloads.
//!
//! All public functions in this module are pure: no I/O, no state carried
//! between calls.  They are safe to call from any async or sync context.
//!
//! # Packet layout
//!
//! Every sensor packet shares the same framing:
//!
//! ```text
//! [0..4]   hardware tick count, u32 little-endian (seconds = ticks / divisor)
//! [4..]    N whole samples, followed by at most one partial sample (ignored)
//! ```
//!
//! | Function | Sensor | Sample | Format |
//! |---|---|---|---|
//! | [`decode_eeg`] | EEG | 7 B | lead-off u8, 2 × 24-bit BE signed |
//! | [`decode_ppg`] | PPG | 6 B | 2 × 24-bit BE unsigned (red, IR) |
//! | [`decode_acc`] | ACC | 6 B | odd bytes as u8, or 3 × i16 LE |
//! | [`decode_battery`] | Battery | 1 B | level in percent |
//!
//! Sample `k` of a packet is stamped `header_time + k / sample_rate`.
//! A packet shorter than header + one sample is rejected with
//! [`DecodeError::PacketTooShort`]; a trailing partial sample is dropped.

use log::debug;

use crate::config::{AccLayout, SensorConfig};
use crate::error::DecodeError;
use crate::protocol::{ACC_SAMPLE_SIZE, EEG_SAMPLE_SIZE, PACKET_HEADER_SIZE, PPG_SAMPLE_SIZE};
use crate::types::{AccSample, BatterySample, EegSample, PpgSample};

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Read the 32-bit little-endian tick count from the packet header.
///
/// Callers must have checked `data.len() >= PACKET_HEADER_SIZE`.
fn header_ticks(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// Read a 24-bit big-endian unsigned value.
fn read_u24_be(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32)
}

/// Sign-extend a 24-bit two's-complement value held in the low bits of `raw`.
///
/// ```
/// # use linkband_rs::parse::sign_extend_24;
/// assert_eq!(sign_extend_24(0x80_0000), -8_388_608);
/// assert_eq!(sign_extend_24(0x7F_FFFF), 8_388_607);
/// ```
pub fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

/// Validate length and split a packet into `(start_seconds, whole samples)`.
///
/// Logs (debug) when the packet differs from the configured expected size.
fn frame<'a>(
    data: &'a [u8],
    sensor: &'static str,
    sample_size: usize,
    expected_size: usize,
    divisor: f64,
) -> Result<(f64, std::slice::ChunksExact<'a, u8>), DecodeError> {
    let min = PACKET_HEADER_SIZE + sample_size;
    if data.len() < min {
        return Err(DecodeError::PacketTooShort {
            sensor,
            len: data.len(),
            min,
        });
    }
    let body = &data[PACKET_HEADER_SIZE..];
    if data.len() != expected_size {
        debug!(
            "{sensor} packet size {} (expected {expected_size}), decoding {} sample(s){}",
            data.len(),
            body.len() / sample_size,
            if body.len() % sample_size != 0 {
                ", dropping partial tail"
            } else {
                ""
            }
        );
    }
    let start = header_ticks(data) as f64 / divisor;
    Ok((start, body.chunks_exact(sample_size)))
}

// ── EEG ──────────────────────────────────────────────────────────────────────

/// Convert a signed ADC code to microvolts:
/// `raw × Vref / gain / resolution × 1e6`.
pub fn eeg_raw_to_microvolts(raw: i32, cfg: &SensorConfig) -> f64 {
    raw as f64 * cfg.eeg_voltage_reference / cfg.eeg_gain / cfg.eeg_resolution * 1e6
}

/// Decode an EEG notification.
///
/// Sample layout (7 bytes):
/// ```text
/// [0]     lead-off flag (> 0 = electrode not in contact)
/// [1..4]  channel 1, 24-bit big-endian two's complement
/// [4..7]  channel 2, 24-bit big-endian two's complement
/// ```
pub fn decode_eeg(data: &[u8], cfg: &SensorConfig) -> Result<Vec<EegSample>, DecodeError> {
    let (start, samples) = frame(
        data,
        "EEG",
        EEG_SAMPLE_SIZE,
        cfg.eeg_packet_size,
        cfg.timestamp_divisor,
    )?;
    let step = 1.0 / cfg.eeg_sample_rate;
    Ok(samples
        .enumerate()
        .map(|(k, s)| {
            let ch1_raw = sign_extend_24(read_u24_be(&s[1..4]));
            let ch2_raw = sign_extend_24(read_u24_be(&s[4..7]));
            EegSample {
                timestamp: start + k as f64 * step,
                lead_off: s[0] > 0,
                channel1_uv: eeg_raw_to_microvolts(ch1_raw, cfg),
                channel2_uv: eeg_raw_to_microvolts(ch2_raw, cfg),
                ch1_raw,
                ch2_raw,
            }
        })
        .collect())
}

// ── PPG ──────────────────────────────────────────────────────────────────────

/// Decode a PPG notification: per sample, red then IR as 24-bit BE unsigned.
pub fn decode_ppg(data: &[u8], cfg: &SensorConfig) -> Result<Vec<PpgSample>, DecodeError> {
    let (start, samples) = frame(
        data,
        "PPG",
        PPG_SAMPLE_SIZE,
        cfg.ppg_packet_size,
        cfg.timestamp_divisor,
    )?;
    let step = 1.0 / cfg.ppg_sample_rate;
    Ok(samples
        .enumerate()
        .map(|(k, s)| PpgSample {
            timestamp: start + k as f64 * step,
            red: read_u24_be(&s[0..3]) as i32,
            ir: read_u24_be(&s[3..6]) as i32,
        })
        .collect())
}

// ── Accelerometer ─────────────────────────────────────────────────────────────

/// Decode an accelerometer notification.
///
/// With [`AccLayout::OddByte`] only bytes 1, 3 and 5 of each 6-byte sample
/// carry data (x, y, z), each an unsigned 8-bit magnitude.  With
/// [`AccLayout::SignedLe16`] each 2-byte slot is a little-endian `i16`.
pub fn decode_acc(data: &[u8], cfg: &SensorConfig) -> Result<Vec<AccSample>, DecodeError> {
    let (start, samples) = frame(
        data,
        "ACC",
        ACC_SAMPLE_SIZE,
        cfg.acc_packet_size,
        cfg.timestamp_divisor,
    )?;
    let step = 1.0 / cfg.acc_sample_rate;
    let layout = cfg.acc_layout;
    Ok(samples
        .enumerate()
        .map(|(k, s)| {
            let (x, y, z) = match layout {
                AccLayout::OddByte => (s[1] as i16, s[3] as i16, s[5] as i16),
                AccLayout::SignedLe16 => (
                    i16::from_le_bytes([s[0], s[1]]),
                    i16::from_le_bytes([s[2], s[3]]),
                    i16::from_le_bytes([s[4], s[5]]),
                ),
            };
            AccSample {
                timestamp: start + k as f64 * step,
                x,
                y,
                z,
            }
        })
        .collect())
}

// ── Battery ───────────────────────────────────────────────────────────────────

/// Decode the standard Battery Level characteristic (first byte, percent).
///
/// Values above 100 are clamped.
pub fn decode_battery(data: &[u8]) -> Result<BatterySample, DecodeError> {
    match data.first() {
        Some(&level) => Ok(BatterySample {
            level_percent: level.min(100),
        }),
        None => Err(DecodeError::PacketTooShort {
            sensor: "Battery",
            len: 0,
            min: 1,
        }),
    }
}
