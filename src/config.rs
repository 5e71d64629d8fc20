//! Driver configuration.
//!
//! Every timing constant and decoding parameter of the driver lives here so
//! that a different firmware revision can be accommodated with a TOML file
//! instead of a rebuild.  All sections are optional; missing keys take the
//! values that match current LinkBand hardware.
//!
//! ```toml
//! [sensors]
//! acc_sample_rate = 25.0
//! acc_layout = "signed_le16"
//!
//! [activation]
//! timeout_ms = 5000
//! eeg_start_command = "0x01"
//!
//! [reconnect]
//! backoff_ms = [1000, 2000, 4000]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::{
    ACC_FREQUENCY, DEVICE_NAME_PREFIX, EEG_FREQUENCY, PPG_FREQUENCY, TIMESTAMP_DIVISOR,
};
use crate::types::SensorType;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

/// Top-level configuration for [`crate::engine::LinkBandEngine`] and
/// [`crate::client::LinkBandClient`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkBandConfig {
    pub scan: ScanConfig,
    pub link: LinkConfig,
    pub sensors: SensorConfig,
    pub activation: ActivationConfig,
    pub reconnect: ReconnectConfig,
    pub batch: BatchConfig,
    pub recording: RecordingConfig,
}

impl LinkBandConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would make decoding or scheduling meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sensors;
        for (name, rate) in [
            ("eeg_sample_rate", s.eeg_sample_rate),
            ("ppg_sample_rate", s.ppg_sample_rate),
            ("acc_sample_rate", s.acc_sample_rate),
        ] {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::Invalid(format!("sensors.{name} must be > 0, got {rate}")));
            }
        }
        if s.timestamp_divisor == 0.0 || !s.timestamp_divisor.is_finite() {
            return Err(ConfigError::Invalid("sensors.timestamp_divisor must be non-zero".into()));
        }
        if s.eeg_gain == 0.0 || s.eeg_resolution == 0.0 {
            return Err(ConfigError::Invalid(
                "sensors.eeg_gain and sensors.eeg_resolution must be non-zero".into(),
            ));
        }
        if self.activation.timeout_ms == 0 {
            return Err(ConfigError::Invalid("activation.timeout_ms must be > 0".into()));
        }
        if self.reconnect.backoff_ms.is_empty() {
            return Err(ConfigError::Invalid("reconnect.backoff_ms must not be empty".into()));
        }
        if self.batch.duration_ms == 0 {
            return Err(ConfigError::Invalid("batch.duration_ms must be > 0".into()));
        }
        let c = &self.batch.sample_count;
        if c.eeg == 0 || c.ppg == 0 || c.acc == 0 {
            return Err(ConfigError::Invalid("batch.sample_count entries must be > 0".into()));
        }
        Ok(())
    }
}

// ── Scan ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Only devices whose advertised name starts with this are listed.
    pub name_prefix: String,
    /// How long the CLI scans before connecting to the first match.
    pub scan_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEVICE_NAME_PREFIX.into(),
            scan_timeout_secs: 15,
        }
    }
}

// ── Link ──────────────────────────────────────────────────────────────────────

/// Connection set-up timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// MTU requested right after connecting.  Older firmware negotiates 247.
    pub mtu: u16,
    pub connect_timeout_secs: u64,
    /// Delay between the MTU response and service discovery.
    pub discovery_delay_ms: u64,
    /// Delay between service discovery and the notification-setup entry point.
    pub notification_setup_delay_ms: u64,
    /// Delay between service discovery and the link being marked `ServicesReady`.
    pub services_ready_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mtu: 515,
            connect_timeout_secs: 10,
            discovery_delay_ms: 1000,
            notification_setup_delay_ms: 500,
            services_ready_delay_ms: 2000,
        }
    }
}

impl LinkConfig {
    pub fn discovery_delay(&self) -> Duration {
        ms(self.discovery_delay_ms)
    }
    pub fn notification_setup_delay(&self) -> Duration {
        ms(self.notification_setup_delay_ms)
    }
    pub fn services_ready_delay(&self) -> Duration {
        ms(self.services_ready_delay_ms)
    }
}

// ── Sensors / decoding ────────────────────────────────────────────────────────

/// How the 6-byte accelerometer sample is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccLayout {
    /// Only bytes 1, 3 and 5 carry data, each an unsigned 8-bit value.
    #[default]
    OddByte,
    /// Each 2-byte slot is a little-endian `i16`.
    SignedLe16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub eeg_sample_rate: f64,
    pub ppg_sample_rate: f64,
    pub acc_sample_rate: f64,
    /// Hardware ticks per second in the packet header.
    pub timestamp_divisor: f64,
    /// ADC reference voltage in volts.
    pub eeg_voltage_reference: f64,
    pub eeg_gain: f64,
    /// Full-scale positive code, `2^23 - 1` for a 24-bit ADC.
    pub eeg_resolution: f64,
    /// Expected packet sizes.  Other sizes are still decoded; the mismatch is logged.
    pub eeg_packet_size: usize,
    pub ppg_packet_size: usize,
    pub acc_packet_size: usize,
    pub acc_layout: AccLayout,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            eeg_sample_rate: EEG_FREQUENCY,
            ppg_sample_rate: PPG_FREQUENCY,
            acc_sample_rate: ACC_FREQUENCY,
            timestamp_divisor: TIMESTAMP_DIVISOR,
            eeg_voltage_reference: 4.033,
            eeg_gain: 12.0,
            eeg_resolution: 8_388_607.0,
            eeg_packet_size: 179,
            ppg_packet_size: 172,
            acc_packet_size: 184,
            acc_layout: AccLayout::OddByte,
        }
    }
}

// ── Activation ────────────────────────────────────────────────────────────────

/// Timing of the sequential activation protocol in [`crate::activation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// How long to wait for a sensor's first notification before moving on.
    pub timeout_ms: u64,
    /// Pause after a sensor is confirmed before the next one is started.
    pub settle_ms: u64,
    /// Pause between the EEG start command and the EEG subscribe.
    pub eeg_start_settle_ms: u64,
    pub acc_subscribe_delay_ms: u64,
    pub ppg_subscribe_delay_ms: u64,
    /// Second disable-all pass after the first.
    pub disable_retry_ms: u64,
    /// Extra PPG disable pass; PPG notifications are known to restart on their own.
    pub ppg_disable_retry_ms: u64,
    /// Wait after disable-all before the wake command and queue build.
    pub queue_start_delay_ms: u64,
    /// Added before the first activation when the link is not yet `ServicesReady`.
    pub not_ready_extra_delay_ms: u64,
    /// Sent on the EEG write characteristic to start EEG and wake the device.
    /// `"0x01"` sends the single binary byte accepted by some firmware.
    pub eeg_start_command: String,
    pub eeg_stop_command: String,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8000,
            settle_ms: 500,
            eeg_start_settle_ms: 200,
            acc_subscribe_delay_ms: 600,
            ppg_subscribe_delay_ms: 500,
            disable_retry_ms: 500,
            ppg_disable_retry_ms: 1500,
            queue_start_delay_ms: 1000,
            not_ready_extra_delay_ms: 1000,
            eeg_start_command: "start".into(),
            eeg_stop_command: "stop".into(),
        }
    }
}

impl ActivationConfig {
    pub fn timeout(&self) -> Duration {
        ms(self.timeout_ms)
    }
    pub fn settle(&self) -> Duration {
        ms(self.settle_ms)
    }
    pub fn disable_retry(&self) -> Duration {
        ms(self.disable_retry_ms)
    }
    pub fn ppg_disable_retry(&self) -> Duration {
        ms(self.ppg_disable_retry_ms)
    }
    pub fn queue_start_delay(&self) -> Duration {
        ms(self.queue_start_delay_ms)
    }
    /// Delay between starting a sensor's activation and its notify subscribe.
    pub fn subscribe_delay(&self, sensor: SensorType) -> Duration {
        ms(match sensor {
            SensorType::Eeg => self.eeg_start_settle_ms,
            SensorType::Acc => self.acc_subscribe_delay_ms,
            SensorType::Ppg => self.ppg_subscribe_delay_ms,
        })
    }
}

// ── Reconnect ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Initial state of the auto-reconnect toggle.
    pub enabled: bool,
    pub max_attempts: u32,
    /// Delay before attempt `n` is `backoff_ms[n - 1]`, clamped to the last entry.
    pub backoff_ms: Vec<u64>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            backoff_ms: vec![3000, 5000, 10000, 20000, 30000],
        }
    }
}

impl ReconnectConfig {
    /// Delay before the 1-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) - 1) as usize;
        let v = self
            .backoff_ms
            .get(idx)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(30_000);
        ms(v)
    }
}

// ── Batching ──────────────────────────────────────────────────────────────────

/// How decoded samples are grouped into [`crate::types::DeviceEvent`] batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Fixed device-time windows of `duration_ms`.
    #[default]
    Duration,
    /// Fixed number of samples per batch, per sensor.
    SampleCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleCounts {
    pub eeg: usize,
    pub ppg: usize,
    pub acc: usize,
}

impl Default for SampleCounts {
    fn default() -> Self {
        // One second of data at the default sample rates.
        Self {
            eeg: 250,
            ppg: 50,
            acc: 25,
        }
    }
}

impl SampleCounts {
    pub fn get(&self, sensor: SensorType) -> usize {
        match sensor {
            SensorType::Eeg => self.eeg,
            SensorType::Ppg => self.ppg,
            SensorType::Acc => self.acc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub mode: CollectionMode,
    pub duration_ms: u64,
    pub sample_count: SampleCounts,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: CollectionMode::Duration,
            duration_ms: 1000,
            sample_count: SampleCounts::default(),
        }
    }
}

// ── Recording ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory that receives one CSV per sensor per recording.
    pub directory: PathBuf,
    /// File names are `{prefix}_{SENSOR}_{yyyyMMdd_HHmmss}.csv`.
    pub file_prefix: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("LinkBand"),
            file_prefix: "LinkBand".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = LinkBandConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, LinkBandConfig::default());
        assert_eq!(cfg.activation.timeout(), Duration::from_millis(8000));
        assert_eq!(cfg.reconnect.max_attempts, 5);
        assert_eq!(cfg.scan.name_prefix, "LXB-");
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let cfg = LinkBandConfig::from_toml_str(
            r#"
            [sensors]
            acc_sample_rate = 25.0
            acc_layout = "signed_le16"

            [batch]
            mode = "sample_count"
            sample_count = { eeg = 125 }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sensors.acc_sample_rate, 25.0);
        assert_eq!(cfg.sensors.acc_layout, AccLayout::SignedLe16);
        assert_eq!(cfg.sensors.eeg_sample_rate, 250.0);
        assert_eq!(cfg.batch.mode, CollectionMode::SampleCount);
        assert_eq!(cfg.batch.sample_count.eeg, 125);
        assert_eq!(cfg.batch.sample_count.ppg, 50);
    }

    #[test]
    fn backoff_clamps_to_last_entry() {
        let r = ReconnectConfig::default();
        let delays: Vec<u64> = (1..=7).map(|a| r.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, [3000, 5000, 10000, 20000, 30000, 30000, 30000]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            LinkBandConfig::from_toml_str("[sensors]\neeg_sample_rate = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            LinkBandConfig::from_toml_str("[reconnect]\nbackoff_ms = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            LinkBandConfig::from_toml_str("[sensors]\neeg_gain = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkband.toml");
        std::fs::write(&path, "[activation]\ntimeout_ms = 3000\n").unwrap();
        let cfg = LinkBandConfig::load(&path).unwrap();
        assert_eq!(cfg.activation.timeout_ms, 3000);
        assert!(matches!(
            LinkBandConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
