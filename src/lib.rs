//! # linkband-rs
//!
//! Async Rust driver for LXB LinkBand wearables (two-channel EEG, PPG,
//! accelerometer and battery) over Bluetooth Low Energy.
//!
//! The firmware is picky: sensors must be enabled one at a time in the order
//! EEG → ACC → PPG, with settling pauses, and a sensor that never answers
//! must not hold up the others.  The driver hides that behind a small
//! command surface and an event stream, and reconnects on its own when the
//! radio link drops.
//!
//! ## Quick start
//!
//! ```no_run
//! use linkband_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = LinkBandClient::new(LinkBandConfig::default());
//!     let (mut rx, handle) = client.start().await?;
//!     handle.start_scan().await?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             DeviceEvent::ScanResults(devices) if !devices.is_empty() => {
//!                 handle.connect(devices[0].clone()).await?;
//!             }
//!             DeviceEvent::StateChanged(ConnectionState::ServicesReady) => {
//!                 handle.start_sensors().await?;
//!             }
//!             DeviceEvent::Eeg(samples) => println!("EEG: {} samples", samples.len()),
//!             DeviceEvent::ReconnectExhausted => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`client`] | Tokio runtime, [`client::LinkBandClient`] and the [`client::LinkBandHandle`] command API |
//! | [`engine`] | Deterministic single-threaded engine tying everything together |
//! | [`connection`] | Scan, connect, MTU, discovery, auto-reconnect |
//! | [`activation`] | Sequential sensor activation with confirmation and timeout |
//! | [`session`] | Per-link state, dropped on disconnect |
//! | [`recording`] | Per-sensor CSV recording |
//! | [`batch`] | Duration and sample-count batching |
//! | [`parse`] | Byte-to-sample decoders for EEG, PPG, ACC and battery packets |
//! | [`timer`] | Cancellable timers on a virtual clock |
//! | [`gatt`] | The [`gatt::GattLink`] seam between engine and BLE stack |
//! | [`btle`] | `btleplug` implementation of [`gatt::GattLink`] |
//! | [`config`] | TOML-loadable configuration |
//! | [`types`] | Samples, events and state enums |
//! | [`protocol`] | GATT UUIDs, sampling constants, command encoding |
//! | [`error`] | Typed errors |

pub mod activation;
pub mod batch;
pub mod btle;
pub mod client;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod gatt;
pub mod parse;
pub mod protocol;
pub mod recording;
pub mod session;
pub mod timer;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    pub use crate::client::{Command, LinkBandClient, LinkBandHandle};
    pub use crate::config::{CollectionMode, LinkBandConfig};
    pub use crate::engine::{LinkBandEngine, Status};

    // ── Events and data types ─────────────────────────────────────────────────
    pub use crate::types::{
        AccSample, BatterySample, ConnectionState, DeviceEvent, DeviceHandle, EegSample,
        PpgSample, SensorType,
    };

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{ACC_FREQUENCY, DEVICE_NAME_PREFIX, EEG_FREQUENCY, PPG_FREQUENCY};
}
