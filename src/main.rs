use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::{bail, Result};
use log::{error, info, warn};

use linkband_rs::prelude::*;

const HELP: &str = "\
Commands (type + Enter):
  start / stop        – run or stop sensor activation
  +eeg / -ppg / …     – select or deselect a sensor (while stopped)
  rec / stoprec       – start or stop CSV recording
  mode duration|count – batch by time window or sample count
  auto on|off         – toggle auto-reconnect
  status              – print the current state
  scan                – scan again
  d                   – disconnect
  q                   – quit";

fn parse_sensor(s: &str) -> Option<SensorType> {
    match s.to_ascii_lowercase().as_str() {
        "eeg" => Some(SensorType::Eeg),
        "ppg" => Some(SensorType::Ppg),
        "acc" => Some(SensorType::Acc),
        _ => None,
    }
}

async fn run_command(handle: &LinkBandHandle, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(true);
    };
    match (cmd, words.next()) {
        ("q", _) => {
            info!("Quit requested.");
            handle.shutdown().await?;
            return Ok(false);
        }
        ("start", _) => handle.start_sensors().await?,
        ("stop", _) => handle.stop_sensors().await?,
        ("rec", _) => handle.start_recording().await?,
        ("stoprec", _) => handle.stop_recording().await?,
        ("scan", _) => handle.start_scan().await?,
        ("d", _) => handle.disconnect().await?,
        ("mode", Some("duration")) => handle.set_collection_mode(CollectionMode::Duration).await?,
        ("mode", Some("count")) => {
            handle
                .set_collection_mode(CollectionMode::SampleCount)
                .await?
        }
        ("auto", Some("on")) => handle.set_auto_reconnect(true).await?,
        ("auto", Some("off")) => handle.set_auto_reconnect(false).await?,
        ("status", _) => {
            let s = handle.status().await?;
            println!(
                "[STATUS] {:?}  device={}  selected={:?}  started={:?}  receiving={}  recording={}  auto_reconnect={}  battery={}  mode={:?}",
                s.state,
                s.device_name.as_deref().unwrap_or("-"),
                s.selected,
                s.started,
                s.receiving_data,
                s.recording,
                s.auto_reconnect,
                s.battery
                    .map(|b| format!("{}%", b.level_percent))
                    .unwrap_or_else(|| "-".into()),
                s.collection_mode,
            );
        }
        (other, _) => {
            let sensor = other
                .strip_prefix('+')
                .map(|s| (s, true))
                .or_else(|| other.strip_prefix('-').map(|s| (s, false)))
                .and_then(|(s, on)| parse_sensor(s).map(|s| (s, on)));
            match sensor {
                Some((s, true)) => handle.select(s).await?,
                Some((s, false)) => handle.deselect(s).await?,
                None => println!("{HELP}"),
            }
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG=linkband_rs=debug for protocol-level detail.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading config from {path}");
            LinkBandConfig::load(&path)?
        }
        None => LinkBandConfig::default(),
    };
    let scan_timeout = Duration::from_secs(config.scan.scan_timeout_secs);

    // ── Start ─────────────────────────────────────────────────────────────────
    let client = LinkBandClient::new(config);
    let (mut rx, handle) = client.start().await?;
    handle.start_scan().await?;
    info!(
        "Scanning for LinkBand devices ({}s) …",
        scan_timeout.as_secs()
    );

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on an OS thread so no StdinLock is held across an await.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line.trim().to_owned()).is_err() {
                break;
            }
        }
    });

    let cmd_handle = handle.clone();
    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            match run_command(&cmd_handle, &line).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => error!("Command error: {e}"),
            }
        }
    });

    // ── Main event loop ───────────────────────────────────────────────────────
    let scan_deadline = tokio::time::sleep(scan_timeout);
    tokio::pin!(scan_deadline);
    let mut connected_once = false;
    let mut pick_first = true;

    loop {
        let event = tokio::select! {
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
            _ = &mut scan_deadline, if !connected_once => {
                handle.shutdown().await.ok();
                bail!("no LinkBand device found within {}s", scan_timeout.as_secs());
            }
        };

        match event {
            DeviceEvent::ScanResults(devices) => {
                for d in &devices {
                    println!("[SCAN] {}  id={}", d.name, d.id);
                }
                if pick_first {
                    if let Some(first) = devices.first() {
                        pick_first = false;
                        connected_once = true;
                        info!("Connecting to {} …", first.name);
                        handle.connect(first.clone()).await?;
                    }
                }
            }
            DeviceEvent::Scanning(on) => info!("Scanning: {on}"),
            DeviceEvent::StateChanged(state) => {
                info!("State: {state:?}");
                if state == ConnectionState::ServicesReady {
                    info!("Device ready. Type 'start' to stream.\n{HELP}");
                }
            }
            DeviceEvent::Connected(d) => info!("✅  Connected to: {}", d.name),
            DeviceEvent::Disconnected => info!("❌  Disconnected from device."),

            // ── Samples ───────────────────────────────────────────────────────
            DeviceEvent::Eeg(samples) => {
                if let Some(s) = samples.first() {
                    println!(
                        "[EEG] n={:3}  ts={:.3} s  ch1={:+9.2} µV  ch2={:+9.2} µV  lead_off={}",
                        samples.len(),
                        s.timestamp,
                        s.channel1_uv,
                        s.channel2_uv,
                        s.lead_off
                    );
                }
            }
            DeviceEvent::Ppg(samples) => {
                if let Some(s) = samples.first() {
                    println!(
                        "[PPG] n={:3}  ts={:.3} s  red={:8}  ir={:8}",
                        samples.len(),
                        s.timestamp,
                        s.red,
                        s.ir
                    );
                }
            }
            DeviceEvent::Acc(samples) => {
                if let Some(s) = samples.first() {
                    println!(
                        "[ACC] n={:3}  ts={:.3} s  x={:+6}  y={:+6}  z={:+6}",
                        samples.len(),
                        s.timestamp,
                        s.x,
                        s.y,
                        s.z
                    );
                }
            }
            DeviceEvent::Battery(b) => println!("[BATTERY] {}%", b.level_percent),
            DeviceEvent::EegBatch(b) => info!("EEG batch: {} samples", b.len()),
            DeviceEvent::PpgBatch(b) => info!("PPG batch: {} samples", b.len()),
            DeviceEvent::AccBatch(b) => info!("ACC batch: {} samples", b.len()),

            // ── Activation ────────────────────────────────────────────────────
            DeviceEvent::SelectionChanged(s) => info!("Selected: {s:?}"),
            DeviceEvent::SensorStarted(s) => info!("{s} subscribed"),
            DeviceEvent::SensorConfirmed(s) => info!("{s} streaming"),
            DeviceEvent::ActivationTimedOut(s) => warn!("{s} did not respond, skipped"),
            DeviceEvent::ReceivingData(on) => info!("Receiving data: {on}"),

            // ── Reconnect / recording ─────────────────────────────────────────
            DeviceEvent::AutoReconnect(on) => info!("Auto-reconnect: {on}"),
            DeviceEvent::ReconnectScheduled { attempt, delay } => {
                info!("Reconnect attempt {attempt} in {} s", delay.as_secs())
            }
            DeviceEvent::ReconnectExhausted => {
                error!("Giving up on reconnecting. Type 'scan' to look again or 'q' to quit.");
                pick_first = true;
            }
            DeviceEvent::RecordingStarted(paths) => {
                for p in paths {
                    info!("Recording to {}", p.display());
                }
            }
            DeviceEvent::RecordingStopped => info!("Recording stopped."),
        }
    }

    info!("Event loop finished – exiting.");
    Ok(())
}
