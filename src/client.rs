//! Tokio runtime around [`LinkBandEngine`].
//!
//! [`LinkBandClient::start`] opens the Bluetooth adapter and spawns one task
//! that owns the engine.  That task waits on three things at once:
//!
//! * backend events (BLE completions, notifications, disconnects),
//! * [`Command`]s sent through a [`LinkBandHandle`],
//! * the engine's next timer deadline.
//!
//! Whichever comes first is applied to the engine, and every [`DeviceEvent`]
//! it produces is forwarded on the event channel.  Virtual engine time is the
//! wall time elapsed since the task started.

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::btle::BtleLink;
use crate::config::{CollectionMode, LinkBandConfig};
use crate::engine::{LinkBandEngine, Status};
use crate::gatt::{GattLink, LinkEvent};
use crate::types::{DeviceEvent, DeviceHandle, SensorType};

/// A [`GattLink`] whose completions arrive as backend-specific events that
/// must be folded back into the link before the engine sees them.
pub trait LinkBackend: GattLink {
    type Event: Send + 'static;

    /// Update the link's own state from `ev` and translate it.  `None` means
    /// the event was internal or stale.
    fn absorb(&mut self, ev: Self::Event) -> Option<LinkEvent>;
}

/// Requests accepted by the runtime task.
#[derive(Debug)]
pub enum Command {
    StartScan,
    StopScan,
    Connect(DeviceHandle),
    Disconnect,
    Select(SensorType),
    Deselect(SensorType),
    StartSensors,
    StopSensors,
    StartRecording,
    StopRecording,
    SetCollectionMode(CollectionMode),
    SetAutoReconnect(bool),
    Status(oneshot::Sender<Status>),
    /// Disconnect and end the runtime task.
    Shutdown,
}

/// Connects to the first Bluetooth adapter and runs the engine on it.
pub struct LinkBandClient {
    config: LinkBandConfig,
}

impl LinkBandClient {
    pub fn new(config: LinkBandConfig) -> Self {
        Self { config }
    }

    /// Open the adapter and spawn the runtime task.
    ///
    /// Returns the event receiver and a handle for sending commands.
    pub async fn start(self) -> Result<(mpsc::Receiver<DeviceEvent>, LinkBandHandle)> {
        let (link, backend_rx) = BtleLink::new(&self.config.link).await?;
        info!("client: Bluetooth adapter ready");
        Ok(spawn(LinkBandEngine::new(self.config, link), backend_rx))
    }
}

/// Spawn the runtime task for `engine`, fed by `backend_rx`.
pub fn spawn<L>(
    engine: LinkBandEngine<L>,
    backend_rx: mpsc::UnboundedReceiver<L::Event>,
) -> (mpsc::Receiver<DeviceEvent>, LinkBandHandle)
where
    L: LinkBackend + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ev_tx, ev_rx) = mpsc::channel(256);
    tokio::spawn(run(engine, backend_rx, cmd_rx, ev_tx));
    (ev_rx, LinkBandHandle { tx: cmd_tx })
}

async fn run<L: LinkBackend>(
    mut engine: LinkBandEngine<L>,
    mut backend_rx: mpsc::UnboundedReceiver<L::Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
    ev_tx: mpsc::Sender<DeviceEvent>,
) {
    let origin = Instant::now();
    loop {
        let deadline = engine.next_deadline().map(|d| origin + d);
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        let mut stop = false;
        tokio::select! {
            Some(ev) = backend_rx.recv() => {
                engine.advance_to(origin.elapsed());
                if let Some(ev) = engine.link_mut().absorb(ev) {
                    engine.handle_link_event(ev);
                }
            }
            cmd = cmd_rx.recv() => {
                engine.advance_to(origin.elapsed());
                match cmd {
                    Some(Command::Shutdown) | None => {
                        info!("client: shutting down");
                        engine.disconnect();
                        stop = true;
                    }
                    Some(cmd) => apply(&mut engine, cmd),
                }
            }
            _ = timer => engine.advance_to(origin.elapsed()),
        }

        for ev in engine.drain_events() {
            if ev_tx.send(ev).await.is_err() {
                debug!("client: event receiver dropped");
                engine.disconnect();
                stop = true;
                break;
            }
        }
        if stop {
            break;
        }
    }
}

fn apply<L: GattLink>(engine: &mut LinkBandEngine<L>, cmd: Command) {
    debug!("client: {cmd:?}");
    match cmd {
        Command::StartScan => engine.start_scan(),
        Command::StopScan => engine.stop_scan(),
        Command::Connect(device) => engine.connect(device),
        Command::Disconnect => engine.disconnect(),
        Command::Select(s) => {
            engine.select(s);
        }
        Command::Deselect(s) => {
            engine.deselect(s);
        }
        Command::StartSensors => engine.start_sensors(),
        Command::StopSensors => engine.stop_sensors(),
        Command::StartRecording => {
            if let Err(e) = engine.start_recording() {
                warn!("client: start recording: {e}");
            }
        }
        Command::StopRecording => {
            if let Err(e) = engine.stop_recording() {
                warn!("client: stop recording: {e}");
            }
        }
        Command::SetCollectionMode(mode) => {
            engine.set_collection_mode(mode);
        }
        Command::SetAutoReconnect(true) => engine.enable_auto_reconnect(),
        Command::SetAutoReconnect(false) => engine.disable_auto_reconnect(),
        Command::Status(reply) => {
            let _ = reply.send(engine.status());
        }
        Command::Shutdown => {}
    }
}

// ── LinkBandHandle ────────────────────────────────────────────────────────────

/// Cheap, cloneable sender of [`Command`]s to a running client.
#[derive(Clone)]
pub struct LinkBandHandle {
    tx: mpsc::Sender<Command>,
}

impl LinkBandHandle {
    pub async fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow!("LinkBand client task has stopped"))
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.send(Command::StartScan).await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.send(Command::StopScan).await
    }

    pub async fn connect(&self, device: DeviceHandle) -> Result<()> {
        self.send(Command::Connect(device)).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    pub async fn select(&self, sensor: SensorType) -> Result<()> {
        self.send(Command::Select(sensor)).await
    }

    pub async fn deselect(&self, sensor: SensorType) -> Result<()> {
        self.send(Command::Deselect(sensor)).await
    }

    /// Run the sequential activation for the selected sensors.
    pub async fn start_sensors(&self) -> Result<()> {
        self.send(Command::StartSensors).await
    }

    pub async fn stop_sensors(&self) -> Result<()> {
        self.send(Command::StopSensors).await
    }

    pub async fn start_recording(&self) -> Result<()> {
        self.send(Command::StartRecording).await
    }

    pub async fn stop_recording(&self) -> Result<()> {
        self.send(Command::StopRecording).await
    }

    pub async fn set_collection_mode(&self, mode: CollectionMode) -> Result<()> {
        self.send(Command::SetCollectionMode(mode)).await
    }

    pub async fn set_auto_reconnect(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetAutoReconnect(enabled)).await
    }

    /// Snapshot of the engine's observable state.
    pub async fn status(&self) -> Result<Status> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx)).await?;
        rx.await
            .map_err(|_| anyhow!("LinkBand client task has stopped"))
    }

    /// Disconnect and stop the client task.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}
