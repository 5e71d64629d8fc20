//! The tokio runtime around the engine, on paused time with a responding mock.

mod common;

use std::time::Duration;

use common::*;
use linkband_rs::client::{self, LinkBandHandle};
use linkband_rs::config::{CollectionMode, LinkBandConfig};
use linkband_rs::engine::LinkBandEngine;
use linkband_rs::types::{ConnectionState, DeviceEvent, SensorType};
use tokio::sync::mpsc;

async fn wait_for<F>(rx: &mut mpsc::Receiver<DeviceEvent>, mut pred: F) -> DeviceEvent
where
    F: FnMut(&DeviceEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Some(ev) if pred(&ev) => return ev,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn start() -> (MockLink, mpsc::Receiver<DeviceEvent>, LinkBandHandle) {
    let (link, backend_rx) = MockLink::new().responding(vec![
        device("x", "Other"),
        band(),
    ]);
    let engine = LinkBandEngine::new(LinkBandConfig::default(), link.clone());
    let (rx, handle) = client::spawn(engine, backend_rx);
    (link, rx, handle)
}

#[tokio::test(start_paused = true)]
async fn scan_connect_and_reach_services_ready() {
    let (link, mut rx, handle) = start();

    handle.start_scan().await.unwrap();
    let found = wait_for(&mut rx, |e| matches!(e, DeviceEvent::ScanResults(d) if !d.is_empty())).await;
    let DeviceEvent::ScanResults(devices) = found else {
        unreachable!()
    };
    assert_eq!(devices, [band()]);

    handle.connect(devices[0].clone()).await.unwrap();
    wait_for(&mut rx, |e| {
        matches!(e, DeviceEvent::StateChanged(ConnectionState::ServicesReady))
    })
    .await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, ConnectionState::ServicesReady);
    assert_eq!(status.device_name.as_deref(), Some("LXB-01A2"));
    assert_eq!(status.selected.len(), 3);
    assert!(!status.scanning);
    assert!(link.ops().contains(&Op::DiscoverServices));

    handle.shutdown().await.unwrap();
    wait_for(&mut rx, |e| matches!(e, DeviceEvent::Disconnected)).await;
    assert!(rx.recv().await.is_none());
    assert!(handle.start_scan().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn commands_reach_the_engine_in_order() {
    let (_link, mut rx, handle) = start();
    handle.connect(band()).await.unwrap();
    wait_for(&mut rx, |e| {
        matches!(e, DeviceEvent::StateChanged(ConnectionState::ServicesReady))
    })
    .await;

    handle.deselect(SensorType::Ppg).await.unwrap();
    handle.set_collection_mode(CollectionMode::SampleCount).await.unwrap();
    handle.set_auto_reconnect(false).await.unwrap();
    wait_for(&mut rx, |e| matches!(e, DeviceEvent::AutoReconnect(false))).await;

    let status = handle.status().await.unwrap();
    assert!(!status.selected.contains(&SensorType::Ppg));
    assert_eq!(status.collection_mode, CollectionMode::SampleCount);
    assert!(!status.auto_reconnect);

    // The mock never sends data, so every sensor times out in turn.
    handle.start_sensors().await.unwrap();
    wait_for(&mut rx, |e| matches!(e, DeviceEvent::ReceivingData(true))).await;
    let status = handle.status().await.unwrap();
    assert!(status.receiving_data);
    assert_eq!(status.started.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_event_receiver_stops_the_runtime() {
    let (link, mut rx, handle) = start();
    handle.connect(band()).await.unwrap();
    wait_for(&mut rx, |e| {
        matches!(e, DeviceEvent::StateChanged(ConnectionState::ServicesReady))
    })
    .await;
    drop(rx);

    // The next event has nowhere to go; the runtime disconnects and exits.
    handle.set_auto_reconnect(false).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(link.ops().contains(&Op::Disconnect));
    assert!(handle.start_scan().await.is_err());
}
