//! End-to-end engine behaviour against a recording mock link, on virtual time.

mod common;

use std::collections::BTreeSet;

use common::*;
use linkband_rs::config::{CollectionMode, LinkBandConfig};
use linkband_rs::error::RecordingError;
use linkband_rs::gatt::LinkEvent;
use linkband_rs::protocol::*;
use linkband_rs::types::{ConnectionState, DeviceEvent, SensorType};

fn link_lost() -> LinkEvent {
    LinkEvent::ConnectionStateChanged { connected: false }
}

fn enables(ops: &[Op]) -> Vec<uuid::Uuid> {
    ops.iter()
        .filter_map(|op| match op {
            Op::SetNotify(u, true) => Some(*u),
            _ => None,
        })
        .collect()
}

// ── Connection set-up ─────────────────────────────────────────────────────────

#[test]
fn connect_runs_mtu_discovery_and_setup_on_schedule() {
    let mut e = engine();
    e.connect(band());
    assert_eq!(e.state(), ConnectionState::Connecting);
    assert_eq!(e.link().take_ops(), [Op::Connect(band().id)]);

    e.handle_link_event(LinkEvent::ConnectionStateChanged { connected: true });
    assert_eq!(e.state(), ConnectionState::Connected);
    assert_eq!(e.connected_device_name(), Some("LXB-01A2"));
    assert_eq!(e.link().take_ops(), [Op::RequestMtu(515)]);
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::Connected(d) if d.name == "LXB-01A2")), 1);

    // A failed MTU request still leads to discovery.
    e.handle_link_event(LinkEvent::MtuChanged {
        mtu: 23,
        success: false,
    });
    e.advance_to(ms(999));
    assert_eq!(e.state(), ConnectionState::Connected);
    e.advance_to(ms(1000));
    assert_eq!(e.state(), ConnectionState::ServicesDiscovering);
    assert_eq!(e.link().take_ops(), [Op::DiscoverServices]);

    e.handle_link_event(LinkEvent::ServicesDiscovered { success: true });
    assert_eq!(e.selected_sensors(), BTreeSet::from(SensorType::ALL));

    e.advance_to(ms(1499));
    assert!(e.link().ops().is_empty());
    e.advance_to(ms(1500));
    assert_eq!(e.link().take_ops(), [Op::Read(BATTERY_CHARACTERISTIC)]);

    e.advance_to(ms(2999));
    assert_eq!(e.state(), ConnectionState::ServicesDiscovering);
    e.advance_to(ms(3000));
    assert_eq!(e.state(), ConnectionState::ServicesReady);

    e.handle_link_event(LinkEvent::CharacteristicChanged {
        uuid: BATTERY_CHARACTERISTIC,
        value: vec![87],
    });
    assert_eq!(e.battery().map(|b| b.level_percent), Some(87));
    assert!(e.next_deadline().is_none());
}

#[test]
fn sensors_cannot_start_before_discovery() {
    let mut e = engine();
    e.connect(band());
    e.handle_link_event(LinkEvent::ConnectionStateChanged { connected: true });
    e.link().take_ops();
    e.select(SensorType::Eeg);
    e.start_sensors();
    assert!(e.link().ops().is_empty());
    assert!(e.next_deadline().is_none());
}

// ── Scanning ──────────────────────────────────────────────────────────────────

#[test]
fn scan_lists_prefixed_devices_once() {
    let mut e = engine();
    e.start_scan();
    assert!(e.is_scanning());
    for d in [
        device("a", "LXB-01"),
        device("a", "LXB-01"),
        device("b", "Muse-S"),
        device("c", "LXB-02"),
    ] {
        e.handle_link_event(LinkEvent::DeviceDiscovered(d));
    }
    let names: Vec<_> = e.scanned_devices().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["LXB-01", "LXB-02"]);

    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ScanResults(_))), 3);

    // Connecting stops the scan first.
    e.connect(device("c", "LXB-02"));
    assert!(!e.is_scanning());
    assert_eq!(e.link().take_ops(), [Op::StartScan, Op::StopScan, Op::Connect("c".into())]);
}

// ── Auto-reconnect ────────────────────────────────────────────────────────────

#[test]
fn reconnect_follows_backoff_then_gives_up() {
    let mut e = engine();
    connect_ready(&mut e);

    e.handle_link_event(link_lost());
    assert_eq!(e.state(), ConnectionState::Disconnected);
    assert!(e.session().is_none());
    let mut ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::Disconnected)), 1);

    for (i, delay) in [3000, 5000, 10000, 20000, 30000].into_iter().enumerate() {
        let attempt = i as u32 + 1;
        assert_eq!(
            count(&ev, |x| matches!(
                x,
                DeviceEvent::ReconnectScheduled { attempt: a, delay: d } if *a == attempt && *d == ms(delay)
            )),
            1,
            "attempt {attempt}"
        );
        e.advance_by(ms(delay - 1));
        assert!(e.link().take_ops().is_empty());
        e.advance_by(ms(1));
        assert_eq!(e.link().take_ops(), [Op::Connect(band().id)]);
        assert_eq!(e.state(), ConnectionState::Connecting);

        e.handle_link_event(link_lost());
        ev = e.drain_events();
        // A failed attempt is not a disconnection of an established link.
        assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::Disconnected)), 0);
    }

    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ReconnectExhausted)), 1);
    assert!(e.next_deadline().is_none());
    assert_eq!(e.last_device(), Some(&band()));
}

#[test]
fn successful_reconnect_resets_attempts() {
    let mut e = engine();
    connect_ready(&mut e);
    e.handle_link_event(link_lost());
    e.advance_by(ms(3000));
    assert_eq!(e.reconnect_state().attempts, 1);

    e.handle_link_event(LinkEvent::ConnectionStateChanged { connected: true });
    assert_eq!(e.state(), ConnectionState::Connected);
    assert_eq!(e.reconnect_state().attempts, 0);
    assert!(e.session().is_some());
}

#[test]
fn manual_disconnect_never_reconnects() {
    let mut e = engine();
    connect_ready(&mut e);
    e.disconnect();
    e.disconnect();
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::Disconnected)), 1);
    assert_eq!(e.link().take_ops(), [Op::Disconnect]);

    // The platform still reports the drop; it must not schedule anything.
    e.handle_link_event(link_lost());
    assert!(e.drain_events().is_empty());
    assert!(e.next_deadline().is_none());
}

// ── Activation ────────────────────────────────────────────────────────────────

#[test]
fn activation_runs_in_firmware_order() {
    let mut e = engine();
    connect_ready(&mut e);
    assert!(e.deselect(SensorType::Acc));
    assert_eq!(
        e.selected_sensors(),
        BTreeSet::from([SensorType::Ppg, SensorType::Eeg])
    );

    let t0 = e.now();
    e.start_sensors();
    let ops = e.link().take_ops();
    // Disable-all: PPG first, then every sensor, with the EEG stop command.
    assert_eq!(ops[0], Op::SetNotify(PPG_CHARACTERISTIC, false));
    assert!(ops.contains(&Op::Write(EEG_WRITE_CHARACTERISTIC, b"stop".to_vec())));
    assert!(ops.contains(&Op::WriteDescriptor(
        ACCELEROMETER_CHARACTERISTIC,
        DISABLE_NOTIFICATION_VALUE.to_vec()
    )));
    assert!(enables(&ops).is_empty());

    // Wake command once the queue is built.
    e.advance_to(t0 + ms(1000));
    assert!(e
        .link()
        .take_ops()
        .contains(&Op::Write(EEG_WRITE_CHARACTERISTIC, b"start".to_vec())));

    e.advance_to(t0 + ms(1699));
    assert!(!e.is_started(SensorType::Eeg));
    e.advance_to(t0 + ms(1700));
    assert!(e.is_started(SensorType::Eeg));
    let ops = e.link().take_ops();
    assert_eq!(enables(&ops), [EEG_NOTIFY_CHARACTERISTIC]);
    assert!(ops.contains(&Op::WriteDescriptor(
        EEG_NOTIFY_CHARACTERISTIC,
        ENABLE_NOTIFICATION_VALUE.to_vec()
    )));

    e.advance_to(t0 + ms(1800));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 0, 25)));
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::SensorConfirmed(SensorType::Eeg))), 1);
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::Eeg(s) if s.len() == 25)), 1);

    // PPG starts after the settle pause and its own subscribe delay.
    e.advance_to(t0 + ms(2799));
    assert!(enables(&e.link().ops()).is_empty());
    e.advance_to(t0 + ms(2800));
    assert_eq!(enables(&e.link().take_ops()), [PPG_CHARACTERISTIC]);
    assert!(!e.is_receiving_data());

    e.handle_link_event(notify(SensorType::Ppg, packet(SensorType::Ppg, 0, 28)));
    e.advance_by(ms(499));
    assert!(!e.is_receiving_data());
    e.advance_by(ms(1));
    assert!(e.is_receiving_data());
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ReceivingData(true))), 1);
    assert!(!e.is_started(SensorType::Acc));
}

#[test]
fn data_before_subscribe_does_not_confirm() {
    let mut e = engine();
    connect_ready(&mut e);
    e.deselect(SensorType::Ppg);
    e.deselect(SensorType::Acc);
    let t0 = e.now();
    e.start_sensors();

    // EEG streams as soon as the start command lands, before its subscribe.
    e.advance_to(t0 + ms(1600));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 0, 25)));
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::SensorConfirmed(_))), 0);
    assert_eq!(
        e.session().and_then(|s| s.sequencer().currently_activating()),
        Some(SensorType::Eeg)
    );

    e.link().take_ops();
    e.advance_to(t0 + ms(1700));
    assert!(e.is_started(SensorType::Eeg));
    let ops = e.link().take_ops();
    assert_eq!(enables(&ops), [EEG_NOTIFY_CHARACTERISTIC]);
    assert!(ops.contains(&Op::WriteDescriptor(
        EEG_NOTIFY_CHARACTERISTIC,
        ENABLE_NOTIFICATION_VALUE.to_vec()
    )));

    e.advance_to(t0 + ms(1800));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 3277, 25)));
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::SensorConfirmed(SensorType::Eeg))), 1);
    e.advance_to(t0 + ms(2300));
    assert!(e.is_receiving_data());
}

#[test]
fn disable_all_repeats_and_ppg_gets_an_extra_pass() {
    let mut e = engine();
    connect_ready(&mut e);
    let t0 = e.now();
    e.start_sensors();
    e.link().take_ops();

    let disable = |uuid| {
        [
            Op::SetNotify(uuid, false),
            Op::WriteDescriptor(uuid, DISABLE_NOTIFICATION_VALUE.to_vec()),
        ]
    };

    e.advance_to(t0 + ms(499));
    assert!(e.link().ops().is_empty());
    e.advance_to(t0 + ms(500));
    let ops = e.link().take_ops();
    assert_eq!(ops.len(), 7);
    for uuid in [EEG_NOTIFY_CHARACTERISTIC, PPG_CHARACTERISTIC, ACCELEROMETER_CHARACTERISTIC] {
        assert_eq!(ops_on(&ops, uuid), disable(uuid));
    }
    assert!(ops.contains(&Op::Write(EEG_WRITE_CHARACTERISTIC, b"stop".to_vec())));

    e.advance_to(t0 + ms(1000));
    assert_eq!(
        e.link().take_ops(),
        [Op::Write(EEG_WRITE_CHARACTERISTIC, b"start".to_vec())]
    );

    // The PPG pass was armed first, so it runs before EEG begins.
    e.advance_to(t0 + ms(1500));
    let ops = e.link().take_ops();
    assert_eq!(ops[..2], disable(PPG_CHARACTERISTIC));
    assert!(ops_on(&ops, ACCELEROMETER_CHARACTERISTIC).is_empty());
    assert!(ops_on(&ops, EEG_NOTIFY_CHARACTERISTIC).is_empty());
    assert_eq!(ops[2], Op::Write(EEG_WRITE_CHARACTERISTIC, b"start".to_vec()));
}

#[test]
fn receiving_flag_is_reported_only_on_change() {
    let mut e = engine();
    connect_ready(&mut e);
    e.deselect(SensorType::Ppg);
    e.deselect(SensorType::Acc);
    let t0 = e.now();
    e.start_sensors();
    e.stop_sensors();
    e.start_sensors();
    assert_eq!(
        count(&e.drain_events(), |x| matches!(x, DeviceEvent::ReceivingData(_))),
        0
    );

    e.advance_to(t0 + ms(1800));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 0, 25)));
    e.advance_to(t0 + ms(2300));
    e.stop_sensors();
    e.stop_sensors();
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ReceivingData(true))), 1);
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ReceivingData(false))), 1);
}

#[test]
fn silent_sensor_times_out_and_the_queue_moves_on() {
    let mut e = engine();
    connect_ready(&mut e);
    let t0 = e.now();
    e.start_sensors();

    // EEG subscribes at +1700 and times out 8 s after it began at +1500.
    e.advance_to(t0 + ms(9499));
    assert!(e.is_started(SensorType::Eeg));
    assert_eq!(
        count(&e.drain_events(), |x| matches!(x, DeviceEvent::ActivationTimedOut(_))),
        0
    );
    e.advance_to(t0 + ms(9500));
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ActivationTimedOut(SensorType::Eeg))), 1);
    assert!(e.is_started(SensorType::Eeg), "started flag survives a timeout");

    // ACC subscribes 600 ms later and answers.
    e.advance_to(t0 + ms(10100));
    assert!(e.is_started(SensorType::Acc));
    e.advance_to(t0 + ms(10200));
    e.handle_link_event(notify(SensorType::Acc, packet(SensorType::Acc, 0, 30)));

    // PPG begins at +10700 and never answers.
    e.advance_to(t0 + ms(18699));
    assert!(!e.is_receiving_data());
    e.advance_to(t0 + ms(18700));
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ActivationTimedOut(SensorType::Ppg))), 1);
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ActivationTimedOut(SensorType::Acc))), 0);
    assert!(e.is_receiving_data());
    assert_eq!(e.status().started, BTreeSet::from(SensorType::ALL));
}

#[test]
fn missing_characteristic_abandons_only_its_own_step() {
    let link = MockLink::new().without_characteristic(ACCELEROMETER_CHARACTERISTIC);
    let mut e = engine_with(LinkBandConfig::default(), link);
    connect_ready(&mut e);
    let t0 = e.now();
    e.start_sensors();

    e.advance_to(t0 + ms(1800));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 0, 25)));

    // ACC begins at +2300; its subscribe at +2900 finds nothing.
    e.advance_to(t0 + ms(2900));
    assert!(!e.is_started(SensorType::Acc));
    e.advance_to(t0 + ms(10300));
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ActivationTimedOut(SensorType::Acc))), 1);
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::SensorStarted(SensorType::Acc))), 0);

    e.advance_to(t0 + ms(10800));
    assert!(e.is_started(SensorType::Ppg));
    assert!(ops_on(&e.link().ops(), ACCELEROMETER_CHARACTERISTIC).is_empty());
}

#[test]
fn missing_cccd_skips_to_the_next_sensor() {
    let link = MockLink::new().without_cccd(ACCELEROMETER_CHARACTERISTIC);
    let mut e = engine_with(LinkBandConfig::default(), link);
    connect_ready(&mut e);
    let t0 = e.now();
    e.start_sensors();

    e.advance_to(t0 + ms(1800));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 0, 25)));

    // ACC begins at +2300; its subscribe at +2900 cannot write the CCCD.
    e.advance_to(t0 + ms(2900));
    assert!(!e.is_started(SensorType::Acc));
    let acc = ops_on(&e.link().ops(), ACCELEROMETER_CHARACTERISTIC);
    assert!(acc.contains(&Op::SetNotify(ACCELEROMETER_CHARACTERISTIC, true)));
    assert!(!acc.iter().any(|op| matches!(op, Op::WriteDescriptor(..))));

    e.advance_to(t0 + ms(10300));
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::ActivationTimedOut(SensorType::Acc))), 1);
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::SensorStarted(SensorType::Acc))), 0);

    e.advance_to(t0 + ms(10800));
    assert!(e.is_started(SensorType::Ppg));
    e.handle_link_event(notify(SensorType::Ppg, packet(SensorType::Ppg, 0, 28)));
    e.advance_by(ms(500));
    assert!(e.is_receiving_data());
}

#[test]
fn not_ready_link_delays_first_activation() {
    let mut e = engine();
    e.connect(band());
    e.handle_link_event(LinkEvent::ConnectionStateChanged { connected: true });
    e.handle_link_event(LinkEvent::MtuChanged {
        mtu: 515,
        success: true,
    });
    e.advance_to(ms(1000));
    e.handle_link_event(LinkEvent::ServicesDiscovered { success: true });

    // Discovered but not yet ServicesReady (that happens at 3000).
    e.start_sensors();
    e.advance_to(ms(3699));
    assert!(!e.is_started(SensorType::Eeg));
    e.advance_to(ms(3700));
    assert!(e.is_started(SensorType::Eeg));
}

#[test]
fn selection_and_mode_are_locked_while_receiving() {
    let mut e = engine();
    connect_ready(&mut e);
    e.deselect(SensorType::Ppg);
    e.deselect(SensorType::Acc);
    let t0 = e.now();
    e.start_sensors();
    e.advance_to(t0 + ms(1800));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 0, 25)));
    e.advance_by(ms(500));
    assert!(e.is_receiving_data());

    assert!(!e.select(SensorType::Ppg));
    assert!(!e.set_collection_mode(CollectionMode::SampleCount));
    assert_eq!(e.selected_sensors(), BTreeSet::from([SensorType::Eeg]));

    e.stop_sensors();
    assert!(!e.is_receiving_data());
    assert!(e.select(SensorType::Ppg));
    assert!(e.set_collection_mode(CollectionMode::SampleCount));
}

#[test]
fn stop_and_disconnect_leave_no_activation_behind() {
    let mut e = engine();
    connect_ready(&mut e);
    let t0 = e.now();
    e.start_sensors();
    e.advance_to(t0 + ms(1600));

    e.stop_sensors();
    e.link().take_ops();
    e.advance_by(ms(20_000));
    let ev = e.drain_events();
    assert_eq!(
        count(&ev, |x| matches!(
            x,
            DeviceEvent::SensorStarted(_) | DeviceEvent::ActivationTimedOut(_) | DeviceEvent::ReceivingData(true)
        )),
        0
    );
    assert!(enables(&e.link().ops()).is_empty());

    e.start_sensors();
    e.advance_by(ms(1600));
    e.disconnect();
    assert!(e.next_deadline().is_none());
    assert!(!e.is_started(SensorType::Eeg));
}

// ── Notifications ─────────────────────────────────────────────────────────────

#[test]
fn bad_notifications_are_dropped() {
    let mut e = engine();
    connect_ready(&mut e);
    e.handle_link_event(notify(SensorType::Eeg, Vec::new()));
    e.handle_link_event(notify(SensorType::Eeg, vec![1, 2, 3, 4, 5]));
    e.handle_link_event(LinkEvent::CharacteristicChanged {
        uuid: EEG_WRITE_CHARACTERISTIC,
        value: vec![1, 2, 3],
    });
    assert!(e.drain_events().is_empty());
    assert!(e.session().is_some_and(|s| s.recent_eeg().is_empty()));
}

#[test]
fn sample_count_mode_emits_fixed_size_batches() {
    let mut e = engine();
    connect_ready(&mut e);
    assert!(e.set_collection_mode(CollectionMode::SampleCount));
    for k in 0..11u32 {
        e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, k * 3277, 25)));
    }
    let ev = e.drain_events();
    let batches: Vec<_> = ev
        .iter()
        .filter_map(|x| match x {
            DeviceEvent::EegBatch(b) => Some(b.len()),
            _ => None,
        })
        .collect();
    assert_eq!(batches, [250]);
    assert_eq!(e.session().map(|s| s.recent_eeg().len()), Some(275));
}

// ── Recording ─────────────────────────────────────────────────────────────────

#[test]
fn recording_requires_a_link() {
    let mut e = engine();
    assert!(matches!(e.start_recording(), Err(RecordingError::NotConnected)));
    assert!(matches!(e.stop_recording(), Err(RecordingError::NotRecording)));
}

#[test]
fn link_drop_closes_recording_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LinkBandConfig::default();
    config.recording.directory = dir.path().join("rec");
    config.recording.file_prefix = "Test".into();
    let mut e = engine_with(config, MockLink::new());
    connect_ready(&mut e);

    let paths = e.start_recording().unwrap();
    assert_eq!(paths.len(), 3);
    assert!(matches!(e.start_recording(), Err(RecordingError::AlreadyRecording)));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 32768, 3)));

    e.handle_link_event(link_lost());
    e.disconnect();
    e.handle_link_event(link_lost());
    let ev = e.drain_events();
    assert_eq!(count(&ev, |x| matches!(x, DeviceEvent::RecordingStopped)), 1);
    assert!(!e.is_recording());

    let eeg = paths
        .iter()
        .find(|p| p.to_string_lossy().contains("_EEG_"))
        .unwrap();
    let text = std::fs::read_to_string(eeg).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "Timestamp_ms,Ch1_Raw,Ch2_Raw,Channel1_uV,Channel2_uV,LeadOff");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("1000,"));
    assert!(lines[2].starts_with("1004,"));
}

#[test]
fn deselected_sensor_is_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LinkBandConfig::default();
    config.recording.directory = dir.path().to_path_buf();
    let mut e = engine_with(config, MockLink::new());
    connect_ready(&mut e);
    e.deselect(SensorType::Ppg);
    e.deselect(SensorType::Acc);

    let paths = e.start_recording().unwrap();
    assert_eq!(paths.len(), 1);
    e.handle_link_event(notify(SensorType::Acc, packet(SensorType::Acc, 0, 5)));
    e.handle_link_event(notify(SensorType::Eeg, packet(SensorType::Eeg, 0, 2)));
    e.stop_recording().unwrap();

    let text = std::fs::read_to_string(&paths[0]).unwrap();
    assert_eq!(text.lines().count(), 3);
}
