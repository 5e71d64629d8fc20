//! Everything that belongs to one physical link.
//!
//! A [`LinkSession`] is created when the link comes up and dropped when it
//! goes down, manually or not.  Dropping it drops the activation queue and
//! its timers, the started flags, the batch windows, the recent-sample
//! buffers and the battery level in one go, so nothing carries over into the
//! next connection.  [`LinkSession::close`] runs first to stop recording.

use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};

use crate::activation::{ActivationTimer, Sequencer};
use crate::batch::Batcher;
use crate::config::{ActivationConfig, BatchConfig, RecordingConfig};
use crate::error::RecordingError;
use crate::gatt::GattLink;
use crate::recording::{CsvRow, Recorder};
use crate::timer::TimerQueue;
use crate::types::{
    AccSample, BatterySample, DeviceEvent, DeviceHandle, EegSample, PpgSample, SensorType,
};

/// Capacity of the rolling display buffers.
pub const RECENT_EEG: usize = 1000;
pub const RECENT_PPG: usize = 500;
pub const RECENT_ACC: usize = 300;

/// A rolling buffer that keeps the newest `cap` samples.
#[derive(Debug)]
pub struct Recent<T> {
    cap: usize,
    buf: VecDeque<T>,
}

impl<T: Clone> Recent<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn extend_from_slice(&mut self, samples: &[T]) {
        let skip = samples.len().saturating_sub(self.cap);
        for s in &samples[skip..] {
            if self.buf.len() == self.cap {
                self.buf.pop_front();
            }
            self.buf.push_back(s.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.buf.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }
}

#[derive(Debug)]
struct Streams {
    eeg: Batcher<EegSample>,
    ppg: Batcher<PpgSample>,
    acc: Batcher<AccSample>,
}

impl Streams {
    fn new(cfg: &BatchConfig) -> Self {
        Self {
            eeg: Batcher::for_sensor(SensorType::Eeg, cfg),
            ppg: Batcher::for_sensor(SensorType::Ppg, cfg),
            acc: Batcher::for_sensor(SensorType::Acc, cfg),
        }
    }
}

/// Per-link state.  See the module docs.
#[derive(Debug)]
pub struct LinkSession {
    device: DeviceHandle,
    selected: BTreeSet<SensorType>,
    sequencer: Sequencer,
    recorder: Recorder,
    batches: Streams,
    recent_eeg: Recent<EegSample>,
    recent_ppg: Recent<PpgSample>,
    recent_acc: Recent<AccSample>,
    battery: Option<BatterySample>,
}

impl LinkSession {
    /// A fresh session for `device`, created at virtual time `now`.
    pub fn new(device: DeviceHandle, now: Duration, batch: &BatchConfig) -> Self {
        Self {
            device,
            selected: BTreeSet::new(),
            sequencer: Sequencer::new(now),
            recorder: Recorder::new(),
            batches: Streams::new(batch),
            recent_eeg: Recent::new(RECENT_EEG),
            recent_ppg: Recent::new(RECENT_PPG),
            recent_acc: Recent::new(RECENT_ACC),
            battery: None,
        }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn selected(&self) -> &BTreeSet<SensorType> {
        &self.selected
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn battery(&self) -> Option<BatterySample> {
        self.battery
    }

    pub fn recent_eeg(&self) -> &Recent<EegSample> {
        &self.recent_eeg
    }

    pub fn recent_ppg(&self) -> &Recent<PpgSample> {
        &self.recent_ppg
    }

    pub fn recent_acc(&self) -> &Recent<AccSample> {
        &self.recent_acc
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    /// Replace the selection.  Emits `SelectionChanged` when it differs.
    pub fn set_selection(&mut self, selected: BTreeSet<SensorType>, events: &mut Vec<DeviceEvent>) {
        if self.selected != selected {
            self.selected = selected;
            events.push(DeviceEvent::SelectionChanged(self.selected.clone()));
        }
    }

    /// Add or remove one sensor.  Refused while data is being received.
    pub fn toggle(&mut self, sensor: SensorType, on: bool, events: &mut Vec<DeviceEvent>) -> bool {
        if self.sequencer.is_receiving() {
            warn!("session: selection is locked while receiving data");
            return false;
        }
        let mut next = self.selected.clone();
        if on {
            next.insert(sensor);
        } else {
            next.remove(&sensor);
        }
        self.set_selection(next, events);
        true
    }

    // ── Activation ────────────────────────────────────────────────────────────

    pub(crate) fn activation_timers(&mut self) -> &mut TimerQueue<ActivationTimer> {
        self.sequencer.timers_mut()
    }

    pub fn start_sensors<L: GattLink>(
        &mut self,
        link: &mut L,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        self.sequencer.start(&self.selected, link, cfg, events);
    }

    /// Silence every sensor and release any partial batch.
    pub fn stop_sensors<L: GattLink>(
        &mut self,
        link: &mut L,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        self.sequencer.stop(link, cfg, events);
        self.flush_batches(events);
    }

    pub fn on_activation_timer<L: GattLink>(
        &mut self,
        timer: ActivationTimer,
        services_ready: bool,
        link: &mut L,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        self.sequencer
            .on_timer(timer, &self.selected, services_ready, link, cfg, events);
    }

    pub fn confirm_data(
        &mut self,
        sensor: SensorType,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        self.sequencer.on_data(sensor, cfg, events);
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    pub fn start_recording(
        &mut self,
        cfg: &RecordingConfig,
        events: &mut Vec<DeviceEvent>,
    ) -> Result<Vec<PathBuf>, RecordingError> {
        let paths = self.recorder.start(
            &cfg.directory,
            &cfg.file_prefix,
            &self.selected,
            chrono::Local::now(),
        )?;
        events.push(DeviceEvent::RecordingStarted(paths.clone()));
        Ok(paths)
    }

    /// Returns how many streams were closed.
    pub fn stop_recording(&mut self, events: &mut Vec<DeviceEvent>) -> usize {
        let n = self.recorder.stop();
        if n > 0 {
            events.push(DeviceEvent::RecordingStopped);
        }
        n
    }

    /// Everything the link drop requires before the session is dropped:
    /// close recordings, cancel activation timers, discard partial batches.
    pub fn close(&mut self, events: &mut Vec<DeviceEvent>) {
        self.stop_recording(events);
        let was_receiving = self.sequencer.is_receiving();
        self.sequencer.reset();
        self.batches.eeg.clear();
        self.batches.ppg.clear();
        self.batches.acc.clear();
        if was_receiving {
            events.push(DeviceEvent::ReceivingData(false));
        }
    }

    // ── Batching ──────────────────────────────────────────────────────────────

    /// Rebuild every batcher for a new collection mode, discarding partial
    /// windows.
    pub fn reset_batches(&mut self, cfg: &BatchConfig) {
        self.batches = Streams::new(cfg);
    }

    /// Emit whatever the batchers hold, e.g. when streaming stops.
    pub fn flush_batches(&mut self, events: &mut Vec<DeviceEvent>) {
        if let Some(b) = self.batches.eeg.flush() {
            events.push(DeviceEvent::EegBatch(b));
        }
        if let Some(b) = self.batches.ppg.flush() {
            events.push(DeviceEvent::PpgBatch(b));
        }
        if let Some(b) = self.batches.acc.flush() {
            events.push(DeviceEvent::AccBatch(b));
        }
    }

    // ── Sample intake ─────────────────────────────────────────────────────────

    pub fn on_eeg(&mut self, samples: Vec<EegSample>, events: &mut Vec<DeviceEvent>) {
        self.recent_eeg.extend_from_slice(&samples);
        self.record(&samples);
        for b in self.batches.eeg.extend(samples.iter().copied()) {
            events.push(DeviceEvent::EegBatch(b));
        }
        events.push(DeviceEvent::Eeg(samples));
    }

    pub fn on_ppg(&mut self, samples: Vec<PpgSample>, events: &mut Vec<DeviceEvent>) {
        self.recent_ppg.extend_from_slice(&samples);
        self.record(&samples);
        for b in self.batches.ppg.extend(samples.iter().copied()) {
            events.push(DeviceEvent::PpgBatch(b));
        }
        events.push(DeviceEvent::Ppg(samples));
    }

    pub fn on_acc(&mut self, samples: Vec<AccSample>, events: &mut Vec<DeviceEvent>) {
        self.recent_acc.extend_from_slice(&samples);
        self.record(&samples);
        for b in self.batches.acc.extend(samples.iter().copied()) {
            events.push(DeviceEvent::AccBatch(b));
        }
        events.push(DeviceEvent::Acc(samples));
    }

    pub fn on_battery(&mut self, sample: BatterySample, events: &mut Vec<DeviceEvent>) {
        if self.battery != Some(sample) {
            info!("session: battery {}%", sample.level_percent);
        }
        self.battery = Some(sample);
        events.push(DeviceEvent::Battery(sample));
    }

    /// Append to the sensor's recording stream when it is both recording and
    /// still selected.  Write failures are logged and collection carries on.
    fn record<T: CsvRow>(&mut self, samples: &[T]) {
        if !self.selected.contains(&T::SENSOR) {
            return;
        }
        if let Err(e) = self.recorder.write(samples) {
            warn!("session: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> LinkSession {
        LinkSession::new(
            DeviceHandle {
                id: "AA:BB".into(),
                name: "LXB-01".into(),
            },
            Duration::ZERO,
            &BatchConfig::default(),
        )
    }

    fn acc(t: f64) -> AccSample {
        AccSample {
            timestamp: t,
            x: 0,
            y: 0,
            z: 0,
        }
    }

    #[test]
    fn recent_buffer_keeps_newest() {
        let mut r = Recent::new(3);
        r.extend_from_slice(&[1, 2]);
        r.extend_from_slice(&[3, 4]);
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), [2, 3, 4]);
        r.extend_from_slice(&[5, 6, 7, 8, 9]);
        assert_eq!(r.iter().copied().collect::<Vec<_>>(), [7, 8, 9]);
        assert_eq!(r.latest(), Some(&9));
    }

    #[test]
    fn selection_change_is_reported_once() {
        let mut s = session();
        let mut ev = Vec::new();
        assert!(s.toggle(SensorType::Ppg, true, &mut ev));
        assert!(s.toggle(SensorType::Ppg, true, &mut ev));
        assert_eq!(ev.len(), 1);
        assert!(s.selected().contains(&SensorType::Ppg));
    }

    #[test]
    fn samples_feed_recent_and_batches() {
        let mut s = session();
        let mut ev = Vec::new();
        s.on_acc((0..20).map(|i| acc(i as f64 * 0.1)).collect(), &mut ev);
        assert_eq!(s.recent_acc().len(), 20);
        // 0.0 .. 1.9 s: one full 1000 ms window closed at 1.0 s.
        let batches: Vec<_> = ev
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::AccBatch(b) => Some(b.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, [10]);

        ev.clear();
        s.flush_batches(&mut ev);
        assert!(matches!(&ev[..], [DeviceEvent::AccBatch(b)] if b.len() == 10));
    }
}
