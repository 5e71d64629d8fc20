//! Sequential sensor activation.
//!
//! The firmware drops notifications when several sensors are enabled at once,
//! and it only honours enables in the order EEG → ACC → PPG with settling
//! pauses in between.  [`Sequencer`] turns a caller's selection into that
//! sequence:
//!
//! 1. Disable every sensor (unsubscribe, CCCD off, EEG stop command), then
//!    again after `disable_retry_ms`, with an extra PPG pass after
//!    `ppg_disable_retry_ms`.
//! 2. After `queue_start_delay_ms`, send the EEG start command (the device's
//!    wake signal, sent even when EEG is not selected) and queue the
//!    selected sensors in activation order.
//! 3. For the head of the queue: arm the timeout, wait the sensor's
//!    subscribe delay, then subscribe and write the CCCD.  EEG sends its
//!    start command again first.
//! 4. The first decoded data for that sensor after its subscribe, or the
//!    timeout, advances the queue (after `settle_ms` on confirmation).
//! 5. An empty queue means the device is streaming.
//!
//! A missing attribute abandons only the step that needed it.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::ActivationConfig;
use crate::gatt::GattLink;
use crate::protocol::{
    encode_command, notify_characteristic, CCCD, DISABLE_NOTIFICATION_VALUE, EEG_SERVICE,
    EEG_WRITE_CHARACTERISTIC, ENABLE_NOTIFICATION_VALUE,
};
use crate::timer::{TimerHandle, TimerQueue};
use crate::types::{DeviceEvent, SensorType};

/// Timers owned by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTimer {
    /// Second disable-all pass.
    DisableRetry,
    /// Extra PPG-only disable pass.
    PpgDisableRetry,
    /// Wake command and queue build.
    BuildQueue,
    /// Start the sensor at the head of the queue.
    ActivateNext,
    /// Subscribe the sensor currently activating.
    Subscribe(SensorType),
    /// The sensor currently activating never produced data.
    Timeout(SensorType),
}

/// Per-link activation state.  Lives inside [`crate::session::LinkSession`],
/// so dropping the session drops every activation timer with it.
#[derive(Debug)]
pub struct Sequencer {
    timers: TimerQueue<ActivationTimer>,
    queue: VecDeque<SensorType>,
    current: Option<SensorType>,
    timeout: Option<TimerHandle>,
    started: BTreeSet<SensorType>,
    receiving: bool,
    /// The queue may only be built while a run is in progress.
    running: bool,
}

/// Activation order for a selection, independent of insertion order.
pub fn activation_queue(selected: &BTreeSet<SensorType>) -> VecDeque<SensorType> {
    SensorType::ACTIVATION_ORDER
        .into_iter()
        .filter(|s| selected.contains(s))
        .collect()
}

impl Sequencer {
    /// A sequencer whose timer clock starts at `now`.
    pub fn new(now: Duration) -> Self {
        Self {
            timers: TimerQueue::starting_at(now),
            queue: VecDeque::new(),
            current: None,
            timeout: None,
            started: BTreeSet::new(),
            receiving: false,
            running: false,
        }
    }

    pub fn timers(&self) -> &TimerQueue<ActivationTimer> {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerQueue<ActivationTimer> {
        &mut self.timers
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    /// A start has been issued and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_started(&self, sensor: SensorType) -> bool {
        self.started.contains(&sensor)
    }

    pub fn started(&self) -> &BTreeSet<SensorType> {
        &self.started
    }

    pub fn currently_activating(&self) -> Option<SensorType> {
        self.current
    }

    pub fn pending(&self) -> impl Iterator<Item = SensorType> + '_ {
        self.queue.iter().copied()
    }

    /// Begin the activation protocol for `selected`.
    pub fn start<L: GattLink>(
        &mut self,
        selected: &BTreeSet<SensorType>,
        link: &mut L,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        if selected.is_empty() {
            warn!("activation: no sensors selected");
            return;
        }
        info!("activation: starting {selected:?}");
        let was_receiving = self.receiving;
        self.reset();
        self.running = true;
        self.disable_all(link, cfg, was_receiving, events);
        self.timers.spawn_after(cfg.queue_start_delay(), ActivationTimer::BuildQueue);
    }

    /// Cancel everything in flight and silence every sensor.
    pub fn stop<L: GattLink>(
        &mut self,
        link: &mut L,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        info!("activation: stopping all sensors");
        let was_receiving = self.receiving;
        self.reset();
        self.disable_all(link, cfg, was_receiving, events);
    }

    /// Forget all state and cancel all timers without touching the link.
    /// Used when the link itself is gone.
    pub fn reset(&mut self) {
        let n = self.timers.cancel_where(|_| true);
        if n > 0 {
            debug!("activation: cancelled {n} pending timer(s)");
        }
        self.queue.clear();
        self.current = None;
        self.timeout = None;
        self.started.clear();
        self.receiving = false;
        self.running = false;
    }

    /// Dispatch a fired activation timer.
    pub fn on_timer<L: GattLink>(
        &mut self,
        timer: ActivationTimer,
        selected: &BTreeSet<SensorType>,
        services_ready: bool,
        link: &mut L,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        match timer {
            ActivationTimer::DisableRetry => {
                for sensor in SensorType::ALL {
                    set_notify(sensor, false, link, cfg);
                }
            }
            ActivationTimer::PpgDisableRetry => {
                set_notify(SensorType::Ppg, false, link, cfg);
            }
            ActivationTimer::BuildQueue => {
                if !self.running {
                    return;
                }
                write_eeg_command(&cfg.eeg_start_command, link);
                self.queue = activation_queue(selected);
                info!("activation: queue {:?}", self.queue);
                let mut delay = cfg.settle();
                if !services_ready {
                    debug!("activation: services not ready yet, delaying first sensor");
                    delay += Duration::from_millis(cfg.not_ready_extra_delay_ms);
                }
                self.timers.spawn_after(delay, ActivationTimer::ActivateNext);
            }
            ActivationTimer::ActivateNext => self.activate_next(link, cfg, events),
            ActivationTimer::Subscribe(sensor) => {
                if self.current != Some(sensor) {
                    return;
                }
                if set_notify(sensor, true, link, cfg) {
                    self.started.insert(sensor);
                    events.push(DeviceEvent::SensorStarted(sensor));
                    info!("activation: {sensor} subscribed, waiting for data");
                }
            }
            ActivationTimer::Timeout(sensor) => {
                if self.current != Some(sensor) {
                    return;
                }
                warn!(
                    "activation: no {sensor} data within {} ms, moving on",
                    cfg.timeout_ms
                );
                self.timeout = None;
                self.current = None;
                events.push(DeviceEvent::ActivationTimedOut(sensor));
                self.activate_next(link, cfg, events);
            }
        }
    }

    /// Report that decoded data arrived for `sensor`.
    ///
    /// Only data after the sensor's own subscribe counts as confirmation.
    pub fn on_data(
        &mut self,
        sensor: SensorType,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        if self.current != Some(sensor) {
            return;
        }
        if !self.started.contains(&sensor) {
            debug!("activation: {sensor} data before subscribe, not counted");
            return;
        }
        info!("activation: {sensor} data confirmed");
        if let Some(h) = self.timeout.take() {
            self.timers.cancel(h);
        }
        self.current = None;
        events.push(DeviceEvent::SensorConfirmed(sensor));
        self.timers.spawn_after(cfg.settle(), ActivationTimer::ActivateNext);
    }

    fn activate_next<L: GattLink>(
        &mut self,
        link: &mut L,
        cfg: &ActivationConfig,
        events: &mut Vec<DeviceEvent>,
    ) {
        if let Some(h) = self.timeout.take() {
            self.timers.cancel(h);
        }
        let Some(sensor) = self.queue.pop_front() else {
            info!("activation: all queued sensors processed");
            self.current = None;
            if !self.receiving {
                self.receiving = true;
                events.push(DeviceEvent::ReceivingData(true));
            }
            return;
        };
        info!(
            "activation: activating {sensor} ({} remaining)",
            self.queue.len()
        );
        self.current = Some(sensor);
        self.timeout = Some(self.timers.spawn_after(cfg.timeout(), ActivationTimer::Timeout(sensor)));
        if sensor == SensorType::Eeg {
            write_eeg_command(&cfg.eeg_start_command, link);
        }
        self.timers.spawn_after(cfg.subscribe_delay(sensor), ActivationTimer::Subscribe(sensor));
    }

    /// First disable-all pass plus the two scheduled retries.
    fn disable_all<L: GattLink>(
        &mut self,
        link: &mut L,
        cfg: &ActivationConfig,
        was_receiving: bool,
        events: &mut Vec<DeviceEvent>,
    ) {
        // PPG first: it is the one that restarts on its own.
        set_notify(SensorType::Ppg, false, link, cfg);
        for sensor in SensorType::ALL {
            set_notify(sensor, false, link, cfg);
        }
        self.timers.spawn_after(cfg.disable_retry(), ActivationTimer::DisableRetry);
        self.timers.spawn_after(cfg.ppg_disable_retry(), ActivationTimer::PpgDisableRetry);
        if was_receiving {
            events.push(DeviceEvent::ReceivingData(false));
        }
    }
}

/// Subscribe / unsubscribe one sensor and write its CCCD.
///
/// Disabling EEG also sends the EEG stop command.  Returns `false` when the
/// characteristic or descriptor is missing; that step is then abandoned.
fn set_notify<L: GattLink>(
    sensor: SensorType,
    enabled: bool,
    link: &mut L,
    cfg: &ActivationConfig,
) -> bool {
    let (service, uuid) = notify_characteristic(sensor);
    let ch = match link.characteristic(service, uuid) {
        Ok(ch) => ch,
        Err(e) => {
            error!("activation: {sensor}: {e}");
            return false;
        }
    };
    link.set_notify(&ch, enabled);
    let ok = match link.descriptor(&ch, CCCD) {
        Ok(desc) => {
            let value = if enabled {
                ENABLE_NOTIFICATION_VALUE
            } else {
                DISABLE_NOTIFICATION_VALUE
            };
            link.write_descriptor(&desc, &value);
            true
        }
        Err(e) => {
            error!("activation: {sensor}: {e}");
            false
        }
    };
    if sensor == SensorType::Eeg && !enabled {
        write_eeg_command(&cfg.eeg_stop_command, link);
    }
    ok
}

fn write_eeg_command<L: GattLink>(cmd: &str, link: &mut L) {
    match link.characteristic(EEG_SERVICE, EEG_WRITE_CHARACTERISTIC) {
        Ok(ch) => {
            debug!("activation: EEG command {cmd:?}");
            link.write_characteristic(&ch, &encode_command(cmd));
        }
        Err(e) => error!("activation: EEG command {cmd:?}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_follows_firmware_order_not_selection_order() {
        let selected: BTreeSet<_> = [SensorType::Ppg, SensorType::Eeg].into_iter().collect();
        assert_eq!(
            activation_queue(&selected),
            VecDeque::from([SensorType::Eeg, SensorType::Ppg])
        );
        let all: BTreeSet<_> = SensorType::ALL.into_iter().collect();
        assert_eq!(
            activation_queue(&all),
            VecDeque::from([SensorType::Eeg, SensorType::Acc, SensorType::Ppg])
        );
        assert!(activation_queue(&BTreeSet::new()).is_empty());
    }
}
