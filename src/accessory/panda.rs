//! Polling loop and command handler for one PandaPWR plug.
//!
//! Cached state has two writers: the poll cycle and the command handler. Each
//! takes the lock only to assign fields, never across an `.await`, so a poll
//! and a command that are both in flight simply race and the last one to
//! complete wins. The next successful poll reconciles any divergence.

use super::tasks::{self, TaskHandle};
use super::{
    AccessoryInformation, AccessoryUpdater, CachedState, ChargingState, StatusLowBattery,
};
use crate::device::{DeviceApi, Telemetry};
use crate::error::BridgeError;
use crate::telemetry::{normalize_power_data, normalize_voltage_data};
use chrono::Utc;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between accepted on/off commands.
pub const COMMAND_DEBOUNCE: Duration = Duration::from_millis(5000);

/// What happened to an on/off request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    /// Device acknowledged; cached state and switch updated.
    Applied,
    /// Dropped by the debounce window; nothing sent.
    Debounced,
    /// Sent but the device failed or rejected it; cached state untouched.
    Failed,
}

/// Timers owned by a running accessory.
pub struct AccessoryTasks {
    pub identity: TaskHandle,
    pub poll: TaskHandle,
}

impl AccessoryTasks {
    pub fn stop(&self) {
        self.identity.stop();
        self.poll.stop();
    }

    /// Returns `false` if either timer died instead of stopping.
    pub async fn join(self) -> bool {
        let identity = self.identity.join().await;
        let poll = self.poll.join().await;
        identity && poll
    }
}

pub struct PandaAccessory {
    device: Arc<dyn DeviceApi>,
    updater: Arc<dyn AccessoryUpdater>,
    state: Mutex<CachedState>,
    last_command: Mutex<Option<Instant>>,
    debounce: Duration,
}

impl PandaAccessory {
    /// Create the accessory and publish its initial values to the host.
    pub fn new(device: Arc<dyn DeviceApi>, updater: Arc<dyn AccessoryUpdater>) -> Self {
        let accessory = Self {
            device,
            updater,
            state: Mutex::new(CachedState::default()),
            last_command: Mutex::new(None),
            debounce: COMMAND_DEBOUNCE,
        };
        accessory.publish_initial();
        accessory
    }

    fn publish_initial(&self) {
        let state = self.state.lock().clone();
        self.updater.set_switch_on(state.on);
        self.updater.set_voltage(state.voltage);
        self.updater.set_battery_level(state.power);
        self.updater
            .set_charging_state(ChargingState::from_power(state.power));
        self.updater
            .set_low_battery(StatusLowBattery::from_power(state.power));
    }

    /// Start the one-shot identity fetch and the recurring poll.
    pub fn start(self: &Arc<Self>, interval: Duration, identity_delay: Duration) -> AccessoryTasks {
        let this = self.clone();
        let identity = tasks::spawn_delayed("identity", identity_delay, move || async move {
            this.refresh_identity().await;
        });

        let this = self.clone();
        let poll = tasks::spawn_interval("poll", interval, move || {
            let this = this.clone();
            async move {
                this.poll_once().await;
            }
        });

        AccessoryTasks { identity, poll }
    }

    /// Snapshot of the cached state.
    pub fn state(&self) -> CachedState {
        self.state.lock().clone()
    }

    /// Fetch identity and write the accessory information service.
    pub async fn refresh_identity(&self) -> bool {
        match self.device.fetch_identity().await {
            Ok(identity) => {
                debug!(
                    "PandaPwr identity: serial {}, firmware {}",
                    identity.serial, identity.firmware_version
                );
                self.updater
                    .set_information(&AccessoryInformation::from(identity));
                true
            }
            Err(e) => {
                warn!("Failed to fetch PandaPwr identity: {}", e);
                false
            }
        }
    }

    /// One poll cycle. Returns `false` when the fetch failed and nothing changed.
    pub async fn poll_once(&self) -> bool {
        debug!("Getting PandaPwr state...");
        match self.device.fetch_telemetry().await {
            Ok(telemetry) => {
                self.apply_telemetry(telemetry);
                true
            }
            Err(e) => {
                warn!("Failed to poll PandaPwr: {}", e);
                false
            }
        }
    }

    fn apply_telemetry(&self, telemetry: Telemetry) {
        let on = telemetry.is_on();
        let voltage = normalize_voltage_data(telemetry.voltage);
        let power = normalize_power_data(telemetry.power);

        {
            let mut state = self.state.lock();
            state.on = on;
            state.voltage = voltage;
            state.power = power;
            state.updated_at = Some(Utc::now());
        }

        self.updater.set_switch_on(on);
        self.updater.set_voltage(voltage);
        self.updater.set_battery_level(power);
        self.updater
            .set_charging_state(ChargingState::from_power(telemetry.power));
        self.updater
            .set_low_battery(StatusLowBattery::from_power(telemetry.power));

        debug!(
            "Updated PandaPwr state, power: {} voltage: {} battery level: {}",
            on, voltage, power
        );
    }

    /// Handle an on/off request from the host.
    ///
    /// Requests within [`COMMAND_DEBOUNCE`] of the last accepted one are
    /// dropped. The host may keep showing the requested value until the next
    /// poll corrects it.
    pub async fn set_on(&self, on: bool) -> CommandOutcome {
        let now = Instant::now();
        {
            let mut last = self.last_command.lock();
            if let Some(previous) = *last
                && now.duration_since(previous) < self.debounce
            {
                warn!(
                    "Skipping setOn: Less than {} seconds since the last call.",
                    self.debounce.as_secs()
                );
                return CommandOutcome::Debounced;
            }
            *last = Some(now);
        }

        debug!("Set Characteristic On -> {}", on);
        match self.device.send_command(on).await {
            Ok(()) => {
                self.state.lock().on = on;
                self.updater.set_switch_on(on);
                debug!("Set Characteristic On Succeeded {}", on);
                CommandOutcome::Applied
            }
            Err(BridgeError::CommandRejected(status)) => {
                error!("Failed to set characteristic {} (status {})", on, status);
                CommandOutcome::Failed
            }
            Err(e) => {
                error!("Failed to send power command {}: {}", on, e);
                CommandOutcome::Failed
            }
        }
    }

    /// Current cached on/off value. Never touches the network.
    pub fn get_on(&self) -> bool {
        let on = self.state.lock().on;
        debug!("Get Characteristic On -> {}", on);
        on
    }
}
