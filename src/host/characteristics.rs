//! Characteristic slots for the accessory's three services.
//!
//! Each slot is thread-safe shared state that the accessory writes through
//! [`AccessoryUpdater`] and the host reads. A version counter moves on every
//! real change and the shared [`ChangeNotifier`] wakes anyone watching.

use crate::accessory::{
    AccessoryInformation, AccessoryUpdater, ChargingState, CommandOutcome, StatusLowBattery,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use tokio::sync::Notify;

pub const SWITCH_SERVICE_NAME: &str = "PandaPWR";
pub const VOLTAGE_SERVICE_NAME: &str = "Panda Voltage";
pub const BATTERY_SERVICE_NAME: &str = "Panda Power Level";

/// Anything whose value changes can be detected by comparing versions.
pub trait Versioned: Send + Sync {
    fn version(&self) -> u32;
}

/// Wakes watchers when any characteristic of an accessory changes.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    notify: Arc<Notify>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_waiters();
    }

    /// Wait for the next change.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

/// Host-side callbacks for the switch characteristic (`onSet` / `onGet`).
#[async_trait]
pub trait SwitchHandler: Send + Sync {
    async fn handle_set(&self, on: bool) -> CommandOutcome;

    fn handle_get(&self) -> bool;
}

/// Switch service `On` characteristic.
pub struct SwitchCharacteristic {
    name: &'static str,
    state: AtomicBool,
    version: AtomicU32,
    notifier: ChangeNotifier,
    handler: RwLock<Option<Arc<dyn SwitchHandler>>>,
}

impl SwitchCharacteristic {
    fn new(initial: bool, notifier: ChangeNotifier) -> Self {
        Self {
            name: SWITCH_SERVICE_NAME,
            state: AtomicBool::new(initial),
            version: AtomicU32::new(0),
            notifier,
            handler: RwLock::new(None),
        }
    }

    /// Service display name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Value as last pushed by the accessory.
    pub fn get(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    /// Push a value. Bumps the version and notifies only on change.
    pub fn update(&self, value: bool) {
        let old = self.state.swap(value, Ordering::SeqCst);
        if old != value {
            self.version.fetch_add(1, Ordering::SeqCst);
            self.notifier.notify();
        }
    }

    /// Register the accessory's set/get callbacks.
    pub fn on_set(&self, handler: Arc<dyn SwitchHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// A user asked for a new value. `None` when nothing is registered.
    pub async fn request_set(&self, value: bool) -> Option<CommandOutcome> {
        let handler = self.handler.read().clone()?;
        Some(handler.handle_set(value).await)
    }

    /// A user read the current value.
    pub fn request_get(&self) -> bool {
        match self.handler.read().as_ref() {
            Some(handler) => handler.handle_get(),
            None => self.get(),
        }
    }
}

impl Versioned for SwitchCharacteristic {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Light sensor `CurrentAmbientLightLevel`, carrying voltage.
pub struct LightLevelCharacteristic {
    name: &'static str,
    bits: AtomicU64,
    version: AtomicU32,
    notifier: ChangeNotifier,
}

impl LightLevelCharacteristic {
    fn new(initial: f64, notifier: ChangeNotifier) -> Self {
        Self {
            name: VOLTAGE_SERVICE_NAME,
            bits: AtomicU64::new(initial.to_bits()),
            version: AtomicU32::new(0),
            notifier,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    pub fn update(&self, level: f64) {
        let old = self.bits.swap(level.to_bits(), Ordering::SeqCst);
        if old != level.to_bits() {
            self.version.fetch_add(1, Ordering::SeqCst);
            self.notifier.notify();
        }
    }
}

impl Versioned for LightLevelCharacteristic {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Battery service: `BatteryLevel`, `ChargingState`, `StatusLowBattery`.
///
/// The level is integral on the host side, so pushed percentages are rounded.
pub struct BatteryCharacteristics {
    name: &'static str,
    level: AtomicU8,
    charging: AtomicU8,
    low: AtomicU8,
    version: AtomicU32,
    notifier: ChangeNotifier,
}

impl BatteryCharacteristics {
    fn new(notifier: ChangeNotifier) -> Self {
        Self {
            name: BATTERY_SERVICE_NAME,
            level: AtomicU8::new(0),
            charging: AtomicU8::new(ChargingState::NotCharging as u8),
            low: AtomicU8::new(StatusLowBattery::Low as u8),
            version: AtomicU32::new(0),
            notifier,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn level(&self) -> u8 {
        self.level.load(Ordering::SeqCst)
    }

    pub fn charging_state(&self) -> ChargingState {
        ChargingState::from_repr(self.charging.load(Ordering::SeqCst))
            .unwrap_or(ChargingState::NotCharging)
    }

    pub fn low_battery(&self) -> StatusLowBattery {
        StatusLowBattery::from_repr(self.low.load(Ordering::SeqCst))
            .unwrap_or(StatusLowBattery::Normal)
    }

    fn store(&self, slot: &AtomicU8, value: u8) {
        if slot.swap(value, Ordering::SeqCst) != value {
            self.version.fetch_add(1, Ordering::SeqCst);
            self.notifier.notify();
        }
    }

    pub fn update_level(&self, percent: f64) {
        let level = percent.clamp(0.0, 100.0).round() as u8;
        self.store(&self.level, level);
    }

    pub fn update_charging_state(&self, state: ChargingState) {
        self.store(&self.charging, state as u8);
    }

    pub fn update_low_battery(&self, status: StatusLowBattery) {
        self.store(&self.low, status as u8);
    }
}

impl Versioned for BatteryCharacteristics {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of every characteristic, for logs and status output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServicesSnapshot {
    pub switch_service: &'static str,
    pub on: bool,
    pub voltage_service: &'static str,
    pub voltage: f64,
    pub battery_service: &'static str,
    pub battery_level: u8,
    pub charging_state: ChargingState,
    pub low_battery: StatusLowBattery,
    pub information: Option<AccessoryInformation>,
}

/// The switch, light sensor and battery services of one accessory.
pub struct PandaServices {
    pub switch: SwitchCharacteristic,
    pub voltage: LightLevelCharacteristic,
    pub battery: BatteryCharacteristics,
    information: RwLock<Option<AccessoryInformation>>,
    notifier: ChangeNotifier,
}

impl PandaServices {
    pub fn new() -> Self {
        let notifier = ChangeNotifier::new();
        Self {
            switch: SwitchCharacteristic::new(false, notifier.clone()),
            voltage: LightLevelCharacteristic::new(crate::telemetry::LIGHT_LEVEL_MIN, notifier.clone()),
            battery: BatteryCharacteristics::new(notifier.clone()),
            information: RwLock::new(None),
            notifier,
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn information(&self) -> Option<AccessoryInformation> {
        self.information.read().clone()
    }

    pub fn snapshot(&self) -> ServicesSnapshot {
        ServicesSnapshot {
            switch_service: self.switch.name(),
            on: self.switch.get(),
            voltage_service: self.voltage.name(),
            voltage: self.voltage.get(),
            battery_service: self.battery.name(),
            battery_level: self.battery.level(),
            charging_state: self.battery.charging_state(),
            low_battery: self.battery.low_battery(),
            information: self.information(),
        }
    }
}

impl Default for PandaServices {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessoryUpdater for PandaServices {
    fn set_switch_on(&self, on: bool) {
        self.switch.update(on);
    }

    fn set_voltage(&self, level: f64) {
        self.voltage.update(level);
    }

    fn set_battery_level(&self, percent: f64) {
        self.battery.update_level(percent);
    }

    fn set_charging_state(&self, state: ChargingState) {
        self.battery.update_charging_state(state);
    }

    fn set_low_battery(&self, status: StatusLowBattery) {
        self.battery.update_low_battery(status);
    }

    fn set_information(&self, info: &AccessoryInformation) {
        let mut current = self.information.write();
        if current.as_ref() != Some(info) {
            *current = Some(info.clone());
            drop(current);
            self.notifier.notify();
        }
    }
}
