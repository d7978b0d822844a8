//! The PandaPWR accessory: cached state, polling loop and command handling.
//!
//! Host-owned characteristic objects are reached only through the
//! [`AccessoryUpdater`] capability, so the polling and command logic can run
//! against any host (or a recording fake in tests).

mod panda;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use panda::{AccessoryTasks, CommandOutcome, PandaAccessory, COMMAND_DEBOUNCE};
pub use tasks::TaskHandle;

use crate::device::DeviceIdentity;
use crate::telemetry::LIGHT_LEVEL_MIN;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, FromRepr};

pub const MANUFACTURER: &str = "Panda";
pub const MODEL: &str = "BlackColtPandaPwr";

/// Battery service charging state, as the host encodes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, FromRepr, Serialize)]
#[repr(u8)]
pub enum ChargingState {
    #[strum(serialize = "not charging")]
    NotCharging = 0,
    #[strum(serialize = "charging")]
    Charging = 1,
    #[strum(serialize = "not chargeable")]
    NotChargeable = 2,
}

impl ChargingState {
    /// Charging whenever the plug draws power.
    pub fn from_power(power: f64) -> Self {
        if power > 0.0 {
            Self::Charging
        } else {
            Self::NotCharging
        }
    }
}

/// Battery service low-battery flag, as the host encodes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, FromRepr, Serialize)]
#[repr(u8)]
pub enum StatusLowBattery {
    #[strum(serialize = "normal")]
    Normal = 0,
    #[strum(serialize = "low")]
    Low = 1,
}

impl StatusLowBattery {
    /// Low below one watt.
    pub fn from_power(power: f64) -> Self {
        if power < 1.0 {
            Self::Low
        } else {
            Self::Normal
        }
    }
}

/// Values for the host's accessory information service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AccessoryInformation {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl From<DeviceIdentity> for AccessoryInformation {
    fn from(identity: DeviceIdentity) -> Self {
        Self {
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            serial_number: identity.serial,
            firmware_revision: identity.firmware_version,
        }
    }
}

/// Last known device state, always in host units.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CachedState {
    /// Last confirmed relay state (poll or acknowledged command).
    pub on: bool,
    /// Normalized voltage (light level units, never below the floor).
    pub voltage: f64,
    /// Normalized power (battery percentage, `0..=100`).
    pub power: f64,
    /// When the last successful poll landed.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for CachedState {
    fn default() -> Self {
        Self {
            on: false,
            voltage: LIGHT_LEVEL_MIN,
            power: 0.0,
            updated_at: None,
        }
    }
}

/// Capability for pushing values into host-owned characteristics.
///
/// Implementations must not block; they are called from timer tasks and
/// command handlers alike.
pub trait AccessoryUpdater: Send + Sync {
    /// Switch service `On` characteristic.
    fn set_switch_on(&self, on: bool);

    /// Light sensor `CurrentAmbientLightLevel`, carrying normalized voltage.
    fn set_voltage(&self, level: f64);

    /// Battery service `BatteryLevel`, carrying normalized power.
    fn set_battery_level(&self, percent: f64);

    fn set_charging_state(&self, state: ChargingState);

    fn set_low_battery(&self, status: StatusLowBattery);

    /// Accessory information service (manufacturer, model, serial, firmware).
    fn set_information(&self, info: &AccessoryInformation);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_battery_flags() {
        assert_eq!(ChargingState::from_power(0.0), ChargingState::NotCharging);
        assert_eq!(ChargingState::from_power(0.1), ChargingState::Charging);
        assert_eq!(StatusLowBattery::from_power(0.0), StatusLowBattery::Low);
        assert_eq!(StatusLowBattery::from_power(0.99), StatusLowBattery::Low);
        assert_eq!(StatusLowBattery::from_power(1.0), StatusLowBattery::Normal);
    }

    #[test]
    fn test_enum_host_encoding() {
        assert_eq!(ChargingState::Charging as u8, 1);
        assert_eq!(ChargingState::from_repr(2), Some(ChargingState::NotChargeable));
        assert_eq!(StatusLowBattery::Low as u8, 1);
        assert_eq!(StatusLowBattery::Low.to_string(), "low");
    }

    #[test]
    fn test_information_from_identity() {
        let info = AccessoryInformation::from(DeviceIdentity {
            serial: "PP-1".to_string(),
            firmware_version: "1.2.3".to_string(),
        });
        assert_eq!(info.manufacturer, "Panda");
        assert_eq!(info.model, "BlackColtPandaPwr");
        assert_eq!(info.serial_number, "PP-1");
        assert_eq!(info.firmware_revision, "1.2.3");
    }

    #[test]
    fn test_initial_cached_state() {
        let state = CachedState::default();
        assert!(!state.on);
        assert!(state.voltage > 0.0);
        assert_eq!(state.power, 0.0);
        assert!(state.updated_at.is_none());
    }
}
