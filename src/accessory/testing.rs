//! Test doubles for the device and the host.

use super::{AccessoryInformation, AccessoryUpdater, ChargingState, StatusLowBattery};
use crate::device::{DeviceApi, DeviceIdentity, Telemetry};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::cell::RefCell;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn unreachable() -> BridgeError {
    BridgeError::IoError(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "device unreachable",
    ))
}

/// Scripted device. `None` in any slot means the call fails at transport level.
pub struct FakeDevice {
    pub identity: Mutex<Option<DeviceIdentity>>,
    pub telemetry: Mutex<Option<Telemetry>>,
    /// Status the device answers `/set` with.
    pub command_status: Mutex<Option<StatusCode>>,
    pub commands: Mutex<Vec<bool>>,
    pub telemetry_delay: Duration,
    pub telemetry_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            identity: Mutex::new(None),
            telemetry: Mutex::new(None),
            command_status: Mutex::new(Some(StatusCode::OK)),
            commands: Mutex::new(Vec::new()),
            telemetry_delay: Duration::ZERO,
            telemetry_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_telemetry(self, power: f64, voltage: f64) -> Self {
        *self.telemetry.lock() = Some(Telemetry { power, voltage });
        self
    }

    pub fn with_identity(self, serial: &str, firmware: &str) -> Self {
        *self.identity.lock() = Some(DeviceIdentity {
            serial: serial.to_string(),
            firmware_version: firmware.to_string(),
        });
        self
    }

    pub fn with_command_status(self, status: Option<StatusCode>) -> Self {
        *self.command_status.lock() = status;
        self
    }

    pub fn with_telemetry_delay(mut self, delay: Duration) -> Self {
        self.telemetry_delay = delay;
        self
    }

    pub fn sent_commands(&self) -> Vec<bool> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl DeviceApi for FakeDevice {
    async fn fetch_identity(&self) -> Result<DeviceIdentity> {
        self.identity.lock().clone().ok_or_else(unreachable)
    }

    async fn fetch_telemetry(&self) -> Result<Telemetry> {
        self.telemetry_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.telemetry_delay.is_zero() {
            tokio::time::sleep(self.telemetry_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let telemetry = *self.telemetry.lock();
        telemetry.ok_or_else(unreachable)
    }

    async fn send_command(&self, on: bool) -> Result<()> {
        self.commands.lock().push(on);
        let status = *self.command_status.lock();
        match status {
            Some(status) if status.is_success() => Ok(()),
            Some(status) => Err(BridgeError::CommandRejected(status)),
            None => Err(unreachable()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    SwitchOn(bool),
    Voltage(f64),
    BatteryLevel(f64),
    Charging(ChargingState),
    LowBattery(StatusLowBattery),
    Information(AccessoryInformation),
}

/// Host stand-in that records every characteristic write.
#[derive(Default)]
pub struct RecordingUpdater {
    pub updates: Mutex<Vec<Update>>,
}

impl RecordingUpdater {
    pub fn snapshot(&self) -> Vec<Update> {
        self.updates.lock().clone()
    }

    pub fn clear(&self) {
        self.updates.lock().clear();
    }
}

impl AccessoryUpdater for RecordingUpdater {
    fn set_switch_on(&self, on: bool) {
        self.updates.lock().push(Update::SwitchOn(on));
    }

    fn set_voltage(&self, level: f64) {
        self.updates.lock().push(Update::Voltage(level));
    }

    fn set_battery_level(&self, percent: f64) {
        self.updates.lock().push(Update::BatteryLevel(percent));
    }

    fn set_charging_state(&self, state: ChargingState) {
        self.updates.lock().push(Update::Charging(state));
    }

    fn set_low_battery(&self, status: StatusLowBattery) {
        self.updates.lock().push(Update::LowBattery(status));
    }

    fn set_information(&self, info: &AccessoryInformation) {
        self.updates.lock().push(Update::Information(info.clone()));
    }
}

thread_local! {
    static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Global logger that keeps records per thread, so parallel tests on the
/// current-thread runtime only see their own output.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED.with(|captured| {
            captured
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Start capturing log records on this thread, discarding earlier ones.
pub fn capture_logs() {
    // Another test may have installed it already
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Debug);
    CAPTURED.with(|captured| captured.borrow_mut().clear());
}

/// Messages logged on this thread at exactly `level` since [`capture_logs`].
pub fn captured_logs(level: Level) -> Vec<String> {
    CAPTURED.with(|captured| {
        captured
            .borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    })
}
