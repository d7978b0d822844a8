//! PandaPWR device HTTP API.
//!
//! The plug exposes three endpoints relative to its address:
//! - `GET /get_state` → identity (`ap_pwd`, `fw_version`)
//! - `GET /update_ele_data` → live telemetry (`power`, `voltage`)
//! - `POST /set` with body `power=0|1` → switch the relay

mod client;

pub use client::PandaClient;

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The three URLs derived from the configured device address.
///
/// Built once and never changed for the lifetime of the accessory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoints {
    base: String,
    state: String,
    telemetry: String,
    command: String,
}

impl DeviceEndpoints {
    /// Build the endpoint set from a bare host/IP (`192.168.1.40`) or a full
    /// base URL (`http://192.168.1.40:8080/`).
    pub fn new(address: &str) -> Result<Self> {
        let address = address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(BridgeError::InvalidUrl("empty device address".to_string()));
        }

        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        reqwest::Url::parse(&base).map_err(|e| BridgeError::InvalidUrl(format!("{base}: {e}")))?;

        Ok(Self {
            state: format!("{}/get_state", base),
            telemetry: format!("{}/update_ele_data", base),
            command: format!("{}/set", base),
            base,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn telemetry(&self) -> &str {
        &self.telemetry
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Descriptive metadata reported by `/get_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    #[serde(rename = "ap_pwd")]
    pub serial: String,
    #[serde(rename = "fw_version")]
    pub firmware_version: String,
}

/// Raw telemetry in device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Active power draw in watts.
    pub power: f64,
    /// Mains voltage in volts. Missing or null readings are reported as 0.
    pub voltage: f64,
}

impl Telemetry {
    /// The relay is considered on whenever the plug reports any power draw.
    pub fn is_on(&self) -> bool {
        self.power != 0.0
    }

    pub fn is_charging(&self) -> bool {
        self.power > 0.0
    }

    pub fn is_low(&self) -> bool {
        self.power < 1.0
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTelemetry {
    power: f64,
    #[serde(default)]
    voltage: Option<f64>,
}

impl From<RawTelemetry> for Telemetry {
    fn from(raw: RawTelemetry) -> Self {
        Self {
            power: raw.power,
            voltage: raw.voltage.unwrap_or(0.0),
        }
    }
}

/// Operations the accessory needs from a device.
///
/// Implemented over HTTP by [`PandaClient`]; tests substitute scripted fakes.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// One-shot identity lookup used for accessory information.
    async fn fetch_identity(&self) -> Result<DeviceIdentity>;

    /// Current power/voltage in device units.
    async fn fetch_telemetry(&self) -> Result<Telemetry>;

    /// Switch the relay. `Err(BridgeError::CommandRejected)` on a non-success status.
    async fn send_command(&self, on: bool) -> Result<()>;
}
