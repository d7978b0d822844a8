//! reqwest-backed client for the PandaPWR HTTP API.

use super::{DeviceApi, DeviceEndpoints, DeviceIdentity, RawTelemetry, Telemetry};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue, PRAGMA};
use std::time::Duration;

const COMMAND_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// HTTP client for a single plug.
///
/// No retries: every failure surfaces to the caller, which logs and moves on.
#[derive(Clone)]
pub struct PandaClient {
    http: Client,
    endpoints: DeviceEndpoints,
}

impl PandaClient {
    /// Create a client for `address`. `timeout` of `None` keeps the transport default.
    pub fn new(address: &str, timeout: Option<Duration>) -> Result<Self> {
        let endpoints = DeviceEndpoints::new(address)?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| BridgeError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        debug!("PandaPwr client for {}", endpoints.base());
        Ok(Self { http, endpoints })
    }

    fn command_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(COMMAND_CONTENT_TYPE));
        headers
    }
}

/// Body understood by `/set`.
pub(crate) fn command_body(on: bool) -> String {
    format!("power={}", u8::from(on))
}

#[async_trait]
impl DeviceApi for PandaClient {
    async fn fetch_identity(&self) -> Result<DeviceIdentity> {
        debug!("GET {}", self.endpoints.state());
        let identity = self
            .http
            .get(self.endpoints.state())
            .send()
            .await?
            .json::<DeviceIdentity>()
            .await?;
        Ok(identity)
    }

    async fn fetch_telemetry(&self) -> Result<Telemetry> {
        debug!("GET {}", self.endpoints.telemetry());
        let raw = self
            .http
            .get(self.endpoints.telemetry())
            .send()
            .await?
            .json::<RawTelemetry>()
            .await?;
        Ok(raw.into())
    }

    async fn send_command(&self, on: bool) -> Result<()> {
        debug!("POST {} power={}", self.endpoints.command(), u8::from(on));
        // reqwest keeps no cookie store, so no credentials travel with the request
        let response = self
            .http
            .post(self.endpoints.command())
            .headers(Self::command_headers())
            .body(command_body(on))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BridgeError::CommandRejected(status))
        }
    }
}
