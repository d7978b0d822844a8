//! PandaPWR accessory bridge library.
//!
//! Polls a PandaPWR smart plug over HTTP, maps its telemetry onto accessory
//! characteristics, and forwards on/off requests back to the plug.

pub mod accessory;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod telemetry;
