//! In-process host platform.
//!
//! Stands in for the smart-home runtime the accessory plugs into: accessory
//! registration and cache restore, the launch event, and the characteristic
//! objects the accessory writes to.

pub mod characteristics;
pub mod platform;
pub mod registry;

pub use characteristics::{ChangeNotifier, PandaServices, ServicesSnapshot, SwitchHandler};
pub use platform::{PandaPlatform, RunningAccessory};
pub use registry::{AccessoryCache, AccessoryRegistry, DeviceContext, PlatformAccessory};
