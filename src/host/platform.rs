//! Platform lifecycle: cache restore, launch, discovery.
//!
//! The host calls [`PandaPlatform::configure_accessory`] once per cached
//! accessory, then [`PandaPlatform::did_finish_launching`] once restore is
//! complete. Only then is the configured device resolved against the cache
//! and started.

use super::characteristics::{PandaServices, SwitchHandler};
use super::registry::{AccessoryRegistry, DeviceContext, PlatformAccessory, accessory_uuid};
use crate::accessory::{AccessoryTasks, CommandOutcome, PandaAccessory};
use crate::config::Config;
use crate::device::{DeviceApi, PandaClient};
use crate::error::Result;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
impl SwitchHandler for PandaAccessory {
    async fn handle_set(&self, on: bool) -> CommandOutcome {
        self.set_on(on).await
    }

    fn handle_get(&self) -> bool {
        self.get_on()
    }
}

/// An accessory that has been resolved, wired and started.
pub struct RunningAccessory {
    pub platform_accessory: PlatformAccessory,
    pub accessory: Arc<PandaAccessory>,
    pub services: Arc<PandaServices>,
    tasks: AccessoryTasks,
}

impl RunningAccessory {
    /// Stop both timers and wait for in-flight cycles to settle.
    ///
    /// Returns `false` if a timer had already died.
    pub async fn shutdown(self) -> bool {
        info!("Stopping accessory {}", self.platform_accessory.display_name);
        self.tasks.stop();
        self.tasks.join().await
    }
}

pub struct PandaPlatform<R: AccessoryRegistry> {
    config: Config,
    registry: Arc<R>,
    accessories: HashMap<Uuid, PlatformAccessory>,
    discovered: Vec<Uuid>,
}

impl<R: AccessoryRegistry> PandaPlatform<R> {
    pub fn new(config: Config, registry: Arc<R>) -> Self {
        debug!("Finished initializing platform: {}", config.name);
        Self {
            config,
            registry,
            accessories: HashMap::new(),
            discovered: Vec::new(),
        }
    }

    /// Called for each accessory the host restored from its cache.
    pub fn configure_accessory(&mut self, accessory: PlatformAccessory) {
        info!("Loading accessory from cache: {}", accessory.display_name);
        self.accessories.insert(accessory.uuid, accessory);
    }

    /// Feed every cached accessory through [`Self::configure_accessory`].
    pub fn restore_cached(&mut self) {
        for accessory in self.registry.cached() {
            self.configure_accessory(accessory);
        }
    }

    /// Cache restore finished: discover the configured device over HTTP.
    pub fn did_finish_launching(&mut self) -> Result<RunningAccessory> {
        debug!("Executed didFinishLaunching callback");
        self.config.validate()?;
        let timeout = self.config.request_timeout_secs.map(Duration::from_secs);
        let client = PandaClient::new(&self.config.ip, timeout)?;
        Ok(self.discover_devices(Arc::new(client)))
    }

    /// Resolve the configured device against the cache, start it, and drop
    /// cached accessories that no longer match any configured device.
    pub fn discover_devices(&mut self, device: Arc<dyn DeviceApi>) -> RunningAccessory {
        let uuid = accessory_uuid(&self.config.ip);
        let context = self.device_context();

        let platform_accessory = match self.accessories.get(&uuid) {
            Some(existing) => {
                info!(
                    "Restoring existing accessory from cache: {}",
                    existing.display_name
                );
                let mut restored = existing.clone();
                if restored.context != context {
                    debug!("Refreshing cached context for {}", restored.display_name);
                    restored.context = context;
                    self.registry.register(restored.clone());
                }
                restored
            }
            None => {
                info!("Adding new accessory: {}", self.config.ip);
                let accessory = PlatformAccessory {
                    uuid,
                    display_name: context.display_name.clone(),
                    context,
                };
                self.registry.register(accessory.clone());
                accessory
            }
        };
        self.accessories.insert(uuid, platform_accessory.clone());
        self.discovered.push(uuid);

        let running = self.start(platform_accessory, device);

        let stale: Vec<PlatformAccessory> = self
            .accessories
            .values()
            .filter(|a| !self.discovered.contains(&a.uuid))
            .cloned()
            .collect();
        for accessory in stale {
            info!(
                "Removing existing accessory from cache: {}",
                accessory.display_name
            );
            self.registry.unregister(&accessory.uuid);
            self.accessories.remove(&accessory.uuid);
        }

        running
    }

    fn device_context(&self) -> DeviceContext {
        DeviceContext {
            name: self.config.name.clone(),
            ip: self.config.ip.clone(),
            interval: self.config.interval_secs,
            display_name: self.config.name.clone(),
        }
    }

    fn start(
        &self,
        platform_accessory: PlatformAccessory,
        device: Arc<dyn DeviceApi>,
    ) -> RunningAccessory {
        let services = Arc::new(PandaServices::new());
        let accessory = Arc::new(PandaAccessory::new(device, services.clone()));
        services.switch.on_set(accessory.clone());

        let interval = Duration::from_secs(platform_accessory.context.interval);
        let identity_delay = Duration::from_millis(self.config.identity_delay_ms);
        let tasks = accessory.start(interval, identity_delay);
        info!(
            "Polling {} every {}s",
            platform_accessory.context.ip, platform_accessory.context.interval
        );

        RunningAccessory {
            platform_accessory,
            accessory,
            services,
            tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::testing::FakeDevice;
    use crate::host::registry::AccessoryCache;
    use std::sync::atomic::Ordering;

    fn config(ip: &str) -> Config {
        Config {
            ip: ip.to_string(),
            ..Config::default()
        }
    }

    fn cached(ip: &str, interval: u64) -> PlatformAccessory {
        PlatformAccessory {
            uuid: accessory_uuid(ip),
            display_name: "pandaPwr".to_string(),
            context: DeviceContext {
                name: "pandaPwr".to_string(),
                ip: ip.to_string(),
                interval,
                display_name: "pandaPwr".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_new_device_is_registered() {
        let registry = Arc::new(AccessoryCache::in_memory());
        let mut platform = PandaPlatform::new(config("10.0.0.4"), registry.clone());
        platform.restore_cached();

        let running = platform.discover_devices(Arc::new(FakeDevice::new()));

        assert_eq!(registry.cached(), vec![cached("10.0.0.4", 6)]);
        assert_eq!(running.platform_accessory.uuid, accessory_uuid("10.0.0.4"));
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_cached_device_is_reused_and_stale_removed() {
        let registry = Arc::new(AccessoryCache::in_memory());
        registry.register(cached("10.0.0.4", 6));
        registry.register(cached("10.0.0.99", 6));

        let mut platform = PandaPlatform::new(config("10.0.0.4"), registry.clone());
        platform.restore_cached();
        let running = platform.discover_devices(Arc::new(FakeDevice::new()));

        assert_eq!(registry.cached(), vec![cached("10.0.0.4", 6)]);
        assert_eq!(running.platform_accessory, cached("10.0.0.4", 6));
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_restored_context_follows_config() {
        let registry = Arc::new(AccessoryCache::in_memory());
        registry.register(cached("10.0.0.4", 30));

        let mut platform = PandaPlatform::new(config("10.0.0.4"), registry.clone());
        platform.restore_cached();
        let running = platform.discover_devices(Arc::new(FakeDevice::new()));

        assert_eq!(running.platform_accessory.context.interval, 6);
        assert_eq!(registry.cached(), vec![cached("10.0.0.4", 6)]);
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_switch_requests_reach_accessory() {
        let registry = Arc::new(AccessoryCache::in_memory());
        let device = Arc::new(FakeDevice::new());
        let mut platform = PandaPlatform::new(config("10.0.0.4"), registry);
        let running = platform.discover_devices(device.clone());

        let outcome = running.services.switch.request_set(true).await;
        assert_eq!(outcome, Some(CommandOutcome::Applied));
        assert!(running.services.switch.get());
        assert!(running.services.switch.request_get());
        assert_eq!(device.sent_commands(), vec![true]);

        running.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_polls() {
        let registry = Arc::new(AccessoryCache::in_memory());
        let device = Arc::new(FakeDevice::new().with_telemetry(12.0, 229.0));
        let mut platform = PandaPlatform::new(
            Config {
                interval_secs: 0,
                ..config("10.0.0.4")
            },
            registry,
        );
        let running = platform.discover_devices(device.clone());

        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(device.telemetry_calls.load(Ordering::SeqCst), 3);
        assert_eq!(running.services.battery.level(), 12);
        assert!(running.shutdown().await);
    }

    #[test]
    fn test_launch_requires_address() {
        let registry = Arc::new(AccessoryCache::in_memory());
        let mut platform = PandaPlatform::new(Config::default(), registry.clone());
        assert!(platform.did_finish_launching().is_err());
        assert!(registry.is_empty());
    }
}
