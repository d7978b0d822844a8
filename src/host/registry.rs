//! Accessory registry with on-disk cache.
//!
//! Mirrors what a host does between restarts: accessories registered by the
//! platform are remembered, handed back at startup, and removed when the
//! platform no longer claims them.

use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Device details stored alongside a registered accessory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceContext {
    pub name: String,
    pub ip: String,
    pub interval: u64,
    pub display_name: String,
}

/// An accessory as the host tracks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAccessory {
    pub uuid: Uuid,
    pub display_name: String,
    pub context: DeviceContext,
}

/// Stable accessory identifier for a device address.
pub fn accessory_uuid(ip: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, ip.trim().as_bytes())
}

/// Host-side accessory registration.
pub trait AccessoryRegistry: Send + Sync {
    /// Add an accessory, replacing any entry with the same UUID.
    fn register(&self, accessory: PlatformAccessory);

    fn unregister(&self, uuid: &Uuid);

    /// Accessories restored from the previous run.
    fn cached(&self) -> Vec<PlatformAccessory>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CacheFile {
    accessories: Vec<PlatformAccessory>,
}

impl CacheFile {
    fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<CacheFile>(&bytes) {
                Ok(cache) => {
                    info!(
                        "Loaded {} cached accessories from {:?}",
                        cache.accessories.len(),
                        path
                    );
                    cache
                }
                Err(e) => {
                    warn!("Failed to parse accessory cache, starting empty: {}", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No accessory cache found (first run)");
                Self::default()
            }
            Err(e) => {
                error!("Failed to read accessory cache: {}", e);
                Self::default()
            }
        }
    }

    fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)
    }
}

/// JSON-file-backed [`AccessoryRegistry`].
///
/// Every change is written through immediately; write failures are logged
/// and the in-memory view stays authoritative for this run.
pub struct AccessoryCache {
    path: Option<PathBuf>,
    state: RwLock<CacheFile>,
}

impl AccessoryCache {
    pub fn open(path: PathBuf) -> Self {
        let state = CacheFile::load(&path);
        Self {
            path: Some(path),
            state: RwLock::new(state),
        }
    }

    /// A cache that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(CacheFile::default()),
        }
    }

    pub fn get(&self, uuid: &Uuid) -> Option<PlatformAccessory> {
        self.state
            .read()
            .accessories
            .iter()
            .find(|a| a.uuid == *uuid)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, state: &CacheFile) {
        if let Some(path) = &self.path
            && let Err(e) = state.save(path)
        {
            error!("Failed to save accessory cache: {}", e);
        }
    }
}

impl AccessoryRegistry for AccessoryCache {
    fn register(&self, accessory: PlatformAccessory) {
        let mut state = self.state.write();
        if state.accessories.iter().any(|a| *a == accessory) {
            return;
        }
        state.accessories.retain(|a| a.uuid != accessory.uuid);
        info!(
            "Registered accessory {} ({})",
            accessory.display_name, accessory.uuid
        );
        state.accessories.push(accessory);
        self.persist(&state);
    }

    fn unregister(&self, uuid: &Uuid) {
        let mut state = self.state.write();
        let before = state.accessories.len();
        state.accessories.retain(|a| a.uuid != *uuid);
        if state.accessories.len() != before {
            info!("Unregistered accessory {}", uuid);
            self.persist(&state);
        }
    }

    fn cached(&self) -> Vec<PlatformAccessory> {
        self.state.read().accessories.clone()
    }
}
