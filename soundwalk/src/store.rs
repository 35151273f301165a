//! Zone catalog persistence.

use crate::error::{Result, SoundWalkError};
use crate::zone::{Zone, seed_zones};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Holds and persists the zone catalog.
pub trait ZoneStore: Send {
    fn load(&self) -> Result<Vec<Zone>>;
    fn save(&self, zones: &[Zone]) -> Result<()>;
}

/// Stores the catalog as a JSON array in a single file.
pub struct JsonZoneStore {
    path: PathBuf,
}

impl JsonZoneStore {
    pub const DEFAULT_FILE_NAME: &'static str = "zones.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/zones.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(Self::DEFAULT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ZoneStore for JsonZoneStore {
    fn load(&self) -> Result<Vec<Zone>> {
        if !self.path.exists() {
            return Err(SoundWalkError::NotFound(format!(
                "zone catalog {}",
                self.path.display()
            )));
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, zones: &[Zone]) -> Result<()> {
        let json = serde_json::to_vec_pretty(zones)?;

        // Write next to the target and rename so readers never see a torn file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        log::debug!("Saved {} zones to {}", zones.len(), self.path.display());
        Ok(())
    }
}

/// In-memory store. `load` fails until something has been saved.
#[derive(Default)]
pub struct MemoryZoneStore {
    zones: Mutex<Option<Vec<Zone>>>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zones(zones: Vec<Zone>) -> Self {
        Self {
            zones: Mutex::new(Some(zones)),
        }
    }

    /// Last saved catalog, if any.
    pub fn snapshot(&self) -> Option<Vec<Zone>> {
        self.zones.lock().ok().and_then(|z| z.clone())
    }
}

impl ZoneStore for MemoryZoneStore {
    fn load(&self) -> Result<Vec<Zone>> {
        self.snapshot()
            .ok_or_else(|| SoundWalkError::NotFound("no saved zone catalog".into()))
    }

    fn save(&self, zones: &[Zone]) -> Result<()> {
        let mut guard = self
            .zones
            .lock()
            .map_err(|_| SoundWalkError::Engine("zone store lock poisoned".into()))?;
        *guard = Some(zones.to_vec());
        Ok(())
    }
}

/// Load the catalog, falling back to the built-in seed zones.
///
/// Any load failure (missing, unreadable or corrupt catalog) yields the seed
/// zones, which are persisted straight away.
pub fn load_or_seed(store: &dyn ZoneStore) -> Vec<Zone> {
    match store.load() {
        Ok(zones) => {
            log::info!("Loaded {} zones", zones.len());
            zones
        }
        Err(e) => {
            if e.is_not_found() {
                log::info!("No zone catalog yet ({}), using seed zones", e);
            } else {
                log::warn!("Failed to load zone catalog: {}, using seed zones", e);
            }
            let seeds = seed_zones();
            if let Err(e) = store.save(&seeds) {
                log::error!("Failed to persist seed zones: {}", e);
            }
            seeds
        }
    }
}
