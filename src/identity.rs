//! Stable per-installation device identifier

use std::sync::OnceLock;

use tracing::{info, warn};
use uuid::Uuid;

use crate::store::Preferences;

pub const DEVICE_ID_KEY: &str = "device_id";

const DEVICE_ID_PREFIX: &str = "device";

/// Lazily created, never rotated device id.
///
/// If the preference store cannot be read or written, a fresh id is used
/// for the rest of this process and nothing is persisted.
pub struct DeviceIdentity {
    prefs: Preferences,
    cached: OnceLock<String>,
}

impl DeviceIdentity {
    pub fn new(prefs: Preferences) -> Self {
        Self {
            prefs,
            cached: OnceLock::new(),
        }
    }

    pub fn get(&self) -> String {
        self.cached.get_or_init(|| self.load_or_create()).clone()
    }

    fn load_or_create(&self) -> String {
        match self.prefs.get(DEVICE_ID_KEY) {
            Ok(Some(id)) if !id.is_empty() => return id,
            Ok(_) => {}
            Err(e) => {
                let id = generate();
                warn!("Preference store unreadable ({:#}); using unpersisted id {}", e, id);
                return id;
            }
        }

        let id = generate();
        match self.prefs.set(DEVICE_ID_KEY, &id) {
            Ok(()) => info!("Generated device id {}", id),
            Err(e) => warn!("Failed to persist device id {} ({:#})", id, e),
        }
        id
    }
}

fn generate() -> String {
    format!("{}_{}", DEVICE_ID_PREFIX, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generated_once_and_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.toml");

        let first = DeviceIdentity::new(Preferences::open(&path)).get();
        let second = DeviceIdentity::new(Preferences::open(&path)).get();

        assert!(first.starts_with("device_"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_id_is_kept() {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::open(dir.path().join("prefs.toml"));
        prefs.set(DEVICE_ID_KEY, "device_abc123").unwrap();

        assert_eq!(DeviceIdentity::new(prefs).get(), "device_abc123");
    }

    #[test]
    fn test_unreadable_store_degrades_to_stable_process_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.toml");
        std::fs::write(&path, "[[[ broken").unwrap();

        let identity = DeviceIdentity::new(Preferences::open(&path));
        let id = identity.get();
        assert!(id.starts_with("device_"));
        assert_eq!(identity.get(), id);
        // the corrupt store is left alone
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[[[ broken");
    }

    #[test]
    fn test_ids_differ_between_installations() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let id_a = DeviceIdentity::new(Preferences::open(a.path().join("p.toml"))).get();
        let id_b = DeviceIdentity::new(Preferences::open(b.path().join("p.toml"))).get();
        assert_ne!(id_a, id_b);
    }
}
