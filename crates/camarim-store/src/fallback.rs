//! # Fallback Store
//!
//! Whole-blob persistence over a [`KeyValueBackend`]: the entire data set
//! is serialized as one JSON document under a fixed key.
//!
//! This store is both the degraded-mode backend (when the structured store
//! is unavailable) and the always-written mirror (when it is). It never
//! propagates an error to its caller: reads fail closed to a default data
//! set and writes report success or failure as a boolean.

use tracing::{debug, warn};

use camarim_core::SystemData;

use crate::error::StoreResult;
use crate::kv::KeyValueBackend;

/// Fixed key the live data set is stored under.
pub const SYSTEM_DATA_KEY: &str = "camarim-system-data";

// =============================================================================
// Fallback Store
// =============================================================================

/// Key-value fallback store holding the data set as one JSON blob.
pub struct FallbackStore {
    kv: Box<dyn KeyValueBackend>,
}

impl FallbackStore {
    /// Creates a fallback store over the given backend.
    pub fn new(kv: Box<dyn KeyValueBackend>) -> Self {
        FallbackStore { kv }
    }

    /// Loads the persisted data set.
    ///
    /// ## Fail-Closed Behavior
    /// - Absent blob → default SystemData
    /// - Unreadable backend → default SystemData (logged)
    /// - Malformed JSON → default SystemData (logged); the corrupt value
    ///   is left in place for forensic recovery, never deleted here
    ///
    /// Settings defaults are injected after a successful parse, so a blob
    /// written before a default existed still comes back fully
    /// initialized.
    pub fn load(&self) -> SystemData {
        let raw = match self.kv.get(SYSTEM_DATA_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = SYSTEM_DATA_KEY, "No fallback blob, starting fresh");
                return SystemData::default();
            }
            Err(e) => {
                warn!(key = SYSTEM_DATA_KEY, error = %e, "Fallback read failed, using defaults");
                return SystemData::default();
            }
        };

        match serde_json::from_str::<SystemData>(&raw) {
            Ok(mut data) => {
                let injected = data.settings.ensure_defaults();
                if injected > 0 {
                    debug!(injected, "Injected missing settings defaults");
                }
                data
            }
            Err(e) => {
                // Corrupt value stays under the key for recovery
                warn!(
                    key = SYSTEM_DATA_KEY,
                    error = %e,
                    "Fallback blob is malformed, using defaults"
                );
                SystemData::default()
            }
        }
    }

    /// Persists the whole data set as one JSON blob.
    ///
    /// ## Returns
    /// `true` on success; `false` on any failure (serialization, quota,
    /// backend I/O). Failures are logged, never thrown.
    pub fn save(&self, data: &SystemData) -> bool {
        let blob = match serde_json::to_string(data) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "Failed to serialize data set for fallback");
                return false;
            }
        };

        match self.kv.set(SYSTEM_DATA_KEY, &blob) {
            Ok(()) => {
                debug!(
                    bytes = blob.len(),
                    products = data.products.len(),
                    sales = data.sales.len(),
                    "Fallback blob written"
                );
                true
            }
            Err(e) => {
                warn!(key = SYSTEM_DATA_KEY, error = %e, "Fallback write failed");
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Raw key access (adapter bookkeeping)
    // -------------------------------------------------------------------------

    /// Reads an arbitrary key from the underlying backend.
    pub fn read_key(&self, key: &str) -> StoreResult<Option<String>> {
        self.kv.get(key)
    }

    /// Writes an arbitrary key to the underlying backend.
    pub fn write_key(&self, key: &str, value: &str) -> StoreResult<()> {
        self.kv.set(key, value)
    }

    /// Removes an arbitrary key from the underlying backend.
    pub fn remove_key(&self, key: &str) -> StoreResult<()> {
        self.kv.remove(key)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use camarim_core::types::Product;

    fn store() -> FallbackStore {
        FallbackStore::new(Box::new(MemoryKv::new()))
    }

    fn sample_data() -> SystemData {
        SystemData {
            products: vec![Product {
                id: 1,
                name: "Espresso".to_string(),
                category: "Coffee".to_string(),
                price_cents: 700,
                cost_cents: None,
                stock: 40,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_load_absent_returns_defaults() {
        let data = store().load();
        assert!(data.is_empty());
        assert_eq!(data.settings.len(), 6);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let store = store();
        let data = sample_data();

        assert!(store.save(&data));
        assert_eq!(store.load(), data);
    }

    #[test]
    fn test_malformed_blob_fails_closed_and_is_preserved() {
        let store = store();
        store.write_key(SYSTEM_DATA_KEY, "{not json at all").unwrap();

        let data = store.load();
        assert!(data.is_empty());
        assert_eq!(data.settings.last_product_id(), 0);

        // Forensic copy still present, untouched
        assert_eq!(
            store.read_key(SYSTEM_DATA_KEY).unwrap().as_deref(),
            Some("{not json at all")
        );
    }

    #[test]
    fn test_defaults_injected_into_old_blob() {
        let store = store();
        // A blob from before the commission default existed
        store
            .write_key(
                SYSTEM_DATA_KEY,
                r#"{"products":[],"sales":[],"settings":{"defaultTax":11.0}}"#,
            )
            .unwrap();

        let data = store.load();
        assert_eq!(data.settings.default_tax(), 11.0);
        assert_eq!(data.settings.default_commission(), 10.0);
        assert_eq!(data.settings.len(), 6);
    }

    #[test]
    fn test_quota_exceeded_save_returns_false() {
        let store = FallbackStore::new(Box::new(MemoryKv::with_quota(16)));
        assert!(!store.save(&sample_data()));
    }

    #[test]
    fn test_save_overwrites_previous_blob() {
        let store = store();
        assert!(store.save(&sample_data()));

        let empty = SystemData::default();
        assert!(store.save(&empty));
        assert!(store.load().is_empty());
    }
}
