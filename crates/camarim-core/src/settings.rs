//! # Settings
//!
//! The flat settings map carried inside [`SystemData`](crate::SystemData).
//!
//! Settings are schemaless key/value pairs: the fallback store persists them
//! as one nested JSON object, the structured store fans them out into one
//! record per pair. Six numeric entries are guaranteed to exist after first
//! initialization:
//!
//! | key                 | default | meaning                                |
//! |---------------------|---------|----------------------------------------|
//! | `defaultFee`        | 2.5     | card fee percentage applied at tender  |
//! | `defaultTax`        | 8.0     | tax percentage for new products        |
//! | `defaultMargin`     | 30.0    | target margin percentage               |
//! | `defaultCommission` | 10.0    | attendant commission percentage        |
//! | `lastProductId`     | 0       | running product id counter             |
//! | `lastSaleId`        | 0       | running sale id counter                |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Well-Known Keys
// =============================================================================

/// Card fee percentage applied at tender time.
pub const DEFAULT_FEE_KEY: &str = "defaultFee";
/// Tax percentage suggested for new products.
pub const DEFAULT_TAX_KEY: &str = "defaultTax";
/// Target margin percentage suggested for new products.
pub const DEFAULT_MARGIN_KEY: &str = "defaultMargin";
/// Attendant commission percentage.
pub const DEFAULT_COMMISSION_KEY: &str = "defaultCommission";
/// Running id counter for products.
pub const LAST_PRODUCT_ID_KEY: &str = "lastProductId";
/// Running id counter for sales.
pub const LAST_SALE_ID_KEY: &str = "lastSaleId";

/// The six numeric entries every initialized data set carries, with their
/// first-run values.
pub const NUMERIC_DEFAULTS: [(&str, f64); 6] = [
    (DEFAULT_FEE_KEY, 2.5),
    (DEFAULT_TAX_KEY, 8.0),
    (DEFAULT_MARGIN_KEY, 30.0),
    (DEFAULT_COMMISSION_KEY, 10.0),
    (LAST_PRODUCT_ID_KEY, 0.0),
    (LAST_SALE_ID_KEY, 0.0),
];

// =============================================================================
// Settings
// =============================================================================

/// Flat mapping of string key to JSON value.
///
/// The map is ordered (BTreeMap) so serialized blobs are stable and
/// comparisons in tests are deterministic. An empty map deserializes fine;
/// call [`ensure_defaults`](Settings::ensure_defaults) to inject the six
/// numeric entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, Value>);

impl Settings {
    /// Creates an empty settings map.
    pub fn new() -> Self {
        Settings::default()
    }

    /// Creates a settings map pre-populated with the six numeric defaults.
    pub fn with_defaults() -> Self {
        let mut settings = Settings::new();
        settings.ensure_defaults();
        settings
    }

    /// Injects every missing numeric default, leaving present entries alone.
    ///
    /// ## Returns
    /// The number of entries injected. Zero means the map was already
    /// fully initialized.
    pub fn ensure_defaults(&mut self) -> usize {
        let mut injected = 0;
        for (key, value) in NUMERIC_DEFAULTS {
            if !self.0.contains_key(key) {
                self.0.insert(key.to_string(), json_number(value));
                injected += 1;
            }
        }
        injected
    }

    // -------------------------------------------------------------------------
    // Generic access
    // -------------------------------------------------------------------------

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Inserts or replaces a value, returning the previous one if any.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the map holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all entries (used by the structured store's fan-out).
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Rebuilds a settings map from individual key/value records (the
    /// structured store's inverse of [`iter`](Settings::iter)).
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Settings(pairs.into_iter().collect())
    }

    /// Numeric lookup; returns None when absent or not a number.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Integer lookup; whole-valued floats are accepted since JSON does not
    /// distinguish the two.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Typed accessors for the well-known entries
    // -------------------------------------------------------------------------

    /// Card fee percentage.
    pub fn default_fee(&self) -> f64 {
        self.get_f64(DEFAULT_FEE_KEY).unwrap_or(2.5)
    }

    /// Tax percentage.
    pub fn default_tax(&self) -> f64 {
        self.get_f64(DEFAULT_TAX_KEY).unwrap_or(8.0)
    }

    /// Target margin percentage.
    pub fn default_margin(&self) -> f64 {
        self.get_f64(DEFAULT_MARGIN_KEY).unwrap_or(30.0)
    }

    /// Attendant commission percentage.
    pub fn default_commission(&self) -> f64 {
        self.get_f64(DEFAULT_COMMISSION_KEY).unwrap_or(10.0)
    }

    /// Highest product id handed out so far.
    pub fn last_product_id(&self) -> i64 {
        self.get_i64(LAST_PRODUCT_ID_KEY).unwrap_or(0)
    }

    /// Highest sale id handed out so far.
    pub fn last_sale_id(&self) -> i64 {
        self.get_i64(LAST_SALE_ID_KEY).unwrap_or(0)
    }

    /// Advances the product id counter and returns the new id.
    pub fn next_product_id(&mut self) -> i64 {
        let next = self.last_product_id() + 1;
        self.0
            .insert(LAST_PRODUCT_ID_KEY.to_string(), Value::from(next));
        next
    }

    /// Advances the sale id counter and returns the new id.
    pub fn next_sale_id(&mut self) -> i64 {
        let next = self.last_sale_id() + 1;
        self.0.insert(LAST_SALE_ID_KEY.to_string(), Value::from(next));
        next
    }
}

/// Builds a JSON number, preferring the integer representation for whole
/// values so counters serialize as `0` rather than `0.0`.
fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
