//! # Persisted Types
//!
//! The types that make up the persisted data set.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SystemData                                     │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Settings     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  id (i64)       │   │  flat key →     │       │
//! │  │  category       │   │  date           │   │  JSON value map │       │
//! │  │  stock          │   │  attendant      │   │  + six numeric  │       │
//! │  │  price_cents    │   │  items[]        │   │    defaults     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Layout
//! The fallback store persists SystemData as one JSON blob with camelCase
//! field names; the structured store persists the same types row-per-record.
//! Both layouts round-trip through the serde derives below, so the blob
//! written under `camarim-system-data` stays readable across versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// Ids are assigned from the `lastProductId` counter in [`Settings`] and are
/// unique and stable within the data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique identifier.
    pub id: i64,

    /// Display name.
    pub name: String,

    /// Category used for grouped lookups (indexed in the structured store).
    pub category: String,

    /// Sale price in cents (smallest currency unit).
    pub price_cents: i64,

    /// Acquisition cost in cents, when known.
    #[serde(default)]
    pub cost_cents: Option<i64>,

    /// Current stock level (indexed in the structured store).
    pub stock: i64,
}

impl Product {
    /// Checks whether the requested quantity can currently be sold.
    pub fn in_stock(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A line item in a sale.
///
/// The unit price is frozen at the time of sale, so later product price
/// edits do not rewrite sales history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    /// Id of the product sold.
    pub product_id: i64,

    /// Quantity sold.
    pub quantity: i64,

    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
}

impl SaleItem {
    /// Line total before any sale-level adjustment.
    #[inline]
    pub fn line_total_cents(&self) -> i64 {
        self.quantity * self.unit_price_cents
    }
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    /// Unique identifier, assigned from the `lastSaleId` counter.
    pub id: i64,

    /// When the sale was completed (indexed in the structured store).
    pub date: DateTime<Utc>,

    /// Who rang the sale up (indexed in the structured store).
    pub attendant: String,

    /// Line items.
    #[serde(default)]
    pub items: Vec<SaleItem>,

    /// Sale total in cents.
    pub total_cents: i64,
}

// =============================================================================
// System Data
// =============================================================================

/// The complete persisted application state.
///
/// This is the unit of persistence: it is loaded and saved wholesale, never
/// partially. A fresh instance is empty apart from the settings defaults.
///
/// ## Invariants
/// - `products` ids are unique within the collection
/// - `sales` ids are unique within the collection
/// - `settings` contains the six numeric defaults after first initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    #[serde(default)]
    pub products: Vec<Product>,

    #[serde(default)]
    pub sales: Vec<Sale>,

    #[serde(default)]
    pub settings: Settings,
}

impl Default for SystemData {
    fn default() -> Self {
        SystemData {
            products: Vec::new(),
            sales: Vec::new(),
            settings: Settings::with_defaults(),
        }
    }
}

impl SystemData {
    /// Returns true if both record collections are empty.
    ///
    /// Settings are ignored here: a data set holding nothing but the
    /// injected defaults still counts as empty for migration purposes.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.sales.is_empty()
    }

    /// Looks up a product by id.
    pub fn product(&self, id: i64) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Looks up a sale by id.
    pub fn sale(&self, id: i64) -> Option<&Sale> {
        self.sales.iter().find(|s| s.id == id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_product() -> Product {
        Product {
            id: 1,
            name: "Caipirinha".to_string(),
            category: "Drinks".to_string(),
            price_cents: 1800,
            cost_cents: Some(600),
            stock: 24,
        }
    }

    #[test]
    fn test_default_system_data_is_empty_with_settings() {
        let data = SystemData::default();
        assert!(data.is_empty());
        assert!(data.products.is_empty());
        assert!(data.sales.is_empty());
        // The six numeric defaults are injected on construction
        assert_eq!(data.settings.last_product_id(), 0);
        assert_eq!(data.settings.last_sale_id(), 0);
    }

    #[test]
    fn test_product_serializes_camel_case() {
        let json = serde_json::to_value(sample_product()).unwrap();
        assert_eq!(json["priceCents"], 1800);
        assert_eq!(json["costCents"], 600);
        assert!(json.get("price_cents").is_none());
    }

    #[test]
    fn test_sale_item_line_total() {
        let item = SaleItem {
            product_id: 1,
            quantity: 3,
            unit_price_cents: 1800,
        };
        assert_eq!(item.line_total_cents(), 5400);
    }

    #[test]
    fn test_system_data_round_trip() {
        let data = SystemData {
            products: vec![sample_product()],
            sales: vec![Sale {
                id: 1,
                date: Utc::now(),
                attendant: "Ana".to_string(),
                items: vec![SaleItem {
                    product_id: 1,
                    quantity: 2,
                    unit_price_cents: 1800,
                }],
                total_cents: 3600,
            }],
            settings: Settings::with_defaults(),
        };

        let json = serde_json::to_string(&data).unwrap();
        let back: SystemData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        // Blobs written by older builds may omit collections entirely
        let back: SystemData = serde_json::from_str(r#"{"settings":{}}"#).unwrap();
        assert!(back.products.is_empty());
        assert!(back.sales.is_empty());
    }

    #[test]
    fn test_lookup_by_id() {
        let data = SystemData {
            products: vec![sample_product()],
            ..Default::default()
        };
        assert_eq!(data.product(1).map(|p| p.name.as_str()), Some("Caipirinha"));
        assert!(data.product(2).is_none());
    }
}
