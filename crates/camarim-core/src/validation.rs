//! # Validation Module
//!
//! Data-set validation for Camarim POS.
//!
//! The storage layer trusts whatever it loaded from its own backends, but
//! externally-sourced data (a restored cloud backup, an imported blob) is
//! validated here before it is allowed to overwrite the live data set.

use crate::error::ValidationError;
use crate::types::SystemData;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Data-Set Validation
// =============================================================================

/// Validates a full data set against its documented invariants.
///
/// ## Rules
/// - Product ids are unique within `products`
/// - Sale ids are unique within `sales`
/// - Sale line quantities are not negative
/// - Attendant names are present on sales
///
/// Returns the first violation found; callers reject the whole data set on
/// any error, so exhaustive reporting is not needed here.
pub fn validate_system_data(data: &SystemData) -> ValidationResult<()> {
    validate_unique_ids("products", data.products.iter().map(|p| p.id))?;
    validate_unique_ids("sales", data.sales.iter().map(|s| s.id))?;

    for sale in &data.sales {
        if sale.attendant.trim().is_empty() {
            return Err(ValidationError::Required {
                field: format!("sales[{}].attendant", sale.id),
            });
        }
        for item in &sale.items {
            if item.quantity < 0 {
                return Err(ValidationError::Negative {
                    field: format!("sales[{}].items.quantity", sale.id),
                    value: item.quantity,
                });
            }
        }
    }

    for product in &data.products {
        if product.name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: format!("products[{}].name", product.id),
            });
        }
    }

    Ok(())
}

/// Checks a stream of ids for duplicates.
fn validate_unique_ids(
    collection: &'static str,
    ids: impl Iterator<Item = i64>,
) -> ValidationResult<()> {
    let mut seen = std::collections::BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::DuplicateId { collection, id });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Product, Sale, SaleItem};
    use chrono::Utc;

    fn product(id: i64) -> Product {
        Product {
            id,
            name: format!("Product {id}"),
            category: "General".to_string(),
            price_cents: 1000,
            cost_cents: None,
            stock: 5,
        }
    }

    fn sale(id: i64) -> Sale {
        Sale {
            id,
            date: Utc::now(),
            attendant: "Ana".to_string(),
            items: vec![SaleItem {
                product_id: 1,
                quantity: 1,
                unit_price_cents: 1000,
            }],
            total_cents: 1000,
        }
    }

    #[test]
    fn test_valid_data_passes() {
        let data = SystemData {
            products: vec![product(1), product(2)],
            sales: vec![sale(1)],
            ..Default::default()
        };
        assert!(validate_system_data(&data).is_ok());
    }

    #[test]
    fn test_duplicate_product_id_rejected() {
        let data = SystemData {
            products: vec![product(1), product(1)],
            ..Default::default()
        };
        let err = validate_system_data(&data).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DuplicateId {
                collection: "products",
                id: 1
            }
        ));
    }

    #[test]
    fn test_duplicate_sale_id_rejected() {
        let data = SystemData {
            sales: vec![sale(3), sale(3)],
            ..Default::default()
        };
        let err = validate_system_data(&data).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DuplicateId {
                collection: "sales",
                id: 3
            }
        ));
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let mut bad_sale = sale(1);
        bad_sale.items[0].quantity = -2;
        let data = SystemData {
            sales: vec![bad_sale],
            ..Default::default()
        };
        assert!(matches!(
            validate_system_data(&data),
            Err(ValidationError::Negative { .. })
        ));
    }

    #[test]
    fn test_blank_attendant_rejected() {
        let mut bad_sale = sale(1);
        bad_sale.attendant = "   ".to_string();
        let data = SystemData {
            sales: vec![bad_sale],
            ..Default::default()
        };
        assert!(matches!(
            validate_system_data(&data),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_empty_data_set_is_valid() {
        assert!(validate_system_data(&SystemData::default()).is_ok());
    }
}
