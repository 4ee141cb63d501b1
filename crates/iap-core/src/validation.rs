//! # Validation Module
//!
//! Input validation for ids that cross the platform boundary.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: StoreService entry points                                    │
//! │  └── THIS MODULE: reject malformed product ids synchronously           │
//! │           │          (no operation is created)                          │
//! │           ▼                                                             │
//! │  Layer 2: TransactionProcessor                                         │
//! │  └── Catalog lookup: unknown / not purchasable → ProductUnavailable    │
//! │           │          (reported through the purchase operation)          │
//! │           ▼                                                             │
//! │  Layer 3: Commerce platform                                            │
//! │  └── Payment, signature and duplicate checks                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use iap_core::validation::validate_product_id;
//!
//! assert!(validate_product_id("sword_of_fire").is_ok());
//! assert!(validate_product_id("").is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::ProductDefinition;
use crate::MAX_PRODUCT_ID_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates an application product id.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_PRODUCT_ID_LEN`] characters
/// - Letters, digits, `.`, `_` and `-` only (the common subset of store id rules)
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    validate_id("product_id", product_id)
}

/// Validates a platform store-specific id. Same rules as product ids.
pub fn validate_store_specific_id(store_id: &str) -> ValidationResult<()> {
    validate_id("store_specific_id", store_id)
}

fn validate_id(field: &str, value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_PRODUCT_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_PRODUCT_ID_LEN,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, digits, '.', '_' and '-'".to_string(),
        });
    }

    Ok(())
}

/// Validates a list of product definitions: every id valid, no duplicates.
pub fn validate_product_definitions(definitions: &[ProductDefinition]) -> ValidationResult<()> {
    let mut seen = HashSet::with_capacity(definitions.len());

    for definition in definitions {
        validate_product_id(&definition.id)?;
        if let Some(store_id) = definition.store_specific_id.as_deref() {
            validate_store_specific_id(store_id)?;
        }
        if !seen.insert(definition.id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: definition.id.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductKind;

    #[test]
    fn test_validate_product_id() {
        assert!(validate_product_id("sword_of_fire").is_ok());
        assert!(validate_product_id("com.example.gems-100").is_ok());

        assert!(matches!(
            validate_product_id(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_product_id("has space"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_product_id(&"a".repeat(MAX_PRODUCT_ID_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_duplicate_definitions_rejected() {
        let definitions = vec![
            ProductDefinition::new("potion", ProductKind::Consumable),
            ProductDefinition::new("potion", ProductKind::NonConsumable),
        ];
        let err = validate_product_definitions(&definitions).unwrap_err();
        assert_eq!(err.to_string(), "product_id 'potion' already exists");
    }

    #[test]
    fn test_store_specific_id_checked() {
        let mut definition = ProductDefinition::new("potion", ProductKind::Consumable);
        definition.store_specific_id = Some("bad id".into());
        assert!(validate_product_definitions(&[definition]).is_err());
    }
}
