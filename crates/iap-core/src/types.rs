//! # Domain Types
//!
//! Products, transaction records and purchase outcomes.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ProductDefinition │   │ TransactionRecord│   │ PurchaseResult   │    │
//! │  │  ─────────────   │   │  ─────────────   │   │  ─────────────   │    │
//! │  │  id              │   │  product_id      │   │  record          │    │
//! │  │  store_id        │   │  transaction_id  │   │  verdict         │    │
//! │  │  kind            │   │  receipt         │   │  completed_at    │    │
//! │  └────────┬─────────┘   │  store_id        │   └──────────────────┘    │
//! │           │             │  restored        │                           │
//! │  ┌────────▼─────────┐   └──────────────────┘   ┌──────────────────┐    │
//! │  │     Product      │                          │ PurchaseFailure  │    │
//! │  │  definition      │   ┌──────────────────┐   │  ─────────────   │    │
//! │  │  metadata        │   │ValidationVerdict │   │  product_id      │    │
//! │  │  available       │   │  Ok / Failure /  │   │  error           │    │
//! │  └──────────────────┘   │  NotAvailable    │   │  record?         │    │
//! │                         └──────────────────┘   └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - `ProductDefinition::id`: the application's product id, stable across stores
//! - `ProductDefinition::store_specific_id`: the id the platform knows it by
//! - `TransactionRecord::transaction_id`: assigned by the platform per purchase

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PurchaseError;

// =============================================================================
// Product Kind
// =============================================================================

/// How the platform treats repeated purchases of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// Can be bought again once consumed (currency packs, potions).
    #[default]
    Consumable,
    /// Bought once, owned forever (level unlocks, ad removal).
    NonConsumable,
    /// Renews until canceled.
    Subscription,
}

impl std::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductKind::Consumable => write!(f, "consumable"),
            ProductKind::NonConsumable => write!(f, "non_consumable"),
            ProductKind::Subscription => write!(f, "subscription"),
        }
    }
}

// =============================================================================
// Product Definition
// =============================================================================

/// A product the application declares to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDefinition {
    /// Application product id.
    pub id: String,

    /// Platform-specific id, if different from `id`.
    #[serde(default)]
    pub store_specific_id: Option<String>,

    /// Product kind.
    #[serde(default)]
    pub kind: ProductKind,
}

impl ProductDefinition {
    /// Creates a definition whose store id equals the product id.
    pub fn new(id: impl Into<String>, kind: ProductKind) -> Self {
        ProductDefinition {
            id: id.into(),
            store_specific_id: None,
            kind,
        }
    }

    /// The id to send to the platform.
    pub fn store_id(&self) -> &str {
        self.store_specific_id.as_deref().unwrap_or(&self.id)
    }
}

// =============================================================================
// Product
// =============================================================================

/// Localized storefront data reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub localized_title: String,
    pub localized_description: String,
    /// Formatted price as the platform displays it (e.g. "$0.99").
    pub localized_price_string: String,
    /// ISO 4217 currency code.
    pub iso_currency_code: String,
    /// Price in the currency's smallest unit (99 = $0.99).
    pub price_minor_units: i64,
}

/// A product as known to the platform after initialization or fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub definition: ProductDefinition,
    #[serde(default)]
    pub metadata: ProductMetadata,
    /// Whether the platform currently allows buying this product.
    pub available_to_purchase: bool,
}

impl Product {
    /// Creates an available product with empty metadata.
    pub fn new(definition: ProductDefinition) -> Self {
        Product {
            definition,
            metadata: ProductMetadata::default(),
            available_to_purchase: true,
        }
    }

    /// Attaches localized metadata.
    pub fn with_metadata(mut self, metadata: ProductMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Application product id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// Product kind.
    #[inline]
    pub fn kind(&self) -> ProductKind {
        self.definition.kind
    }
}

// =============================================================================
// Transaction Record
// =============================================================================

/// Immutable snapshot of one purchase as delivered by the platform.
///
/// Created when the platform reports a payment that needs processing, either
/// for an explicit purchase or for a restored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Application product id.
    pub product_id: String,

    /// Platform transaction id (absent on some platforms for restores).
    pub transaction_id: Option<String>,

    /// Opaque receipt payload. Parsing it is the validator's business.
    pub receipt: Option<String>,

    /// Platform that produced the receipt (e.g. "GooglePlay", "AppleAppStore").
    pub store_id: String,

    /// True if the purchase was not started by a `purchase` call.
    pub restored: bool,

    /// When the record was taken.
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Returns true if the receipt is missing or blank.
    pub fn has_empty_receipt(&self) -> bool {
        self.receipt
            .as_deref()
            .map_or(true, |receipt| receipt.trim().is_empty())
    }
}

// =============================================================================
// Validation Verdict
// =============================================================================

/// Verdict of the application's receipt validator.
///
/// An absent verdict (`None`) means "accept without validation".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationVerdict {
    /// Receipt is genuine. Confirm and complete.
    Ok,
    /// Receipt is not genuine. Confirm (so it is not replayed) and fail.
    Failure,
    /// No verdict right now. Do not confirm; the platform redelivers later.
    NotAvailable,
}

// =============================================================================
// Purchase Outcomes
// =============================================================================

/// Result of a completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResult {
    pub record: TransactionRecord,
    /// `None` when validation was suppressed.
    pub verdict: Option<ValidationVerdict>,
    pub completed_at: DateTime<Utc>,
}

impl PurchaseResult {
    pub fn product_id(&self) -> &str {
        &self.record.product_id
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.record.transaction_id.as_deref()
    }

    pub fn is_restored(&self) -> bool {
        self.record.restored
    }
}

/// Failure payload of a purchase operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseFailure {
    pub product_id: String,
    pub error: PurchaseError,
    /// Present once the platform delivered transaction data.
    pub record: Option<TransactionRecord>,
}

impl std::fmt::Display for PurchaseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "purchase of '{}' failed: {}", self.product_id, self.error)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(receipt: Option<&str>) -> TransactionRecord {
        TransactionRecord {
            product_id: "potion".into(),
            transaction_id: Some("T1".into()),
            receipt: receipt.map(str::to_string),
            store_id: "TestStore".into(),
            restored: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_store_id_falls_back_to_product_id() {
        let mut definition = ProductDefinition::new("gem_pack", ProductKind::Consumable);
        assert_eq!(definition.store_id(), "gem_pack");

        definition.store_specific_id = Some("com.example.gems".into());
        assert_eq!(definition.store_id(), "com.example.gems");
    }

    #[test]
    fn test_empty_receipt_detection() {
        assert!(record(None).has_empty_receipt());
        assert!(record(Some("")).has_empty_receipt());
        assert!(record(Some("   ")).has_empty_receipt());
        assert!(!record(Some("R1")).has_empty_receipt());
    }

    #[test]
    fn test_product_kind_default_and_display() {
        assert_eq!(ProductKind::default(), ProductKind::Consumable);
        assert_eq!(ProductKind::NonConsumable.to_string(), "non_consumable");
    }

    #[test]
    fn test_purchase_failure_display() {
        let failure = PurchaseFailure {
            product_id: "sword_of_fire".into(),
            error: PurchaseError::PaymentDeclined,
            record: None,
        };
        assert_eq!(
            failure.to_string(),
            "purchase of 'sword_of_fire' failed: Payment was declined"
        );
    }

    #[test]
    fn test_product_definition_deserializes_with_defaults() {
        let definition: ProductDefinition = serde_json::from_str(r#"{"id":"potion"}"#).unwrap();
        assert_eq!(definition.kind, ProductKind::Consumable);
        assert!(definition.store_specific_id.is_none());
    }
}
