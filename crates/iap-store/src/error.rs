//! # Store Error Types
//!
//! Errors returned synchronously by the store: rejected calls and
//! configuration problems. Asynchronous failures travel through operations
//! instead (`PurchaseError`, `StoreFetchError` in iap-core).
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Store Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Caller Input   │  │     State       │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │ InvalidProductId│  │  Busy           │  │  InvalidConfig          │ │
//! │  │                 │  │  Disposed       │  │  ConfigLoadFailed       │ │
//! │  │                 │  │                 │  │  ConfigSaveFailed       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use iap_core::ValidationError;
use thiserror::Error;

/// Result type alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error type.
///
/// No operation is created when one of these is returned.
#[derive(Debug, Error)]
pub enum StoreError {
    // =========================================================================
    // Caller Input Errors
    // =========================================================================
    /// The product id failed validation.
    #[error("Invalid product id: {0}")]
    InvalidProductId(#[from] ValidationError),

    // =========================================================================
    // State Errors
    // =========================================================================
    /// A purchase of a different product is already pending.
    #[error("Store is busy purchasing '{pending_product}'")]
    Busy { pending_product: String },

    /// The store was disposed.
    #[error("Store has been disposed")]
    Disposed,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid store configuration.
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(err: toml::ser::Error) -> Self {
        StoreError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl StoreError {
    /// Returns true if the same call may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy { .. })
    }

    /// Returns true if the caller passed bad input.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, StoreError::InvalidProductId(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidConfig(_)
                | StoreError::ConfigLoadFailed(_)
                | StoreError::ConfigSaveFailed(_)
        )
    }
}
