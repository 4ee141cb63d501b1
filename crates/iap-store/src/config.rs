//! # Store Configuration
//!
//! Product declarations and store behavior settings.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     IAP_STORE_NAME=GooglePlay                                          │
//! │     IAP_VALIDATE_RECEIPTS=false                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/iap-store/store.toml (Linux)                             │
//! │     ~/Library/Application Support/com.iap.store/store.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     no products, validation on, event capacity 64                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! name = "GooglePlay"
//! event_capacity = 64
//! validate_receipts = true
//!
//! [[products]]
//! id = "sword_of_fire"
//! kind = "non_consumable"
//!
//! [[products]]
//! id = "potion"
//! store_specific_id = "com.example.potion"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use iap_core::validation::validate_product_definitions;
use iap_core::ProductDefinition;

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Store Settings
// =============================================================================

/// Store behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Platform name, used in logs.
    #[serde(default = "default_store_name")]
    pub name: String,

    /// Buffer size of the `StoreEvent` broadcast channel. Subscribers that
    /// fall further behind skip the oldest events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// When false, every receipt is accepted as if no validator were set.
    #[serde(default = "default_true")]
    pub validate_receipts: bool,
}

fn default_store_name() -> String {
    "DefaultStore".to_string()
}

fn default_event_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            name: default_store_name(),
            event_capacity: default_event_capacity(),
            validate_receipts: true,
        }
    }
}

// =============================================================================
// Main Store Configuration
// =============================================================================

/// Complete store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub store: StoreSettings,

    /// Products declared to the platform at initialization.
    #[serde(default)]
    pub products: Vec<ProductDefinition>,
}

impl StoreConfig {
    /// Creates a config declaring `products` with default settings.
    pub fn with_products(products: Vec<ProductDefinition>) -> Self {
        StoreConfig {
            store: StoreSettings::default(),
            products,
        }
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (store.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> StoreResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading store config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads the config, falling back to defaults when the file is
    /// unreadable or invalid.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        match Self::load(config_path) {
            Ok(config) => config,
            Err(error) => {
                warn!(%error, "Store config unusable, falling back to defaults");
                Self::default()
            }
        }
    }

    /// Writes the config as TOML. A config that would not load back is
    /// rejected before anything touches the disk.
    pub fn save(&self, config_path: Option<PathBuf>) -> StoreResult<()> {
        self.validate()?;
        let Some(path) = config_path.or_else(Self::default_config_path) else {
            return Err(StoreError::ConfigSaveFailed(
                "no config directory on this platform".into(),
            ));
        };

        let contents = toml::to_string_pretty(self)?;
        write_config_file(&path, &contents)
            .map_err(|e| StoreError::ConfigSaveFailed(format!("{}: {e}", path.display())))?;

        info!(?path, products = self.products.len(), "Store config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        if self.store.event_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "event_capacity must be greater than 0".into(),
            ));
        }

        validate_product_definitions(&self.products)
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("IAP_STORE_NAME") {
            debug!(store = %name, "Overriding store name from environment");
            self.store.name = name;
        }

        if let Ok(capacity) = std::env::var("IAP_EVENT_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(capacity) => self.store.event_capacity = capacity,
                Err(_) => warn!(value = %capacity, "Ignoring invalid IAP_EVENT_CAPACITY"),
            }
        }

        if let Ok(validate) = std::env::var("IAP_VALIDATE_RECEIPTS") {
            match validate.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.store.validate_receipts = true,
                "0" | "false" | "no" | "off" => self.store.validate_receipts = false,
                _ => warn!(value = %validate, "Ignoring invalid IAP_VALIDATE_RECEIPTS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "iap", "store")
            .map(|dirs| dirs.config_dir().join("store.toml"))
    }

    /// Looks up a declared product.
    pub fn product(&self, product_id: &str) -> Option<&ProductDefinition> {
        self.products.iter().find(|definition| definition.id == product_id)
    }
}

fn write_config_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iap_core::ProductKind;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.products.is_empty());
        assert!(config.store.validate_receipts);
        assert_eq!(config.store.event_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_products_from_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
            [store]
            name = "GooglePlay"
            validate_receipts = false

            [[products]]
            id = "sword_of_fire"
            kind = "non_consumable"

            [[products]]
            id = "potion"
            store_specific_id = "com.example.potion"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.name, "GooglePlay");
        assert!(!config.store.validate_receipts);
        assert_eq!(config.store.event_capacity, 64);
        assert_eq!(config.products.len(), 2);
        assert_eq!(
            config.product("sword_of_fire").map(|p| p.kind),
            Some(ProductKind::NonConsumable)
        );
        assert_eq!(
            config.product("potion").map(|p| p.store_id()),
            Some("com.example.potion")
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = StoreConfig::with_products(vec![
            ProductDefinition::new("potion", ProductKind::Consumable),
            ProductDefinition::new("potion", ProductKind::Consumable),
        ]);
        assert!(config.validate().unwrap_err().is_config_error());

        config.products.pop();
        assert!(config.validate().is_ok());

        config.store.event_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("iap-store-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("store.toml");
        let config = StoreConfig::with_products(vec![ProductDefinition::new(
            "gem_pack",
            ProductKind::Consumable,
        )]);

        config.save(Some(path.clone())).unwrap();
        let loaded = StoreConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.products, config.products);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_invalid_config_is_not_saved() {
        let path = std::env::temp_dir().join(format!("iap-store-{}.toml", uuid::Uuid::new_v4()));
        let mut config = StoreConfig::default();
        config.store.event_capacity = 0;

        let err = config.save(Some(path.clone())).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
        assert!(!path.exists());
    }
}
