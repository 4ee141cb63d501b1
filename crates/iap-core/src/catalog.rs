//! # Product Catalog
//!
//! Read-only view of the products the platform reported, keyed by
//! application product id.
//!
//! The store replaces its catalog snapshot after initialization and merges
//! fetched products into a new snapshot; a snapshot itself never changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::Product;

/// Products indexed by application product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    products: HashMap<String, Product>,
}

impl ProductCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a product.
    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    /// Looks up a product that can be bought right now.
    ///
    /// `None` covers both "unknown id" and "known but not purchasable".
    pub fn purchasable(&self, product_id: &str) -> Option<&Product> {
        self.get(product_id)
            .filter(|product| product.available_to_purchase)
    }

    /// Returns a new catalog with `products` added or replaced.
    pub fn merged(&self, products: impl IntoIterator<Item = Product>) -> Self {
        let mut merged = self.clone();
        merged.extend(products);
        merged
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.products.contains_key(product_id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }
}

impl Extend<Product> for ProductCatalog {
    fn extend<I: IntoIterator<Item = Product>>(&mut self, products: I) {
        for product in products {
            self.products.insert(product.id().to_string(), product);
        }
    }
}

impl FromIterator<Product> for ProductCatalog {
    fn from_iter<I: IntoIterator<Item = Product>>(products: I) -> Self {
        let mut catalog = ProductCatalog::new();
        catalog.extend(products);
        catalog
    }
}
