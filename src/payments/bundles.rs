//! Static credit bundle catalog.
//!
//! A bundle is a fixed (price, units) pair purchasable by an organization.
//! During reconciliation the catalog is the authority for how many units a
//! payment grants; the paid amount is never trusted above it.

use serde::{Deserialize, Serialize};

/// A purchasable credit bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBundle {
    /// Catalog identifier, referenced from payment metadata.
    pub id: String,
    /// Price in minor currency units.
    pub price_minor: u64,
    /// Units granted on purchase.
    pub units: u64,
}

/// Fixed price list mapping purchase prices to unit grants.
///
/// # Example
///
/// ```rust
/// use textledger::payments::BundleCatalog;
///
/// let catalog = BundleCatalog::builder()
///     .bundle("starter", 1_000, 50)
///     .bundle("business", 5_000, 300)
///     .build();
///
/// assert_eq!(catalog.get("starter").unwrap().units, 50);
/// assert!(catalog.get("nope").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct BundleCatalog {
    bundles: Vec<CreditBundle>,
}

impl BundleCatalog {
    /// Start building a catalog.
    #[must_use]
    pub fn builder() -> BundleCatalogBuilder {
        BundleCatalogBuilder::default()
    }

    /// Look up a bundle by id.
    #[must_use]
    pub fn get(&self, bundle_id: &str) -> Option<&CreditBundle> {
        self.bundles.iter().find(|b| b.id == bundle_id)
    }

    /// All bundles, in catalog order.
    #[must_use]
    pub fn all(&self) -> &[CreditBundle] {
        &self.bundles
    }
}

/// Builder for [`BundleCatalog`].
#[derive(Debug, Default)]
pub struct BundleCatalogBuilder {
    bundles: Vec<CreditBundle>,
}

impl BundleCatalogBuilder {
    /// Add a bundle to the catalog.
    #[must_use]
    pub fn bundle(mut self, id: impl Into<String>, price_minor: u64, units: u64) -> Self {
        self.bundles.push(CreditBundle {
            id: id.into(),
            price_minor,
            units,
        });
        self
    }

    /// Finish the catalog.
    #[must_use]
    pub fn build(self) -> BundleCatalog {
        BundleCatalog {
            bundles: self.bundles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let catalog = BundleCatalog::builder()
            .bundle("starter", 1_000, 50)
            .bundle("business", 5_000, 300)
            .build();

        let starter = catalog.get("starter").unwrap();
        assert_eq!(starter.price_minor, 1_000);
        assert_eq!(starter.units, 50);

        assert!(catalog.get("enterprise").is_none());
        assert_eq!(catalog.all().len(), 2);
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = BundleCatalog::default();
        assert!(catalog.get("anything").is_none());
    }
}
