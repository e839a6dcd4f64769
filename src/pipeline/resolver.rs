//! Product resolution — match a line item against the catalog or decide a new
//! entry must be created.
//!
//! Lookup tests case-insensitive equality across chemical name, CAS number,
//! and catalog number with OR semantics. A hit produces a merge patch (incoming
//! non-null fields overwrite, null fields keep the stored value); a miss
//! produces a create with pending approval and placeholder defaults.
//!
//! The resolver does not write. It returns a `ProductOp` that the store applies
//! inside the enquiry transaction, so product writes commit or roll back with
//! the enquiry itself. Resolution runs once per line item with no caching:
//! repeated unknown chemicals within one assembly can create duplicate catalog
//! entries, which is cosmetic rather than a correctness problem.

use std::sync::Arc;

use tracing::debug;

use crate::error::DatabaseError;
use crate::model::product::UNNAMED_PRODUCT;
use crate::model::{ApprovalStatus, NewProduct, ProductPatch};
use crate::pipeline::types::{LineCandidate, ProductOp};
use crate::store::Database;

/// Resolves line-item candidates to catalog products.
pub struct ProductResolver {
    db: Arc<dyn Database>,
}

impl ProductResolver {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Decide the product op for one candidate.
    pub async fn resolve(&self, candidate: &LineCandidate) -> Result<ProductOp, DatabaseError> {
        let existing = self
            .db
            .find_product_by_identifiers(
                candidate.chemical_name.as_deref(),
                candidate.cas_number.as_deref(),
                candidate.cat_number.as_deref(),
            )
            .await?;

        match existing {
            Some(product) => {
                debug!(
                    product_id = %product.product_id,
                    cat_number = %product.cat_number,
                    "Catalog hit"
                );
                Ok(ProductOp::Use {
                    product_id: product.product_id,
                    patch: ProductPatch {
                        chemical_name: candidate.chemical_name.clone(),
                        cas_number: candidate.cas_number.clone(),
                        cat_number: candidate.cat_number.clone(),
                        molecular_weight: candidate.molecular_weight,
                    },
                })
            }
            None => {
                let product_name = candidate
                    .chemical_name
                    .clone()
                    .unwrap_or_else(|| UNNAMED_PRODUCT.to_string());
                debug!(product_name = %product_name, "No catalog match, creating");
                Ok(ProductOp::Create(NewProduct {
                    product_name,
                    // None here means the store generates a placeholder.
                    cat_number: candidate.cat_number.clone(),
                    cas_number: candidate.cas_number.clone(),
                    chemical_name: candidate.chemical_name.clone(),
                    molecular_formula: None,
                    molecular_weight: candidate.molecular_weight,
                    description: None,
                    approval_status: ApprovalStatus::Pending,
                    inventory_status: None,
                    country_of_origin: None,
                }))
            }
        }
    }
}
