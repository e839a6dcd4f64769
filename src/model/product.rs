//! Product catalog model.

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog approval state. Auto-created products start as `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Inventory status assigned to products created implicitly during assembly.
pub const DEFAULT_INVENTORY_STATUS: &str = "custom_synthesis";

/// Country of origin assigned when the incoming data doesn't carry one.
pub const DEFAULT_COUNTRY_OF_ORIGIN: &str = "india";

/// Placeholder name for products created from a line item with no chemical name.
pub const UNNAMED_PRODUCT: &str = "Unnamed Product";

/// A catalog product.
///
/// `cat_number` is always unique and non-null; `cas_number` is unique when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: Uuid,
    pub product_name: String,
    pub cat_number: String,
    pub cas_number: Option<String>,
    pub chemical_name: Option<String>,
    pub molecular_formula: Option<String>,
    pub molecular_weight: Option<Decimal>,
    pub description: Option<String>,
    pub approval_status: ApprovalStatus,
    pub inventory_status: String,
    pub country_of_origin: String,
}

/// Fields for creating a product, either via the API or implicitly by the
/// resolver when no catalog match is found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_name: String,
    /// Generated (`CAT-` + 6 hex chars) when absent.
    #[serde(default)]
    pub cat_number: Option<String>,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub chemical_name: Option<String>,
    #[serde(default)]
    pub molecular_formula: Option<String>,
    #[serde(default)]
    pub molecular_weight: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub inventory_status: Option<String>,
    #[serde(default)]
    pub country_of_origin: Option<String>,
}

/// Merge update produced by the resolver on a catalog hit.
///
/// Only non-null fields overwrite; everything else keeps its stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub chemical_name: Option<String>,
    pub cas_number: Option<String>,
    pub cat_number: Option<String>,
    pub molecular_weight: Option<Decimal>,
}

impl ProductPatch {
    /// True when the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.chemical_name.is_none()
            && self.cas_number.is_none()
            && self.cat_number.is_none()
            && self.molecular_weight.is_none()
    }
}

/// Generate a placeholder catalog number: fixed prefix + 6 random hex chars.
///
/// Not checked for collisions before insert; the unique constraint catches the
/// (vanishingly rare) clash.
pub fn generate_cat_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("CAT-{suffix:06x}")
}
