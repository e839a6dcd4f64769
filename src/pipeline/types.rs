//! Shared types for the enquiry ingestion pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Flag, NewProduct, ProductPatch, Standards};

// ── Inbound email payload ───────────────────────────────────────────

/// One email in a bulk intake request.
///
/// The caller has already attributed the email to a customer; the free-text
/// content and the claimed product list are what the fingerprint covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    pub customer_id: Uuid,
    pub email_content: String,
    pub products: Vec<RequestedProduct>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A product as claimed in an email, before resolution against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedProduct {
    pub product_name: String,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub chemical_name: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub cat_number: Option<String>,
    #[serde(default)]
    pub molecular_weight: Option<Decimal>,
    #[serde(default)]
    pub variant: Option<String>,
    /// Raw standards string; coerced to `USA` when missing or invalid.
    #[serde(default)]
    pub standards: Option<String>,
    /// Raw flag string; coerced to `known` when missing or invalid.
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

/// An attachment reference carried alongside an inbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
}

// ── Resolution input/output ─────────────────────────────────────────

/// Normalized line item handed to the product resolver.
///
/// Both entry points (strict portal, loose email) converge on this shape.
#[derive(Debug, Clone)]
pub struct LineCandidate {
    pub chemical_name: Option<String>,
    pub cas_number: Option<String>,
    pub cat_number: Option<String>,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub molecular_weight: Option<Decimal>,
    pub variant: Option<String>,
    pub standards: Standards,
    pub flag: Flag,
    pub attachment_ref: Option<String>,
}

/// The resolver's decision for one line item.
///
/// Applied inside the enquiry transaction so product writes commit or roll
/// back together with the enquiry header and its line items.
#[derive(Debug, Clone)]
pub enum ProductOp {
    /// Matched an existing product; merge the patch into it.
    Use {
        product_id: Uuid,
        patch: ProductPatch,
    },
    /// No match; create a new catalog entry.
    Create(NewProduct),
}

/// A line item with its resolved product op, ready to persist.
#[derive(Debug, Clone)]
pub struct AssembledLine {
    pub product: ProductOp,
    pub candidate: LineCandidate,
}

// ── Batch results ───────────────────────────────────────────────────

/// Accept/reject status for one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Accepted,
    Rejected,
}

/// Per-email outcome within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub enquiry_id: Uuid,
    pub status: ItemStatus,
    pub message: String,
}

/// Result of a bulk intake call: one entry per input email, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    pub results: Vec<BatchItemResult>,
}
