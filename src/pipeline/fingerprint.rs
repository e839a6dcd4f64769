//! Content fingerprinting for duplicate suppression.
//!
//! The fingerprint covers the email's free text and the ordered list of
//! claimed product names — nothing else. Two emails with the same body and
//! the same product-name sequence hash identically no matter who sent them,
//! what was attached, or what quantities were asked for. This is coarse
//! dedup, not an integrity check.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::InboundEmail;
use crate::store::Database;

/// Compute the fingerprint of an inbound email.
pub fn fingerprint(email: &InboundEmail) -> String {
    content_fingerprint(
        &email.email_content,
        email.products.iter().map(|p| p.product_name.as_str()),
    )
}

/// Fingerprint from raw parts: free text plus ordered product names.
pub fn content_fingerprint<'a>(
    content: &str,
    product_names: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    for name in product_names {
        hasher.update(name.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Duplicate detector backed by the fingerprint store.
pub struct Deduplicator {
    db: Arc<dyn Database>,
}

impl Deduplicator {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Exact-match lookup. Returns the enquiry the fingerprint was first
    /// recorded against, if any.
    pub async fn is_duplicate(&self, hash: &str) -> Result<Option<Uuid>, DatabaseError> {
        self.db.lookup_fingerprint(hash).await
    }

    /// Record a fingerprint after a successful assembly so later identical
    /// submissions are rejected.
    pub async fn record(&self, hash: &str, enquiry_id: Uuid) -> Result<(), DatabaseError> {
        self.db.record_fingerprint(hash, enquiry_id).await
    }
}
