//! Bulk batch processing — independent, isolated handling of each email.
//!
//! One result per input email, in input order. A failed or duplicate item is
//! reported and skipped; the rest of the batch still runs. Items are processed
//! strictly sequentially, so products committed by earlier items are visible
//! to later ones.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pipeline::assembler::{EmailAssembly, EnquiryAssembler, coerce_email_item};
use crate::pipeline::fingerprint::{Deduplicator, fingerprint};
use crate::pipeline::types::{BatchItemResult, BatchOutcome, InboundEmail, ItemStatus};
use crate::store::Database;

/// Message attached to accepted batch items.
const ACCEPTED_MESSAGE: &str = "Enquiry queued for parsing";

/// Processes batches of inbound emails through dedup and assembly.
pub struct BatchProcessor {
    assembler: Arc<EnquiryAssembler>,
    dedup: Deduplicator,
}

impl BatchProcessor {
    pub fn new(db: Arc<dyn Database>, assembler: Arc<EnquiryAssembler>) -> Self {
        Self {
            assembler,
            dedup: Deduplicator::new(db),
        }
    }

    /// Process every email in the batch. The call itself only fails on
    /// infrastructure problems outside the per-item loop; item failures are
    /// converted into `rejected` results.
    pub async fn process(&self, emails: &[InboundEmail]) -> BatchOutcome {
        let batch_id = generate_batch_id();
        info!(batch_id = %batch_id, count = emails.len(), "Processing enquiry batch");

        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            let enquiry_id = Uuid::new_v4();
            let result = match self.process_one(enquiry_id, email).await {
                Ok(()) => BatchItemResult {
                    enquiry_id,
                    status: ItemStatus::Accepted,
                    message: ACCEPTED_MESSAGE.to_string(),
                },
                Err(e) => {
                    warn!(enquiry_id = %enquiry_id, error = %e, "Batch item rejected");
                    BatchItemResult {
                        enquiry_id,
                        status: ItemStatus::Rejected,
                        message: e.to_string(),
                    }
                }
            };
            results.push(result);
        }

        let accepted = results
            .iter()
            .filter(|r| r.status == ItemStatus::Accepted)
            .count();
        info!(
            batch_id = %batch_id,
            accepted,
            rejected = results.len() - accepted,
            "Batch complete"
        );

        BatchOutcome { batch_id, results }
    }

    /// Dedup → assemble → record fingerprint, for one email.
    async fn process_one(&self, enquiry_id: Uuid, email: &InboundEmail) -> Result<()> {
        let hash = fingerprint(email);

        if let Some(original) = self.dedup.is_duplicate(&hash).await? {
            return Err(Error::Duplicate { original });
        }

        let items = email.products.iter().map(coerce_email_item).collect();
        self.assembler
            .assemble_email(EmailAssembly {
                enquiry_id,
                customer_id: email.customer_id,
                enquiry_datetime: Utc::now(),
                items,
            })
            .await?;

        self.dedup.record(&hash, enquiry_id).await?;
        Ok(())
    }
}

/// Fresh batch id: fixed prefix + 8 random hex chars.
fn generate_batch_id() -> String {
    format!("batch-{:08x}", rand::thread_rng().r#gen::<u32>())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::{Flag, NewCustomer};
    use crate::pipeline::types::RequestedProduct;
    use crate::store::LibSqlBackend;

    async fn setup() -> (Arc<dyn Database>, BatchProcessor, Uuid) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let customer = db
            .insert_customer(&NewCustomer {
                name: "Acme Corp".into(),
                company_name: None,
                email: Some("buyer@acme.com".into()),
                phone: None,
                mobile: None,
                landline: None,
                address: None,
                department: None,
                title: None,
                tag: None,
                flag: Flag::Known,
                contact_owner: None,
            })
            .await
            .unwrap();
        let assembler = Arc::new(EnquiryAssembler::new(Arc::clone(&db)));
        let batch = BatchProcessor::new(Arc::clone(&db), assembler);
        (db, batch, customer.customer_id)
    }

    fn email(customer_id: Uuid, content: &str, product: &str) -> InboundEmail {
        InboundEmail {
            customer_id,
            email_content: content.into(),
            products: vec![RequestedProduct {
                product_name: product.into(),
                quantity: Some(dec!(100)),
                chemical_name: None,
                price: None,
                cas_number: None,
                cat_number: None,
                molecular_weight: None,
                variant: None,
                standards: None,
                flag: None,
                attachment_ref: None,
            }],
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn batch_accepts_new_emails() {
        let (db, batch, customer_id) = setup().await;
        let outcome = batch
            .process(&[
                email(customer_id, "need acetone", "Acetone"),
                email(customer_id, "need benzene", "Benzene"),
            ])
            .await;

        assert!(outcome.batch_id.starts_with("batch-"));
        assert_eq!(outcome.results.len(), 2);
        assert!(
            outcome
                .results
                .iter()
                .all(|r| r.status == ItemStatus::Accepted)
        );
        assert_eq!(db.list_enquiries(None, 10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_within_batch_is_rejected_with_original_id() {
        let (db, batch, customer_id) = setup().await;
        let outcome = batch
            .process(&[
                email(customer_id, "need acetone", "Acetone"),
                email(customer_id, "need acetone", "Acetone"),
            ])
            .await;

        assert_eq!(outcome.results[0].status, ItemStatus::Accepted);
        assert_eq!(outcome.results[1].status, ItemStatus::Rejected);
        assert!(
            outcome.results[1]
                .message
                .contains(&outcome.results[0].enquiry_id.to_string())
        );
        // No second enquiry, and no second product either.
        assert_eq!(db.list_enquiries(None, 10, 0).await.unwrap().len(), 1);
        assert_eq!(db.list_products(None, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_across_batches_is_rejected() {
        let (_db, batch, customer_id) = setup().await;
        let first = batch
            .process(&[email(customer_id, "need acetone", "Acetone")])
            .await;
        let second = batch
            .process(&[email(customer_id, "need acetone", "Acetone")])
            .await;

        assert_eq!(second.results[0].status, ItemStatus::Rejected);
        assert!(
            second.results[0]
                .message
                .contains(&first.results[0].enquiry_id.to_string())
        );
    }

    #[tokio::test]
    async fn failing_item_does_not_abort_batch() {
        let (db, batch, customer_id) = setup().await;
        let outcome = batch
            .process(&[
                email(customer_id, "first", "Acetone"),
                // Unknown customer: assembly fails for this item only.
                email(Uuid::new_v4(), "second", "Benzene"),
                email(customer_id, "third", "Toluene"),
            ])
            .await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].status, ItemStatus::Accepted);
        assert_eq!(outcome.results[1].status, ItemStatus::Rejected);
        assert!(outcome.results[1].message.contains("not found"));
        assert_eq!(outcome.results[2].status, ItemStatus::Accepted);
        assert_eq!(db.list_enquiries(None, 10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn later_items_see_products_from_earlier_items() {
        let (db, batch, customer_id) = setup().await;
        batch
            .process(&[
                email(customer_id, "first ask", "Acetone"),
                email(customer_id, "second ask", "Acetone"),
            ])
            .await;

        // The second email's line resolved against the product the first one
        // created — sequential visibility, no duplicate catalog entry.
        assert_eq!(db.list_products(None, 10, 0).await.unwrap().len(), 1);
    }
}
