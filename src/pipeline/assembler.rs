//! Enquiry assembly — both entry points converge here.
//!
//! The portal path validates everything up front: date/time formats and every
//! enum field are rejected on the first bad value. The email path is lenient
//! by design: missing quantities default to zero and unrecognized enum strings
//! coerce to their defaults, because extraction output is best-effort.
//!
//! Either way the assembly itself is all-or-nothing: the customer is checked
//! before any resolution, and the store persists products, header, and line
//! items in a single transaction.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result, ValidationError};
use crate::model::{Enquiry, EnquiryChannel, EnquiryStatus, Flag, NewEnquiry, Standards};
use crate::pipeline::resolver::ProductResolver;
use crate::pipeline::types::{AssembledLine, LineCandidate, RequestedProduct};
use crate::store::Database;

/// Expected portal date format.
const PORTAL_DATE_FORMAT: &str = "%Y-%m-%d";
/// Expected portal time format.
const PORTAL_TIME_FORMAT: &str = "%H:%M";

// ── Portal submission ───────────────────────────────────────────────

/// A customer-entered enquiry from the portal. Strictly validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSubmission {
    pub customer_id: Uuid,
    /// `YYYY-MM-DD`.
    pub enquiry_date: String,
    /// `HH:MM`.
    pub enquiry_time: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub enquiry_channel: Option<String>,
    #[serde(default)]
    pub is_enquiry_active: Option<bool>,
    #[serde(default)]
    pub products: Vec<PortalLineItem>,
}

/// One portal-entered line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalLineItem {
    pub quantity: Decimal,
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
    #[serde(default)]
    pub standards: Option<String>,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

// ── Email assembly input ────────────────────────────────────────────

/// An email-derived enquiry, already attributed and coerced.
#[derive(Debug, Clone)]
pub struct EmailAssembly {
    /// Provisional id allocated by the caller (batch item or ingest).
    pub enquiry_id: Uuid,
    pub customer_id: Uuid,
    pub enquiry_datetime: DateTime<Utc>,
    pub items: Vec<LineCandidate>,
}

// ── Assembler ───────────────────────────────────────────────────────

/// Builds and persists enquiry aggregates.
pub struct EnquiryAssembler {
    db: Arc<dyn Database>,
    resolver: ProductResolver,
}

impl EnquiryAssembler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        let resolver = ProductResolver::new(Arc::clone(&db));
        Self { db, resolver }
    }

    /// Portal entry point: strict validation, then shared assembly.
    pub async fn assemble_portal(&self, submission: &PortalSubmission) -> Result<Enquiry> {
        let date = NaiveDate::parse_from_str(&submission.enquiry_date, PORTAL_DATE_FORMAT)
            .map_err(|_| ValidationError::InvalidDate(submission.enquiry_date.clone()))?;
        let time = NaiveTime::parse_from_str(&submission.enquiry_time, PORTAL_TIME_FORMAT)
            .map_err(|_| ValidationError::InvalidTime(submission.enquiry_time.clone()))?;
        let enquiry_datetime = NaiveDateTime::new(date, time).and_utc();

        let status = parse_strict(
            submission.status.as_deref(),
            "status",
            EnquiryStatus::parse,
        )?;
        let channel = parse_strict(
            submission.enquiry_channel.as_deref(),
            "enquiry_channel",
            EnquiryChannel::parse,
        )?;

        let items = submission
            .products
            .iter()
            .map(portal_item_to_candidate)
            .collect::<std::result::Result<Vec<_>, ValidationError>>()?;

        self.assemble(
            Uuid::new_v4(),
            submission.customer_id,
            enquiry_datetime,
            status,
            channel,
            submission.is_enquiry_active.unwrap_or(true),
            items,
        )
        .await
    }

    /// Email entry point: the caller has already coerced the items.
    pub async fn assemble_email(&self, assembly: EmailAssembly) -> Result<Enquiry> {
        self.assemble(
            assembly.enquiry_id,
            assembly.customer_id,
            assembly.enquiry_datetime,
            EnquiryStatus::Open,
            EnquiryChannel::Email,
            true,
            assembly.items,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn assemble(
        &self,
        enquiry_id: Uuid,
        customer_id: Uuid,
        enquiry_datetime: DateTime<Utc>,
        status: EnquiryStatus,
        channel: EnquiryChannel,
        is_active: bool,
        items: Vec<LineCandidate>,
    ) -> Result<Enquiry> {
        // Fail fast, before any resolution or write.
        if self.db.get_customer(customer_id).await?.is_none() {
            return Err(Error::NotFound {
                entity: "customer",
                id: customer_id.to_string(),
            });
        }

        // A resolution failure here aborts the whole enquiry; per-item
        // isolation is the batch processor's job, not the assembler's.
        let mut lines = Vec::with_capacity(items.len());
        for candidate in items {
            let product = self.resolver.resolve(&candidate).await?;
            lines.push(AssembledLine { product, candidate });
        }

        let header = NewEnquiry {
            enquiry_id,
            customer_id,
            enquiry_datetime,
            status,
            is_active,
            channel,
        };
        let enquiry = self.db.create_enquiry_with_items(&header, &lines).await?;

        info!(
            enquiry_id = %enquiry.enquiry_id,
            enquiry_name = %enquiry.enquiry_name,
            lines = enquiry.lines.len(),
            channel = channel.as_str(),
            "Enquiry created"
        );
        Ok(enquiry)
    }
}

/// Strict enum parsing for the portal path: absent is fine (default), an
/// unrecognized value is a validation error.
fn parse_strict<T: Default>(
    value: Option<&str>,
    field: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> std::result::Result<T, ValidationError> {
    match value {
        None => Ok(T::default()),
        Some(s) => parse(s).ok_or_else(|| ValidationError::InvalidField {
            field,
            value: s.to_string(),
        }),
    }
}

/// Portal line item → candidate, rejecting invalid enum strings.
fn portal_item_to_candidate(
    item: &PortalLineItem,
) -> std::result::Result<LineCandidate, ValidationError> {
    Ok(LineCandidate {
        chemical_name: item.chemical_name.clone(),
        cas_number: item.cas_number.clone(),
        cat_number: item.cat_number.clone(),
        quantity: item.quantity,
        price: item.price,
        molecular_weight: item.molecular_weight,
        variant: item.variant.clone(),
        standards: parse_strict(item.standards.as_deref(), "standards", Standards::parse)?,
        flag: parse_strict(item.flag.as_deref(), "flag", Flag::parse)?,
        attachment_ref: item.attachment_ref.clone(),
    })
}

/// Email line item → candidate, coercing instead of rejecting.
///
/// The chemical name falls back to the claimed product name so resolution has
/// a key to work with; quantity defaults to zero; unrecognized standards/flag
/// strings silently become the defaults.
pub fn coerce_email_item(product: &RequestedProduct) -> LineCandidate {
    let chemical_name = product
        .chemical_name
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| Some(product.product_name.clone()).filter(|s| !s.is_empty()));

    LineCandidate {
        chemical_name,
        cas_number: product.cas_number.clone(),
        cat_number: product.cat_number.clone(),
        quantity: product.quantity.unwrap_or_default(),
        price: product.price,
        molecular_weight: product.molecular_weight,
        variant: product.variant.clone(),
        standards: product
            .standards
            .as_deref()
            .and_then(Standards::parse)
            .unwrap_or_default(),
        flag: product
            .flag
            .as_deref()
            .and_then(Flag::parse)
            .unwrap_or_default(),
        attachment_ref: product.attachment_ref.clone(),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::{Flag, NewCustomer};
    use crate::store::LibSqlBackend;

    async fn setup() -> (Arc<dyn Database>, EnquiryAssembler, Uuid) {
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
                contact_owner: Some("portal".into()),
            })
            .await
            .unwrap();
        let assembler = EnquiryAssembler::new(Arc::clone(&db));
        (db, assembler, customer.customer_id)
    }

    fn submission(customer_id: Uuid, date: &str, time: &str) -> PortalSubmission {
        PortalSubmission {
            customer_id,
            enquiry_date: date.into(),
            enquiry_time: time.into(),
            status: None,
            enquiry_channel: Some("Portal".into()),
            is_enquiry_active: None,
            products: vec![PortalLineItem {
                quantity: dec!(100.00),
                chemical_name: Some("Propan-2-one".into()),
                price: Some(dec!(50.00)),
                cas_number: Some("67-64-1".into()),
                cat_number: None,
                molecular_weight: Some(dec!(58.08)),
                variant: Some("25kg Drum".into()),
                standards: Some("USA".into()),
                flag: Some("known".into()),
                attachment_ref: None,
            }],
        }
    }

    #[tokio::test]
    async fn portal_combines_date_and_time() {
        let (_db, assembler, customer_id) = setup().await;
        let enquiry = assembler
            .assemble_portal(&submission(customer_id, "2025-09-25", "01:53"))
            .await
            .unwrap();

        assert_eq!(
            enquiry.enquiry_datetime.to_rfc3339(),
            "2025-09-25T01:53:00+00:00"
        );
        assert_eq!(enquiry.status, EnquiryStatus::Open);
        assert_eq!(enquiry.channel, EnquiryChannel::Portal);
        assert!(enquiry.is_active);
        assert_eq!(enquiry.lines.len(), 1);
    }

    #[tokio::test]
    async fn portal_names_are_sequential() {
        let (_db, assembler, customer_id) = setup().await;
        let first = assembler
            .assemble_portal(&submission(customer_id, "2025-09-25", "01:53"))
            .await
            .unwrap();
        let second = assembler
            .assemble_portal(&submission(customer_id, "2025-09-25", "02:10"))
            .await
            .unwrap();

        assert_eq!(first.enquiry_name, "ENQ-001");
        assert_eq!(second.enquiry_name, "ENQ-002");
    }

    #[tokio::test]
    async fn portal_rejects_wrong_date_format() {
        let (db, assembler, customer_id) = setup().await;
        let err = assembler
            .assemble_portal(&submission(customer_id, "25-09-2025", "01:53"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidDate(_))
        ));
        assert!(err.to_string().contains("YYYY-MM-DD"));
        // Fail-fast: nothing was written.
        assert!(db.list_enquiries(None, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn portal_rejects_wrong_time_format() {
        let (_db, assembler, customer_id) = setup().await;
        let err = assembler
            .assemble_portal(&submission(customer_id, "2025-09-25", "1:53 AM"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::InvalidTime(_))
        ));
    }

    #[tokio::test]
    async fn portal_rejects_invalid_enums() {
        let (_db, assembler, customer_id) = setup().await;

        let mut bad_status = submission(customer_id, "2025-09-25", "01:53");
        bad_status.status = Some("in_flight".into());
        assert!(matches!(
            assembler.assemble_portal(&bad_status).await.unwrap_err(),
            Error::Validation(ValidationError::InvalidField { field: "status", .. })
        ));

        let mut bad_standards = submission(customer_id, "2025-09-25", "01:53");
        bad_standards.products[0].standards = Some("EU".into());
        assert!(matches!(
            assembler.assemble_portal(&bad_standards).await.unwrap_err(),
            Error::Validation(ValidationError::InvalidField {
                field: "standards",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unknown_customer_aborts_before_writes() {
        let (db, assembler, _customer_id) = setup().await;
        let err = assembler
            .assemble_portal(&submission(Uuid::new_v4(), "2025-09-25", "01:53"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { entity: "customer", .. }));
        assert!(db.list_enquiries(None, 10, 0).await.unwrap().is_empty());
        // No product was created for the line item either.
        assert!(
            db.find_product_by_identifiers(Some("Propan-2-one"), None, None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn portal_resolution_reuses_matching_product() {
        let (db, assembler, customer_id) = setup().await;
        let first = assembler
            .assemble_portal(&submission(customer_id, "2025-09-25", "01:53"))
            .await
            .unwrap();
        let second = assembler
            .assemble_portal(&submission(customer_id, "2025-09-26", "09:00"))
            .await
            .unwrap();

        // Same CAS number → same catalog product, not a duplicate entry.
        assert_eq!(first.lines[0].product_id, second.lines[0].product_id);
        let products = db.list_products(None, 10, 0).await.unwrap();
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn email_item_coercion_defaults() {
        let product = RequestedProduct {
            product_name: "Acetone".into(),
            quantity: None,
            chemical_name: None,
            price: None,
            cas_number: None,
            cat_number: None,
            molecular_weight: None,
            variant: None,
            standards: Some("European".into()),
            flag: Some("maybe".into()),
            attachment_ref: None,
        };
        let candidate = coerce_email_item(&product);

        assert_eq!(candidate.chemical_name.as_deref(), Some("Acetone"));
        assert_eq!(candidate.quantity, dec!(0));
        assert_eq!(candidate.standards, Standards::Usa);
        assert_eq!(candidate.flag, Flag::Known);
    }
}
