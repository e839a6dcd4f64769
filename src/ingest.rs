//! Email-triggered ingestion — the entry point the external inbox trigger
//! calls with one fetched email.
//!
//! Flow: mark parsing `processing` → LLM extraction → get-or-create customer
//! by extracted email → fingerprint dedup → email-path assembly → record
//! fingerprint → mark parsing `completed` → acknowledgment. The acknowledgment
//! is best-effort; everything before it is the pipeline proper.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use mail_parser::MessageParser;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result, ValidationError};
use crate::llm::extract::{EnquiryExtractor, ExtractedCustomer, ExtractedPayload, ExtractedProduct};
use crate::llm::LlmProvider;
use crate::model::{
    Customer, Enquiry, Flag, NewCustomer, ParsingRecord, ParsingState, Standards,
};
use crate::notify::AckMailer;
use crate::pipeline::assembler::{EmailAssembly, EnquiryAssembler};
use crate::pipeline::fingerprint::{Deduplicator, content_fingerprint};
use crate::pipeline::types::LineCandidate;
use crate::store::Database;

/// `contact_owner` recorded on customers created from inbound email.
const EMAIL_CONTACT_OWNER: &str = "email";

/// One email as delivered by the inbox trigger.
#[derive(Debug, Clone)]
pub struct IncomingEmail {
    /// Plain-text body.
    pub body: String,
    /// Envelope sender address.
    pub sender: String,
    /// CC addresses to copy on the acknowledgment.
    pub cc: Vec<String>,
    /// Reference timestamp (when the email was received).
    pub received_at: DateTime<Utc>,
}

impl IncomingEmail {
    /// Parse a raw RFC 822 message into an `IncomingEmail`.
    ///
    /// Returns `None` when the message can't be parsed at all.
    pub fn from_rfc822(raw: &[u8], received_at: DateTime<Utc>) -> Option<Self> {
        let parsed = MessageParser::default().parse(raw)?;

        let sender = parsed
            .from()
            .and_then(|addr| addr.first())
            .and_then(|a| a.address())
            .map(|s| s.to_string())?;

        let cc = parsed
            .cc()
            .map(|addr| {
                addr.iter()
                    .filter_map(|a| a.address())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let subject = parsed.subject().unwrap_or("(no subject)");
        let body = parsed
            .body_text(0)
            .map(|text| format!("Subject: {subject}\n\n{text}"))
            .unwrap_or_else(|| format!("Subject: {subject}\n\n(no readable content)"));

        Some(Self {
            body,
            sender,
            cc,
            received_at,
        })
    }
}

/// Orchestrates extraction, attribution, dedup, and assembly for one email.
pub struct EmailIngestor {
    db: Arc<dyn Database>,
    assembler: Arc<EnquiryAssembler>,
    extractor: EnquiryExtractor,
    dedup: Deduplicator,
    mailer: Option<AckMailer>,
}

impl EmailIngestor {
    pub fn new(
        db: Arc<dyn Database>,
        assembler: Arc<EnquiryAssembler>,
        provider: Arc<dyn LlmProvider>,
        mailer: Option<AckMailer>,
    ) -> Self {
        Self {
            extractor: EnquiryExtractor::new(provider),
            dedup: Deduplicator::new(Arc::clone(&db)),
            db,
            assembler,
            mailer,
        }
    }

    /// Ingest one email end to end.
    pub async fn ingest(&self, email: &IncomingEmail) -> Result<Enquiry> {
        let enquiry_id = Uuid::new_v4();
        info!(enquiry_id = %enquiry_id, sender = %email.sender, "Ingesting email");

        self.set_parsing_state(enquiry_id, ParsingState::Processing, None, None)
            .await;

        match self.run(enquiry_id, email).await {
            Ok((enquiry, customer, payload)) => {
                self.set_parsing_state(
                    enquiry.enquiry_id,
                    ParsingState::Completed,
                    serde_json::to_value(&payload).ok(),
                    None,
                )
                .await;

                // Best-effort acknowledgment: log and move on.
                if let Some(mailer) = &self.mailer {
                    if let Err(e) =
                        mailer.send_acknowledgment(&enquiry, &customer, &email.sender, &email.cc)
                    {
                        warn!(
                            enquiry_id = %enquiry.enquiry_id,
                            error = %e,
                            "Acknowledgment failed (enquiry kept)"
                        );
                    }
                }
                Ok(enquiry)
            }
            Err(e) => {
                self.set_parsing_state(
                    enquiry_id,
                    ParsingState::Failed,
                    None,
                    Some(e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// The pipeline proper: everything that must succeed for an enquiry.
    async fn run(
        &self,
        enquiry_id: Uuid,
        email: &IncomingEmail,
    ) -> Result<(Enquiry, Customer, ExtractedPayload)> {
        let payload = self
            .extractor
            .extract(&email.body, email.received_at)
            .await?;

        let customer = self
            .get_or_create_customer(&payload.customer_details)
            .await?;

        let product_names: Vec<&str> = payload
            .enquiry_details
            .products
            .iter()
            .filter_map(|p| p.chemical_name.as_deref())
            .collect();
        let hash = content_fingerprint(&email.body, product_names);
        if let Some(original) = self.dedup.is_duplicate(&hash).await? {
            return Err(Error::Duplicate { original });
        }

        let enquiry_datetime = combine_loose(
            payload.enquiry_details.enquiry_date.as_deref(),
            payload.enquiry_details.enquiry_time.as_deref(),
            email.received_at,
        );
        let items = payload
            .enquiry_details
            .products
            .iter()
            .map(extracted_to_candidate)
            .collect();

        let enquiry = self
            .assembler
            .assemble_email(EmailAssembly {
                enquiry_id,
                customer_id: customer.customer_id,
                enquiry_datetime,
                items,
            })
            .await?;

        self.dedup.record(&hash, enquiry.enquiry_id).await?;
        Ok((enquiry, customer, payload))
    }

    /// Find the customer by extracted email, creating one on first sight.
    async fn get_or_create_customer(&self, details: &ExtractedCustomer) -> Result<Customer> {
        let email = details
            .email
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("customer_details.email"))?;

        if let Some(existing) = self.db.find_customer_by_email(email).await? {
            return Ok(existing);
        }

        let customer = self
            .db
            .insert_customer(&NewCustomer {
                name: details
                    .customer_name
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
                company_name: details.company_name.clone(),
                email: Some(email.to_string()),
                phone: details.phone.clone(),
                mobile: None,
                landline: None,
                address: details.address.clone(),
                department: None,
                title: None,
                tag: None,
                flag: Flag::Known,
                contact_owner: Some(EMAIL_CONTACT_OWNER.to_string()),
            })
            .await?;

        info!(
            customer_id = %customer.customer_id,
            email = %email,
            "Created customer from email"
        );
        Ok(customer)
    }

    /// Record a parsing-state transition. Failures are logged, never raised —
    /// the parsing record is observability, not pipeline state.
    async fn set_parsing_state(
        &self,
        enquiry_id: Uuid,
        status: ParsingState,
        parsed_payload: Option<serde_json::Value>,
        error_details: Option<String>,
    ) {
        let record = ParsingRecord {
            enquiry_id,
            status,
            message: None,
            parsed_payload,
            error_details,
            updated_at: Utc::now(),
        };
        if let Err(e) = self.db.upsert_parsing_record(&record).await {
            warn!(enquiry_id = %enquiry_id, error = %e, "Failed to record parsing state");
        }
    }
}

/// Combine extracted date/time leniently, falling back to the reference
/// timestamp when either part is missing or unparseable.
fn combine_loose(
    date: Option<&str>,
    time: Option<&str>,
    reference: DateTime<Utc>,
) -> DateTime<Utc> {
    let parsed_date = date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let parsed_time = time.and_then(|t| {
        NaiveTime::parse_from_str(t, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
            .ok()
    });

    match (parsed_date, parsed_time) {
        (Some(d), Some(t)) => NaiveDateTime::new(d, t).and_utc(),
        _ => reference,
    }
}

/// Extracted product → line candidate, with email-path coercions.
fn extracted_to_candidate(product: &ExtractedProduct) -> LineCandidate {
    LineCandidate {
        chemical_name: product.chemical_name.clone().filter(|s| !s.is_empty()),
        cas_number: product.cas_number.clone(),
        cat_number: product.cat_number.clone(),
        quantity: product.quantity.unwrap_or_default(),
        price: None,
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
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::LlmError;
    use crate::store::LibSqlBackend;

    /// Canned provider: returns a fixed reply (or an error).
    struct CannedProvider {
        reply: std::result::Result<String, String>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, LlmError> {
            self.reply.clone().map_err(|reason| LlmError::RequestFailed {
                provider: "canned".to_string(),
                reason,
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    const EXTRACTION_REPLY: &str = r#"{
        "customer_details": {
            "customer_name": "Jane Doe",
            "email": "jane@acme.com",
            "phone": "+1-555-123",
            "company_name": "Acme Corp",
            "address": null
        },
        "enquiry_details": {
            "enquiry_date": "2025-09-25",
            "enquiry_time": "01:53",
            "products": [
                {
                    "quantity": 100.0,
                    "chemical_name": "Propan-2-one",
                    "cas_number": "67-64-1",
                    "standards": "bogus",
                    "flag": "known"
                }
            ]
        }
    }"#;

    fn ingestor(db: Arc<dyn Database>, reply: std::result::Result<String, String>) -> EmailIngestor {
        let assembler = Arc::new(EnquiryAssembler::new(Arc::clone(&db)));
        EmailIngestor::new(db, assembler, Arc::new(CannedProvider { reply }), None)
    }

    fn email(body: &str) -> IncomingEmail {
        IncomingEmail {
            body: body.into(),
            sender: "jane@acme.com".into(),
            cc: vec![],
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ingest_creates_customer_enquiry_and_parsing_record() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let ingestor = ingestor(Arc::clone(&db), Ok(EXTRACTION_REPLY.to_string()));

        let enquiry = ingestor.ingest(&email("Need 100kg acetone")).await.unwrap();

        assert_eq!(enquiry.enquiry_name, "ENQ-001");
        assert_eq!(
            enquiry.enquiry_datetime.to_rfc3339(),
            "2025-09-25T01:53:00+00:00"
        );
        assert_eq!(enquiry.lines.len(), 1);
        assert_eq!(enquiry.lines[0].quantity, dec!(100.0));
        // Invalid standards coerced, not rejected.
        assert_eq!(enquiry.lines[0].standards, Standards::Usa);

        let customer = db
            .find_customer_by_email("jane@acme.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.contact_owner.as_deref(), Some(EMAIL_CONTACT_OWNER));

        let record = db
            .get_parsing_record(enquiry.enquiry_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ParsingState::Completed);
        assert!(record.parsed_payload.is_some());
    }

    #[tokio::test]
    async fn repeated_email_is_rejected_as_duplicate() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let ingestor = ingestor(Arc::clone(&db), Ok(EXTRACTION_REPLY.to_string()));

        let first = ingestor.ingest(&email("Need 100kg acetone")).await.unwrap();
        let err = ingestor
            .ingest(&email("Need 100kg acetone"))
            .await
            .unwrap_err();

        match err {
            Error::Duplicate { original } => assert_eq!(original, first.enquiry_id),
            other => panic!("expected duplicate, got {other}"),
        }
        // No second enquiry, and the customer was not duplicated either.
        assert_eq!(db.list_enquiries(None, 10, 0).await.unwrap().len(), 1);
        assert_eq!(db.list_customers(10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn extraction_failure_marks_parsing_failed() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let ingestor = ingestor(Arc::clone(&db), Err("model unavailable".to_string()));

        let err = ingestor.ingest(&email("whatever")).await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        assert!(db.list_enquiries(None, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_customer_email_fails_ingestion() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let reply = r#"{"customer_details": {"customer_name": "Jane"},
                        "enquiry_details": {"products": []}}"#;
        let ingestor = ingestor(Arc::clone(&db), Ok(reply.to_string()));

        let err = ingestor.ingest(&email("no address here")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::MissingField(_))
        ));
    }

    #[test]
    fn rfc822_parsing_extracts_sender_cc_and_body() {
        let raw = b"From: Jane Doe <jane@acme.com>\r\n\
                    To: sales@example.com\r\n\
                    Cc: procurement@acme.com\r\n\
                    Subject: Requirement\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    Need 100kg acetone.\r\n";
        let email = IncomingEmail::from_rfc822(raw, Utc::now()).unwrap();

        assert_eq!(email.sender, "jane@acme.com");
        assert_eq!(email.cc, vec!["procurement@acme.com".to_string()]);
        assert!(email.body.contains("Subject: Requirement"));
        assert!(email.body.contains("Need 100kg acetone."));
    }

    #[test]
    fn combine_loose_falls_back_to_reference() {
        let reference = Utc::now();
        assert_eq!(combine_loose(None, None, reference), reference);
        assert_eq!(
            combine_loose(Some("25-09-2025"), Some("01:53"), reference),
            reference
        );

        let combined = combine_loose(Some("2025-09-25"), Some("01:53"), reference);
        assert_eq!(combined.to_rfc3339(), "2025-09-25T01:53:00+00:00");
    }
}
