//! End-to-end pipeline tests over the in-memory backend: portal creation,
//! bulk intake with dedup, and the interplay between the two paths.

use std::sync::Arc;

use rust_decimal_macros::dec;
use uuid::Uuid;

use chem_intake::model::{ApprovalStatus, EnquiryStatus, Flag, NewCustomer, NewProduct};
use chem_intake::pipeline::types::{InboundEmail, ItemStatus, RequestedProduct};
use chem_intake::pipeline::{BatchProcessor, EnquiryAssembler, PortalLineItem, PortalSubmission};
use chem_intake::store::{Database, LibSqlBackend};

struct Harness {
    db: Arc<dyn Database>,
    assembler: Arc<EnquiryAssembler>,
    batch: BatchProcessor,
    customer_id: Uuid,
}

async fn harness() -> Harness {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let customer = db
        .insert_customer(&NewCustomer {
            name: "Acme Corp".into(),
            company_name: Some("Acme Corporation".into()),
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
    let assembler = Arc::new(EnquiryAssembler::new(Arc::clone(&db)));
    let batch = BatchProcessor::new(Arc::clone(&db), Arc::clone(&assembler));
    Harness {
        db,
        assembler,
        batch,
        customer_id: customer.customer_id,
    }
}

fn requested(name: &str, cas: Option<&str>) -> RequestedProduct {
    RequestedProduct {
        product_name: name.into(),
        quantity: Some(dec!(25)),
        chemical_name: None,
        price: None,
        cas_number: cas.map(Into::into),
        cat_number: None,
        molecular_weight: None,
        variant: None,
        standards: None,
        flag: None,
        attachment_ref: None,
    }
}

fn inbound(customer_id: Uuid, content: &str, products: Vec<RequestedProduct>) -> InboundEmail {
    InboundEmail {
        customer_id,
        email_content: content.into(),
        products,
        attachments: Vec::new(),
    }
}

#[tokio::test]
async fn bulk_then_portal_share_catalog_and_sequence() {
    let h = harness().await;

    // Bulk email creates an enquiry and an auto-pending catalog entry.
    let outcome = h
        .batch
        .process(&[inbound(
            h.customer_id,
            "Requirement: 25kg acetone",
            vec![requested("Acetone", Some("67-64-1"))],
        )])
        .await;
    assert_eq!(outcome.results[0].status, ItemStatus::Accepted);

    let products = h.db.list_products(None, 10, 0).await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].approval_status, ApprovalStatus::Pending);
    assert!(products[0].cat_number.starts_with("CAT-"));

    // A portal enquiry naming the same CAS number reuses that product and
    // takes the next name in sequence.
    let submission = PortalSubmission {
        customer_id: h.customer_id,
        enquiry_date: "2025-09-25".into(),
        enquiry_time: "01:53".into(),
        status: None,
        enquiry_channel: Some("Portal".into()),
        is_enquiry_active: None,
        products: vec![PortalLineItem {
            quantity: dec!(50),
            chemical_name: Some("Propan-2-one".into()),
            price: None,
            cas_number: Some("67-64-1".into()),
            cat_number: None,
            molecular_weight: Some(dec!(58.08)),
            variant: None,
            standards: Some("UK".into()),
            flag: Some("known".into()),
            attachment_ref: None,
        }],
    };
    let portal_enquiry = h.assembler.assemble_portal(&submission).await.unwrap();
    assert_eq!(portal_enquiry.enquiry_name, "ENQ-002");
    assert_eq!(
        portal_enquiry.lines[0].product_id,
        products[0].product_id
    );

    // The portal's richer data merged into the catalog entry.
    let merged = h
        .db
        .get_product(products[0].product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged.chemical_name.as_deref(), Some("Propan-2-one"));
    assert_eq!(merged.molecular_weight, Some(dec!(58.08)));

    assert_eq!(h.db.list_enquiries(None, 10, 0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn bulk_dedup_is_content_based_not_customer_based() {
    let h = harness().await;
    let other = h
        .db
        .insert_customer(&NewCustomer {
            name: "Beta Labs".into(),
            company_name: None,
            email: Some("lab@beta.com".into()),
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

    // Same content and product list from a different customer: still a
    // duplicate — the fingerprint covers text + product names only.
    let outcome = h
        .batch
        .process(&[
            inbound(
                h.customer_id,
                "Need 25kg acetone",
                vec![requested("Acetone", None)],
            ),
            inbound(
                other.customer_id,
                "Need 25kg acetone",
                vec![requested("Acetone", None)],
            ),
        ])
        .await;

    assert_eq!(outcome.results[0].status, ItemStatus::Accepted);
    assert_eq!(outcome.results[1].status, ItemStatus::Rejected);
    assert!(
        outcome.results[1]
            .message
            .contains(&outcome.results[0].enquiry_id.to_string())
    );

    // Different product list with identical text is NOT a duplicate.
    let outcome2 = h
        .batch
        .process(&[inbound(
            h.customer_id,
            "Need 25kg acetone",
            vec![requested("Benzene", None)],
        )])
        .await;
    assert_eq!(outcome2.results[0].status, ItemStatus::Accepted);
}

#[tokio::test]
async fn mixed_batch_keeps_order_and_isolation() {
    let h = harness().await;

    let emails = vec![
        inbound(h.customer_id, "ask one", vec![requested("Acetone", None)]),
        inbound(Uuid::new_v4(), "ask two", vec![requested("Benzene", None)]),
        inbound(h.customer_id, "ask one", vec![requested("Acetone", None)]),
        inbound(h.customer_id, "ask four", vec![requested("Toluene", None)]),
    ];
    let outcome = h.batch.process(&emails).await;

    assert_eq!(outcome.results.len(), 4);
    let statuses: Vec<ItemStatus> = outcome.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Accepted,
            ItemStatus::Rejected, // unknown customer
            ItemStatus::Rejected, // duplicate of item one
            ItemStatus::Accepted,
        ]
    );

    // Only the accepted items left enquiries behind.
    assert_eq!(h.db.list_enquiries(None, 10, 0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn enquiry_lifecycle_after_intake() {
    let h = harness().await;

    let outcome = h
        .batch
        .process(&[inbound(
            h.customer_id,
            "lifecycle",
            vec![requested("Acetone", None)],
        )])
        .await;
    let enquiry_id = outcome.results[0].enquiry_id;

    // Filterable by status, then patched to processed.
    let open = h
        .db
        .list_enquiries(Some(EnquiryStatus::Open), 10, 0)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);

    let patched = h
        .db
        .update_enquiry(
            enquiry_id,
            &chem_intake::model::EnquiryPatch {
                status: Some(EnquiryStatus::Processed),
                is_active: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patched.status, EnquiryStatus::Processed);
    assert!(patched.is_active);

    assert!(
        h.db.list_enquiries(Some(EnquiryStatus::Open), 10, 0)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn preseeded_catalog_is_matched_not_duplicated() {
    let h = harness().await;
    let seeded = h
        .db
        .insert_product(&NewProduct {
            product_name: "Acetone".into(),
            cat_number: Some("CAT-A001".into()),
            cas_number: Some("67-64-1".into()),
            chemical_name: Some("Acetone".into()),
            molecular_formula: Some("C3H6O".into()),
            molecular_weight: Some(dec!(58.08)),
            description: None,
            approval_status: ApprovalStatus::Approved,
            inventory_status: Some("in_stock".into()),
            country_of_origin: None,
        })
        .await
        .unwrap();

    // The inbound claim only carries the chemical name; it still matches.
    let outcome = h
        .batch
        .process(&[inbound(
            h.customer_id,
            "More acetone please",
            vec![requested("Acetone", None)],
        )])
        .await;
    assert_eq!(outcome.results[0].status, ItemStatus::Accepted);

    let enquiry = h
        .db
        .get_enquiry(outcome.results[0].enquiry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enquiry.lines[0].product_id, seeded.product_id);
    assert_eq!(h.db.list_products(None, 10, 0).await.unwrap().len(), 1);

    // The match did not downgrade the approved catalog entry.
    let still = h.db.get_product(seeded.product_id).await.unwrap().unwrap();
    assert_eq!(still.approval_status, ApprovalStatus::Approved);
    assert_eq!(still.inventory_status, "in_stock");
}
