//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    ApprovalStatus, Customer, CustomerPatch, Enquiry, EnquiryPatch, EnquiryStatus, NewCustomer,
    NewEnquiry, NewProduct, ParsingRecord, Product, ProductPatch,
};
use crate::pipeline::types::AssembledLine;

/// Backend-agnostic persistence trait covering customers, the product catalog,
/// enquiries, fingerprints, and parsing records.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Customers ───────────────────────────────────────────────────

    /// Insert a new customer. Fails on a duplicate email.
    async fn insert_customer(&self, customer: &NewCustomer) -> Result<Customer, DatabaseError>;

    /// Get a customer by ID.
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, DatabaseError>;

    /// Look up a customer by email address.
    async fn find_customer_by_email(&self, email: &str)
    -> Result<Option<Customer>, DatabaseError>;

    /// List customers, most recently created first.
    async fn list_customers(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Customer>, DatabaseError>;

    /// Apply a partial update. Returns `None` when the customer doesn't exist.
    async fn update_customer(
        &self,
        id: Uuid,
        patch: &CustomerPatch,
    ) -> Result<Option<Customer>, DatabaseError>;

    // ── Products ────────────────────────────────────────────────────

    /// Insert a new product. Fails on duplicate cat/cas numbers.
    async fn insert_product(&self, product: &NewProduct) -> Result<Product, DatabaseError>;

    /// Get a product by ID.
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, DatabaseError>;

    /// Find a product by any of its identifying keys, case-insensitively.
    ///
    /// OR semantics: the first product whose chemical name, CAS number, or
    /// catalog number equals a supplied value is returned. All-`None` input
    /// returns `None` without querying.
    async fn find_product_by_identifiers(
        &self,
        chemical_name: Option<&str>,
        cas_number: Option<&str>,
        cat_number: Option<&str>,
    ) -> Result<Option<Product>, DatabaseError>;

    /// List products, optionally filtered by approval status.
    async fn list_products(
        &self,
        approval_status: Option<ApprovalStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Product>, DatabaseError>;

    /// Merge-update a product. Returns `None` when it doesn't exist.
    async fn update_product(
        &self,
        id: Uuid,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, DatabaseError>;

    // ── Enquiries ───────────────────────────────────────────────────

    /// Persist an enquiry header, its line items, and all pending product ops
    /// in one transaction. Allocates the next sequential `enquiry_name` inside
    /// the same transaction, retrying on a name collision.
    async fn create_enquiry_with_items(
        &self,
        enquiry: &NewEnquiry,
        lines: &[AssembledLine],
    ) -> Result<Enquiry, DatabaseError>;

    /// Get an enquiry with its line items.
    async fn get_enquiry(&self, id: Uuid) -> Result<Option<Enquiry>, DatabaseError>;

    /// List enquiries (with line items), optionally filtered by status.
    async fn list_enquiries(
        &self,
        status: Option<EnquiryStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Enquiry>, DatabaseError>;

    /// Apply a partial update. Returns `None` when the enquiry doesn't exist.
    async fn update_enquiry(
        &self,
        id: Uuid,
        patch: &EnquiryPatch,
    ) -> Result<Option<Enquiry>, DatabaseError>;

    // ── Fingerprints ────────────────────────────────────────────────

    /// Exact-match lookup of a content fingerprint. Returns the enquiry the
    /// fingerprint was first recorded against.
    async fn lookup_fingerprint(&self, hash: &str) -> Result<Option<Uuid>, DatabaseError>;

    /// Record a content fingerprint against an enquiry.
    async fn record_fingerprint(&self, hash: &str, enquiry_id: Uuid)
    -> Result<(), DatabaseError>;

    // ── Parsing records ─────────────────────────────────────────────

    /// Insert or replace the parsing record for an enquiry.
    async fn upsert_parsing_record(&self, record: &ParsingRecord) -> Result<(), DatabaseError>;

    /// Get the parsing record for an enquiry.
    async fn get_parsing_record(
        &self,
        enquiry_id: Uuid,
    ) -> Result<Option<ParsingRecord>, DatabaseError>;
}
