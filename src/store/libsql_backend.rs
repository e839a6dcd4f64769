//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Enquiry creation runs as a
//! single transaction covering product ops, the enquiry header, and all line
//! items; the sequential `enquiry_name` is allocated inside that transaction
//! against a UNIQUE constraint, with a bounded retry on collision.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    ApprovalStatus, Customer, CustomerPatch, Enquiry, EnquiryChannel, EnquiryLine, EnquiryPatch,
    EnquiryStatus, Flag, NewCustomer, NewEnquiry, NewProduct, ParsingRecord, ParsingState,
    Product, ProductPatch, Standards, generate_cat_number,
};
use crate::pipeline::types::{AssembledLine, ProductOp};
use crate::store::migrations;
use crate::store::traits::Database;

/// Max attempts when enquiry-name allocation collides under concurrent creation.
const NAME_ALLOC_RETRIES: u32 = 3;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Map a libsql error, classifying constraint violations.
fn db_err(e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") || msg.contains("constraint") {
        DatabaseError::Constraint(msg)
    } else {
        DatabaseError::Query(msg)
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_decimal(s: &str) -> Decimal {
    s.parse().unwrap_or_default()
}

/// Nullable text parameter.
fn opt_text(v: Option<&str>) -> Value {
    match v {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

/// Nullable decimal parameter (stored as text).
fn opt_decimal(v: Option<&Decimal>) -> Value {
    match v {
        Some(d) => Value::Text(d.to_string()),
        None => Value::Null,
    }
}

// ── Row mappers ─────────────────────────────────────────────────────

const CUSTOMER_COLUMNS: &str = "customer_id, name, company_name, email, phone, mobile, \
                                landline, address, department, title, tag, flag, contact_owner";

fn row_to_customer(row: &libsql::Row) -> Result<Customer, libsql::Error> {
    let id: String = row.get(0)?;
    let flag: String = row.get(11)?;
    Ok(Customer {
        customer_id: parse_uuid(&id),
        name: row.get(1)?,
        company_name: row.get::<String>(2).ok(),
        email: row.get::<String>(3).ok(),
        phone: row.get::<String>(4).ok(),
        mobile: row.get::<String>(5).ok(),
        landline: row.get::<String>(6).ok(),
        address: row.get::<String>(7).ok(),
        department: row.get::<String>(8).ok(),
        title: row.get::<String>(9).ok(),
        tag: row.get::<String>(10).ok(),
        flag: Flag::parse(&flag).unwrap_or_default(),
        contact_owner: row.get::<String>(12).ok(),
    })
}

const PRODUCT_COLUMNS: &str = "product_id, product_name, cat_number, cas_number, chemical_name, \
                               molecular_formula, molecular_weight, description, approval_status, \
                               inventory_status, country_of_origin";

fn row_to_product(row: &libsql::Row) -> Result<Product, libsql::Error> {
    let id: String = row.get(0)?;
    let approval: String = row.get(8)?;
    Ok(Product {
        product_id: parse_uuid(&id),
        product_name: row.get(1)?,
        cat_number: row.get(2)?,
        cas_number: row.get::<String>(3).ok(),
        chemical_name: row.get::<String>(4).ok(),
        molecular_formula: row.get::<String>(5).ok(),
        molecular_weight: row.get::<String>(6).ok().map(|s| parse_decimal(&s)),
        description: row.get::<String>(7).ok(),
        approval_status: ApprovalStatus::parse(&approval).unwrap_or_default(),
        inventory_status: row.get(9)?,
        country_of_origin: row.get(10)?,
    })
}

const ENQUIRY_COLUMNS: &str =
    "enquiry_id, enquiry_name, customer_id, enquiry_datetime, status, is_active, channel";

fn row_to_enquiry_header(row: &libsql::Row) -> Result<Enquiry, libsql::Error> {
    let id: String = row.get(0)?;
    let customer_id: String = row.get(2)?;
    let datetime: String = row.get(3)?;
    let status: String = row.get(4)?;
    let is_active: i64 = row.get(5)?;
    let channel: String = row.get(6)?;
    Ok(Enquiry {
        enquiry_id: parse_uuid(&id),
        enquiry_name: row.get(1)?,
        customer_id: parse_uuid(&customer_id),
        enquiry_datetime: parse_datetime(&datetime),
        status: EnquiryStatus::parse(&status).unwrap_or_default(),
        is_active: is_active != 0,
        channel: EnquiryChannel::parse(&channel).unwrap_or_default(),
        lines: Vec::new(),
    })
}

const LINE_COLUMNS: &str = "line_id, enquiry_id, product_id, quantity, chemical_name, price, \
                            cas_number, cat_number, molecular_weight, variant, standards, flag, \
                            attachment_ref";

fn row_to_line(row: &libsql::Row) -> Result<EnquiryLine, libsql::Error> {
    let enquiry_id: String = row.get(1)?;
    let product_id: String = row.get(2)?;
    let quantity: String = row.get(3)?;
    let standards: String = row.get(10)?;
    let flag: String = row.get(11)?;
    Ok(EnquiryLine {
        line_id: row.get(0)?,
        enquiry_id: parse_uuid(&enquiry_id),
        product_id: parse_uuid(&product_id),
        quantity: parse_decimal(&quantity),
        chemical_name: row.get::<String>(4).ok(),
        price: row.get::<String>(5).ok().map(|s| parse_decimal(&s)),
        cas_number: row.get::<String>(6).ok(),
        cat_number: row.get::<String>(7).ok(),
        molecular_weight: row.get::<String>(8).ok().map(|s| parse_decimal(&s)),
        variant: row.get::<String>(9).ok(),
        standards: Standards::parse(&standards).unwrap_or_default(),
        flag: Flag::parse(&flag).unwrap_or_default(),
        attachment_ref: row.get::<String>(12).ok(),
    })
}

// ── Backend impl ────────────────────────────────────────────────────

impl LibSqlBackend {
    async fn load_lines(&self, enquiry_id: Uuid) -> Result<Vec<EnquiryLine>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {LINE_COLUMNS} FROM enquiry_products \
                     WHERE enquiry_id = ?1 ORDER BY line_id"
                ),
                libsql::params![enquiry_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut lines = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            lines.push(row_to_line(&row).map_err(db_err)?);
        }
        Ok(lines)
    }

    /// One attempt at the enquiry transaction. A name collision surfaces as a
    /// `Constraint` error mentioning `enquiry_name`.
    async fn try_create_enquiry(
        &self,
        enquiry: &NewEnquiry,
        lines: &[AssembledLine],
    ) -> Result<(), DatabaseError> {
        let tx = self.conn.transaction().await.map_err(db_err)?;

        // Next sequence number from the highest existing name, inside the
        // transaction so the UNIQUE constraint arbitrates races.
        let mut rows = tx
            .query(
                "SELECT COALESCE(MAX(CAST(SUBSTR(enquiry_name, 5) AS INTEGER)), 0) \
                 FROM enquiries",
                (),
            )
            .await
            .map_err(db_err)?;
        let seq: i64 = match rows.next().await.map_err(db_err)? {
            Some(row) => row.get(0).map_err(db_err)?,
            None => 0,
        };
        let enquiry_name = format!("ENQ-{:03}", seq + 1);

        // Apply product ops and collect the resolved product ids.
        let mut product_ids = Vec::with_capacity(lines.len());
        for line in lines {
            let product_id = match &line.product {
                ProductOp::Use { product_id, patch } => {
                    if !patch.is_empty() {
                        apply_product_patch(&tx, *product_id, patch).await?;
                    }
                    *product_id
                }
                ProductOp::Create(new) => insert_product_tx(&tx, new).await?,
            };
            product_ids.push(product_id);
        }

        tx.execute(
            "INSERT INTO enquiries \
             (enquiry_id, enquiry_name, customer_id, enquiry_datetime, status, is_active, channel) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            libsql::params![
                enquiry.enquiry_id.to_string(),
                enquiry_name,
                enquiry.customer_id.to_string(),
                enquiry.enquiry_datetime.to_rfc3339(),
                enquiry.status.as_str(),
                i64::from(enquiry.is_active),
                enquiry.channel.as_str(),
            ],
        )
        .await
        .map_err(db_err)?;

        for (line, product_id) in lines.iter().zip(product_ids) {
            let c = &line.candidate;
            tx.execute(
                "INSERT INTO enquiry_products \
                 (enquiry_id, product_id, quantity, chemical_name, price, cas_number, cat_number, \
                  molecular_weight, variant, standards, flag, attachment_ref) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                libsql::params![
                    enquiry.enquiry_id.to_string(),
                    product_id.to_string(),
                    c.quantity.to_string(),
                    opt_text(c.chemical_name.as_deref()),
                    opt_decimal(c.price.as_ref()),
                    opt_text(c.cas_number.as_deref()),
                    opt_text(c.cat_number.as_deref()),
                    opt_decimal(c.molecular_weight.as_ref()),
                    opt_text(c.variant.as_deref()),
                    c.standards.as_str(),
                    c.flag.as_str(),
                    opt_text(c.attachment_ref.as_deref()),
                ],
            )
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }
}

/// Merge non-null patch fields into an existing product, inside a transaction.
async fn apply_product_patch(
    tx: &libsql::Transaction,
    product_id: Uuid,
    patch: &ProductPatch,
) -> Result<(), DatabaseError> {
    let mut sets = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    if let Some(v) = &patch.chemical_name {
        sets.push("chemical_name = ?");
        params.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.cas_number {
        sets.push("cas_number = ?");
        params.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.cat_number {
        sets.push("cat_number = ?");
        params.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.molecular_weight {
        sets.push("molecular_weight = ?");
        params.push(Value::Text(v.to_string()));
    }
    params.push(Value::Text(product_id.to_string()));

    tx.execute(
        &format!(
            "UPDATE products SET {} WHERE product_id = ?",
            sets.join(", ")
        ),
        params,
    )
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Insert a product row inside a transaction, returning its fresh id.
async fn insert_product_tx(
    tx: &libsql::Transaction,
    new: &NewProduct,
) -> Result<Uuid, DatabaseError> {
    let product_id = Uuid::new_v4();
    let cat_number = new
        .cat_number
        .clone()
        .unwrap_or_else(generate_cat_number);

    tx.execute(
        "INSERT INTO products \
         (product_id, product_name, cat_number, cas_number, chemical_name, molecular_formula, \
          molecular_weight, description, approval_status, inventory_status, country_of_origin) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        libsql::params![
            product_id.to_string(),
            new.product_name.clone(),
            cat_number,
            opt_text(new.cas_number.as_deref()),
            opt_text(new.chemical_name.as_deref()),
            opt_text(new.molecular_formula.as_deref()),
            opt_decimal(new.molecular_weight.as_ref()),
            opt_text(new.description.as_deref()),
            new.approval_status.as_str(),
            new.inventory_status
                .clone()
                .unwrap_or_else(|| crate::model::product::DEFAULT_INVENTORY_STATUS.to_string()),
            new.country_of_origin
                .clone()
                .unwrap_or_else(|| crate::model::product::DEFAULT_COUNTRY_OF_ORIGIN.to_string()),
        ],
    )
    .await
    .map_err(db_err)?;
    Ok(product_id)
}

#[async_trait]
impl Database for LibSqlBackend {
    // ── Customers ───────────────────────────────────────────────────

    async fn insert_customer(&self, customer: &NewCustomer) -> Result<Customer, DatabaseError> {
        let customer_id = Uuid::new_v4();
        self.conn
            .execute(
                "INSERT INTO customers \
                 (customer_id, name, company_name, email, phone, mobile, landline, address, \
                  department, title, tag, flag, contact_owner) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                libsql::params![
                    customer_id.to_string(),
                    customer.name.clone(),
                    opt_text(customer.company_name.as_deref()),
                    opt_text(customer.email.as_deref()),
                    opt_text(customer.phone.as_deref()),
                    opt_text(customer.mobile.as_deref()),
                    opt_text(customer.landline.as_deref()),
                    opt_text(customer.address.as_deref()),
                    opt_text(customer.department.as_deref()),
                    opt_text(customer.title.as_deref()),
                    opt_text(customer.tag.as_deref()),
                    customer.flag.as_str(),
                    opt_text(customer.contact_owner.as_deref()),
                ],
            )
            .await
            .map_err(db_err)?;

        self.get_customer(customer_id)
            .await?
            .ok_or_else(|| DatabaseError::Query("customer missing after insert".into()))
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = ?1"),
                libsql::params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_customer(&row).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Customer>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {CUSTOMER_COLUMNS} FROM customers \
                     WHERE LOWER(email) = LOWER(?1) LIMIT 1"
                ),
                libsql::params![email],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_customer(&row).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    async fn list_customers(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Customer>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {CUSTOMER_COLUMNS} FROM customers \
                     ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
                ),
                libsql::params![limit as i64, offset as i64],
            )
            .await
            .map_err(db_err)?;

        let mut customers = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            customers.push(row_to_customer(&row).map_err(db_err)?);
        }
        Ok(customers)
    }

    async fn update_customer(
        &self,
        id: Uuid,
        patch: &CustomerPatch,
    ) -> Result<Option<Customer>, DatabaseError> {
        let mut sets: Vec<&'static str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let text_fields = [
            ("name = ?", &patch.name),
            ("company_name = ?", &patch.company_name),
            ("email = ?", &patch.email),
            ("phone = ?", &patch.phone),
            ("mobile = ?", &patch.mobile),
            ("landline = ?", &patch.landline),
            ("address = ?", &patch.address),
            ("department = ?", &patch.department),
            ("title = ?", &patch.title),
            ("tag = ?", &patch.tag),
            ("contact_owner = ?", &patch.contact_owner),
        ];
        for (set, value) in text_fields {
            if let Some(v) = value {
                sets.push(set);
                params.push(Value::Text(v.clone()));
            }
        }
        if let Some(v) = patch.flag {
            sets.push("flag = ?");
            params.push(Value::Text(v.as_str().to_string()));
        }

        if !sets.is_empty() {
            params.push(Value::Text(id.to_string()));
            self.conn
                .execute(
                    &format!(
                        "UPDATE customers SET {} WHERE customer_id = ?",
                        sets.join(", ")
                    ),
                    params,
                )
                .await
                .map_err(db_err)?;
        }

        self.get_customer(id).await
    }

    // ── Products ────────────────────────────────────────────────────

    async fn insert_product(&self, product: &NewProduct) -> Result<Product, DatabaseError> {
        let tx = self.conn.transaction().await.map_err(db_err)?;
        let product_id = insert_product_tx(&tx, product).await?;
        tx.commit().await.map_err(db_err)?;

        self.get_product(product_id)
            .await?
            .ok_or_else(|| DatabaseError::Query("product missing after insert".into()))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ?1"),
                libsql::params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_product(&row).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    async fn find_product_by_identifiers(
        &self,
        chemical_name: Option<&str>,
        cas_number: Option<&str>,
        cat_number: Option<&str>,
    ) -> Result<Option<Product>, DatabaseError> {
        let mut conds = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        if let Some(name) = chemical_name {
            conds.push("LOWER(chemical_name) = LOWER(?)");
            params.push(Value::Text(name.to_string()));
        }
        if let Some(cas) = cas_number {
            conds.push("LOWER(cas_number) = LOWER(?)");
            params.push(Value::Text(cas.to_string()));
        }
        if let Some(cat) = cat_number {
            conds.push("LOWER(cat_number) = LOWER(?)");
            params.push(Value::Text(cat.to_string()));
        }
        if conds.is_empty() {
            return Ok(None);
        }

        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE {} LIMIT 1",
                    conds.join(" OR ")
                ),
                params,
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_product(&row).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    async fn list_products(
        &self,
        approval_status: Option<ApprovalStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Product>, DatabaseError> {
        let (sql, params) = match approval_status {
            Some(status) => (
                format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE approval_status = ?1 \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                ),
                vec![
                    Value::Text(status.as_str().to_string()),
                    Value::Integer(limit as i64),
                    Value::Integer(offset as i64),
                ],
            ),
            None => (
                format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products \
                     ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
                ),
                vec![Value::Integer(limit as i64), Value::Integer(offset as i64)],
            ),
        };

        let mut rows = self.conn.query(&sql, params).await.map_err(db_err)?;
        let mut products = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            products.push(row_to_product(&row).map_err(db_err)?);
        }
        Ok(products)
    }

    async fn update_product(
        &self,
        id: Uuid,
        patch: &ProductPatch,
    ) -> Result<Option<Product>, DatabaseError> {
        if !patch.is_empty() {
            let tx = self.conn.transaction().await.map_err(db_err)?;
            apply_product_patch(&tx, id, patch).await?;
            tx.commit().await.map_err(db_err)?;
        }
        self.get_product(id).await
    }

    // ── Enquiries ───────────────────────────────────────────────────

    async fn create_enquiry_with_items(
        &self,
        enquiry: &NewEnquiry,
        lines: &[AssembledLine],
    ) -> Result<Enquiry, DatabaseError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_create_enquiry(enquiry, lines).await {
                Err(DatabaseError::Constraint(msg))
                    if msg.contains("enquiry_name") && attempt < NAME_ALLOC_RETRIES =>
                {
                    warn!(attempt, "Enquiry name collision, retrying allocation");
                    continue;
                }
                Err(e) => return Err(e),
                Ok(()) => break,
            }
        }

        self.get_enquiry(enquiry.enquiry_id)
            .await?
            .ok_or_else(|| DatabaseError::Query("enquiry missing after insert".into()))
    }

    async fn get_enquiry(&self, id: Uuid) -> Result<Option<Enquiry>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE enquiry_id = ?1"),
                libsql::params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };
        let mut enquiry = row_to_enquiry_header(&row).map_err(db_err)?;
        enquiry.lines = self.load_lines(enquiry.enquiry_id).await?;
        Ok(Some(enquiry))
    }

    async fn list_enquiries(
        &self,
        status: Option<EnquiryStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Enquiry>, DatabaseError> {
        let (sql, params) = match status {
            Some(status) => (
                format!(
                    "SELECT {ENQUIRY_COLUMNS} FROM enquiries WHERE status = ?1 \
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                ),
                vec![
                    Value::Text(status.as_str().to_string()),
                    Value::Integer(limit as i64),
                    Value::Integer(offset as i64),
                ],
            ),
            None => (
                format!(
                    "SELECT {ENQUIRY_COLUMNS} FROM enquiries \
                     ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
                ),
                vec![Value::Integer(limit as i64), Value::Integer(offset as i64)],
            ),
        };

        let mut rows = self.conn.query(&sql, params).await.map_err(db_err)?;
        let mut enquiries = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            enquiries.push(row_to_enquiry_header(&row).map_err(db_err)?);
        }
        for enquiry in &mut enquiries {
            enquiry.lines = self.load_lines(enquiry.enquiry_id).await?;
        }
        Ok(enquiries)
    }

    async fn update_enquiry(
        &self,
        id: Uuid,
        patch: &EnquiryPatch,
    ) -> Result<Option<Enquiry>, DatabaseError> {
        let mut sets = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        if let Some(status) = patch.status {
            sets.push("status = ?");
            params.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(is_active) = patch.is_active {
            sets.push("is_active = ?");
            params.push(Value::Integer(i64::from(is_active)));
        }

        if !sets.is_empty() {
            params.push(Value::Text(id.to_string()));
            self.conn
                .execute(
                    &format!(
                        "UPDATE enquiries SET {} WHERE enquiry_id = ?",
                        sets.join(", ")
                    ),
                    params,
                )
                .await
                .map_err(db_err)?;
        }

        self.get_enquiry(id).await
    }

    // ── Fingerprints ────────────────────────────────────────────────

    async fn lookup_fingerprint(&self, hash: &str) -> Result<Option<Uuid>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT enquiry_id FROM enquiry_hashes WHERE hash = ?1 LIMIT 1",
                libsql::params![hash],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let id: String = row.get(0).map_err(db_err)?;
                Ok(Some(parse_uuid(&id)))
            }
            None => Ok(None),
        }
    }

    async fn record_fingerprint(
        &self,
        hash: &str,
        enquiry_id: Uuid,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO enquiry_hashes (hash, enquiry_id) VALUES (?1, ?2)",
                libsql::params![hash, enquiry_id.to_string()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ── Parsing records ─────────────────────────────────────────────

    async fn upsert_parsing_record(&self, record: &ParsingRecord) -> Result<(), DatabaseError> {
        let payload = match &record.parsed_payload {
            Some(value) => Value::Text(
                serde_json::to_string(value)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            ),
            None => Value::Null,
        };

        self.conn
            .execute(
                "INSERT OR REPLACE INTO parsing_status \
                 (enquiry_id, status, message, parsed_payload, error_details, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                libsql::params![
                    record.enquiry_id.to_string(),
                    record.status.as_str(),
                    opt_text(record.message.as_deref()),
                    payload,
                    opt_text(record.error_details.as_deref()),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_parsing_record(
        &self,
        enquiry_id: Uuid,
    ) -> Result<Option<ParsingRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT enquiry_id, status, message, parsed_payload, error_details, updated_at \
                 FROM parsing_status WHERE enquiry_id = ?1",
                libsql::params![enquiry_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };

        let id: String = row.get(0).map_err(db_err)?;
        let status: String = row.get(1).map_err(db_err)?;
        let updated_at: String = row.get(5).map_err(db_err)?;
        let parsed_payload = row
            .get::<String>(3)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok());

        Ok(Some(ParsingRecord {
            enquiry_id: parse_uuid(&id),
            status: ParsingState::parse(&status).unwrap_or_default(),
            message: row.get::<String>(2).ok(),
            parsed_payload,
            error_details: row.get::<String>(4).ok(),
            updated_at: parse_datetime(&updated_at),
        }))
    }
}
