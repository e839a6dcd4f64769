//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks the
//! current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS customers (
                customer_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                company_name TEXT,
                email TEXT UNIQUE,
                phone TEXT,
                mobile TEXT,
                landline TEXT,
                address TEXT,
                department TEXT,
                title TEXT,
                tag TEXT,
                flag TEXT NOT NULL DEFAULT 'known',
                contact_owner TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_customers_email ON customers(email);

            CREATE TABLE IF NOT EXISTS products (
                product_id TEXT PRIMARY KEY,
                product_name TEXT NOT NULL,
                cat_number TEXT NOT NULL UNIQUE,
                cas_number TEXT UNIQUE,
                chemical_name TEXT,
                molecular_formula TEXT,
                molecular_weight TEXT,
                description TEXT,
                approval_status TEXT NOT NULL DEFAULT 'pending',
                inventory_status TEXT NOT NULL DEFAULT 'custom_synthesis',
                country_of_origin TEXT NOT NULL DEFAULT 'india',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_products_approval ON products(approval_status);
            CREATE INDEX IF NOT EXISTS idx_products_chemical_name
                ON products(chemical_name COLLATE NOCASE);

            CREATE TABLE IF NOT EXISTS enquiries (
                enquiry_id TEXT PRIMARY KEY,
                enquiry_name TEXT NOT NULL UNIQUE,
                customer_id TEXT NOT NULL REFERENCES customers(customer_id),
                enquiry_datetime TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                is_active INTEGER NOT NULL DEFAULT 1,
                channel TEXT NOT NULL DEFAULT 'Email',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_enquiries_status ON enquiries(status);
            CREATE INDEX IF NOT EXISTS idx_enquiries_customer ON enquiries(customer_id);

            CREATE TABLE IF NOT EXISTS enquiry_products (
                line_id INTEGER PRIMARY KEY AUTOINCREMENT,
                enquiry_id TEXT NOT NULL REFERENCES enquiries(enquiry_id),
                product_id TEXT NOT NULL REFERENCES products(product_id),
                quantity TEXT NOT NULL,
                chemical_name TEXT,
                price TEXT,
                cas_number TEXT,
                cat_number TEXT,
                molecular_weight TEXT,
                variant TEXT,
                standards TEXT NOT NULL DEFAULT 'USA',
                flag TEXT NOT NULL DEFAULT 'known',
                attachment_ref TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_enquiry_products_enquiry
                ON enquiry_products(enquiry_id);
        "#,
    },
    Migration {
        version: 2,
        name: "dedup_and_parsing",
        sql: r#"
            CREATE TABLE IF NOT EXISTS enquiry_hashes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL UNIQUE,
                enquiry_id TEXT NOT NULL REFERENCES enquiries(enquiry_id),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_enquiry_hashes_hash ON enquiry_hashes(hash);

            CREATE TABLE IF NOT EXISTS parsing_status (
                enquiry_id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                message TEXT,
                parsed_payload TEXT,
                error_details TEXT,
                updated_at TEXT NOT NULL
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` tracking table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            conn.execute(
                "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
                libsql::params![migration.version, migration.name],
            )
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!(
                    "Failed to record migration V{}: {e}",
                    migration.version
                ))
            })?;
        }
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}
