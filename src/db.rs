//! Database module
//!
//! Connectivity and schema checks for the PostgreSQL store.
//! The schema itself lives in `migrations/`.

use sqlx::PgPool;

/// Tables created by `migrations/0001_init.sql`
pub const REQUIRED_TABLES: &[&str] = &[
    "members",
    "categories",
    "items",
    "category_item",
    "deliveries",
    "orders",
    "order_items",
];

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!(table = %table, "Required table does not exist");
            return Ok(false);
        }
    }

    let username_index: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_indexes WHERE indexname = 'uk_members_username')",
    )
    .fetch_one(pool)
    .await?;

    if !username_index {
        tracing::error!("Unique index on members.username is missing");
        return Ok(false);
    }

    tracing::info!(tables = REQUIRED_TABLES.len(), "Database schema verified");
    Ok(true)
}
