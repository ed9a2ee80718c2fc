//! Database module
//!
//! Database connection and schema verification. The schema itself lives in
//! `migrations/`.

use sqlx::PgPool;

/// Tables the PostgreSQL store reads and writes
pub const REQUIRED_TABLES: &[&str] = &[
    "journals",
    "partners",
    "tesote_accounts",
    "bank_statements",
    "bank_statement_lines",
    "tesote_webhooks",
    "tesote_api_logs",
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
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // Line idempotency depends on this index
    let has_line_key: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_indexes
            WHERE tablename = 'bank_statement_lines'
              AND indexname = 'bank_statement_lines_statement_ref_key'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !has_line_key {
        tracing::error!("Unique key on bank_statement_lines (statement_id, external_ref) is missing");
        return Ok(false);
    }

    Ok(true)
}
