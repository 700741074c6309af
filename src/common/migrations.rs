// src/common/migrations.rs
//! Database migration and schema management

use sqlx::SqlitePool;
use std::env;
use tracing::{info, warn};

/// Run all database migrations
///
/// Tables are created if they don't exist. Setting `RESET_DB=true` drops
/// everything first, which is only meant for local development.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let should_reset_db = env::var("RESET_DB").unwrap_or_else(|_| "false".to_string()) == "true";

    if should_reset_db {
        warn!("RESET_DB=true - dropping all tables and recreating schema");
        drop_all_tables(pool).await?;
    }

    create_schema(pool).await?;

    info!("Database migration completed successfully");
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    create_account_tables(pool).await?;
    create_oauth_tables(pool).await?;
    create_form_tables(pool).await?;
    create_indexes(pool).await?;
    Ok(())
}

async fn drop_all_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for table in [
        "form_submissions",
        "external_linkages",
        "oauth_sessions",
        "accounts",
    ] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn create_account_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Timestamps are unix milliseconds so expiry comparisons stay numeric.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL COLLATE NOCASE UNIQUE,
            display_name TEXT,
            role TEXT NOT NULL DEFAULT 'client' CHECK (role IN ('client', 'admin')),
            billing_customer_id TEXT,
            reset_token_hash TEXT,
            reset_token_expires_at INTEGER,
            reset_token_used_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS external_linkages (
            account_id TEXT NOT NULL REFERENCES accounts(id),
            provider TEXT NOT NULL,
            base_url TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            resource_name TEXT,
            provider_email TEXT,
            access_token_enc TEXT NOT NULL,
            refresh_token_enc TEXT,
            connected INTEGER NOT NULL DEFAULT 0,
            expires_at INTEGER,
            last_sync_at INTEGER,
            last_checked_at INTEGER,
            PRIMARY KEY (account_id, provider)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_oauth_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS oauth_sessions (
            state TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            account_email TEXT NOT NULL,
            provider TEXT NOT NULL,
            code_verifier TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_form_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_submissions (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            email TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let indexes = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_reset_token_hash ON accounts(reset_token_hash) WHERE reset_token_hash IS NOT NULL",
        "CREATE INDEX IF NOT EXISTS idx_accounts_billing_customer ON accounts(billing_customer_id)",
        "CREATE INDEX IF NOT EXISTS idx_oauth_sessions_expires ON oauth_sessions(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_form_submissions_kind ON form_submissions(kind, created_at)",
    ];

    for statement in indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
