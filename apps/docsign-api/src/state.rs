//! Application state for DocSign API

use anyhow::Result;
use docsign_core::SignatureStore;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

use crate::config::Config;
use crate::store::SqliteStore;

pub struct AppState {
    pub store: Arc<dyn SignatureStore>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Connecting to database: {}", config.database_url);

        let options = if config.database_url.contains(":memory:") {
            // Every connection to an in-memory database opens a fresh one
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(&config.database_url).await?;

        Self::with_pool(pool, config).await
    }

    pub async fn with_pool(pool: SqlitePool, config: Config) -> Result<Self> {
        Self::run_migrations(&pool).await?;
        let store = SqliteStore::new(pool, config.policy(), config.public_base_url.clone());
        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                file_name TEXT NOT NULL,
                pdf_data BLOB NOT NULL,
                page_sizes_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                signed_file_url TEXT,
                finalized_at TEXT,
                current_artifact_id TEXT,
                current_fingerprint TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signatures (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id),
                page_number INTEGER NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                width REAL NOT NULL,
                height REAL NOT NULL,
                signer_name TEXT NOT NULL,
                signer_email TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                signature_image TEXT,
                rejection_reason TEXT,
                link_sent INTEGER NOT NULL DEFAULT 0,
                link_token TEXT,
                expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id),
                fingerprint TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                pdf_data BLOB NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                actor TEXT NOT NULL,
                signature_id TEXT,
                previous_hash TEXT,
                details TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Indexes for fast lookups
        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_signatures_document ON signatures(document_id)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_signatures_token ON signatures(link_token)",
            "CREATE INDEX IF NOT EXISTS idx_audit_document ON audit_events(document_id, seq)",
        ] {
            sqlx::query(statement).execute(pool).await?;
        }

        tracing::info!("Migrations complete");
        Ok(())
    }
}
