//! PostgreSQL-backed store.

use super::{JsonRows, Store, StoreConnection, TargetTable};
use crate::config::DatabaseConfig;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

/// Store writing into one table through a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    target: TargetTable,
}

impl PgStore {
    pub fn new(pool: PgPool, target: TargetTable) -> Self {
        Self { pool, target }
    }

    /// Open a pool from configuration. The target table must already exist.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        let mut target = TargetTable::new(config.table.clone());
        if let Some(schema) = &config.schema {
            target = target.in_schema(schema.clone());
        }

        log::info!(
            "connected json store targeting {} (max {} connections)",
            target.qualified_name(),
            config.max_connections
        );

        Ok(Self::new(pool, target))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    type Connection = PgStoreConnection;

    fn target(&self) -> &TargetTable {
        &self.target
    }

    async fn acquire(&self) -> Result<PgStoreConnection, sqlx::Error> {
        let conn = self.pool.acquire().await?;
        Ok(PgStoreConnection { conn })
    }
}

/// A pooled connection; returned to the pool on drop.
pub struct PgStoreConnection {
    conn: PoolConnection<Postgres>,
}

impl StoreConnection for PgStoreConnection {
    async fn insert_rows(&mut self, statement: &str, rows: &JsonRows) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(statement)
            .bind(&rows.ids)
            .bind(&rows.payloads)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected())
    }

    async fn copy_in(&mut self, statement: &str, frame: &[u8]) -> Result<u64, sqlx::Error> {
        let mut copy = self.conn.copy_in_raw(statement).await?;

        let sent = copy.send(frame).await.map(|_| ());
        if let Err(err) = sent {
            if let Err(abort_err) = copy.abort("copy frame rejected").await {
                log::warn!("failed to abort COPY after send error: {}", abort_err);
            }
            return Err(err);
        }

        copy.finish().await
    }
}
