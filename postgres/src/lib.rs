//! `PostgreSQL` storage for the office hours service.
//!
//! This crate implements the storage capability traits from
//! `office-hours-core` on top of sqlx. Every request runs in one
//! `SERIALIZABLE` transaction:
//!
//! - Concurrent signups for the same timeslot cannot both see free capacity;
//!   the loser fails with a serialization failure and answers 409
//! - Guarded updates (`attach_*`, `detach_*`, `remove_entry`) are single
//!   `UPDATE ... WHERE <predicate> RETURNING` statements
//! - A partial unique index keeps one active entry per student per queue
//!
//! # Example
//!
//! ```ignore
//! use office_hours_postgres::PgStorage;
//! use office_hours_core::store::{Storage, Transaction};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = PgStorage::connect("postgres://localhost/office_hours", 10).await?;
//!     storage.migrate().await?;
//!
//!     let tx = storage.begin().await?;
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use office_hours_core::StoreError;
use office_hours_core::store::{Storage, StoreResult, Transaction};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

mod appointments;
mod entries;
mod error;
mod queues;
mod rows;

/// Connection pool that opens serializable transactions.
#[derive(Clone, Debug)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect a pool of at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(error::map_sqlx)?;
        Ok(Self { pool })
    }

    /// Connect with fully specified pool options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn connect_with(database_url: &str, options: PgPoolOptions) -> StoreResult<Self> {
        let pool = options
            .connect(database_url)
            .await
            .map_err(error::map_sqlx)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

impl Storage for PgStorage {
    type Tx = PgTransaction;

    async fn begin(&self) -> StoreResult<PgTransaction> {
        let mut tx = self.pool.begin().await.map_err(error::map_sqlx)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(error::map_sqlx)?;
        Ok(PgTransaction { tx })
    }
}

/// One open serializable transaction.
#[derive(Debug)]
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl Transaction for PgTransaction {
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(error::map_sqlx)?;
        metrics::counter!("office_hours.store.commits").increment(1);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await.map_err(error::map_sqlx)?;
        metrics::counter!("office_hours.store.rollbacks").increment(1);
        Ok(())
    }
}
