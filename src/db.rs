use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use anyhow::Result;
use futures_util::future::BoxFuture;
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_producto.sql", include_str!("migrations/001_producto.sql"))];

/// Process-wide connection pool over the producto database.
///
/// Every operation checks out its own connection; the number of live
/// connections is bounded by `max_connections`.
pub struct Database {
    db: LibsqlDatabase,
    permits: Arc<Semaphore>,
    max_connections: usize,
    busy_timeout: Duration,
    acquire_timeout: Duration,
    tx_lock: Mutex<()>,
}

/// A connection checked out of the pool. Dropping it closes the connection
/// (aborting any transaction still open on it) and frees the pool slot.
pub struct PooledConnection {
    conn: Connection,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Database {
    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    /// Opens the database under `data_dir`, applies pending migrations and
    /// returns the pool.
    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let path = cfg.app.database_path(data_dir);
        tracing::info!(path = %path.display(), "[db] opening database");

        let db = Builder::new_local(&path).build().await?;

        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;
        // WAL lets readers proceed while a sync batch holds the write lock.
        conn.execute_batch("PRAGMA journal_mode = WAL;").await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }
        drop(conn);

        let max_connections = cfg.app.max_connections;
        tracing::info!(max_connections, "[db] connection pool ready");

        Ok(Database {
            db,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            busy_timeout: cfg.app.busy_timeout(),
            acquire_timeout: cfg.app.acquire_timeout(),
            tx_lock: Mutex::new(()),
        })
    }

    /// Checks a connection out of the pool, waiting at most the configured
    /// acquire timeout for a free slot.
    pub async fn acquire(&self) -> StoreResult<PooledConnection> {
        let permit = match tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(StoreError::PoolClosed),
            Err(_) => {
                tracing::warn!(timeout = ?self.acquire_timeout, "[db] connection pool exhausted");
                return Err(StoreError::PoolTimeout(self.acquire_timeout));
            }
        };

        let conn = self.db.connect()?;
        conn.execute_batch(&format!("PRAGMA busy_timeout = {};", self.busy_timeout.as_millis()))
            .await?;

        Ok(PooledConnection { conn, _permit: permit })
    }

    /// Runs `work` inside a single transaction on one pooled connection.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back when
    /// it returns `Err`. The connection goes back to the pool on every path,
    /// including when the returned future is dropped before completion.
    pub async fn with_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c Connection) -> BoxFuture<'c, Result<T, E>> + Send,
        E: From<StoreError> + std::fmt::Display + Send,
        T: Send,
    {
        let _guard = self.tx_lock.lock().await;
        let conn = self.acquire().await?;

        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(StoreError::from)?;

        match work(conn.connection()).await {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    tracing::error!(error = %e, "[db] commit failed, rolling back");
                    let _ = conn.execute("ROLLBACK", ()).await;
                    return Err(StoreError::from(e).into());
                }
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(error = %e, "[db] transaction aborted, rolling back");
                if let Err(rollback_err) = conn.execute("ROLLBACK", ()).await {
                    // Closing the connection below discards the transaction anyway.
                    tracing::error!(error = %rollback_err, "[db] rollback failed");
                }
                Err(e)
            }
        }
    }

    pub async fn test_connection(&self) -> StoreResult<()> {
        let conn = self.acquire().await?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?.ok_or(StoreError::MissingRow("SELECT 1"))?;
        Ok(())
    }

    /// Waits for every checked-out connection to come back, then closes the
    /// pool so later acquisitions fail with `PoolClosed`.
    pub async fn close(&self, grace: Duration) {
        let all = self.max_connections as u32;
        match tokio::time::timeout(grace, self.permits.acquire_many(all)).await {
            Ok(Ok(_permits)) => tracing::info!("[db] all connections returned"),
            Ok(Err(_)) => tracing::debug!("[db] pool already closed"),
            Err(_) => tracing::warn!(grace = ?grace, "[db] closing with connections still in use"),
        }
        self.permits.close();
        tracing::info!("[db] connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
