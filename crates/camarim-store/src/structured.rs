//! # Structured Store
//!
//! SQLite-backed structured storage for the data set: three collections,
//! versioned schema, indexed lookups, bulk read/replace inside single
//! transactions.
//!
//! ## Collections (schema version 1)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products   key = id      indexes: category, stock                     │
//! │  sales      key = id      indexes: date, attendant                     │
//! │  settings   key = key     value record {key, value}                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Read/Write Contracts
//! - `get_all` never aborts on a single bad collection: a failed read of
//!   one collection resolves to an empty collection for that part.
//! - `replace_all` is all-or-nothing: clear + insert run in one
//!   transaction, and any error rolls the whole thing back, so a
//!   partially-cleared collection is never observable.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use camarim_core::{Product, Sale, SaleItem, Settings, SystemData};

use crate::error::{StoreError, StoreResult};
use crate::migrations;

// =============================================================================
// Configuration
// =============================================================================

/// Structured store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = StoreConfig::new("/var/lib/camarim/camarim.db")
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (sufficient for a single-operator POS)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Pool acquire timeout.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    pub idle_timeout: Duration,

    /// Whether to run migrations on open.
    pub run_migrations: bool,
}

impl StoreConfig {
    /// Creates a configuration with the given database path. The file is
    /// created on first open if it does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the pool acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on open.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// In-memory database configuration (for testing).
    ///
    /// A single connection is required: each in-memory connection is its
    /// own database.
    pub fn in_memory() -> Self {
        StoreConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    category: String,
    price_cents: i64,
    cost_cents: Option<i64>,
    stock: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            category: row.category,
            price_cents: row.price_cents,
            cost_cents: row.cost_cents,
            stock: row.stock,
        }
    }
}

#[derive(Debug, FromRow)]
struct SaleRow {
    id: i64,
    date: DateTime<Utc>,
    attendant: String,
    items: String,
    total_cents: i64,
}

impl SaleRow {
    fn into_sale(self) -> Sale {
        // A bad items payload degrades that sale's line detail, not the read
        let items: Vec<SaleItem> = match serde_json::from_str(&self.items) {
            Ok(items) => items,
            Err(e) => {
                warn!(sale_id = self.id, error = %e, "Unparseable sale items, dropping line detail");
                Vec::new()
            }
        };

        Sale {
            id: self.id,
            date: self.date,
            attendant: self.attendant,
            items,
            total_cents: self.total_cents,
        }
    }
}

#[derive(Debug, FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

// =============================================================================
// Structured Store
// =============================================================================

/// Handle to the SQLite-backed structured store.
#[derive(Debug, Clone)]
pub struct StructuredStore {
    pool: SqlitePool,
}

impl StructuredStore {
    /// Opens the structured store.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite (WAL journal, NORMAL synchronous, foreign keys)
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    ///
    /// ## Returns
    /// * `Ok(StructuredStore)` - ready-to-use handle
    /// * `Err(StoreError)` - the platform cannot provide the structured
    ///   store; callers degrade to the fallback store
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Opening structured store"
        );

        // sqlite://path creates the file if not exists (mode=rwc)
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| StoreError::Unsupported(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            "Structured store pool created"
        );

        let store = StructuredStore { pool };

        if config.run_migrations {
            migrations::run_migrations(&store.pool).await?;
        }

        Ok(store)
    }

    /// Reads the full data set in one read-only transaction.
    ///
    /// A failed read of any single collection resolves (with a log line)
    /// to an empty collection for that part; the other collections are
    /// still returned.
    pub async fn get_all(&self) -> StoreResult<SystemData> {
        let mut tx = self.pool.begin().await?;

        let products: Vec<Product> = match sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, category, price_cents, cost_cents, stock \
             FROM products ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await
        {
            Ok(rows) => rows.into_iter().map(Product::from).collect(),
            Err(e) => {
                warn!(error = %e, "Product read failed, resolving to empty collection");
                Vec::new()
            }
        };

        let sales: Vec<Sale> = match sqlx::query_as::<_, SaleRow>(
            "SELECT id, date, attendant, items, total_cents FROM sales ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await
        {
            Ok(rows) => rows.into_iter().map(SaleRow::into_sale).collect(),
            Err(e) => {
                warn!(error = %e, "Sale read failed, resolving to empty collection");
                Vec::new()
            }
        };

        let settings = match sqlx::query_as::<_, SettingRow>("SELECT key, value FROM settings")
            .fetch_all(&mut *tx)
            .await
        {
            Ok(rows) => {
                let pairs = rows.into_iter().filter_map(|row| {
                    match serde_json::from_str::<Value>(&row.value) {
                        Ok(value) => Some((row.key, value)),
                        Err(e) => {
                            warn!(key = %row.key, error = %e, "Unparseable setting, skipping");
                            None
                        }
                    }
                });
                Settings::from_pairs(pairs)
            }
            Err(e) => {
                warn!(error = %e, "Settings read failed, resolving to empty collection");
                Settings::new()
            }
        };

        tx.commit().await?;

        debug!(
            products = products.len(),
            sales = sales.len(),
            settings = settings.len(),
            "Structured read complete"
        );

        Ok(SystemData {
            products,
            sales,
            settings,
        })
    }

    /// Replaces the full data set in one read-write transaction.
    ///
    /// Clears each collection, then inserts every record from the input
    /// (settings fan out into one row per key/value pair). Any error rolls
    /// the whole transaction back; no partially-cleared collection is ever
    /// visible to readers.
    pub async fn replace_all(&self, data: &SystemData) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;

        let result = Self::replace_all_in_tx(&mut tx, data).await;

        match result {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::TransactionFailed(e.to_string()))?;
                debug!(
                    products = data.products.len(),
                    sales = data.sales.len(),
                    settings = data.settings.len(),
                    "Structured replace committed"
                );
                Ok(())
            }
            Err(e) => {
                // Rollback is also implied by drop; make it explicit so the
                // failure path reads as the contract it is
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "Rollback after failed replace also failed");
                }
                Err(e)
            }
        }
    }

    async fn replace_all_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        data: &SystemData,
    ) -> StoreResult<()> {
        let failed = |e: sqlx::Error| StoreError::TransactionFailed(e.to_string());

        sqlx::query("DELETE FROM products")
            .execute(&mut **tx)
            .await
            .map_err(failed)?;
        sqlx::query("DELETE FROM sales")
            .execute(&mut **tx)
            .await
            .map_err(failed)?;
        sqlx::query("DELETE FROM settings")
            .execute(&mut **tx)
            .await
            .map_err(failed)?;

        for product in &data.products {
            sqlx::query(
                "INSERT INTO products (id, name, category, price_cents, cost_cents, stock) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.category)
            .bind(product.price_cents)
            .bind(product.cost_cents)
            .bind(product.stock)
            .execute(&mut **tx)
            .await
            .map_err(failed)?;
        }

        for sale in &data.sales {
            let items = serde_json::to_string(&sale.items)?;
            sqlx::query(
                "INSERT INTO sales (id, date, attendant, items, total_cents) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(sale.id)
            .bind(sale.date)
            .bind(&sale.attendant)
            .bind(items)
            .bind(sale.total_cents)
            .execute(&mut **tx)
            .await
            .map_err(failed)?;
        }

        for (key, value) in data.settings.iter() {
            let value = serde_json::to_string(value)?;
            sqlx::query("INSERT INTO settings (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut **tx)
                .await
                .map_err(failed)?;
        }

        Ok(())
    }

    /// Counts products (the opportunistic-migration guard).
    pub async fn product_count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Returns (total embedded, applied) migration counts, for
    /// diagnostics.
    pub async fn migration_status(&self) -> StoreResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }

    /// Checks if the store can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Closes the connection pool. Subsequent operations fail.
    pub async fn close(&self) {
        info!("Closing structured store");
        self.pool.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
