//! Postgres-backed ledger store.
//!
//! Balances live in `stock_balances`; the movement log lives in `stock_movements`, which is
//! append-only at the database level (UPDATE and DELETE are rewritten to no-ops).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerStoreError |
//! |------------|----------------------|------------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (check constraint violation) | `23514` | `Corrupt` |
//! | Database (serialization failure) | `40001` | `Concurrency` |
//! | Anything else | N/A | `Backend` |
//!
//! ## Sync Bridge
//!
//! `LedgerStore` is synchronous. The store keeps the tokio `Handle` it was created on and
//! drives each query with `Handle::block_on`, so trait methods must be called from threads
//! that are not themselves executing inside that runtime.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::{Span, instrument};
use uuid::Uuid;

use stock_ledger_core::{ActorId, Aggregate, AggregateRoot, ExpectedVersion, ProductId};
use stock_ledger_inventory::{
    MovementFilter, MovementId, MovementRecord, MovementType, ProductBalance, RecordMovement,
    StockTerms,
};

use super::r#trait::{CommittedMovement, LedgerStore, LedgerStoreError, ProductSnapshot};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock_balances (
        product_id        UUID PRIMARY KEY,
        current_stock     BIGINT NOT NULL DEFAULT 0 CHECK (current_stock >= 0),
        minimum_stock     BIGINT NOT NULL DEFAULT 0 CHECK (minimum_stock >= 0),
        maximum_stock     BIGINT NOT NULL DEFAULT 0 CHECK (maximum_stock >= 0),
        purchase_cost     BIGINT NOT NULL DEFAULT 0 CHECK (purchase_cost >= 0),
        version           BIGINT NOT NULL DEFAULT 0 CHECK (version >= 0),
        last_movement_at  TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_movements (
        id               BIGSERIAL PRIMARY KEY,
        product_id       UUID NOT NULL REFERENCES stock_balances (product_id),
        movement_type    TEXT NOT NULL CHECK (movement_type IN ('entrada', 'saida')),
        quantity         BIGINT NOT NULL CHECK (quantity > 0),
        reason           TEXT NOT NULL CHECK (length(btrim(reason)) > 0),
        notes            TEXT,
        batch            TEXT,
        expiry_date      DATE,
        actor            UUID NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL,
        resulting_stock  BIGINT NOT NULL CHECK (resulting_stock >= 0)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS stock_movements_product_idx ON stock_movements (product_id, created_at, id)",
    "CREATE INDEX IF NOT EXISTS stock_movements_created_idx ON stock_movements (created_at, id)",
    "CREATE OR REPLACE RULE stock_movements_no_update AS ON UPDATE TO stock_movements DO INSTEAD NOTHING",
    "CREATE OR REPLACE RULE stock_movements_no_delete AS ON DELETE TO stock_movements DO INSTEAD NOTHING",
];

const BALANCE_COLUMNS: &str = "product_id, current_stock, minimum_stock, maximum_stock, purchase_cost, version, last_movement_at";

const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity, reason, notes, batch, expiry_date, actor, created_at, resulting_stock";

/// Postgres-backed ledger store.
///
/// Every commit runs in one transaction that locks the product's balance row
/// (`SELECT ... FOR UPDATE`), so concurrent writers for the same product serialize at the
/// database even across processes. A writer whose expected version is stale gets
/// `Concurrency` and is expected to re-decide (the engine does so a bounded number of times).
///
/// Movement ids come from a `BIGSERIAL`: unique and increasing, but a transaction rolled
/// back after the insert leaves a gap.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    handle: Handle,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            handle,
        }
    }

    /// Connect a pool on the current runtime.
    pub async fn connect(database_url: &str) -> Result<Self, LedgerStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, Handle::current()))
    }

    /// Create tables, indexes and append-only rules if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), LedgerStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn fetch_balance(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductBalance>, LedgerStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM stock_balances WHERE product_id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_balance", e))?;

        row.as_ref().map(balance_from_row).transpose()
    }

    /// Commit one movement:
    /// 1. Ensure the balance row exists and lock it
    /// 2. Check `expected` against the stored version
    /// 3. Insert the movement and update the balance
    /// 4. Commit (or roll back on any failure)
    #[instrument(
        skip(self, movement),
        fields(
            product_id = %movement.product_id,
            movement_type = %movement.movement_type,
            quantity = movement.quantity,
            expected_version = ?expected,
            movement_id = tracing::field::Empty,
        ),
        err
    )]
    pub async fn commit_movement(
        &self,
        movement: RecordMovement,
        expected: ExpectedVersion,
    ) -> Result<CommittedMovement, LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            "INSERT INTO stock_balances (product_id) VALUES ($1) ON CONFLICT (product_id) DO NOTHING",
        )
        .bind(movement.product_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_balance", e))?;

        let current = lock_balance(&mut tx, movement.product_id).await?;

        if !expected.matches(current.version()) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::Concurrency(format!(
                "expected {expected:?}, found {}",
                current.version()
            )));
        }

        let mut balance = current.clone();
        balance.apply(&movement.change());
        if balance.current_stock() < 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::Corrupt(format!(
                "movement would leave product {} at {}",
                movement.product_id,
                balance.current_stock()
            )));
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_movements (
                product_id, movement_type, quantity, reason, notes, batch, expiry_date,
                actor, created_at, resulting_stock
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(movement.product_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(to_db_int(movement.quantity, "quantity")?)
        .bind(&movement.reason)
        .bind(movement.notes.as_deref())
        .bind(movement.batch.as_deref())
        .bind(movement.expiry_date)
        .bind(movement.actor.as_uuid())
        .bind(movement.accepted_at)
        .bind(balance.current_stock())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        sqlx::query(
            r#"
            UPDATE stock_balances
            SET current_stock = $2, version = $3, last_movement_at = $4
            WHERE product_id = $1
            "#,
        )
        .bind(movement.product_id.as_uuid())
        .bind(balance.current_stock())
        .bind(to_db_int(balance.version(), "version")?)
        .bind(balance.last_movement_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_balance", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let id = from_db_int(id, "id")?;
        Span::current().record("movement_id", id);

        let record = movement.into_record(MovementId(id), balance.current_stock());
        Ok(CommittedMovement { record, balance })
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn upsert_product_terms(
        &self,
        product_id: ProductId,
        terms: StockTerms,
    ) -> Result<ProductBalance, LedgerStoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO stock_balances (product_id, minimum_stock, maximum_stock, purchase_cost)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (product_id) DO UPDATE SET
                minimum_stock = EXCLUDED.minimum_stock,
                maximum_stock = EXCLUDED.maximum_stock,
                purchase_cost = EXCLUDED.purchase_cost
            RETURNING {BALANCE_COLUMNS}
            "#
        ))
        .bind(product_id.as_uuid())
        .bind(terms.minimum_stock)
        .bind(terms.maximum_stock)
        .bind(to_db_int(terms.purchase_cost, "purchase_cost")?)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_terms", e))?;

        balance_from_row(&row)
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn remove_product(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM stock_balances WHERE product_id = $1 FOR UPDATE",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_balance", e))?;

        match version {
            None => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(LedgerStoreError::NotFound(product_id));
            }
            Some(v) if v > 0 => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(LedgerStoreError::HasHistory(product_id));
            }
            Some(_) => {}
        }

        sqlx::query("DELETE FROM stock_balances WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_balance", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_balances(&self) -> Result<Vec<ProductBalance>, LedgerStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM stock_balances ORDER BY product_id"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_balances", e))?;

        rows.iter().map(balance_from_row).collect()
    }

    #[instrument(skip(self), fields(movement_count = tracing::field::Empty), err)]
    pub async fn fetch_movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        // Optional filters collapse to TRUE when unbound.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
              AND ($4::text IS NULL OR movement_type = $4)
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(filter.product_id.map(|p| *p.as_uuid()))
        .bind(filter.start)
        .bind(filter.end)
        .bind(filter.movement_type.map(MovementType::as_str))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_movements", e))?;

        let records = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Span::current().record("movement_count", records.len());
        Ok(records)
    }

    /// Balance and history from one REPEATABLE READ transaction.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn fetch_snapshot(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductSnapshot>, LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM stock_balances WHERE product_id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_balance", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };
        let balance = balance_from_row(&row)?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_history", e))?;

        let history = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Some(ProductSnapshot { balance, history }))
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn load_balance(&self, product_id: ProductId) -> Result<Option<ProductBalance>, LedgerStoreError> {
        self.block_on(self.fetch_balance(product_id))
    }

    fn commit(
        &self,
        movement: RecordMovement,
        expected: ExpectedVersion,
    ) -> Result<CommittedMovement, LedgerStoreError> {
        self.block_on(self.commit_movement(movement, expected))
    }

    fn upsert_terms(
        &self,
        product_id: ProductId,
        terms: StockTerms,
    ) -> Result<ProductBalance, LedgerStoreError> {
        self.block_on(self.upsert_product_terms(product_id, terms))
    }

    fn remove(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        self.block_on(self.remove_product(product_id))
    }

    fn list_balances(&self) -> Result<Vec<ProductBalance>, LedgerStoreError> {
        self.block_on(self.fetch_balances())
    }

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        self.block_on(self.fetch_movements(filter))
    }

    fn snapshot(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, LedgerStoreError> {
        self.block_on(self.fetch_snapshot(product_id))
    }
}

async fn lock_balance(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
) -> Result<ProductBalance, LedgerStoreError> {
    let row = sqlx::query(&format!(
        "SELECT {BALANCE_COLUMNS} FROM stock_balances WHERE product_id = $1 FOR UPDATE"
    ))
    .bind(product_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_balance", e))?;

    balance_from_row(&row)
}

fn balance_from_row(row: &PgRow) -> Result<ProductBalance, LedgerStoreError> {
    let product_id: Uuid = column(row, "product_id")?;
    let current_stock: i64 = column(row, "current_stock")?;
    let minimum_stock: i64 = column(row, "minimum_stock")?;
    let maximum_stock: i64 = column(row, "maximum_stock")?;
    let purchase_cost: i64 = column(row, "purchase_cost")?;
    let version: i64 = column(row, "version")?;
    let last_movement_at: Option<DateTime<Utc>> = column(row, "last_movement_at")?;

    Ok(ProductBalance::restore(
        ProductId::from_uuid(product_id),
        current_stock,
        StockTerms::new(
            minimum_stock,
            maximum_stock,
            from_db_int(purchase_cost, "purchase_cost")?,
        ),
        from_db_int(version, "version")?,
        last_movement_at,
    ))
}

fn movement_from_row(row: &PgRow) -> Result<MovementRecord, LedgerStoreError> {
    let id: i64 = column(row, "id")?;
    let product_id: Uuid = column(row, "product_id")?;
    let movement_type: String = column(row, "movement_type")?;
    let quantity: i64 = column(row, "quantity")?;
    let expiry_date: Option<NaiveDate> = column(row, "expiry_date")?;
    let actor: Uuid = column(row, "actor")?;

    Ok(MovementRecord {
        id: MovementId(from_db_int(id, "id")?),
        product_id: ProductId::from_uuid(product_id),
        movement_type: movement_type
            .parse()
            .map_err(|e| LedgerStoreError::Corrupt(format!("movement {id}: {e}")))?,
        quantity: from_db_int(quantity, "quantity")?,
        reason: column(row, "reason")?,
        notes: column(row, "notes")?,
        batch: column(row, "batch")?,
        expiry_date,
        actor: ActorId::from_uuid(actor),
        created_at: column(row, "created_at")?,
        resulting_stock: column(row, "resulting_stock")?,
    })
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, LedgerStoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| LedgerStoreError::Corrupt(format!("failed to decode column {name}: {e}")))
}

fn to_db_int(value: u64, field: &str) -> Result<i64, LedgerStoreError> {
    i64::try_from(value)
        .map_err(|_| LedgerStoreError::Corrupt(format!("{field} {value} exceeds BIGINT range")))
}

fn from_db_int(value: i64, field: &str) -> Result<u64, LedgerStoreError> {
    u64::try_from(value)
        .map_err(|_| LedgerStoreError::Corrupt(format!("{field} {value} is negative")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") => LedgerStoreError::Concurrency(msg),
                Some("23514") => LedgerStoreError::Corrupt(msg),
                _ => LedgerStoreError::Backend(msg),
            }
        }
        other => LedgerStoreError::Backend(format!("{operation}: {other}")),
    }
}
