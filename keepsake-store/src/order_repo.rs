use async_trait::async_trait;
use keepsake_order::error::{LedgerError, LedgerResult};
use keepsake_order::ledger::OrderLedger;
use keepsake_order::models::{Order, OrderDraft, OrderStatus, RecordOutcome, StageMutation};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// Postgres-backed ledger. Each stage write is a read-modify-write of the
/// order document under `SELECT ... FOR UPDATE`, so concurrent writers for
/// one order are serialized by the row lock.
pub struct PgOrderLedger {
    pool: PgPool,
}

impl PgOrderLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> LedgerError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LedgerError::Conflict(format!("unique constraint violated: {}", db.message()))
        }
        _ => LedgerError::Storage(e.to_string()),
    }
}

fn decode(row: &sqlx::postgres::PgRow) -> LedgerResult<Order> {
    let Json(order): Json<Order> = row.try_get("document").map_err(storage)?;
    Ok(order)
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn create(&self, draft: &OrderDraft) -> LedgerResult<Uuid> {
        let order = Order::open(draft)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, status, gateway_order_id, document, created_at, updated_at)
            VALUES ($1, $2, NULL, $3, $4, $4)
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(Json(&order))
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        debug!("Ledger opened order {}", order.id);
        Ok(order.id)
    }

    async fn apply(&self, order_id: Uuid, mutation: StageMutation) -> LedgerResult<RecordOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query("SELECT document FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
            .ok_or(LedgerError::NotFound(order_id))?;
        let mut order = decode(&row)?;

        let outcome = order.apply(mutation)?;
        if outcome == RecordOutcome::Unchanged {
            // Nothing written; dropping the transaction releases the lock
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, gateway_order_id = $3, document = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.gateway_order_id.as_deref())
        .bind(Json(&order))
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(outcome)
    }

    async fn get(&self, order_id: Uuid) -> LedgerResult<Order> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or(LedgerError::NotFound(order_id))?;
        decode(&row)
    }

    async fn find_by_gateway_order(&self, gateway_order_id: &str) -> LedgerResult<Order> {
        let row = sqlx::query("SELECT document FROM orders WHERE gateway_order_id = $1")
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| LedgerError::UnknownGatewayOrder(gateway_order_id.to_string()))?;
        decode(&row)
    }

    async fn list_by_status(&self, status: OrderStatus) -> LedgerResult<Vec<Order>> {
        let rows = sqlx::query("SELECT document FROM orders WHERE status = $1 ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(decode).collect()
    }

    async fn list_all(&self) -> LedgerResult<Vec<Order>> {
        let rows = sqlx::query("SELECT document FROM orders ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(decode).collect()
    }
}
