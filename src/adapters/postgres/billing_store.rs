//! PostgreSQL implementation of BillingStore.
//!
//! A unit of work is one database transaction. `begin` takes a
//! transaction-scoped advisory lock on the subscriber id, so concurrent
//! units of work for the same subscriber queue up and the lock is released
//! by commit or rollback. Dropping the unit of work rolls the transaction
//! back.
//!
//! Order-id uniqueness is the `payment_ledger_order_id_key` constraint.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{
    BillingKey, LedgerEntry, OrderId, PaymentStatus, PlanCode, Subscription,
};
use crate::domain::foundation::{
    BillingKeyId, DomainError, ErrorCode, LedgerEntryId, SubscriberId, SubscriptionId, Timestamp,
};
use crate::ports::{BillingStore, BillingUnitOfWork};

const ORDER_ID_CONSTRAINT: &str = "payment_ledger_order_id_key";

const LEDGER_COLUMNS: &str = "id, subscriber_id, billing_key_id, payment_ref, order_id, \
     display_name, amount, status, created_at, scheduled_at";

const KEY_COLUMNS: &str = "id, subscriber_id, customer_ref, plan, amount, subscription_cycle, \
     is_active, deactivation_date, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str =
    "id, subscriber_id, plan, is_active, next_billing_date, created_at, updated_at";

/// PostgreSQL implementation of the BillingStore port.
#[derive(Clone)]
pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Migration failed: {}", e)))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Row types
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct BillingKeyRow {
    id: Uuid,
    subscriber_id: String,
    customer_ref: String,
    plan: String,
    amount: i64,
    subscription_cycle: i32,
    is_active: bool,
    deactivation_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BillingKeyRow> for BillingKey {
    type Error = DomainError;

    fn try_from(row: BillingKeyRow) -> Result<Self, Self::Error> {
        let subscription_cycle = u32::try_from(row.subscription_cycle).map_err(|_| {
            corrupt(format!("Invalid subscription_cycle: {}", row.subscription_cycle))
        })?;

        Ok(BillingKey {
            id: BillingKeyId::from_uuid(row.id),
            subscriber_id: parse_subscriber(row.subscriber_id)?,
            customer_ref: row.customer_ref,
            plan: parse_plan(&row.plan)?,
            amount: row.amount,
            subscription_cycle,
            is_active: row.is_active,
            deactivation_date: row.deactivation_date,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    subscriber_id: String,
    plan: String,
    is_active: bool,
    next_billing_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            subscriber_id: parse_subscriber(row.subscriber_id)?,
            plan: parse_plan(&row.plan)?,
            is_active: row.is_active,
            next_billing_date: Timestamp::from_datetime(row.next_billing_date),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    subscriber_id: Option<String>,
    billing_key_id: Option<Uuid>,
    payment_ref: Option<String>,
    order_id: String,
    display_name: String,
    amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    scheduled_at: Option<DateTime<Utc>>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(row.id),
            subscriber_id: row.subscriber_id.map(parse_subscriber).transpose()?,
            billing_key_id: row.billing_key_id.map(BillingKeyId::from_uuid),
            payment_ref: row.payment_ref,
            order_id: OrderId::new(row.order_id)
                .map_err(|e| corrupt(format!("Invalid order_id: {}", e)))?,
            display_name: row.display_name,
            amount: row.amount,
            status: row
                .status
                .parse::<PaymentStatus>()
                .map_err(|e| corrupt(format!("Invalid status: {}", e)))?,
            created_at: Timestamp::from_datetime(row.created_at),
            scheduled_at: row.scheduled_at.map(Timestamp::from_datetime),
        })
    }
}

fn corrupt(message: String) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, message)
}

fn parse_subscriber(value: String) -> Result<SubscriberId, DomainError> {
    SubscriberId::new(value).map_err(|e| corrupt(format!("Invalid subscriber_id: {}", e)))
}

fn parse_plan(value: &str) -> Result<PlanCode, DomainError> {
    value
        .parse::<PlanCode>()
        .map_err(|_| corrupt(format!("Invalid plan value: {}", value)))
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("{}: {}", context, e))
}

/// Maps a ledger write error, recognizing the order-id constraint.
fn ledger_write_error(context: &str, order_id: &OrderId, e: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.constraint() == Some(ORDER_ID_CONSTRAINT) {
            return DomainError::new(
                ErrorCode::DuplicateOrderId,
                format!("order id {} already exists", order_id),
            )
            .with_detail("order_id", order_id.as_str());
        }
    }
    db_error(context, e)
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, DomainError>
where
    T: TryFrom<R, Error = DomainError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn begin(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Box<dyn BillingUnitOfWork>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(subscriber.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to lock subscriber", e))?;

        Ok(Box::new(PostgresUnitOfWork {
            subscriber: subscriber.clone(),
            tx,
        }))
    }

    async fn find_entry_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_ledger WHERE order_id = $1",
            LEDGER_COLUMNS
        ))
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find ledger entry", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn list_entries(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_ledger WHERE subscriber_id = $1 ORDER BY created_at DESC",
            LEDGER_COLUMNS
        ))
        .bind(subscriber.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list ledger entries", e))?;

        collect(rows)
    }

    async fn find_billing_key(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Option<BillingKey>, DomainError> {
        let row: Option<BillingKeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM billing_keys WHERE subscriber_id = $1",
            KEY_COLUMNS
        ))
        .bind(subscriber.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find billing key", e))?;

        row.map(BillingKey::try_from).transpose()
    }

    async fn find_subscription(
        &self,
        subscriber: &SubscriberId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscriber.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_due_deactivations(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<BillingKey>, DomainError> {
        let rows: Vec<BillingKeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM billing_keys \
             WHERE is_active AND deactivation_date IS NOT NULL AND deactivation_date <= $1 \
             ORDER BY deactivation_date",
            KEY_COLUMNS
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list due deactivations", e))?;

        collect(rows)
    }
}

/// Unit of work backed by one transaction.
struct PostgresUnitOfWork {
    subscriber: SubscriberId,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingUnitOfWork for PostgresUnitOfWork {
    fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber
    }

    async fn billing_key(&mut self) -> Result<Option<BillingKey>, DomainError> {
        let row: Option<BillingKeyRow> = sqlx::query_as(&format!(
            "SELECT {} FROM billing_keys WHERE subscriber_id = $1",
            KEY_COLUMNS
        ))
        .bind(self.subscriber.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load billing key", e))?;

        row.map(BillingKey::try_from).transpose()
    }

    async fn save_billing_key(&mut self, key: &BillingKey) -> Result<(), DomainError> {
        if key.subscriber_id != self.subscriber {
            return Err(DomainError::validation(
                "subscriber_id",
                "billing key belongs to another subscriber",
            ));
        }

        // The row id survives an overwrite so ledger rows keep pointing at it.
        sqlx::query(
            r#"
            INSERT INTO billing_keys (
                id, subscriber_id, customer_ref, plan, amount, subscription_cycle,
                is_active, deactivation_date, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (subscriber_id) DO UPDATE SET
                customer_ref = EXCLUDED.customer_ref,
                plan = EXCLUDED.plan,
                amount = EXCLUDED.amount,
                subscription_cycle = EXCLUDED.subscription_cycle,
                is_active = EXCLUDED.is_active,
                deactivation_date = EXCLUDED.deactivation_date,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key.id.as_uuid())
        .bind(key.subscriber_id.as_str())
        .bind(&key.customer_ref)
        .bind(key.plan.as_str())
        .bind(key.amount)
        .bind(i32::try_from(key.subscription_cycle).unwrap_or(i32::MAX))
        .bind(key.is_active)
        .bind(key.deactivation_date)
        .bind(key.created_at.as_datetime())
        .bind(key.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to save billing key", e))?;

        Ok(())
    }

    async fn subscription(&mut self) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(self.subscriber.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn save_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        if subscription.subscriber_id != self.subscriber {
            return Err(DomainError::validation(
                "subscriber_id",
                "subscription belongs to another subscriber",
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, subscriber_id, plan, is_active, next_billing_date, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (subscriber_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                is_active = EXCLUDED.is_active,
                next_billing_date = EXCLUDED.next_billing_date,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.subscriber_id.as_str())
        .bind(subscription.plan.as_str())
        .bind(subscription.is_active)
        .bind(subscription.next_billing_date.as_datetime())
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to save subscription", e))?;

        Ok(())
    }

    async fn entries(&mut self) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_ledger WHERE subscriber_id = $1 ORDER BY created_at",
            LEDGER_COLUMNS
        ))
        .bind(self.subscriber.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load ledger entries", e))?;

        collect(rows)
    }

    async fn entry_by_order_id(
        &mut self,
        order_id: &OrderId,
    ) -> Result<Option<LedgerEntry>, DomainError> {
        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payment_ledger WHERE subscriber_id = $1 AND order_id = $2",
            LEDGER_COLUMNS
        ))
        .bind(self.subscriber.as_str())
        .bind(order_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load ledger entry", e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payment_ledger (
                id, subscriber_id, billing_key_id, payment_ref, order_id,
                display_name, amount, status, created_at, scheduled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.subscriber_id.as_ref().map(|s| s.as_str()))
        .bind(entry.billing_key_id.as_ref().map(|k| *k.as_uuid()))
        .bind(&entry.payment_ref)
        .bind(entry.order_id.as_str())
        .bind(&entry.display_name)
        .bind(entry.amount)
        .bind(entry.status.as_str())
        .bind(entry.created_at.as_datetime())
        .bind(entry.scheduled_at.as_ref().map(|t| *t.as_datetime()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ledger_write_error("Failed to insert ledger entry", &entry.order_id, e))?;

        Ok(())
    }

    async fn update_entry(&mut self, entry: &LedgerEntry) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_ledger SET
                subscriber_id = $2,
                billing_key_id = $3,
                payment_ref = $4,
                order_id = $5,
                display_name = $6,
                amount = $7,
                status = $8,
                scheduled_at = $9
            WHERE id = $1 AND subscriber_id = $10
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.subscriber_id.as_ref().map(|s| s.as_str()))
        .bind(entry.billing_key_id.as_ref().map(|k| *k.as_uuid()))
        .bind(&entry.payment_ref)
        .bind(entry.order_id.as_str())
        .bind(&entry.display_name)
        .bind(entry.amount)
        .bind(entry.status.as_str())
        .bind(entry.scheduled_at.as_ref().map(|t| *t.as_datetime()))
        .bind(self.subscriber.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| ledger_write_error("Failed to update ledger entry", &entry.order_id, e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::LedgerEntryNotFound,
                format!("ledger entry {} not found", entry.id),
            ));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }
}
