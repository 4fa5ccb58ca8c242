//! Database service for telecom-service.

use crate::error::TelecomError;
use crate::models::{
    CreatePlan, DraftOrderRequest, LineItem, ListNumbersFilter, ListSubscriptionsFilter,
    NewPhoneNumber, NewSubscription, NumberStatus, NumberTier, Order, OrderStatus, PhoneNumber,
    PlanConfiguration, PlanType, RenewalUpdate, ReservationFilter, Subscription,
    SubscriptionStatus, UsageCounter,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{OrderGateway, StoreResult, TelecomStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const NUMBER_COLUMNS: &str =
    "number_id, phone_number, status, tier, region_code, subscription_id, created_utc, updated_utc";

const PLAN_COLUMNS: &str =
    "plan_id, product_id, plan_type, data_quota_mb, voice_quota_min, contract_months, is_5g, created_utc";

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, customer_id, status, number_id, plan_id, order_id, line_item_id, current_period_start, renewal_date, billing_day, created_utc, updated_utc";

const COUNTER_COLUMNS: &str =
    "counter_id, subscription_id, cycle, data_used_mb, voice_used_min, alerts_fired, created_utc, updated_utc";

#[derive(sqlx::FromRow)]
struct NumberRow {
    number_id: Uuid,
    phone_number: String,
    status: String,
    tier: String,
    region_code: String,
    subscription_id: Option<Uuid>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<NumberRow> for PhoneNumber {
    type Error = TelecomError;

    fn try_from(row: NumberRow) -> Result<Self, Self::Error> {
        Ok(PhoneNumber {
            number_id: row.number_id,
            status: NumberStatus::parse(&row.status)
                .ok_or_else(|| corrupt("number status", &row.status))?,
            tier: NumberTier::parse(&row.tier).ok_or_else(|| corrupt("number tier", &row.tier))?,
            phone_number: row.phone_number,
            region_code: row.region_code,
            subscription_id: row.subscription_id,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    plan_id: Uuid,
    product_id: String,
    plan_type: String,
    data_quota_mb: i64,
    voice_quota_min: i64,
    contract_months: i32,
    is_5g: bool,
    created_utc: DateTime<Utc>,
}

impl TryFrom<PlanRow> for PlanConfiguration {
    type Error = TelecomError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(PlanConfiguration {
            plan_id: row.plan_id,
            plan_type: PlanType::parse(&row.plan_type)
                .ok_or_else(|| corrupt("plan type", &row.plan_type))?,
            product_id: row.product_id,
            data_quota_mb: row.data_quota_mb,
            voice_quota_min: row.voice_quota_min,
            contract_months: row.contract_months,
            is_5g: row.is_5g,
            created_utc: row.created_utc,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    subscription_id: Uuid,
    customer_id: String,
    status: String,
    number_id: Uuid,
    plan_id: Uuid,
    order_id: String,
    line_item_id: String,
    current_period_start: DateTime<Utc>,
    renewal_date: DateTime<Utc>,
    billing_day: i32,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = TelecomError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            subscription_id: row.subscription_id,
            status: SubscriptionStatus::parse(&row.status)
                .ok_or_else(|| corrupt("subscription status", &row.status))?,
            customer_id: row.customer_id,
            number_id: row.number_id,
            plan_id: row.plan_id,
            order_id: row.order_id,
            line_item_id: row.line_item_id,
            current_period_start: row.current_period_start,
            renewal_date: row.renewal_date,
            billing_day: row.billing_day,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    customer_id: String,
    currency_code: String,
    status: String,
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    line_item_id: String,
    product_id: String,
    variant_id: Option<String>,
    title: String,
    quantity: i32,
    unit_price: Decimal,
    metadata: serde_json::Value,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        LineItem {
            line_item_id: row.line_item_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            title: row.title,
            quantity: row.quantity,
            unit_price: row.unit_price,
            metadata: row.metadata,
        }
    }
}

fn corrupt(field: &str, value: &str) -> TelecomError {
    TelecomError::persistence("Unreadable row", format!("unknown {} '{}'", field, value))
}

fn convert<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = TelecomError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn status_labels<S: Copy>(statuses: &[S], as_str: fn(&S) -> &'static str) -> Vec<&'static str> {
    statuses.iter().map(as_str).collect()
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "telecom-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_line_items(&self, order_id: &str) -> StoreResult<Vec<LineItem>> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT line_item_id, product_id, variant_id, title, quantity, unit_price, metadata
            FROM order_line_items
            WHERE order_id = $1
            ORDER BY position
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to get line items", e))?;

        Ok(rows.into_iter().map(LineItem::from).collect())
    }
}

#[async_trait]
impl TelecomStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| TelecomError::persistence("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Phone Number Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(region_code = %input.region_code))]
    async fn insert_phone_number(&self, input: &NewPhoneNumber) -> StoreResult<PhoneNumber> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_phone_number"])
            .start_timer();

        let row = sqlx::query_as::<_, NumberRow>(&format!(
            r#"
            INSERT INTO msisdn_inventory (number_id, phone_number, tier, region_code)
            VALUES ($1, $2, $3, $4)
            RETURNING {NUMBER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.phone_number)
        .bind(input.tier.as_str())
        .bind(&input.region_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TelecomError::DuplicateNumber(input.phone_number.clone())
            } else {
                TelecomError::persistence("Failed to insert phone number", e)
            }
        })?;

        timer.observe_duration();
        row.try_into()
    }

    #[instrument(skip(self))]
    async fn get_phone_number(&self, number_id: Uuid) -> StoreResult<Option<PhoneNumber>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_phone_number"])
            .start_timer();

        let row = sqlx::query_as::<_, NumberRow>(&format!(
            "SELECT {NUMBER_COLUMNS} FROM msisdn_inventory WHERE number_id = $1 AND deleted_utc IS NULL"
        ))
        .bind(number_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to get phone number", e))?;

        timer.observe_duration();
        row.map(PhoneNumber::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_phone_number(&self, phone_number: &str) -> StoreResult<Option<PhoneNumber>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_phone_number"])
            .start_timer();

        let row = sqlx::query_as::<_, NumberRow>(&format!(
            "SELECT {NUMBER_COLUMNS} FROM msisdn_inventory WHERE phone_number = $1 AND deleted_utc IS NULL"
        ))
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to find phone number", e))?;

        timer.observe_duration();
        row.map(PhoneNumber::try_from).transpose()
    }

    #[instrument(skip(self, filter))]
    async fn list_phone_numbers(
        &self,
        filter: &ListNumbersFilter,
    ) -> StoreResult<Vec<PhoneNumber>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_phone_numbers"])
            .start_timer();

        let rows = sqlx::query_as::<_, NumberRow>(&format!(
            r#"
            SELECT {NUMBER_COLUMNS}
            FROM msisdn_inventory
            WHERE deleted_utc IS NULL
              AND ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR region_code = $2)
              AND ($3::text IS NULL OR tier = $3)
            ORDER BY seq
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.region_code.as_deref())
        .bind(filter.tier.map(|t| t.as_str()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to list phone numbers", e))?;

        timer.observe_duration();
        convert(rows)
    }

    #[instrument(skip(self, filter))]
    async fn claim_available_number(
        &self,
        filter: &ReservationFilter,
    ) -> StoreResult<Option<PhoneNumber>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_available_number"])
            .start_timer();

        // SKIP LOCKED lets concurrent reservations each take a different row.
        let row = sqlx::query_as::<_, NumberRow>(&format!(
            r#"
            UPDATE msisdn_inventory
            SET status = 'reserved', updated_utc = NOW()
            WHERE number_id = (
                SELECT number_id
                FROM msisdn_inventory
                WHERE status = 'available'
                  AND deleted_utc IS NULL
                  AND ($1::text IS NULL OR region_code = $1)
                  AND ($2::text IS NULL OR tier = $2)
                  AND ($3::text IS NULL OR phone_number = $3)
                ORDER BY seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {NUMBER_COLUMNS}
            "#
        ))
        .bind(filter.region_code.as_deref())
        .bind(filter.tier.map(|t| t.as_str()))
        .bind(filter.specific_number.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to claim phone number", e))?;

        timer.observe_duration();
        row.map(PhoneNumber::try_from).transpose()
    }

    #[instrument(skip(self, expected))]
    async fn transition_number(
        &self,
        number_id: Uuid,
        expected: &[NumberStatus],
        status: NumberStatus,
        subscription_id: Option<Uuid>,
    ) -> StoreResult<Option<PhoneNumber>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_number"])
            .start_timer();

        let row = sqlx::query_as::<_, NumberRow>(&format!(
            r#"
            UPDATE msisdn_inventory
            SET status = $2, subscription_id = $3, updated_utc = NOW()
            WHERE number_id = $1
              AND deleted_utc IS NULL
              AND (cardinality($4::text[]) = 0 OR status = ANY($4))
            RETURNING {NUMBER_COLUMNS}
            "#
        ))
        .bind(number_id)
        .bind(status.as_str())
        .bind(subscription_id)
        .bind(status_labels(expected, NumberStatus::as_str))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to update phone number", e))?;

        timer.observe_duration();
        row.map(PhoneNumber::try_from).transpose()
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    async fn insert_plan(&self, input: &CreatePlan) -> StoreResult<PlanConfiguration> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_plan"])
            .start_timer();

        let row = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            INSERT INTO plan_configurations (plan_id, product_id, plan_type, data_quota_mb, voice_quota_min, contract_months, is_5g)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.product_id)
        .bind(input.plan_type.as_str())
        .bind(input.data_quota_mb)
        .bind(input.voice_quota_min)
        .bind(input.contract_months)
        .bind(input.is_5g)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TelecomError::DuplicatePlan(input.product_id.clone())
            } else {
                TelecomError::persistence("Failed to create plan", e)
            }
        })?;

        timer.observe_duration();
        info!(plan_id = %row.plan_id, product_id = %row.product_id, "Plan configuration created");
        row.try_into()
    }

    #[instrument(skip(self))]
    async fn get_plan(&self, plan_id: Uuid) -> StoreResult<Option<PlanConfiguration>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plan_configurations WHERE plan_id = $1 AND deleted_utc IS NULL"
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to get plan", e))?;

        timer.observe_duration();
        row.map(PlanConfiguration::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_plan_by_product(
        &self,
        product_id: &str,
    ) -> StoreResult<Option<PlanConfiguration>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_plan_by_product"])
            .start_timer();

        let row = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plan_configurations WHERE product_id = $1 AND deleted_utc IS NULL"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to find plan", e))?;

        timer.observe_duration();
        row.map(PlanConfiguration::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_plans(&self) -> StoreResult<Vec<PlanConfiguration>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_plans"])
            .start_timer();

        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plan_configurations WHERE deleted_utc IS NULL ORDER BY created_utc"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to list plans", e))?;

        timer.observe_duration();
        convert(rows)
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(order_id = %input.order_id, number_id = %input.number_id))]
    async fn insert_subscription(&self, input: &NewSubscription) -> StoreResult<Subscription> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_subscription"])
            .start_timer();

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            INSERT INTO subscriptions (subscription_id, customer_id, number_id, plan_id, order_id, line_item_id, current_period_start, renewal_date, billing_day)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.customer_id)
        .bind(input.number_id)
        .bind(input.plan_id)
        .bind(&input.order_id)
        .bind(&input.line_item_id)
        .bind(input.current_period_start)
        .bind(input.renewal_date)
        .bind(input.billing_day)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TelecomError::InvalidStateTransition {
                    entity: "phone number",
                    from: "assigned".to_string(),
                    to: "assigned".to_string(),
                }
            } else {
                TelecomError::persistence("Failed to create subscription", e)
            }
        })?;

        timer.observe_duration();
        info!(subscription_id = %row.subscription_id, "Subscription created");
        row.try_into()
    }

    #[instrument(skip(self))]
    async fn get_subscription(&self, subscription_id: Uuid) -> StoreResult<Option<Subscription>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = $1 AND deleted_utc IS NULL"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to get subscription", e))?;

        timer.observe_duration();
        row.map(Subscription::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_open_subscription_for_number(
        &self,
        number_id: Uuid,
    ) -> StoreResult<Option<Subscription>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_open_subscription_for_number"])
            .start_timer();

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE number_id = $1 AND status <> 'cancelled' AND deleted_utc IS NULL
            "#
        ))
        .bind(number_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to find subscription for number", e))?;

        timer.observe_duration();
        row.map(Subscription::try_from).transpose()
    }

    #[instrument(skip(self, filter))]
    async fn list_subscriptions(
        &self,
        filter: &ListSubscriptionsFilter,
    ) -> StoreResult<(Vec<Subscription>, i64)> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_subscriptions"])
            .start_timer();

        const PREDICATE: &str = r#"
            ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR customer_id = $2)
              AND ($3::uuid IS NULL OR number_id = $3)
              AND ($4 OR deleted_utc IS NULL)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM subscriptions WHERE {PREDICATE}"
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_id.as_deref())
        .bind(filter.number_id)
        .bind(filter.include_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to count subscriptions", e))?;

        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE {PREDICATE}
            ORDER BY created_utc DESC, subscription_id
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.customer_id.as_deref())
        .bind(filter.number_id)
        .bind(filter.include_deleted)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to list subscriptions", e))?;

        timer.observe_duration();
        Ok((convert(rows)?, total))
    }

    #[instrument(skip(self, expected))]
    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        expected: &[SubscriptionStatus],
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_subscription"])
            .start_timer();

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET status = $2, updated_utc = NOW()
            WHERE subscription_id = $1
              AND deleted_utc IS NULL
              AND (cardinality($3::text[]) = 0 OR status = ANY($3))
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(status.as_str())
        .bind(status_labels(expected, SubscriptionStatus::as_str))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to update subscription status", e))?;

        timer.observe_duration();
        row.map(Subscription::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_due_subscriptions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Subscription>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_due_subscriptions"])
            .start_timer();

        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE status <> 'cancelled' AND deleted_utc IS NULL AND renewal_date <= $1
            ORDER BY (status = 'suspended'), renewal_date
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to find due subscriptions", e))?;

        timer.observe_duration();
        convert(rows)
    }

    #[instrument(skip(self, update), fields(subscription_id = %update.subscription_id, cycle = %update.cycle))]
    async fn apply_renewal(
        &self,
        update: &RenewalUpdate,
    ) -> StoreResult<Option<(Subscription, UsageCounter)>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_renewal"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TelecomError::persistence("Failed to begin transaction", e))?;

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET current_period_start = $2, renewal_date = $3, status = 'active', updated_utc = NOW()
            WHERE subscription_id = $1 AND status <> 'cancelled' AND deleted_utc IS NULL
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(update.subscription_id)
        .bind(update.current_period_start)
        .bind(update.renewal_date)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TelecomError::persistence("Failed to advance subscription period", e))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(None);
        };

        // An existing counter for the cycle is kept as is.
        let counter = sqlx::query_as::<_, UsageCounter>(&format!(
            r#"
            INSERT INTO usage_counters (counter_id, subscription_id, cycle)
            VALUES ($1, $2, $3)
            ON CONFLICT (subscription_id, cycle) DO UPDATE SET updated_utc = usage_counters.updated_utc
            RETURNING {COUNTER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(update.subscription_id)
        .bind(&update.cycle)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| TelecomError::persistence("Failed to open usage counter", e))?;

        tx.commit()
            .await
            .map_err(|e| TelecomError::persistence("Failed to commit renewal", e))?;

        timer.observe_duration();
        Ok(Some((row.try_into()?, counter)))
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
    ) -> StoreResult<Option<(Subscription, PhoneNumber)>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_subscription"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TelecomError::persistence("Failed to begin transaction", e))?;

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', updated_utc = NOW()
            WHERE subscription_id = $1 AND status <> 'cancelled' AND deleted_utc IS NULL
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TelecomError::persistence("Failed to cancel subscription", e))?;

        let Some(row) = row else {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(None);
        };

        let number = sqlx::query_as::<_, NumberRow>(&format!(
            r#"
            UPDATE msisdn_inventory
            SET status = 'available', subscription_id = NULL, updated_utc = NOW()
            WHERE number_id = $1 AND deleted_utc IS NULL
            RETURNING {NUMBER_COLUMNS}
            "#
        ))
        .bind(row.number_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| TelecomError::persistence("Failed to release phone number", e))?;

        let Some(number) = number else {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Err(TelecomError::NumberNotFound(row.number_id));
        };

        tx.commit()
            .await
            .map_err(|e| TelecomError::persistence("Failed to commit cancellation", e))?;

        timer.observe_duration();
        Ok(Some((row.try_into()?, number.try_into()?)))
    }

    #[instrument(skip(self))]
    async fn soft_delete_subscription(&self, subscription_id: Uuid) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["soft_delete_subscription"])
            .start_timer();

        sqlx::query(
            "UPDATE subscriptions SET deleted_utc = NOW(), updated_utc = NOW() WHERE subscription_id = $1",
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to delete subscription", e))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Usage Counter Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn get_usage_counter(
        &self,
        subscription_id: Uuid,
        cycle: &str,
    ) -> StoreResult<Option<UsageCounter>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_usage_counter"])
            .start_timer();

        let counter = sqlx::query_as::<_, UsageCounter>(&format!(
            r#"
            SELECT {COUNTER_COLUMNS}
            FROM usage_counters
            WHERE subscription_id = $1 AND cycle = $2 AND deleted_utc IS NULL
            "#
        ))
        .bind(subscription_id)
        .bind(cycle)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to get usage counter", e))?;

        timer.observe_duration();
        Ok(counter)
    }

    #[instrument(skip(self))]
    async fn create_usage_counter_if_absent(
        &self,
        subscription_id: Uuid,
        cycle: &str,
    ) -> StoreResult<(UsageCounter, bool)> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_usage_counter"])
            .start_timer();

        let inserted = sqlx::query_as::<_, UsageCounter>(&format!(
            r#"
            INSERT INTO usage_counters (counter_id, subscription_id, cycle)
            VALUES ($1, $2, $3)
            ON CONFLICT (subscription_id, cycle) DO NOTHING
            RETURNING {COUNTER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(subscription_id)
        .bind(cycle)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to create usage counter", e))?;

        timer.observe_duration();

        match inserted {
            Some(counter) => Ok((counter, true)),
            None => {
                let existing = self
                    .get_usage_counter(subscription_id, cycle)
                    .await?
                    .ok_or_else(|| {
                        TelecomError::persistence("Failed to create usage counter", "row vanished")
                    })?;
                Ok((existing, false))
            }
        }
    }

    #[instrument(skip(self))]
    async fn increment_usage(
        &self,
        subscription_id: Uuid,
        cycle: &str,
        data_mb: f64,
        voice_min: f64,
    ) -> StoreResult<UsageCounter> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["increment_usage"])
            .start_timer();

        let counter = sqlx::query_as::<_, UsageCounter>(&format!(
            r#"
            INSERT INTO usage_counters (counter_id, subscription_id, cycle, data_used_mb, voice_used_min)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (subscription_id, cycle) DO UPDATE
            SET data_used_mb = usage_counters.data_used_mb + EXCLUDED.data_used_mb,
                voice_used_min = usage_counters.voice_used_min + EXCLUDED.voice_used_min,
                updated_utc = NOW()
            RETURNING {COUNTER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(subscription_id)
        .bind(cycle)
        .bind(data_mb)
        .bind(voice_min)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to record usage", e))?;

        timer.observe_duration();
        Ok(counter)
    }

    #[instrument(skip(self))]
    async fn mark_alerts_fired(&self, counter_id: Uuid, bits: i32) -> StoreResult<i32> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_alerts_fired"])
            .start_timer();

        let previous: Option<i32> = sqlx::query_scalar(
            r#"
            WITH prev AS (
                SELECT counter_id, alerts_fired FROM usage_counters WHERE counter_id = $1 FOR UPDATE
            )
            UPDATE usage_counters u
            SET alerts_fired = u.alerts_fired | $2, updated_utc = NOW()
            FROM prev
            WHERE u.counter_id = prev.counter_id
            RETURNING prev.alerts_fired
            "#,
        )
        .bind(counter_id)
        .bind(bits)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to mark alerts", e))?;

        timer.observe_duration();
        previous.ok_or_else(|| TelecomError::persistence("Failed to mark alerts", "counter missing"))
    }
}

#[async_trait]
impl OrderGateway for Database {
    #[instrument(skip(self))]
    async fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_order"])
            .start_timer();

        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, customer_id, currency_code, status
            FROM orders
            WHERE order_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TelecomError::persistence("Failed to get order", e))?;

        let Some(row) = row else {
            timer.observe_duration();
            return Ok(None);
        };

        let items = self.fetch_line_items(&row.order_id).await?;
        timer.observe_duration();

        Ok(Some(Order {
            status: OrderStatus::parse(&row.status)
                .ok_or_else(|| corrupt("order status", &row.status))?,
            order_id: row.order_id,
            customer_id: row.customer_id,
            currency_code: row.currency_code,
            items,
        }))
    }

    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_order"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TelecomError::persistence("Failed to begin transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, customer_id, currency_code, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO UPDATE
            SET customer_id = EXCLUDED.customer_id,
                currency_code = EXCLUDED.currency_code,
                status = EXCLUDED.status,
                updated_utc = NOW()
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.customer_id)
        .bind(&order.currency_code)
        .bind(order.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| TelecomError::persistence("Failed to store order", e))?;

        sqlx::query("DELETE FROM order_line_items WHERE order_id = $1")
            .bind(&order.order_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| TelecomError::persistence("Failed to replace line items", e))?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_line_items (line_item_id, order_id, position, product_id, variant_id, title, quantity, unit_price, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&item.line_item_id)
            .bind(&order.order_id)
            .bind(position as i32)
            .bind(&item.product_id)
            .bind(&item.variant_id)
            .bind(&item.title)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(&item.metadata)
            .execute(&mut *tx)
            .await
            .map_err(|e| TelecomError::persistence("Failed to store line item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| TelecomError::persistence("Failed to commit order", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, request), fields(subscription_id = %request.subscription_id))]
    async fn create_draft_order(&self, request: &DraftOrderRequest) -> StoreResult<Order> {
        if let Some(existing) = self.get_order(&request.order_id()).await? {
            info!(order_id = %existing.order_id, "Reusing renewal draft order");
            return Ok(existing);
        }

        let order = request.to_order();
        self.upsert_order(&order).await?;
        info!(order_id = %order.order_id, "Renewal draft order created");
        Ok(order)
    }
}
