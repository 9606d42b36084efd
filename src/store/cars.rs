use crate::db::{PoolManager, schema};
use crate::error::{DbError, StoreError, StoreResult};
use crate::models::car::photos_param;
use crate::models::{CarPage, CarRecord, CarUpdate, NewCar, QueryParam, Statement};
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Facade over the `cars` table.
///
/// Cheap to clone; clones share the pool and the schema-ready flag.
#[derive(Debug, Clone)]
pub struct CarStore {
    pool: Arc<PoolManager>,
    schema_ready: Arc<OnceCell<()>>,
}

impl CarStore {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    /// Create the table and indexes if missing.
    ///
    /// Runs once per store; a failed run is attempted again on the next call.
    /// Nullability relaxation afterwards is best effort.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                let db = self.pool.db_type();
                for sql in schema::create_statements(db) {
                    self.pool.execute_query(&Statement::new(*sql)).await?;
                }
                for sql in schema::relax_statements(db) {
                    if let Err(e) = self.pool.execute_query(&Statement::new(*sql)).await {
                        debug!(sql, error = %e, "Ignoring failed schema relaxation");
                    }
                }
                info!(db_type = %db, "Cars schema ready");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    /// Insert a new listing and return the stored row.
    pub async fn insert(&self, car: NewCar) -> StoreResult<CarRecord> {
        car.validate().map_err(StoreError::invalid_argument)?;
        self.ensure_schema().await?;

        let now = Utc::now();
        let status = car.status.unwrap_or_default();
        let sql = format!(
            "INSERT INTO cars (custom_id, source_message_id, source_channel_name, \
             target_channel_message_id, brand, model, year, price, description, photos, \
             status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            self.columns()
        );
        let stmt = Statement::new(sql)
            .bind(car.custom_id.as_str())
            .bind(car.source_message_id)
            .bind(car.source_channel_name.clone())
            .bind(car.target_channel_message_id)
            .bind(car.brand.clone())
            .bind(car.model.clone())
            .bind(car.year)
            .bind(car.price)
            .bind(car.description.clone())
            .bind(photos_param(&car.photos))
            .bind(status.as_str())
            .bind(now)
            .bind(now);

        let result = match self.pool.execute_query(&stmt).await {
            Ok(result) => result,
            Err(DbError::UniqueViolation { constraint, .. }) => {
                warn!(
                    custom_id = %car.custom_id,
                    constraint = constraint.as_deref().unwrap_or("unknown"),
                    "Duplicate car insert rejected"
                );
                return Err(StoreError::conflict(car.custom_id));
            }
            Err(e) => return Err(e.into()),
        };

        let record = single_record(result.into_first(), &car.custom_id)?
            .ok_or_else(|| StoreError::internal("Insert returned no row"))?;
        info!(custom_id = %record.custom_id, id = record.id, "Car inserted");
        Ok(record)
    }

    /// Look a listing up by its business key.
    pub async fn fetch_by_key(&self, custom_id: &str) -> StoreResult<Option<CarRecord>> {
        self.ensure_schema().await?;
        let stmt = Statement::new(format!(
            "SELECT {} FROM cars WHERE custom_id = $1",
            self.columns()
        ))
        .bind(custom_id);
        let result = self.pool.execute_query(&stmt).await?;
        single_record(result.into_first(), custom_id)
    }

    /// One page of listings, newest first, plus the total row count.
    pub async fn list_page(&self, limit: u32, offset: u64) -> StoreResult<CarPage> {
        self.ensure_schema().await?;
        let offset = i64::try_from(offset)
            .map_err(|_| StoreError::invalid_argument("offset is too large"))?;

        let page = Statement::new(format!(
            "SELECT {} FROM cars ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            self.columns()
        ))
        .bind(i64::from(limit))
        .bind(offset);
        let result = self.pool.execute_query(&page).await?;
        let records = result
            .rows
            .into_iter()
            .map(|row| CarRecord::from_row(row).map_err(StoreError::internal))
            .collect::<StoreResult<Vec<_>>>()?;

        let count = self
            .pool
            .execute_query(&Statement::new("SELECT COUNT(*) AS total FROM cars"))
            .await?;
        let total = count
            .into_first()
            .and_then(|row| row.get("total").and_then(JsonValue::as_u64))
            .ok_or_else(|| StoreError::internal("COUNT(*) returned no total"))?;

        debug!(limit, offset, returned = records.len(), total, "Listed cars");
        Ok(CarPage { records, total })
    }

    /// Apply a partial update. `updated_at` is always refreshed.
    pub async fn update(&self, custom_id: &str, changes: CarUpdate) -> StoreResult<CarRecord> {
        changes.validate().map_err(StoreError::invalid_argument)?;
        let assignments = changes.assignments();
        if assignments.is_empty() {
            return Err(StoreError::invalid_argument("No fields to update"));
        }
        self.ensure_schema().await?;

        let mut set = Vec::with_capacity(assignments.len() + 1);
        let mut params: Vec<QueryParam> = Vec::with_capacity(assignments.len() + 2);
        for (column, value) in assignments {
            params.push(value);
            set.push(format!("{} = ${}", column.column_name(), params.len()));
        }
        params.push(Utc::now().into());
        set.push(format!("updated_at = ${}", params.len()));
        params.push(custom_id.into());

        let stmt = Statement {
            sql: format!(
                "UPDATE cars SET {} WHERE custom_id = ${} RETURNING {}",
                set.join(", "),
                params.len(),
                self.columns()
            ),
            params,
        };
        let result = self.pool.execute_query(&stmt).await?;
        let record = single_record(result.into_first(), custom_id)?
            .ok_or_else(|| StoreError::not_found(custom_id))?;
        info!(custom_id, "Car updated");
        Ok(record)
    }

    /// Hard delete. Returns the removed row.
    pub async fn delete(&self, custom_id: &str) -> StoreResult<CarRecord> {
        self.ensure_schema().await?;
        let stmt = Statement::new(format!(
            "DELETE FROM cars WHERE custom_id = $1 RETURNING {}",
            self.columns()
        ))
        .bind(custom_id);
        let result = self.pool.execute_query(&stmt).await?;
        let record = single_record(result.into_first(), custom_id)?
            .ok_or_else(|| StoreError::not_found(custom_id))?;
        info!(custom_id, "Car deleted");
        Ok(record)
    }

    /// Advisory lookup by source message identity.
    ///
    /// Never fails: any error is logged and reported as no match.
    pub async fn find_duplicate(&self, message_id: i64, channel: &str) -> Option<CarRecord> {
        match self.lookup_source(message_id, channel).await {
            Ok(found) => found,
            Err(e) => {
                warn!(message_id, channel, error = %e, "Duplicate check failed, assuming none");
                None
            }
        }
    }

    async fn lookup_source(&self, message_id: i64, channel: &str) -> StoreResult<Option<CarRecord>> {
        self.ensure_schema().await?;
        let stmt = Statement::new(format!(
            "SELECT {} FROM cars WHERE source_message_id = $1 AND source_channel_name = $2 \
             ORDER BY id LIMIT 1",
            self.columns()
        ))
        .bind(message_id)
        .bind(channel);
        let result = self.pool.execute_query(&stmt).await?;
        single_record(result.into_first(), "")
    }

    fn columns(&self) -> &'static str {
        schema::car_columns(self.pool.db_type())
    }
}

fn single_record(
    row: Option<serde_json::Map<String, JsonValue>>,
    custom_id: &str,
) -> StoreResult<Option<CarRecord>> {
    row.map(CarRecord::from_row)
        .transpose()
        .map_err(|e| {
            warn!(custom_id, error = %e, "Stored car could not be decoded");
            StoreError::internal(e)
        })
}

