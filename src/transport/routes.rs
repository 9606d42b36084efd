//! HTTP routes for car listings.
//!
//! | Method | Path | Store call |
//! |---|---|---|
//! | POST | `/api/cars` | `insert` |
//! | GET | `/api/cars` | `list_page` |
//! | GET, PUT, DELETE | `/api/cars/{custom_id}` | `fetch_by_key`, `update`, `delete` |
//! | GET | `/api/cars/check-duplicate/{message_id}/{channel}` | `find_duplicate` |
//! | GET | `/api/health` | `check_connection`, `pool_stats` |

use crate::db::PoolStats;
use crate::error::{StoreError, StoreResult};
use crate::models::{CarRecord, CarUpdate, NewCar};
use crate::store::CarStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Request and error counters reported by the health endpoint.
#[derive(Debug, Default)]
pub struct RequestCounters {
    requests: AtomicU64,
    errors: AtomicU64,
}

impl RequestCounters {
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    store: CarStore,
    started_at: Instant,
    counters: Arc<RequestCounters>,
}

impl AppState {
    pub fn new(store: CarStore) -> Self {
        Self {
            store,
            started_at: Instant::now(),
            counters: Arc::new(RequestCounters::default()),
        }
    }

    pub fn store(&self) -> &CarStore {
        &self.store
    }

    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/cars", get(list_cars).post(create_car))
        .route(
            "/api/cars/{custom_id}",
            get(get_car).put(update_car).delete(delete_car),
        )
        .route(
            "/api/cars/check-duplicate/{message_id}/{channel}",
            get(check_duplicate),
        )
        .route("/api/health", get(health))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
}

async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    state.counters.requests.fetch_add(1, Ordering::Relaxed);
    let response = next.run(request).await;
    if response.status().is_server_error() {
        state.counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

#[derive(Serialize)]
struct CarMessage {
    message: &'static str,
    car: CarRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

async fn create_car(
    State(state): State<AppState>,
    body: Result<Json<NewCar>, JsonRejection>,
) -> StoreResult<(StatusCode, Json<CarMessage>)> {
    let Json(car) = body.map_err(|e| StoreError::invalid_argument(e.body_text()))?;
    let start = Instant::now();
    let car = state.store.insert(car).await?;
    Ok((
        StatusCode::CREATED,
        Json(CarMessage {
            message: "Car saved",
            car,
            duration_ms: Some(start.elapsed().as_millis() as u64),
        }),
    ))
}

async fn get_car(
    State(state): State<AppState>,
    Path(custom_id): Path<String>,
) -> StoreResult<Json<CarRecord>> {
    state
        .store
        .fetch_by_key(&custom_id)
        .await?
        .map(Json)
        .ok_or_else(|| StoreError::not_found(custom_id))
}

/// Raw pagination parameters. Unparseable values fall back to the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageParams {
    /// `(page, limit)` with page >= 1 and limit clamped to 1..=100.
    pub fn resolve(&self) -> (u64, u32) {
        let page = self
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<u64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(DEFAULT_PAGE);
        let limit = self
            .limit
            .as_deref()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .map(|l| l.clamp(1, i64::from(MAX_PAGE_SIZE)) as u32)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Serialize)]
struct Pagination {
    page: u64,
    limit: u32,
    total: u64,
    pages: u64,
}

#[derive(Serialize)]
struct CarList {
    cars: Vec<CarRecord>,
    pagination: Pagination,
}

async fn list_cars(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> StoreResult<Json<CarList>> {
    let (page, limit) = params.resolve();
    let offset = (page - 1).saturating_mul(u64::from(limit));
    let result = state.store.list_page(limit, offset).await?;
    Ok(Json(CarList {
        cars: result.records,
        pagination: Pagination {
            page,
            limit,
            total: result.total,
            pages: result.total.div_ceil(u64::from(limit)),
        },
    }))
}

async fn update_car(
    State(state): State<AppState>,
    Path(custom_id): Path<String>,
    body: Result<Json<CarUpdate>, JsonRejection>,
) -> StoreResult<Json<CarMessage>> {
    let Json(changes) = body.map_err(|e| StoreError::invalid_argument(e.body_text()))?;
    let car = state.store.update(&custom_id, changes).await?;
    Ok(Json(CarMessage {
        message: "Car updated",
        car,
        duration_ms: None,
    }))
}

async fn delete_car(
    State(state): State<AppState>,
    Path(custom_id): Path<String>,
) -> StoreResult<Json<CarMessage>> {
    let car = state.store.delete(&custom_id).await?;
    Ok(Json(CarMessage {
        message: "Car deleted",
        car,
        duration_ms: None,
    }))
}

async fn check_duplicate(
    State(state): State<AppState>,
    Path((message_id, channel)): Path<(String, String)>,
) -> StoreResult<Json<Option<CarRecord>>> {
    let message_id = message_id.trim().parse::<i64>().map_err(|_| {
        StoreError::invalid_argument(format!("message_id must be an integer, got '{}'", message_id))
    })?;
    Ok(Json(state.store.find_duplicate(message_id, &channel).await))
}

#[derive(Serialize)]
struct ServerHealth {
    status: &'static str,
    uptime_secs: u64,
    requests: u64,
    errors: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct DatabaseHealth {
    connected: bool,
    pool: Option<PoolStats>,
}

#[derive(Serialize)]
struct Health {
    server: ServerHealth,
    database: DatabaseHealth,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let pool = state.store.pool();
    let connected = pool.check_connection().await;
    let stats = pool.pool_stats().await;
    Json(Health {
        server: ServerHealth {
            status: if connected { "ok" } else { "degraded" },
            uptime_secs: state.started_at.elapsed().as_secs(),
            requests: state.counters.requests(),
            errors: state.counters.errors(),
            timestamp: Utc::now(),
        },
        database: DatabaseHealth {
            connected,
            pool: stats,
        },
    })
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": {"code": "not_found", "message": "Route not found"}})),
    )
}
