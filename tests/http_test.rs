//! HTTP tests driving the router directly with `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use car_store_server::config::DatabaseConfig;
use car_store_server::db::{PoolManager, RetryPolicy};
use car_store_server::store::CarStore;
use car_store_server::transport::{AppState, router};
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

async fn setup_app() -> (Router, AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("cars.db").display());
    let config = DatabaseConfig::parse(&url).unwrap();
    let policy = RetryPolicy {
        query_retry_delay: Duration::from_millis(5),
        acquire_retry_delay: Duration::from_millis(5),
        settle_delay: Duration::from_millis(5),
        ..RetryPolicy::default()
    };
    let store = CarStore::new(PoolManager::new(config, policy).unwrap());
    let state = AppState::new(store);
    (router(state.clone()), state, dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn car_body(custom_id: &str) -> Value {
    json!({
        "custom_id": custom_id,
        "source_message_id": 1001,
        "source_channel_name": "cars_channel",
        "brand": "Toyota",
        "model": "Corolla",
        "year": 2018,
        "price": "9500.00",
        "photos": ["https://cdn.example.com/a.jpg"]
    })
}

#[tokio::test]
async fn test_create_and_get_car() {
    let (app, _state, _dir) = setup_app().await;

    let (status, body) = send(&app, "POST", "/api/cars", Some(car_body("car-1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Car saved");
    assert_eq!(body["car"]["custom_id"], "car-1");
    assert_eq!(body["car"]["price"], 9500.0);
    assert_eq!(body["car"]["status"], "available");
    assert!(body["duration_ms"].is_u64());

    let (status, body) = send(&app, "GET", "/api/cars/car-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["brand"], "Toyota");
    assert_eq!(body["photos"], json!(["https://cdn.example.com/a.jpg"]));
}

#[tokio::test]
async fn test_duplicate_create_returns_409() {
    let (app, _state, _dir) = setup_app().await;
    send(&app, "POST", "/api/cars", Some(car_body("car-1"))).await;

    let (status, body) = send(&app, "POST", "/api/cars", Some(car_body("car-1"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn test_malformed_body_returns_400() {
    let (app, _state, _dir) = setup_app().await;
    let (status, body) = send(&app, "POST", "/api/cars", Some(json!({"brand": "Toyota"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");
}

#[tokio::test]
async fn test_non_finite_price_returns_400() {
    let (app, _state, _dir) = setup_app().await;

    let mut body = car_body("car-1");
    body["price"] = json!("NaN");
    let (status, body) = send(&app, "POST", "/api/cars", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");

    send(&app, "POST", "/api/cars", Some(car_body("car-1"))).await;
    let (status, _) = send(&app, "PUT", "/api/cars/car-1", Some(json!({"price": "-inf"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, car) = send(&app, "GET", "/api/cars/car-1", None).await;
    assert_eq!(car["price"], 9500.0);
}

#[tokio::test]
async fn test_unknown_car_returns_404() {
    let (app, _state, _dir) = setup_app().await;

    let (status, body) = send(&app, "GET", "/api/cars/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = send(&app, "DELETE", "/api/cars/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PUT", "/api/cars/nope", Some(json!({"brand": "BMW"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_delete() {
    let (app, _state, _dir) = setup_app().await;
    send(&app, "POST", "/api/cars", Some(car_body("car-1"))).await;

    let (status, body) = send(&app, "PUT", "/api/cars/car-1", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_argument");

    let (status, body) = send(
        &app,
        "PUT",
        "/api/cars/car-1",
        Some(json!({"status": "sold", "price": 9000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["car"]["status"], "sold");
    assert_eq!(body["car"]["price"], 9000.0);
    assert_eq!(body["car"]["model"], "Corolla");

    let (status, body) = send(&app, "DELETE", "/api/cars/car-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["car"]["custom_id"], "car-1");

    let (status, _) = send(&app, "GET", "/api/cars/car-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_pagination() {
    let (app, _state, _dir) = setup_app().await;
    for id in ["car-1", "car-2", "car-3"] {
        send(&app, "POST", "/api/cars", Some(car_body(id))).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (status, body) = send(&app, "GET", "/api/cars?page=1&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cars"].as_array().unwrap().len(), 2);
    assert_eq!(body["cars"][0]["custom_id"], "car-3");
    assert_eq!(
        body["pagination"],
        json!({"page": 1, "limit": 2, "total": 3, "pages": 2})
    );

    let (_, body) = send(&app, "GET", "/api/cars?page=2&limit=2", None).await;
    assert_eq!(body["cars"][0]["custom_id"], "car-1");

    let (_, body) = send(&app, "GET", "/api/cars", None).await;
    assert_eq!(body["pagination"]["limit"], 10);
}

#[tokio::test]
async fn test_check_duplicate() {
    let (app, _state, _dir) = setup_app().await;
    send(&app, "POST", "/api/cars", Some(car_body("car-1"))).await;

    let (status, body) = send(&app, "GET", "/api/cars/check-duplicate/1001/cars_channel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["custom_id"], "car-1");

    let (status, body) = send(&app, "GET", "/api/cars/check-duplicate/1002/cars_channel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, _) = send(&app, "GET", "/api/cars/check-duplicate/abc/cars_channel", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_counters() {
    let (app, state, _dir) = setup_app().await;
    send(&app, "GET", "/api/cars/nope", None).await;

    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"]["status"], "ok");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["database"]["pool"]["retry_count"], 0);
    assert_eq!(body["server"]["requests"], 2);
    assert_eq!(body["server"]["errors"], 0);
    assert_eq!(state.counters().requests(), 2);
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let (app, _state, _dir) = setup_app().await;
    let (status, body) = send(&app, "GET", "/api/trucks", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}
