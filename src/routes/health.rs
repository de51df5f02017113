use axum::Json;
use serde_json::{json, Value};
use std::time::SystemTime;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": httpdate::fmt_http_date(SystemTime::now()),
    }))
}
