use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::kernel::deps::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    connection_pool: ConnectionPoolHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

/// Checks DB connectivity/latency and reports pool utilization. Returns
/// 503 rather than 200 when the database is unreachable so load balancers
/// stop routing traffic to this replica (spec §5 replica-scale model).
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sqlx::query("SELECT 1").execute(&state.db),
    )
    .await
    {
        Ok(Ok(_)) => DatabaseHealth { status: "ok".to_string(), error: None },
        Ok(Err(err)) => DatabaseHealth { status: "error".to_string(), error: Some(err.to_string()) },
        Err(_) => DatabaseHealth { status: "error".to_string(), error: Some("query timeout (>5s)".to_string()) },
    };

    let pool_options = state.db.options();
    let pool_health = ConnectionPoolHealth {
        size: state.db.size(),
        idle_connections: state.db.num_idle(),
        max_connections: pool_options.get_max_connections(),
    };

    let is_healthy = db_health.status == "ok";
    let status_code = if is_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database: db_health,
            connection_pool: pool_health,
        }),
    )
}
