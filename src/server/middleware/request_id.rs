//! Request ID propagation (spec §7: every error body carries a `request_id`).
//!
//! `tower_http::request_id` assigns the `x-request-id` header; this module
//! supplies the id-generation strategy and mirrors the header into a
//! task-local so `ApiError::into_response` — which has no access to the
//! request — can still read it synchronously.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_REQUEST_ID: String;
}

/// Generates a fresh UUID per request, used with `SetRequestIdLayer`.
#[derive(Clone, Default)]
pub struct MakeUuidRequestId;

impl MakeRequestId for MakeUuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let header = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(header))
    }
}

/// Mirrors the `x-request-id` header (already set by `SetRequestIdLayer`
/// upstream of this layer) into a task-local for the duration of the
/// handler, so error responses can stamp it without threading it through
/// every call site.
pub async fn capture(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    CURRENT_REQUEST_ID.scope(id, next.run(request)).await
}

/// Reads the current request's id. Returns `"unknown"` outside a request
/// scope (e.g. in unit tests that construct `ApiError` directly).
pub fn current() -> String {
    CURRENT_REQUEST_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| "unknown".to_string())
}
