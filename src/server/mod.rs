//! HTTP server assembly: Axum router, middleware stack (spec §6, §9).

pub mod middleware;
pub mod routes;

use std::time::Duration;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::deps::AppState;
use middleware::request_id::{capture, MakeUuidRequestId};

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any);

    let header_name = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);

    // The SSE route is exempt from the request timeout (spec §5: "SSE
    // streams have no server-side timeout — they end when the job ends
    // or the client disconnects"); every other route gets one.
    let timed = Router::new()
        .route("/health", get(routes::health_handler))
        .route("/v1/content/generate", post(routes::content::generate))
        .route("/v1/content/jobs", get(routes::content::list_jobs))
        .route("/v1/content/jobs/:id", get(routes::content::get_job))
        .route("/v1/content/jobs/:id/cancel", post(routes::content::cancel_job))
        .route("/v1/content/usage", get(routes::content::usage))
        .route("/v1/content/voiceover", post(routes::media::voiceover))
        .route("/v1/content/video/render", post(routes::media::render_video))
        .route("/v1/billing/webhook", post(routes::billing::webhook))
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let untimed = Router::new().route("/v1/content/jobs/:id/stream", get(routes::content::stream_job));

    timed
        .merge(untimed)
        .layer(
            ServiceBuilder::new()
                // Outermost first: assign/propagate the request id before
                // anything else sees the request, then let `capture` mirror
                // it into a task-local for synchronous error responses.
                .layer(SetRequestIdLayer::new(header_name.clone(), MakeUuidRequestId))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(axum::middleware::from_fn(capture))
                .layer(CatchPanicLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
