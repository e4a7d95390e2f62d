//! `POST /v1/billing/webhook` — not in the core HTTP table but required
//! by the billing audit trail (`original_source/services/billing_service.py`,
//! spec §3, §8 property 3). Provider-agnostic: signature verification and
//! payload parsing are delegated to `BillingGateway`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use uuid::Uuid;

use crate::domains::billing::{BillingStore, WebhookOutcome};
use crate::errors::{ApiError, ApiResult};
use crate::kernel::deps::AppState;

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation("missing webhook signature".to_string()))?;

    let verified = state
        .billing
        .verify_webhook_signature(&body, signature)
        .map_err(ApiError::Internal)?;
    if !verified {
        return Err(ApiError::AuthError);
    }

    let event = state.billing.parse_event(&body).map_err(ApiError::Internal)?;

    let org_id = event
        .payload
        .get("org_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<Uuid>().ok());

    let store = BillingStore::new(state.db.clone());
    match store.process(&event, org_id).await.map_err(ApiError::Internal)? {
        WebhookOutcome::Processed => Ok(StatusCode::OK),
        WebhookOutcome::Duplicate => Ok(StatusCode::OK),
    }
}
